//! 一维信号的峰值查找，变化检测和能量峰值检测共用

/// 自校准的峰值高度阈值策略
///
/// 变化检测使用标准差，能量检测使用均值，两者刻意保持不同。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// 信号的总体标准差
    StdDev,
    /// 信号的算术平均值
    Mean,
}

impl Threshold {
    /// 根据参考信号计算阈值，空信号返回 0
    pub fn level(&self, reference: &[f64]) -> f64 {
        match self {
            Threshold::StdDev => std_dev(reference),
            Threshold::Mean => mean(reference),
        }
    }
}

pub fn mean(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().sum::<f64>() / signal.len() as f64
}

/// 总体标准差（ddof = 0）
pub fn std_dev(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let m = mean(signal);
    let variance = signal.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / signal.len() as f64;
    variance.sqrt()
}

/// 查找局部极大值
///
/// 首尾两个点不会被视为峰值。平台（连续相等的最大值）只返回平台中点，
/// 中点向左取整。
pub fn local_maxima(signal: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if signal.len() < 3 {
        return peaks;
    }

    let last = signal.len() - 1;
    let mut i = 1;
    while i < last {
        if signal[i - 1] < signal[i] {
            let mut ahead = i + 1;
            while ahead < last && signal[ahead] == signal[i] {
                ahead += 1;
            }
            if signal[ahead] < signal[i] {
                let right = ahead - 1;
                peaks.push((i + right) / 2);
                i = ahead;
            }
        }
        i += 1;
    }

    peaks
}

/// 查找高度严格大于 `height` 的局部极大值，按索引升序返回
pub fn find_peaks(signal: &[f64], height: f64) -> Vec<usize> {
    local_maxima(signal)
        .into_iter()
        .filter(|&idx| signal[idx] > height)
        .collect()
}
