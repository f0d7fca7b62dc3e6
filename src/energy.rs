use tracing::debug;
use crate::audio_extractor::Waveform;
use crate::error::{AnalysisError, AnalysisResult};
use crate::peaks::{self, Threshold};

/// 默认能量窗口大小（采样点数）
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// 能量峰值检测使用的阈值策略：能量序列的均值
pub const ENERGY_THRESHOLD: Threshold = Threshold::Mean;

/// 计算不重叠窗口的平均平方振幅，末尾不足一个窗口的采样被丢弃
pub fn chunk_energy(mono: &[f32], chunk_size: usize) -> Vec<f64> {
    if chunk_size == 0 {
        return Vec::new();
    }
    mono.chunks_exact(chunk_size)
        .map(|chunk| {
            chunk.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / chunk_size as f64
        })
        .collect()
}

/// 检测音频能量峰值时间点（秒），按升序返回
///
/// 静音或能量恒定的音频不会产生峰值。
pub fn detect_energy_peaks(waveform: &Waveform, chunk_size: usize) -> AnalysisResult<Vec<f64>> {
    if waveform.sample_rate == 0 {
        return Err(AnalysisError::invalid_input("采样率不能为 0"));
    }
    if chunk_size == 0 {
        return Err(AnalysisError::invalid_input("能量窗口大小不能为 0"));
    }
    if waveform.samples.iter().any(|s| !s.is_finite()) {
        return Err(AnalysisError::invalid_input("波形中包含非有限值"));
    }

    let mono = waveform.to_mono();
    let energy = chunk_energy(&mono, chunk_size);
    let height = ENERGY_THRESHOLD.level(&energy);
    let seconds_per_chunk = chunk_size as f64 / waveform.sample_rate as f64;

    let timestamps: Vec<f64> = peaks::find_peaks(&energy, height)
        .into_iter()
        .map(|idx| idx as f64 * seconds_per_chunk)
        .collect();

    debug!(
        "🔍 [能量检测] {} 个窗口, 均值 {:.6}, 检测到 {} 个峰值",
        energy.len(),
        height,
        timestamps.len()
    );

    Ok(timestamps)
}
