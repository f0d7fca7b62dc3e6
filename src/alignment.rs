//! 音频起点偏移搜索：让音频能量峰值尽量落在画面变化点上

use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::error::{AnalysisError, AnalysisResult};

/// 默认搜索步长（秒）
pub const DEFAULT_OFFSET_STEP: f64 = 0.5;

// 吸收 (audio - video) / step 的浮点误差，避免多出一个候选
const GRID_EPSILON: f64 = 1e-9;

/// 一次对齐分析的完整结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentReport {
    /// 画面变化时间点（秒）
    pub change_timestamps: Vec<f64>,
    /// 音频能量峰值时间点（秒）
    pub energy_peaks: Vec<f64>,
    /// 选中的音频起点偏移（秒）
    pub offset: f64,
    /// 选中偏移的对齐得分，越低越好
    pub score: f64,
    pub video_duration: f64,
    pub audio_duration: f64,
}

/// 计算某个偏移下的对齐得分
///
/// 对每个变化点，取它到平移后（峰值 - offset）最近峰值的距离，求和。
/// 只从变化点一侧计算，不是对称距离。峰值为空时返回 0。
pub fn alignment_score(change_timestamps: &[f64], energy_peaks: &[f64], offset: f64) -> f64 {
    if energy_peaks.is_empty() {
        return 0.0;
    }
    change_timestamps
        .iter()
        .map(|&change| {
            energy_peaks
                .iter()
                .map(|&peak| (change - (peak - offset)).abs())
                .fold(f64::INFINITY, f64::min)
        })
        .sum()
}

/// 生成候选偏移：从 0 开始按步长递增，覆盖 [0, audio - video] 整个区间
///
/// 区间长度不是步长整数倍时，最后一个候选向上取到下一个步长。
/// 音频不长于视频时没有候选。
pub fn candidate_offsets(video_duration: f64, audio_duration: f64, step: f64) -> AnalysisResult<Vec<f64>> {
    validate_duration("视频时长", video_duration)?;
    validate_duration("音频时长", audio_duration)?;
    if !step.is_finite() || step <= 0.0 {
        return Err(AnalysisError::invalid_input(format!("搜索步长无效: {}", step)));
    }

    let slack = (audio_duration - video_duration).max(0.0);
    if slack <= 0.0 {
        return Ok(Vec::new());
    }

    let last = (slack / step - GRID_EPSILON).ceil().max(0.0) as usize;
    Ok((0..=last).map(|k| k as f64 * step).collect())
}

/// 网格搜索最佳音频起点偏移（秒）
///
/// 得分相同时保留最早的偏移。没有候选、变化点为空或峰值为空时返回 0。
pub fn find_best_offset(
    change_timestamps: &[f64],
    energy_peaks: &[f64],
    video_duration: f64,
    audio_duration: f64,
    step: f64,
) -> AnalysisResult<f64> {
    search(change_timestamps, energy_peaks, video_duration, audio_duration, step).map(|(offset, _)| offset)
}

/// 与 [`find_best_offset`] 相同，额外返回选中偏移的得分
pub fn search(
    change_timestamps: &[f64],
    energy_peaks: &[f64],
    video_duration: f64,
    audio_duration: f64,
    step: f64,
) -> AnalysisResult<(f64, f64)> {
    validate_timestamps("画面变化时间点", change_timestamps)?;
    validate_timestamps("音频能量峰值", energy_peaks)?;
    let candidates = candidate_offsets(video_duration, audio_duration, step)?;

    if candidates.is_empty() {
        debug!("🎚️  [对齐] 音频不长于视频，偏移固定为 0");
        return Ok((0.0, alignment_score(change_timestamps, energy_peaks, 0.0)));
    }
    if change_timestamps.is_empty() || energy_peaks.is_empty() {
        debug!(
            "🎚️  [对齐] 变化点 {} 个, 峰值 {} 个, 无法比较，偏移固定为 0",
            change_timestamps.len(),
            energy_peaks.len()
        );
        return Ok((0.0, 0.0));
    }

    let mut best_offset = 0.0;
    let mut best_score = f64::INFINITY;
    for &offset in &candidates {
        let score = alignment_score(change_timestamps, energy_peaks, offset);
        if score < best_score {
            best_score = score;
            best_offset = offset;
        }
    }

    debug!(
        "🎚️  [对齐] {} 个候选偏移, 最佳偏移 {:.2}s, 得分 {:.4}",
        candidates.len(),
        best_offset,
        best_score
    );

    Ok((best_offset, best_score))
}

fn validate_duration(name: &str, value: f64) -> AnalysisResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(AnalysisError::invalid_input(format!("{}无效: {}", name, value)));
    }
    Ok(())
}

fn validate_timestamps(name: &str, values: &[f64]) -> AnalysisResult<()> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::invalid_input(format!("{}中包含非有限值", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_aligns_peak() {
        let offset = find_best_offset(&[1.5], &[2.0], 3.0, 3.4, 0.5).unwrap();
        assert_eq!(offset, 0.5);
    }

    #[test]
    fn test_audio_not_longer_than_video() {
        assert_eq!(find_best_offset(&[1.0], &[3.0], 10.0, 10.0, 0.5).unwrap(), 0.0);
        assert_eq!(find_best_offset(&[1.0], &[3.0], 10.0, 4.0, 0.5).unwrap(), 0.0);
    }

    #[test]
    fn test_deterministic() {
        let changes = [0.8, 2.4, 5.1, 7.7];
        let peaks = [1.9, 3.3, 4.6, 6.2, 8.8, 11.0];
        let first = find_best_offset(&changes, &peaks, 9.0, 14.0, 0.5).unwrap();
        for _ in 0..5 {
            assert_eq!(find_best_offset(&changes, &peaks, 9.0, 14.0, 0.5).unwrap(), first);
        }
    }

    #[test]
    fn test_ties_keep_earliest_offset() {
        // 没有峰值时所有候选得分都为 0
        let offset = find_best_offset(&[1.0], &[], 5.0, 8.0, 0.5).unwrap();
        assert_eq!(offset, 0.0);

        // 两个偏移得分相同（1.0 和 2.0 都让峰值与变化点距离 0.5）
        let (offset, score) = search(&[2.0], &[3.5], 4.0, 6.0, 1.0).unwrap();
        assert_eq!(offset, 1.0);
        assert!((score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_sets_are_degenerate() {
        assert_eq!(find_best_offset(&[], &[1.0, 2.0], 3.0, 9.0, 0.5).unwrap(), 0.0);
        assert_eq!(find_best_offset(&[1.0, 2.0], &[], 3.0, 9.0, 0.5).unwrap(), 0.0);
    }

    #[test]
    fn test_candidate_grid() {
        assert_eq!(candidate_offsets(3.0, 4.0, 0.5).unwrap(), vec![0.0, 0.5, 1.0]);
        assert_eq!(candidate_offsets(3.0, 3.4, 0.5).unwrap(), vec![0.0, 0.5]);
        assert!(candidate_offsets(3.0, 3.0, 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_step_and_durations() {
        assert!(matches!(
            find_best_offset(&[1.0], &[1.0], 3.0, 5.0, 0.0),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(matches!(
            find_best_offset(&[1.0], &[1.0], f64::NAN, 5.0, 0.5),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(matches!(
            find_best_offset(&[f64::INFINITY], &[1.0], 3.0, 5.0, 0.5),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_score_is_one_directional() {
        // 多余的峰值不会增加得分
        assert_eq!(alignment_score(&[1.0], &[1.0, 50.0, 90.0], 0.0), 0.0);
        // 每个变化点都要找到最近的峰值
        assert_eq!(alignment_score(&[1.0, 3.0], &[1.0], 0.0), 2.0);
    }
}
