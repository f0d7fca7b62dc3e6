use image::DynamicImage;
use tracing::debug;
use crate::error::{AnalysisError, AnalysisResult};
use crate::peaks::{self, Threshold};

/// 画面变化检测使用的阈值策略：帧间差分的标准差
pub const CHANGE_THRESHOLD: Threshold = Threshold::StdDev;

/// 画面变化检测器，用于找出剪辑点、运动突变等视觉变化的时间点
pub struct ChangeDetector {
    threshold: Threshold,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(CHANGE_THRESHOLD)
    }
}

impl ChangeDetector {
    pub fn new(threshold: Threshold) -> Self {
        Self { threshold }
    }

    /// 计算单帧亮度：所有像素所有通道取值的平均值
    pub fn frame_brightness(frame: &DynamicImage) -> f64 {
        let bytes = frame.as_bytes();
        match frame {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_) => mean_u8(bytes),
            // 其他位深统一转换为 RGB8 再计算
            _ => mean_u8(frame.to_rgb8().as_raw()),
        }
    }

    /// 将帧序列压缩为亮度序列
    pub fn brightness_signal(frames: &[DynamicImage]) -> Vec<f64> {
        frames.iter().map(Self::frame_brightness).collect()
    }

    /// 检测画面变化时间点（秒），按升序返回
    ///
    /// 第 i 个差分描述第 i 帧到第 i+1 帧的变化，换算成时间为 i / fps。
    pub fn detect(&self, brightness: &[f64], fps: f64) -> AnalysisResult<Vec<f64>> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(AnalysisError::invalid_input(format!("帧率无效: {}", fps)));
        }
        if let Some(idx) = brightness.iter().position(|v| !v.is_finite()) {
            return Err(AnalysisError::invalid_input(format!(
                "第 {} 帧亮度不是有限值",
                idx
            )));
        }
        if brightness.len() < 2 {
            return Ok(Vec::new());
        }

        let diffs: Vec<f64> = brightness.windows(2).map(|w| w[1] - w[0]).collect();
        let height = self.threshold.level(&diffs);
        let magnitudes: Vec<f64> = diffs.iter().map(|d| d.abs()).collect();

        let timestamps: Vec<f64> = peaks::find_peaks(&magnitudes, height)
            .into_iter()
            .map(|idx| idx as f64 / fps)
            .collect();

        debug!(
            "🔍 [变化检测] {} 帧, 阈值 {:.4}, 检测到 {} 个变化点",
            brightness.len(),
            height,
            timestamps.len()
        );

        Ok(timestamps)
    }
}

fn mean_u8(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let sum: u64 = bytes.iter().map(|&b| b as u64).sum();
    sum as f64 / bytes.len() as f64
}

/// 按默认的标准差阈值检测变化时间点
pub fn detect_change_timestamps(brightness: &[f64], fps: f64) -> AnalysisResult<Vec<f64>> {
    ChangeDetector::default().detect(brightness, fps)
}

/// 直接从解码后的帧序列检测变化时间点
pub fn detect_frame_changes(frames: &[DynamicImage], fps: f64) -> AnalysisResult<Vec<f64>> {
    detect_change_timestamps(&ChangeDetector::brightness_signal(frames), fps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    fn gray_frame(value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_fn(16, 16, |_, _| image::Luma([value])))
    }

    #[test]
    fn test_frame_brightness() {
        assert_eq!(ChangeDetector::frame_brightness(&gray_frame(100)), 100.0);

        let rgb = DynamicImage::ImageRgb8(ImageBuffer::from_fn(4, 4, |_, _| image::Rgb([0u8, 30, 90])));
        assert!((ChangeDetector::frame_brightness(&rgb) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_video_has_no_changes() {
        let frames: Vec<DynamicImage> = (0..30).map(|_| gray_frame(80)).collect();
        let changes = detect_frame_changes(&frames, 30.0).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_single_jump_at_frame_45() {
        let brightness: Vec<f64> = (0..90).map(|i| if i < 45 { 50.0 } else { 200.0 }).collect();
        let changes = detect_change_timestamps(&brightness, 30.0).unwrap();

        // 第 44 个差分（第 44 帧到第 45 帧）
        assert_eq!(changes, vec![44.0 / 30.0]);
        assert!((changes[0] - 1.5).abs() <= 1.0 / 30.0);
    }

    #[test]
    fn test_change_index_maps_to_seconds() {
        let brightness = [0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 10.0, 10.0];
        assert_eq!(detect_change_timestamps(&brightness, 2.0).unwrap(), vec![1.0]);
    }

    #[test]
    fn test_single_flash_frame() {
        let frames: Vec<DynamicImage> = (0..60)
            .map(|i| if i == 20 { gray_frame(250) } else { gray_frame(10) })
            .collect();
        let changes = detect_frame_changes(&frames, 30.0).unwrap();

        // 差分 19 (+240) 和 20 (-240) 的绝对值形成平台，取左中点
        assert_eq!(changes, vec![19.0 / 30.0]);
    }

    #[test]
    fn test_small_change_below_std_is_ignored() {
        // 差分为 [0, 10, 0, 2, 0, ...]，2 高于均值 0.6 但低于标准差 2.2
        let mut brightness = vec![0.0, 0.0, 10.0, 10.0];
        brightness.extend(std::iter::repeat(12.0).take(17));
        let changes = detect_change_timestamps(&brightness, 10.0).unwrap();

        assert_eq!(changes, vec![0.1]);
    }

    #[test]
    fn test_too_few_frames() {
        assert!(detect_change_timestamps(&[], 25.0).unwrap().is_empty());
        assert!(detect_change_timestamps(&[12.0], 25.0).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(
            detect_change_timestamps(&[1.0, 2.0], 0.0),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(matches!(
            detect_change_timestamps(&[1.0, f64::NAN, 3.0], 30.0),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_timestamps_are_sorted_and_bounded() {
        let brightness: Vec<f64> = (0..120)
            .map(|i| match i {
                0..=29 => 20.0,
                30..=69 => 180.0,
                70..=99 => 60.0,
                _ => 240.0,
            })
            .collect();
        let changes = detect_change_timestamps(&brightness, 24.0).unwrap();
        let duration = brightness.len() as f64 / 24.0;

        assert_eq!(changes.len(), 3);
        assert!(changes.windows(2).all(|w| w[0] < w[1]));
        assert!(changes.iter().all(|&t| t >= 0.0 && t <= duration));
    }
}
