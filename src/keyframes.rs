use image::DynamicImage;
use std::path::{Path, PathBuf};
use crate::error::AnalysisResult;

/// 默认关键帧数量
pub const DEFAULT_MAX_KEYFRAMES: usize = 3;

/// 每个颜色通道的直方图分箱数
const HISTOGRAM_BINS: usize = 8;

/// 选出的关键帧
#[derive(Debug, Clone)]
pub struct Keyframe {
    /// 在原始帧序列中的索引
    pub index: usize,
    /// 帧图像
    pub frame: DynamicImage,
    /// 与上一个关键帧的颜色直方图卡方距离，第一个关键帧为 None
    pub scene_difference: Option<f64>,
}

/// 计算需要保留的帧索引
///
/// 帧数少于上限时全部保留；否则步长取 frame_count / max_count（向下取整），
/// 从 0 开始每隔一个步长取一帧，最多取 max_count 帧。
pub fn select_keyframe_indices(frame_count: usize, max_count: usize) -> Vec<usize> {
    if frame_count == 0 || max_count == 0 {
        return Vec::new();
    }
    if frame_count < max_count {
        return (0..frame_count).collect();
    }

    let stride = frame_count / max_count;
    (0..frame_count).step_by(stride).take(max_count).collect()
}

/// 从帧序列中选出关键帧，返回 (原始索引, 帧)
pub fn select_keyframes<T>(frames: Vec<T>, max_count: usize) -> Vec<(usize, T)> {
    let indices = select_keyframe_indices(frames.len(), max_count);
    let mut wanted = indices.into_iter().peekable();

    frames
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| {
            if wanted.peek() == Some(idx) {
                wanted.next();
                true
            } else {
                false
            }
        })
        .collect()
}

/// 为选出的帧计算相邻关键帧之间的场景差异
pub fn build_keyframes(selected: Vec<(usize, DynamicImage)>) -> Vec<Keyframe> {
    let mut keyframes = Vec::with_capacity(selected.len());
    let mut previous: Option<Vec<f32>> = None;

    for (index, frame) in selected {
        let histogram = color_histogram(&frame);
        let scene_difference = previous
            .as_ref()
            .map(|prev| histogram_difference(prev, &histogram));
        previous = Some(histogram);
        keyframes.push(Keyframe {
            index,
            frame,
            scene_difference,
        });
    }

    keyframes
}

/// 关键帧文件名，编号从 1 开始
pub fn keyframe_filename(ordinal: usize) -> String {
    format!("keyframe_{}.jpg", ordinal)
}

/// 将关键帧保存为 JPEG，返回按顺序排列的文件路径
pub fn save_keyframes(keyframes: &[Keyframe], output_dir: &Path) -> AnalysisResult<Vec<PathBuf>> {
    keyframes
        .iter()
        .enumerate()
        .map(|(i, keyframe)| -> AnalysisResult<PathBuf> {
            let path = output_dir.join(keyframe_filename(i + 1));
            // JPEG 不支持透明通道
            keyframe.frame.to_rgb8().save(&path)?;
            Ok(path)
        })
        .collect()
}

/// RGB 三维颜色直方图（每通道 8 个分箱），按 L2 范数归一化后展平
pub fn color_histogram(frame: &DynamicImage) -> Vec<f32> {
    let rgb = frame.to_rgb8();
    let bin_width = 256 / HISTOGRAM_BINS;
    let mut hist = vec![0f32; HISTOGRAM_BINS * HISTOGRAM_BINS * HISTOGRAM_BINS];

    for pixel in rgb.pixels() {
        let r = pixel[0] as usize / bin_width;
        let g = pixel[1] as usize / bin_width;
        let b = pixel[2] as usize / bin_width;
        hist[(r * HISTOGRAM_BINS + g) * HISTOGRAM_BINS + b] += 1.0;
    }

    let norm = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in hist.iter_mut() {
            *v /= norm;
        }
    }
    hist
}

/// 两个直方图的卡方距离：Σ (h1 - h2)² / h1，跳过 h1 为 0 的分箱
pub fn histogram_difference(hist1: &[f32], hist2: &[f32]) -> f64 {
    hist1
        .iter()
        .zip(hist2)
        .filter(|(a, _)| a.abs() > f32::EPSILON)
        .map(|(&a, &b)| {
            let d = (a - b) as f64;
            d * d / a as f64
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    fn solid(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(8, 8, |_, _| image::Rgb([r, g, b])))
    }

    #[test]
    fn test_fewer_frames_than_max_keeps_all() {
        for count in 0..3 {
            let frames: Vec<usize> = (100..100 + count).collect();
            let selected = select_keyframes(frames.clone(), 3);
            assert_eq!(selected.len(), count);
            assert_eq!(selected.iter().map(|(_, f)| *f).collect::<Vec<_>>(), frames);
        }
    }

    #[test]
    fn test_stride_selection() {
        assert_eq!(select_keyframe_indices(10, 3), vec![0, 3, 6]);
        assert_eq!(select_keyframe_indices(3, 3), vec![0, 1, 2]);
        assert_eq!(select_keyframe_indices(90, 3), vec![0, 30, 60]);
        assert_eq!(select_keyframe_indices(7, 2), vec![0, 3]);
    }

    #[test]
    fn test_max_count_respected_and_increasing() {
        for count in 3..200 {
            let indices = select_keyframe_indices(count, 3);
            assert_eq!(indices.len(), 3);
            assert!(indices.windows(2).all(|w| w[0] < w[1]));
            assert!(indices.iter().all(|&i| i < count));
        }
    }

    #[test]
    fn test_zero_frames_and_zero_max() {
        assert!(select_keyframe_indices(0, 3).is_empty());
        assert!(select_keyframe_indices(10, 0).is_empty());
        assert!(select_keyframes(Vec::<u8>::new(), 3).is_empty());
    }

    #[test]
    fn test_select_keyframes_returns_original_indices() {
        let frames: Vec<char> = "abcdefghij".chars().collect();
        let selected = select_keyframes(frames, 3);
        assert_eq!(selected, vec![(0, 'a'), (3, 'd'), (6, 'g')]);
    }

    #[test]
    fn test_identical_frames_have_zero_difference() {
        let a = color_histogram(&solid(10, 200, 30));
        let b = color_histogram(&solid(10, 200, 30));
        assert_eq!(histogram_difference(&a, &b), 0.0);
    }

    #[test]
    fn test_different_frames_have_positive_difference() {
        let keyframes = build_keyframes(vec![(0, solid(0, 0, 0)), (5, solid(255, 255, 255))]);
        assert_eq!(keyframes[0].scene_difference, None);
        assert!(keyframes[1].scene_difference.unwrap() > 0.0);
    }

    #[test]
    fn test_histogram_is_normalized() {
        let hist = color_histogram(&solid(40, 90, 250));
        let norm: f32 = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_save_keyframes() {
        let dir = tempfile::tempdir().unwrap();
        let keyframes = build_keyframes(vec![(0, solid(1, 2, 3)), (4, solid(9, 8, 7))]);
        let paths = save_keyframes(&keyframes, dir.path()).unwrap();

        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("keyframe_1.jpg"));
        assert!(paths[1].ends_with("keyframe_2.jpg"));
        assert!(paths.iter().all(|p| p.exists()));
    }
}
