use ffmpeg_next as ffmpeg;
use image::DynamicImage;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};
use crate::change_detector::ChangeDetector;
use crate::error::{AnalysisError, AnalysisResult};

/// 视频基本信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    /// 帧率
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// 时长（秒），容器未提供时为 0
    pub duration: f64,
}

/// 视频处理器，负责按原始帧率逐帧解码
pub struct VideoProcessor {
    input_path: String,
}

impl VideoProcessor {
    pub fn new(input_path: impl AsRef<Path>) -> AnalysisResult<Self> {
        ffmpeg::init().map_err(|e| AnalysisError::Decode(format!("初始化 FFmpeg 失败: {}", e)))?;

        // 只保留 FFmpeg 的错误日志
        unsafe {
            ffmpeg::sys::av_log_set_level(ffmpeg::sys::AV_LOG_ERROR as i32);
        }

        Ok(Self {
            input_path: input_path.as_ref().to_string_lossy().to_string(),
        })
    }

    fn open(&self) -> AnalysisResult<ffmpeg::format::context::Input> {
        ffmpeg::format::input(&self.input_path)
            .map_err(|e| AnalysisError::Decode(format!("无法打开视频文件 {}: {}", self.input_path, e)))
    }

    /// 获取视频信息
    pub fn get_video_info(&self) -> AnalysisResult<VideoInfo> {
        let ictx = self.open()?;

        let video_stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| AnalysisError::Decode("未找到视频流".to_string()))?;

        let decoder = ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| AnalysisError::Decode(format!("无法创建视频解码器: {}", e)))?;

        let fps = video_stream.avg_frame_rate();
        let fps_value = if fps.denominator() > 0 && fps.numerator() > 0 {
            fps.numerator() as f64 / fps.denominator() as f64
        } else {
            30.0 // 默认值
        };

        let duration = if ictx.duration() > 0 {
            ictx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
        } else {
            0.0
        };

        Ok(VideoInfo {
            fps: fps_value,
            width: decoder.width(),
            height: decoder.height(),
            duration,
        })
    }

    /// 解码视频流，回调参数为 (帧索引, 原始解码帧)，返回总帧数
    fn decode<F>(&self, mut on_decoded: F) -> AnalysisResult<usize>
    where
        F: FnMut(usize, &ffmpeg::frame::Video) -> AnalysisResult<()>,
    {
        let mut ictx = self.open()?;

        let video_stream_index = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| AnalysisError::Decode("未找到视频流".to_string()))?
            .index();

        let parameters = ictx
            .stream(video_stream_index)
            .ok_or_else(|| AnalysisError::Decode("视频流索引无效".to_string()))?
            .parameters();
        let mut decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| AnalysisError::Decode(format!("无法创建视频解码器: {}", e)))?;

        let start = Instant::now();
        let mut frame_index = 0usize;

        for (stream, packet) in ictx.packets() {
            if stream.index() != video_stream_index {
                continue;
            }
            // 损坏的数据包直接跳过
            if decoder.send_packet(&packet).is_err() {
                continue;
            }
            drain_decoder(&mut decoder, &mut frame_index, &mut on_decoded)?;
        }

        decoder
            .send_eof()
            .map_err(|e| AnalysisError::Decode(format!("刷新解码器失败: {}", e)))?;
        drain_decoder(&mut decoder, &mut frame_index, &mut on_decoded)?;

        debug!(
            "🎞️  [视频解码] 解码 {} 帧，耗时 {:.2}秒",
            frame_index,
            start.elapsed().as_secs_f64()
        );

        Ok(frame_index)
    }

    /// 按解码顺序遍历每一帧，回调参数为 (帧索引, RGB 图像)，返回总帧数
    pub fn for_each_frame<F>(&self, mut on_frame: F) -> AnalysisResult<usize>
    where
        F: FnMut(usize, DynamicImage) -> AnalysisResult<()>,
    {
        // 缩放器在拿到第一帧后按实际像素格式创建
        let mut scaler: Option<ffmpeg::software::scaling::Context> = None;

        self.decode(|idx, decoded| {
            let mut context = match scaler.take() {
                Some(context) => context,
                None => rgb_scaler(decoded)?,
            };
            let mut rgb_frame = ffmpeg::frame::Video::empty();
            let converted = context.run(decoded, &mut rgb_frame);
            scaler = Some(context);
            converted.map_err(|e| AnalysisError::Decode(format!("像素格式转换失败: {}", e)))?;
            on_frame(idx, frame_to_image(&rgb_frame))
        })
    }

    /// 逐帧计算亮度序列，不在内存中保留帧图像
    pub fn brightness_signal(&self) -> AnalysisResult<Vec<f64>> {
        let mut brightness = Vec::new();
        self.for_each_frame(|_, frame| {
            brightness.push(ChangeDetector::frame_brightness(&frame));
            Ok(())
        })?;
        info!("✅ [视频解码] 亮度序列计算完成: {} 帧", brightness.len());
        Ok(brightness)
    }

    /// 统计总帧数，只解码不做像素格式转换
    pub fn count_frames(&self) -> AnalysisResult<usize> {
        self.decode(|_, _| Ok(()))
    }

    /// 只保留指定索引的帧，返回 (帧索引, 图像)，按索引升序
    pub fn extract_frames_at(&self, indices: &[usize]) -> AnalysisResult<Vec<(usize, DynamicImage)>> {
        let wanted: BTreeSet<usize> = indices.iter().copied().collect();
        let mut frames = Vec::with_capacity(wanted.len());
        self.for_each_frame(|idx, frame| {
            if wanted.contains(&idx) {
                frames.push((idx, frame));
            }
            Ok(())
        })?;
        Ok(frames)
    }
}

fn drain_decoder<F>(
    decoder: &mut ffmpeg::decoder::Video,
    frame_index: &mut usize,
    on_decoded: &mut F,
) -> AnalysisResult<()>
where
    F: FnMut(usize, &ffmpeg::frame::Video) -> AnalysisResult<()>,
{
    let mut decoded = ffmpeg::frame::Video::empty();
    while decoder.receive_frame(&mut decoded).is_ok() {
        on_decoded(*frame_index, &decoded)?;
        *frame_index += 1;
    }
    Ok(())
}

fn rgb_scaler(frame: &ffmpeg::frame::Video) -> AnalysisResult<ffmpeg::software::scaling::Context> {
    ffmpeg::software::scaling::Context::get(
        frame.format(),
        frame.width(),
        frame.height(),
        ffmpeg::format::Pixel::RGB24,
        frame.width(),
        frame.height(),
        ffmpeg::software::scaling::Flags::BILINEAR,
    )
    .map_err(|e| AnalysisError::Decode(format!("无法创建缩放器: {}", e)))
}

/// 将 RGB24 格式的 FFmpeg 帧转换为 DynamicImage，逐行拷贝以跳过行尾填充
fn frame_to_image(frame: &ffmpeg::frame::Video) -> DynamicImage {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let row_bytes = width * 3;
    let mut buffer = Vec::with_capacity(row_bytes * height);
    for y in 0..height {
        let start = y * stride;
        let end = (start + row_bytes).min(data.len());
        buffer.extend_from_slice(&data[start.min(end)..end]);
    }
    // 数据不完整时用黑色补齐
    buffer.resize(row_bytes * height, 0);

    let img = image::RgbImage::from_raw(width as u32, height as u32, buffer)
        .unwrap_or_else(|| image::RgbImage::new(width as u32, height as u32));
    DynamicImage::ImageRgb8(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::process::Command;

    /// 用 ffmpeg 的 testsrc 生成 10 帧的小视频，没有 ffmpeg 命令时返回 None
    fn synthetic_video(dir: &Path) -> Option<PathBuf> {
        let path = dir.join("testsrc.mp4");
        let status = Command::new("ffmpeg")
            .args(["-y", "-loglevel", "error", "-f", "lavfi", "-i", "testsrc=size=32x32:rate=5"])
            .args(["-frames:v", "10", "-c:v", "mpeg4"])
            .arg(&path)
            .status()
            .ok()?;
        status.success().then_some(path)
    }

    #[test]
    fn test_count_frames_matches_decoded_frames() {
        let dir = tempfile::tempdir().unwrap();
        let Some(path) = synthetic_video(dir.path()) else {
            return;
        };
        let processor = VideoProcessor::new(&path).unwrap();

        let mut sizes = Vec::new();
        let decoded = processor
            .for_each_frame(|_, frame| {
                sizes.push(frame.as_rgb8().map(|img| img.dimensions()));
                Ok(())
            })
            .unwrap();

        assert_eq!(processor.count_frames().unwrap(), 10);
        assert_eq!(decoded, 10);
        assert!(sizes.iter().all(|&size| size == Some((32, 32))));
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let processor = VideoProcessor::new("/nonexistent/video.mp4").unwrap();
        assert!(matches!(processor.count_frames(), Err(AnalysisError::Decode(_))));
    }
}
