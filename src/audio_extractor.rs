use ffmpeg_next as ffmpeg;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempPath;
use tracing::debug;
use crate::error::{AnalysisError, AnalysisResult};

/// 带采样率的 PCM 波形，多声道时按帧交错存放，取值范围 [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl Waveform {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> AnalysisResult<Self> {
        if sample_rate == 0 {
            return Err(AnalysisError::invalid_input("采样率不能为 0"));
        }
        if channels == 0 {
            return Err(AnalysisError::invalid_input("声道数不能为 0"));
        }
        Ok(Self {
            sample_rate,
            channels,
            samples,
        })
    }

    /// 单声道波形
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> AnalysisResult<Self> {
        Self::new(sample_rate, 1, samples)
    }

    /// 每个声道的采样帧数
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// 时长（秒）
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// 各声道取平均转换为单声道，末尾不完整的采样帧会被丢弃
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// 读取 WAV 文件（支持 8/16/24/32 位整数和 32 位浮点）
pub fn read_wav(path: impl AsRef<Path>) -> AnalysisResult<Waveform> {
    let reader = hound::WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    debug!("🎵 [音频] WAV 参数: {:?}", spec);

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Waveform::new(spec.sample_rate, spec.channels, samples)
}

/// 将波形的一段写为 16 位 PCM WAV
pub fn write_wav(path: impl AsRef<Path>, waveform: &Waveform) -> AnalysisResult<()> {
    let spec = hound::WavSpec {
        channels: waveform.channels,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
    for &sample in &waveform.samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(())
}

// 16 位 PCM WAV 的文件头大小
const WAV_HEADER_BYTES: u64 = 44;

/// 将波形切分为若干个 16 位 PCM WAV 临时文件，每个文件不超过 `max_bytes`
pub fn split_wav(waveform: &Waveform, max_bytes: u64) -> AnalysisResult<Vec<TempPath>> {
    let bytes_per_frame = waveform.channels.max(1) as u64 * 2;
    let frames_per_chunk = max_bytes.saturating_sub(WAV_HEADER_BYTES) / bytes_per_frame;
    if frames_per_chunk == 0 {
        return Err(AnalysisError::invalid_input(format!(
            "分段大小过小: {} 字节",
            max_bytes
        )));
    }

    let samples_per_chunk = frames_per_chunk as usize * waveform.channels.max(1) as usize;
    let mut chunks = Vec::new();
    for samples in waveform.samples.chunks(samples_per_chunk) {
        let chunk = Waveform::new(waveform.sample_rate, waveform.channels, samples.to_vec())?;
        let path = temp_wav_path("video-song-chunk-")?;
        write_wav(&path, &chunk)?;
        chunks.push(path);
    }
    debug!("🎵 [音频] 切分为 {} 段（每段最多 {} 字节）", chunks.len(), max_bytes);
    Ok(chunks)
}

/// 创建一个 drop 时自动删除的临时 WAV 路径
pub fn temp_wav_path(prefix: &str) -> AnalysisResult<TempPath> {
    let file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".wav")
        .tempfile()
        .map_err(|e| AnalysisError::resource(std::env::temp_dir(), e))?;
    Ok(file.into_temp_path())
}

/// 提取得到的临时音频文件，离开作用域时自动删除
pub struct ExtractedAudio {
    path: TempPath,
}

impl ExtractedAudio {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> AnalysisResult<Waveform> {
        read_wav(&self.path)
    }
}

/// 音频提取器，从视频（或任意 ffmpeg 能读取的媒体）中提取 PCM 音频
pub struct AudioExtractor {
    input_path: String,
}

impl AudioExtractor {
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

    /// 输入文件是否包含音频流
    pub fn has_audio_track(&self) -> AnalysisResult<bool> {
        let ictx = ffmpeg::format::input(&self.input_path)
            .map_err(|e| AnalysisError::Decode(format!("无法打开媒体文件 {}: {}", self.input_path, e)))?;
        Ok(ictx.streams().best(ffmpeg::media::Type::Audio).is_some())
    }

    /// 提取为 16 位 PCM WAV 临时文件
    ///
    /// `sample_rate` 为 None 时保留原始采样率，`mono` 为 true 时下混为单声道。
    pub fn extract_wav(&self, sample_rate: Option<u32>, mono: bool) -> AnalysisResult<ExtractedAudio> {
        let path = temp_wav_path("video-song-audio-")?;
        self.extract_to_file(&path, sample_rate, mono)?;
        Ok(ExtractedAudio { path })
    }

    /// 提取音频到指定文件（16 位 PCM WAV）
    pub fn extract_to_file(
        &self,
        output_path: impl AsRef<Path>,
        sample_rate: Option<u32>,
        mono: bool,
    ) -> AnalysisResult<()> {
        let output_path_str = output_path.as_ref().to_string_lossy().to_string();

        let mut command = Command::new("ffmpeg");
        command
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(&self.input_path)
            .arg("-vn")
            .arg("-acodec")
            .arg("pcm_s16le");
        if let Some(rate) = sample_rate {
            command.arg("-ar").arg(rate.to_string());
        }
        if mono {
            command.arg("-ac").arg("1");
        }
        command.arg("-y").arg(&output_path_str);

        run_ffmpeg(command, "音频提取失败")
    }
}

/// 用指定偏移处的一段音频替换视频的音轨
///
/// 视频流直接复制，音频从 `offset` 秒开始截取 `duration` 秒并编码为 AAC。
pub fn mux_audio(
    video_path: impl AsRef<Path>,
    audio_path: impl AsRef<Path>,
    offset: f64,
    duration: f64,
    output_path: impl AsRef<Path>,
) -> AnalysisResult<PathBuf> {
    let output_path = output_path.as_ref().to_path_buf();

    let mut command = Command::new("ffmpeg");
    command
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(video_path.as_ref())
        .arg("-ss")
        .arg(format!("{:.3}", offset.max(0.0)))
        .arg("-t")
        .arg(format!("{:.3}", duration.max(0.0)))
        .arg("-i")
        .arg(audio_path.as_ref())
        .arg("-map")
        .arg("0:v:0")
        .arg("-map")
        .arg("1:a:0")
        .arg("-c:v")
        .arg("copy")
        .arg("-c:a")
        .arg("aac")
        .arg("-b:a")
        .arg("192k")
        .arg("-shortest")
        .arg("-y")
        .arg(&output_path);

    run_ffmpeg(command, "音视频合成失败")?;
    Ok(output_path)
}

fn run_ffmpeg(mut command: Command, message: &str) -> AnalysisResult<()> {
    let output = command.output().map_err(|e| AnalysisError::Ffmpeg {
        message: format!("执行 ffmpeg 命令失败: {}", e),
        stderr: None,
    })?;

    if !output.status.success() {
        return Err(AnalysisError::Ffmpeg {
            message: message.to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }
    Ok(())
}
