//! 后期合成：分析画面变化与歌曲能量峰值，选出最佳偏移后替换视频音轨

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use crate::alignment::{self, AlignmentReport};
use crate::audio_extractor::{mux_audio, AudioExtractor};
use crate::change_detector::detect_change_timestamps;
use crate::energy::detect_energy_peaks;
use crate::error::{AnalysisError, AnalysisResult};
use crate::video_processor::VideoProcessor;

/// 分析视频与音频的对齐关系
pub fn analyze_alignment(
    video_path: impl AsRef<Path>,
    audio_path: impl AsRef<Path>,
    energy_chunk_size: usize,
    offset_step: f64,
) -> AnalysisResult<AlignmentReport> {
    let video_path = video_path.as_ref();
    let audio_path = audio_path.as_ref();

    let video_start = Instant::now();
    let processor = VideoProcessor::new(video_path)?;
    let info = processor.get_video_info()?;
    let brightness = processor.brightness_signal()?;
    let change_timestamps = detect_change_timestamps(&brightness, info.fps)?;

    // 容器没有时长信息时按帧数推算
    let video_duration = if info.duration > 0.0 {
        info.duration
    } else {
        brightness.len() as f64 / info.fps
    };
    info!(
        "✅ [对齐] 画面变化检测完成，{} 帧, {} 个变化点，耗时: {:.2}秒",
        brightness.len(),
        change_timestamps.len(),
        video_start.elapsed().as_secs_f64()
    );

    let audio_start = Instant::now();
    let extractor = AudioExtractor::new(audio_path)?;
    if !extractor.has_audio_track()? {
        return Err(AnalysisError::invalid_input(format!(
            "文件中没有音频流: {}",
            audio_path.display()
        )));
    }
    let waveform = extractor.extract_wav(None, false)?.read()?;
    let energy_peaks = detect_energy_peaks(&waveform, energy_chunk_size)?;
    let audio_duration = waveform.duration();
    info!(
        "✅ [对齐] 能量峰值检测完成，{} 个峰值，耗时: {:.2}秒",
        energy_peaks.len(),
        audio_start.elapsed().as_secs_f64()
    );

    let (offset, score) = alignment::search(
        &change_timestamps,
        &energy_peaks,
        video_duration,
        audio_duration,
        offset_step,
    )?;
    info!(
        "🎚️  [对齐] 最佳偏移: {:.2}秒 (得分 {:.3}), 视频 {:.2}秒, 音频 {:.2}秒",
        offset, score, video_duration, audio_duration
    );

    Ok(AlignmentReport {
        change_timestamps,
        energy_peaks,
        offset,
        score,
        video_duration,
        audio_duration,
    })
}

/// 实际截取音频的起点：不超过音频能覆盖整段视频的最晚位置
pub fn mux_start(report: &AlignmentReport) -> f64 {
    let slack = (report.audio_duration - report.video_duration).max(0.0);
    report.offset.min(slack)
}

/// 对齐并合成最终视频
pub fn combine_audio(
    video_path: impl AsRef<Path>,
    audio_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    energy_chunk_size: usize,
    offset_step: f64,
) -> AnalysisResult<(PathBuf, AlignmentReport)> {
    let video_path = video_path.as_ref();
    let audio_path = audio_path.as_ref();
    let report = analyze_alignment(video_path, audio_path, energy_chunk_size, offset_step)?;

    let start = mux_start(&report);
    if start < report.offset {
        warn!(
            "⚠️  [对齐] 偏移 {:.2}秒 超出音频可用范围，截取起点调整为 {:.2}秒",
            report.offset, start
        );
    }

    let mux_timer = Instant::now();
    let output = mux_audio(video_path, audio_path, start, report.video_duration, output_path)?;
    info!(
        "✅ [对齐] 音视频合成完成: {}，耗时: {:.2}秒",
        output.display(),
        mux_timer.elapsed().as_secs_f64()
    );

    Ok((output, report))
}
