//! 基于 Silero VAD 的语音检测
//!
//! 模型只支持 16kHz（512 采样/帧）或 8kHz（256 采样/帧）单声道输入，
//! 调用方负责在提取音频时完成重采样。

use tracing::debug;
use voice_activity_detector::VoiceActivityDetector;
use crate::audio_extractor::Waveform;
use crate::error::{AnalysisError, AnalysisResult};

/// 语音检测使用的采样率
pub const VAD_SAMPLE_RATE: u32 = 16000;

/// 一段语音（秒）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechSegment {
    pub start: f64,
    pub end: f64,
}

/// 语音检测器
pub struct SpeechDetector {
    /// 语音概率阈值
    threshold: f32,
    /// 最短语音持续时间（毫秒），更短的片段视为噪声
    min_speech_ms: u32,
}

impl Default for SpeechDetector {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_speech_ms: 250,
        }
    }
}

impl SpeechDetector {
    pub fn new(threshold: f32, min_speech_ms: u32) -> Self {
        Self {
            threshold,
            min_speech_ms,
        }
    }

    fn frame_size(sample_rate: u32) -> AnalysisResult<usize> {
        match sample_rate {
            8000 => Ok(256),
            16000 => Ok(512),
            other => Err(AnalysisError::invalid_input(format!(
                "语音检测只支持 8000 或 16000 Hz，实际为 {}",
                other
            ))),
        }
    }

    /// 检测波形中的语音片段
    pub fn detect_segments(&self, waveform: &Waveform) -> AnalysisResult<Vec<SpeechSegment>> {
        let frame_size = Self::frame_size(waveform.sample_rate)?;
        let mono = waveform.to_mono();

        let mut vad = VoiceActivityDetector::builder()
            .sample_rate(waveform.sample_rate as i64)
            .chunk_size(frame_size)
            .build()
            .map_err(|e| AnalysisError::Decode(format!("初始化 Silero VAD 失败: {:?}", e)))?;

        let probabilities: Vec<f32> = mono
            .chunks(frame_size)
            .map(|chunk| vad.predict(chunk.iter().copied()))
            .collect();

        let frame_secs = frame_size as f64 / waveform.sample_rate as f64;
        let segments = self.segments_from_probabilities(&probabilities, frame_secs);
        debug!(
            "🗣️  [语音检测] {} 帧, 检测到 {} 段语音",
            probabilities.len(),
            segments.len()
        );
        Ok(segments)
    }

    /// 波形中是否包含语音
    pub fn has_speech(&self, waveform: &Waveform) -> AnalysisResult<bool> {
        Ok(!self.detect_segments(waveform)?.is_empty())
    }

    /// 将逐帧语音概率合并为语音片段，丢弃短于最短时长的片段
    pub fn segments_from_probabilities(&self, probabilities: &[f32], frame_secs: f64) -> Vec<SpeechSegment> {
        let min_secs = self.min_speech_ms as f64 / 1000.0;
        let mut segments = Vec::new();
        let mut start: Option<usize> = None;

        for (i, &p) in probabilities.iter().enumerate() {
            match (p >= self.threshold, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    push_segment(&mut segments, s, i, frame_secs, min_secs);
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            push_segment(&mut segments, s, probabilities.len(), frame_secs, min_secs);
        }

        segments
    }
}

fn push_segment(segments: &mut Vec<SpeechSegment>, start: usize, end: usize, frame_secs: f64, min_secs: f64) {
    let segment = SpeechSegment {
        start: start as f64 * frame_secs,
        end: end as f64 * frame_secs,
    };
    if segment.end - segment.start >= min_secs {
        segments.push(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_SECS: f64 = 0.032;

    #[test]
    fn test_segments_merge_consecutive_frames() {
        let detector = SpeechDetector::default();
        let mut probs = vec![0.1f32; 10];
        probs.extend(vec![0.9f32; 10]);
        probs.extend(vec![0.2f32; 5]);

        let segments = detector.segments_from_probabilities(&probs, FRAME_SECS);
        assert_eq!(segments.len(), 1);
        assert!((segments[0].start - 10.0 * FRAME_SECS).abs() < 1e-9);
        assert!((segments[0].end - 20.0 * FRAME_SECS).abs() < 1e-9);
    }

    #[test]
    fn test_short_bursts_are_ignored() {
        let detector = SpeechDetector::default();
        let probs = [0.0, 0.95, 0.95, 0.0, 0.0, 0.9, 0.0];
        assert!(detector.segments_from_probabilities(&probs, FRAME_SECS).is_empty());
    }

    #[test]
    fn test_trailing_segment_is_closed() {
        let detector = SpeechDetector::new(0.5, 100);
        let probs = [0.0, 0.0, 0.7, 0.8, 0.9, 0.6];
        let segments = detector.segments_from_probabilities(&probs, FRAME_SECS);
        assert_eq!(segments.len(), 1);
        assert!((segments[0].end - 6.0 * FRAME_SECS).abs() < 1e-9);
    }

    #[test]
    fn test_unsupported_sample_rate() {
        let wave = Waveform::mono(44100, vec![0.0; 44100]).unwrap();
        assert!(matches!(
            SpeechDetector::default().has_speech(&wave),
            Err(AnalysisError::InvalidInput(_))
        ));
    }
}
