pub mod error;
pub mod peaks;
pub mod change_detector;
pub mod energy;
pub mod alignment;
pub mod keyframes;
pub mod video_processor;
pub mod audio_extractor;
pub mod speech;
pub mod models;
pub mod prompt;
pub mod services;
pub mod http;
pub mod openai;
pub mod suno;
pub mod storage;
pub mod postprocess;
pub mod processor;
pub mod handler;
pub mod config;

pub use error::{AnalysisError, AnalysisResult, ServiceError, ServiceResult};
pub use change_detector::{detect_change_timestamps, detect_frame_changes, ChangeDetector};
pub use energy::detect_energy_peaks;
pub use alignment::{find_best_offset, AlignmentReport};
pub use keyframes::{select_keyframes, Keyframe};
pub use video_processor::{VideoInfo, VideoProcessor};
pub use audio_extractor::{AudioExtractor, Waveform};
pub use speech::SpeechDetector;
pub use services::{FrameDescriber, PromptWriter, Services, SongClip, SongGenerator, SpeechToText};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use suno::{SunoClient, SunoConfig};
pub use storage::MediaLayout;
pub use processor::{ProcessConfig, VideoPipeline};
pub use config::{ConfigLoader, ExtendedConfig};
