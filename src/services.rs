//! 外部 AI 服务接口
//!
//! 流水线只依赖这些 trait，具体实现（OpenAI、Suno 或测试替身）在启动时注入。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use crate::error::ServiceResult;

/// 语音转文字
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// 转写一个音频文件
    async fn transcribe(&self, audio_path: &Path) -> ServiceResult<String>;
}

/// 关键帧描述（视觉语言模型）
#[async_trait]
pub trait FrameDescriber: Send + Sync {
    /// 一次性描述所有关键帧，返回模型的完整回复文本
    async fn describe(&self, keyframe_paths: &[PathBuf]) -> ServiceResult<String>;
}

/// 歌曲提示词生成
#[async_trait]
pub trait PromptWriter: Send + Sync {
    async fn write_prompt(&self, content: &str) -> ServiceResult<String>;
}

/// 音乐生成服务返回的一首歌
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongClip {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
}

/// 音乐生成
#[async_trait]
pub trait SongGenerator: Send + Sync {
    /// 根据提示词生成歌曲，等待音频就绪后返回
    async fn generate(&self, prompt: &str, make_instrumental: bool) -> ServiceResult<Vec<SongClip>>;

    /// 下载歌曲音频到指定路径
    async fn download(&self, clip: &SongClip, destination: &Path) -> ServiceResult<PathBuf>;
}

/// 流水线使用的全部外部服务
#[derive(Clone)]
pub struct Services {
    pub speech_to_text: Arc<dyn SpeechToText>,
    pub frame_describer: Arc<dyn FrameDescriber>,
    pub prompt_writer: Arc<dyn PromptWriter>,
    pub song_generator: Arc<dyn SongGenerator>,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::ServiceError;

    /// 每次调用返回固定文本
    pub struct FixedSpeech(pub &'static str);

    #[async_trait]
    impl SpeechToText for FixedSpeech {
        async fn transcribe(&self, _audio_path: &Path) -> ServiceResult<String> {
            Ok(self.0.to_string())
        }
    }

    /// 返回固定回复，为 None 时模拟服务故障
    pub struct FixedReply(pub Option<&'static str>);

    fn reply(value: Option<&'static str>) -> ServiceResult<String> {
        value
            .map(str::to_string)
            .ok_or(ServiceError::RequestFailed {
                status: 503,
                body: "unavailable".to_string(),
            })
    }

    #[async_trait]
    impl FrameDescriber for FixedReply {
        async fn describe(&self, _keyframe_paths: &[PathBuf]) -> ServiceResult<String> {
            reply(self.0)
        }
    }

    #[async_trait]
    impl PromptWriter for FixedReply {
        async fn write_prompt(&self, _content: &str) -> ServiceResult<String> {
            reply(self.0)
        }
    }

    /// 返回预设歌曲列表，下载时写入假的音频内容
    pub struct FakeSongs(pub Vec<SongClip>);

    #[async_trait]
    impl SongGenerator for FakeSongs {
        async fn generate(&self, _prompt: &str, _make_instrumental: bool) -> ServiceResult<Vec<SongClip>> {
            Ok(self.0.clone())
        }

        async fn download(&self, _clip: &SongClip, destination: &Path) -> ServiceResult<PathBuf> {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(destination, b"ID3")?;
            Ok(destination.to_path_buf())
        }
    }

    pub fn clip(id: &str) -> SongClip {
        SongClip {
            id: id.to_string(),
            title: None,
            status: Some("complete".to_string()),
            audio_url: None,
        }
    }

    pub fn services(describe: Option<&'static str>, prompt: Option<&'static str>, clips: Vec<SongClip>) -> Services {
        Services {
            speech_to_text: Arc::new(FixedSpeech("hello")),
            frame_describer: Arc::new(FixedReply(describe)),
            prompt_writer: Arc::new(FixedReply(prompt)),
            song_generator: Arc::new(FakeSongs(clips)),
        }
    }
}
