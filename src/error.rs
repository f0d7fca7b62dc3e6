use std::path::PathBuf;
use thiserror::Error;

/// 信号分析结果类型
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// 信号分析（变化检测、能量峰值、偏移搜索、关键帧）中可能出现的错误
///
/// 空的峰值集合、空的时间戳集合不属于错误，调用方需要自行处理这类退化结果。
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源访问失败: {path}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("视频解码失败: {0}")]
    Decode(String),

    #[error("WAV 读写失败: {0}")]
    Wav(#[from] hound::Error),

    #[error("FFmpeg 执行失败: {message}")]
    Ffmpeg {
        message: String,
        stderr: Option<String>,
    },

    #[error("图片处理失败: {0}")]
    Image(#[from] image::ImageError),
}

impl AnalysisError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Resource {
            path: path.into(),
            source,
        }
    }
}

/// 外部 AI 服务调用结果类型
pub type ServiceResult<T> = Result<T, ServiceError>;

/// 外部 AI 服务（OpenAI、Suno）调用中可能出现的错误
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("网络请求失败: {0}")]
    Network(#[from] reqwest::Error),

    #[error("服务返回错误状态 {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("服务返回了无法识别的响应: {0}")]
    UnexpectedResponse(String),

    #[error("文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("服务未配置: {0}")]
    NotConfigured(String),
}

impl ServiceError {
    /// 是否值得重试（网络错误、超时、限流和 5xx）
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
