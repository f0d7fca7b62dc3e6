use serde::{Deserialize, Serialize};
use crate::alignment::AlignmentReport;

/// 只携带视频 ID 的请求（处理、后期合成）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoIdRequest {
    pub video_id: String,
}

/// 上传视频的响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub video_id: String,
}

/// 单个关键帧的描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeAnalysis {
    /// 关键帧名称（keyframe_1、keyframe_2 …）
    pub frame: String,
    /// 关键帧图片路径
    pub path: String,
    /// 模型给出的描述
    pub description: String,
}

/// 视频处理的响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoProcessingResponse {
    pub message: String,
    pub has_speech: bool,
    #[serde(default)]
    pub transcription: Option<String>,
    pub keyframe_analysis: Vec<KeyframeAnalysis>,
    /// 提交给音乐生成服务的提示词
    pub suno_prompt: String,
}

/// 生成歌曲的请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub video_id: String,
    pub suno_prompt: String,
}

/// 生成歌曲的响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub message: String,
    pub song_path: String,
}

/// 后期合成的请求
pub type VideoPostProcessRequest = VideoIdRequest;

/// 后期合成的响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPostProcessResponse {
    pub message: String,
    pub output_path: String,
    /// 音频起点偏移（秒）
    pub offset: f64,
}

/// 单个关键帧的元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyframeMetadata {
    /// 关键帧名称
    pub frame: String,
    /// 在原始帧序列中的索引
    pub frame_index: usize,
    /// 对应的时间点（秒）
    pub timestamp: f64,
    /// 图片路径
    pub path: String,
    /// 与上一个关键帧的颜色直方图差异
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_difference: Option<f64>,
}

/// 一次处理的完整元数据，写入 analysis.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoAnalysisRecord {
    pub video_id: String,
    /// 视频帧率
    pub fps: f64,
    /// 视频总时长（秒）
    pub duration: f64,
    /// 视频分辨率（宽x高）
    pub resolution: String,
    /// 总帧数
    pub frame_count: usize,
    pub keyframes: Vec<KeyframeMetadata>,
    pub result: VideoProcessingResponse,
    /// 处理完成时间（RFC 3339）
    pub processed_at: String,
}

/// 后期合成的元数据，写入 alignment.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentRecord {
    pub video_id: String,
    pub output_path: String,
    pub report: AlignmentReport,
    pub processed_at: String,
}
