use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Json, Multipart, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
    Router,
};
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};
use crate::models::{
    GenerateRequest, GenerateResponse, UploadResponse, VideoIdRequest, VideoPostProcessRequest,
    VideoPostProcessResponse, VideoProcessingResponse,
};
use crate::processor::VideoPipeline;
use crate::storage::MediaLayout;

/// 上传视频的大小上限
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

type HandlerResult<T> = Result<ResponseJson<T>, (StatusCode, String)>;

/// 共享的服务状态
#[derive(Clone)]
pub struct AppState {
    pub pipeline: VideoPipeline,
}

/// 创建 HTTP 路由
pub fn router(state: AppState) -> Router {
    let media = ServeDir::new(state.pipeline.layout().root());
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/upload_video", post(upload_video))
        .route("/process_video", post(process_video))
        .route("/generate", post(generate_song))
        .route("/post_process", post(post_process))
        // 生成的关键帧、歌曲和最终视频
        .nest_service("/media", media)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 上传视频（multipart 字段 `file`）
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> HandlerResult<UploadResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("读取上传内容失败: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("读取上传文件失败: {}", e)))?;
        if data.is_empty() {
            return Err((StatusCode::BAD_REQUEST, "上传的文件为空".to_string()));
        }

        let video_id = state
            .pipeline
            .save_video(&data)
            .await
            .map_err(|e| {
                error!("保存上传视频失败: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
            })?;

        return Ok(ResponseJson(UploadResponse {
            message: "Video uploaded successfully".to_string(),
            video_id,
        }));
    }

    Err((StatusCode::BAD_REQUEST, "缺少 file 字段".to_string()))
}

/// 处理已上传的视频
pub async fn process_video(
    State(state): State<AppState>,
    payload: Result<Json<VideoIdRequest>, JsonRejection>,
) -> HandlerResult<VideoProcessingResponse> {
    let Json(request) = payload.map_err(bad_request)?;
    check_video(&state, &request.video_id)?;

    let start = Instant::now();
    let response = state
        .pipeline
        .process_video(&request.video_id)
        .await
        .map_err(|e| stage_error("video processing", e, start))?;

    info!("Video {} processed: {}", request.video_id, response.message);
    Ok(ResponseJson(response))
}

/// 根据提示词生成歌曲
pub async fn generate_song(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> HandlerResult<GenerateResponse> {
    let Json(request) = payload.map_err(bad_request)?;
    check_video(&state, &request.video_id)?;
    if request.suno_prompt.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "suno_prompt 不能为空".to_string()));
    }

    let start = Instant::now();
    let response = state
        .pipeline
        .generate_song(&request.video_id, &request.suno_prompt)
        .await
        .map_err(|e| stage_error("song generation", e, start))?;

    info!("Song for video {} saved to {}", request.video_id, response.song_path);
    Ok(ResponseJson(response))
}

/// 将歌曲对齐后合成最终视频
pub async fn post_process(
    State(state): State<AppState>,
    payload: Result<Json<VideoPostProcessRequest>, JsonRejection>,
) -> HandlerResult<VideoPostProcessResponse> {
    let Json(request) = payload.map_err(bad_request)?;
    check_video(&state, &request.video_id)?;

    let start = Instant::now();
    let response = state
        .pipeline
        .post_process(&request.video_id)
        .await
        .map_err(|e| stage_error("video post-processing", e, start))?;

    info!("Video {} post-processed: {}", request.video_id, response.output_path);
    Ok(ResponseJson(response))
}

fn bad_request(rejection: JsonRejection) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, rejection.body_text())
}

/// ID 格式错误返回 400，视频不存在返回 404
fn check_video(state: &AppState, video_id: &str) -> Result<(), (StatusCode, String)> {
    if !MediaLayout::is_valid_video_id(video_id) {
        return Err((StatusCode::BAD_REQUEST, format!("无效的视频 ID: {}", video_id)));
    }
    if !state.pipeline.layout().video_exists(video_id) {
        return Err((StatusCode::NOT_FOUND, format!("视频不存在: {}", video_id)));
    }
    Ok(())
}

fn stage_error(stage: &str, err: anyhow::Error, start: Instant) -> (StatusCode, String) {
    let message = format!(
        "An error occurred during {}: {:#}. Processing time: {:.2} seconds",
        stage,
        err,
        start.elapsed().as_secs_f64()
    );
    error!("{}", message);
    (StatusCode::INTERNAL_SERVER_ERROR, message)
}
