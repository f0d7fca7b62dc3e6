//! Suno 音乐生成客户端（兼容 suno-api 的 HTTP 接口）

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use crate::error::{ServiceError, ServiceResult};
use crate::http::{check_status, with_retry};
use crate::services::{SongClip, SongGenerator};

/// Suno 客户端配置
#[derive(Debug, Clone)]
pub struct SunoConfig {
    pub base_url: String,
    /// 登录 Suno 后的 Cookie
    pub cookie: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for SunoConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            cookie: String::new(),
            model: "chirp-v3-5".to_string(),
            // wait_audio 会阻塞到音频生成完成
            timeout: Duration::from_secs(600),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    prompt: &'a str,
    make_instrumental: bool,
    wait_audio: bool,
    model: &'a str,
}

/// Suno 客户端
pub struct SunoClient {
    http: Client,
    config: SunoConfig,
}

impl SunoClient {
    pub fn new(config: SunoConfig) -> ServiceResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// 查询歌曲的最新状态
    async fn fetch_clip(&self, id: &str) -> ServiceResult<SongClip> {
        let response = self
            .http
            .get(self.url("api/get"))
            .query(&[("ids", id)])
            .header("Cookie", &self.config.cookie)
            .send()
            .await?;
        let clips: Vec<SongClip> = check_status(response).await?.json().await?;
        clips
            .into_iter()
            .find(|clip| clip.id == id)
            .ok_or_else(|| ServiceError::UnexpectedResponse(format!("找不到歌曲 {}", id)))
    }
}

#[async_trait]
impl SongGenerator for SunoClient {
    async fn generate(&self, prompt: &str, make_instrumental: bool) -> ServiceResult<Vec<SongClip>> {
        // 没有 Cookie 时服务仍可启动，只有生成歌曲时才报错
        if self.config.cookie.is_empty() {
            return Err(ServiceError::NotConfigured(
                "未设置 Suno Cookie（SUNO_COOKIE）".to_string(),
            ));
        }
        let body = GenerateBody {
            prompt,
            make_instrumental,
            wait_audio: true,
            model: &self.config.model,
        };

        let clips = with_retry("Suno", self.config.max_retries, self.config.retry_backoff, || async {
            let response = self
                .http
                .post(self.url("api/generate"))
                .header("Cookie", &self.config.cookie)
                .json(&body)
                .send()
                .await?;
            Ok::<_, ServiceError>(check_status(response).await?.json::<Vec<SongClip>>().await?)
        })
        .await?;

        info!("🎵 [歌曲生成] Suno 返回 {} 首歌曲", clips.len());
        Ok(clips)
    }

    async fn download(&self, clip: &SongClip, destination: &Path) -> ServiceResult<PathBuf> {
        let audio_url = match &clip.audio_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => self
                .fetch_clip(&clip.id)
                .await?
                .audio_url
                .filter(|url| !url.is_empty())
                .ok_or_else(|| {
                    ServiceError::UnexpectedResponse(format!("歌曲 {} 还没有音频地址", clip.id))
                })?,
        };

        let response = self.http.get(&audio_url).send().await?;
        let bytes = check_status(response).await?.bytes().await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, &bytes).await?;
        info!("📥 [歌曲下载] {} 字节 -> {}", bytes.len(), destination.display());

        Ok(destination.to_path_buf())
    }
}
