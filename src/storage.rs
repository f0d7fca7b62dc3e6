use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 媒体目录布局
///
/// ```text
/// <root>/<id>/<id>.mp4
/// <root>/<id>/keyframe_1.jpg …
/// <root>/<id>/analysis.json
/// <root>/<id>/suno_output/generated_song.mp3
/// <root>/<id>/final_output.mp4
/// <root>/<id>/alignment.json
/// ```
#[derive(Debug, Clone)]
pub struct MediaLayout {
    root: PathBuf,
}

impl MediaLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 生成新的视频 ID
    pub fn new_video_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// 视频 ID 必须是 UUID，防止拼出媒体目录之外的路径
    pub fn is_valid_video_id(video_id: &str) -> bool {
        Uuid::parse_str(video_id).is_ok()
    }

    pub fn video_dir(&self, video_id: &str) -> PathBuf {
        self.root.join(video_id)
    }

    pub fn video_path(&self, video_id: &str) -> PathBuf {
        self.video_dir(video_id).join(format!("{}.mp4", video_id))
    }

    /// 关键帧与视频放在同一目录
    pub fn keyframe_dir(&self, video_id: &str) -> PathBuf {
        self.video_dir(video_id)
    }

    pub fn analysis_path(&self, video_id: &str) -> PathBuf {
        self.video_dir(video_id).join("analysis.json")
    }

    pub fn suno_output_dir(&self, video_id: &str) -> PathBuf {
        self.video_dir(video_id).join("suno_output")
    }

    pub fn song_path(&self, video_id: &str) -> PathBuf {
        self.suno_output_dir(video_id).join("generated_song.mp3")
    }

    pub fn final_output_path(&self, video_id: &str) -> PathBuf {
        self.video_dir(video_id).join("final_output.mp4")
    }

    pub fn alignment_path(&self, video_id: &str) -> PathBuf {
        self.video_dir(video_id).join("alignment.json")
    }

    /// 视频是否已上传
    pub fn video_exists(&self, video_id: &str) -> bool {
        Self::is_valid_video_id(video_id) && self.video_path(video_id).is_file()
    }

    /// 创建视频目录
    pub async fn ensure_video_dir(&self, video_id: &str) -> std::io::Result<PathBuf> {
        let dir = self.video_dir(video_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}
