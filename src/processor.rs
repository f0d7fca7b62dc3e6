use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};
use crate::alignment::DEFAULT_OFFSET_STEP;
use crate::audio_extractor::{split_wav, AudioExtractor, Waveform};
use crate::energy::DEFAULT_CHUNK_SIZE;
use crate::error::AnalysisResult;
use crate::keyframes::{build_keyframes, save_keyframes, select_keyframe_indices, DEFAULT_MAX_KEYFRAMES};
use crate::models::{
    AlignmentRecord, GenerateResponse, KeyframeAnalysis, KeyframeMetadata, VideoAnalysisRecord,
    VideoPostProcessResponse, VideoProcessingResponse,
};
use crate::postprocess::combine_audio;
use crate::prompt::{
    combine_keyframe_descriptions, create_full_content, fallback_descriptions, keyframe_label,
    split_keyframe_descriptions, transcription_error, PROMPT_ERROR,
};
use crate::services::Services;
use crate::speech::{SpeechDetector, VAD_SAMPLE_RATE};
use crate::storage::MediaLayout;
use crate::video_processor::{VideoInfo, VideoProcessor};

/// Whisper 单次上传的大小上限
pub const DEFAULT_TRANSCRIPTION_CHUNK_BYTES: u64 = 25 * 1024 * 1024;

/// 流水线配置
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// 最多提取的关键帧数量
    pub max_scenes: usize,
    /// 能量峰值检测的分块大小（采样点）
    pub energy_chunk_size: usize,
    /// 偏移搜索步长（秒）
    pub offset_step: f64,
    /// 转写分段的最大字节数
    pub transcription_chunk_bytes: u64,
    /// 是否生成纯音乐
    pub make_instrumental: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            max_scenes: DEFAULT_MAX_KEYFRAMES,
            energy_chunk_size: DEFAULT_CHUNK_SIZE,
            offset_step: DEFAULT_OFFSET_STEP,
            transcription_chunk_bytes: DEFAULT_TRANSCRIPTION_CHUNK_BYTES,
            make_instrumental: true,
        }
    }
}

/// 关键帧提取结果
struct ExtractedKeyframes {
    info: VideoInfo,
    frame_count: usize,
    paths: Vec<PathBuf>,
    metadata: Vec<KeyframeMetadata>,
}

/// 视频到歌曲的处理流水线：处理 → 生成歌曲 → 后期合成
#[derive(Clone)]
pub struct VideoPipeline {
    layout: MediaLayout,
    services: Services,
    config: ProcessConfig,
}

impl VideoPipeline {
    pub fn new(layout: MediaLayout, services: Services, config: ProcessConfig) -> Self {
        Self {
            layout,
            services,
            config,
        }
    }

    pub fn layout(&self) -> &MediaLayout {
        &self.layout
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// 保存上传的视频，返回新的视频 ID
    pub async fn save_video(&self, data: &[u8]) -> Result<String> {
        let video_id = MediaLayout::new_video_id();
        self.layout
            .ensure_video_dir(&video_id)
            .await
            .context("创建视频目录失败")?;
        let video_path = self.layout.video_path(&video_id);
        tokio::fs::write(&video_path, data)
            .await
            .context(format!("保存视频失败: {}", video_path.display()))?;
        info!("📤 [上传] 视频已保存: {} ({} 字节)", video_path.display(), data.len());
        Ok(video_id)
    }

    /// 导入本地视频文件，返回新的视频 ID
    pub async fn import_video(&self, source: &Path) -> Result<String> {
        let video_id = MediaLayout::new_video_id();
        self.layout
            .ensure_video_dir(&video_id)
            .await
            .context("创建视频目录失败")?;
        tokio::fs::copy(source, self.layout.video_path(&video_id))
            .await
            .context(format!("复制视频失败: {}", source.display()))?;
        Ok(video_id)
    }

    fn existing_video(&self, video_id: &str) -> Result<PathBuf> {
        if !self.layout.video_exists(video_id) {
            bail!("视频不存在: {}", video_id);
        }
        Ok(self.layout.video_path(video_id))
    }

    /// 处理视频：语音检测、转写、关键帧提取与描述、生成歌曲提示词
    pub async fn process_video(&self, video_id: &str) -> Result<VideoProcessingResponse> {
        let video_path = self.existing_video(video_id)?;
        let total_start = Instant::now();
        info!("🎬 [视频处理] 开始处理视频: {}", video_path.display());
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        // 1. 语音检测
        let speech_start = Instant::now();
        info!("⏳ [视频处理] 正在检测语音...");
        let speech_audio = {
            let path = video_path.clone();
            match tokio::task::spawn_blocking(move || extract_speech_audio(&path))
                .await
                .context("语音检测任务异常退出")?
            {
                Ok(audio) => audio,
                Err(e) => {
                    warn!("⚠️  [视频处理] 语音检测失败，按无语音处理: {}", e);
                    None
                }
            }
        };
        let has_speech = speech_audio.is_some();
        let speech_duration = speech_start.elapsed();
        info!(
            "✅ [视频处理] 语音检测完成，耗时: {:.2}秒",
            speech_duration.as_secs_f64()
        );
        info!("  • 包含语音: {}", has_speech);

        // 2. 转写
        let transcribe_start = Instant::now();
        let transcription = match speech_audio {
            Some(waveform) => {
                info!("⏳ [视频处理] 正在转写语音...");
                let text = match self.transcribe(waveform).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("⚠️  [视频处理] 转写失败: {:#}", e);
                        transcription_error(format!("{:#}", e))
                    }
                };
                info!(
                    "✅ [视频处理] 转写完成，耗时: {:.2}秒",
                    transcribe_start.elapsed().as_secs_f64()
                );
                Some(text)
            }
            None => None,
        };
        let transcribe_duration = transcribe_start.elapsed();

        // 3. 关键帧提取
        let keyframe_start = Instant::now();
        info!("⏳ [视频处理] 正在提取关键帧（最多 {} 个）...", self.config.max_scenes);
        let extracted = {
            let path = video_path.clone();
            let output_dir = self.layout.keyframe_dir(video_id);
            let max_scenes = self.config.max_scenes;
            tokio::task::spawn_blocking(move || extract_keyframes(&path, &output_dir, max_scenes))
                .await
                .context("关键帧提取任务异常退出")?
                .map_err(|e| {
                    error!("❌ [视频处理] 关键帧提取失败: {}", e);
                    e
                })?
        };
        let keyframe_duration = keyframe_start.elapsed();
        info!(
            "✅ [视频处理] 关键帧提取完成，耗时: {:.2}秒",
            keyframe_duration.as_secs_f64()
        );
        info!("  • 总帧数: {} 帧", extracted.frame_count);
        info!("  • 关键帧数: {} 个", extracted.paths.len());

        // 4. 关键帧描述
        let describe_start = Instant::now();
        info!("⏳ [视频处理] 正在生成关键帧描述...");
        let keyframe_analysis = self.describe_keyframes(&extracted.paths).await;
        let describe_duration = describe_start.elapsed();
        info!(
            "✅ [视频处理] 关键帧描述完成，耗时: {:.2}秒",
            describe_duration.as_secs_f64()
        );

        // 5. 歌曲提示词
        let prompt_start = Instant::now();
        let suno_prompt = self
            .write_prompt(&keyframe_analysis, transcription.as_deref())
            .await;
        let prompt_duration = prompt_start.elapsed();
        info!(
            "✅ [视频处理] 提示词生成完成，耗时: {:.2}秒",
            prompt_duration.as_secs_f64()
        );
        info!("  • 提示词: {}", suno_prompt);

        let processing_time = total_start.elapsed();
        let response = VideoProcessingResponse {
            message: format!(
                "Video processing completed in {:.2} seconds",
                processing_time.as_secs_f64()
            ),
            has_speech,
            transcription,
            keyframe_analysis,
            suno_prompt,
        };

        // 6. 保存分析结果
        let record = VideoAnalysisRecord {
            video_id: video_id.to_string(),
            fps: extracted.info.fps,
            duration: extracted.info.duration,
            resolution: format!("{}x{}", extracted.info.width, extracted.info.height),
            frame_count: extracted.frame_count,
            keyframes: extracted.metadata,
            result: response.clone(),
            processed_at: Utc::now().to_rfc3339(),
        };
        write_json(&self.layout.analysis_path(video_id), &record).await?;

        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "🎉 [视频处理] 处理完成！总耗时: {:.2}秒 ({:.0}ms)",
            processing_time.as_secs_f64(),
            processing_time.as_millis()
        );
        info!("📊 [视频处理] 各阶段耗时统计:");
        info!("  • 语音检测: {:.2}秒", speech_duration.as_secs_f64());
        info!("  • 语音转写: {:.2}秒", transcribe_duration.as_secs_f64());
        info!("  • 关键帧提取: {:.2}秒", keyframe_duration.as_secs_f64());
        info!("  • 关键帧描述: {:.2}秒", describe_duration.as_secs_f64());
        info!("  • 提示词生成: {:.2}秒", prompt_duration.as_secs_f64());
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        Ok(response)
    }

    /// 切分音频并并发转写，按顺序用空格拼接
    async fn transcribe(&self, waveform: Waveform) -> Result<String> {
        let max_bytes = self.config.transcription_chunk_bytes;
        let chunks = tokio::task::spawn_blocking(move || split_wav(&waveform, max_bytes))
            .await
            .context("音频切分任务异常退出")??;
        info!("  • 转写分段: {} 段", chunks.len());

        let speech_to_text = &self.services.speech_to_text;
        let texts = try_join_all(chunks.iter().map(|chunk| speech_to_text.transcribe(chunk)))
            .await
            .context("调用语音转写服务失败")?;

        Ok(texts
            .iter()
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" "))
    }

    /// 描述失败时每个关键帧使用占位描述
    async fn describe_keyframes(&self, keyframe_paths: &[PathBuf]) -> Vec<KeyframeAnalysis> {
        if keyframe_paths.is_empty() {
            return Vec::new();
        }
        match self.services.frame_describer.describe(keyframe_paths).await {
            Ok(full_description) => split_keyframe_descriptions(&full_description, keyframe_paths),
            Err(e) => {
                warn!("⚠️  [视频处理] 关键帧描述失败: {}", e);
                fallback_descriptions(keyframe_paths)
            }
        }
    }

    async fn write_prompt(&self, keyframe_analysis: &[KeyframeAnalysis], transcription: Option<&str>) -> String {
        let descriptions = combine_keyframe_descriptions(keyframe_analysis);
        let content = create_full_content(&descriptions, transcription);
        match self.services.prompt_writer.write_prompt(&content).await {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("⚠️  [视频处理] 提示词生成失败: {}", e);
                PROMPT_ERROR.to_string()
            }
        }
    }

    /// 根据提示词生成歌曲，下载第一首到视频目录
    pub async fn generate_song(&self, video_id: &str, suno_prompt: &str) -> Result<GenerateResponse> {
        self.existing_video(video_id)?;
        let start = Instant::now();
        info!("🎵 [歌曲生成] 开始生成歌曲: {}", suno_prompt);

        let clips = self
            .services
            .song_generator
            .generate(suno_prompt, self.config.make_instrumental)
            .await
            .context("调用音乐生成服务失败")?;
        let clip = clips.first().ok_or_else(|| anyhow!("Failed to generate song"))?;

        let song_path = self
            .services
            .song_generator
            .download(clip, &self.layout.song_path(video_id))
            .await
            .context(format!("下载歌曲失败: {}", clip.id))?;

        let processing_time = start.elapsed().as_secs_f64();
        info!(
            "✅ [歌曲生成] 歌曲已保存: {}，耗时: {:.2}秒",
            song_path.display(),
            processing_time
        );

        Ok(GenerateResponse {
            message: format!(
                "Song generated and downloaded successfully in {:.2} seconds",
                processing_time
            ),
            song_path: song_path.to_string_lossy().to_string(),
        })
    }

    /// 将生成的歌曲对齐到画面变化并合成最终视频
    pub async fn post_process(&self, video_id: &str) -> Result<VideoPostProcessResponse> {
        let video_path = self.existing_video(video_id)?;
        let song_path = self.layout.song_path(video_id);
        if !song_path.is_file() {
            bail!("歌曲尚未生成: {}", video_id);
        }
        let start = Instant::now();
        info!("🎞️  [后期合成] 开始合成: {}", video_path.display());

        let output_path = self.layout.final_output_path(video_id);
        let chunk_size = self.config.energy_chunk_size;
        let step = self.config.offset_step;
        let (output_path, report) = tokio::task::spawn_blocking(move || {
            combine_audio(&video_path, &song_path, &output_path, chunk_size, step)
        })
        .await
        .context("后期合成任务异常退出")??;

        let offset = report.offset;
        let record = AlignmentRecord {
            video_id: video_id.to_string(),
            output_path: output_path.to_string_lossy().to_string(),
            report,
            processed_at: Utc::now().to_rfc3339(),
        };
        write_json(&self.layout.alignment_path(video_id), &record).await?;

        let processing_time = start.elapsed().as_secs_f64();
        info!("✅ [后期合成] 完成，耗时: {:.2}秒", processing_time);

        Ok(VideoPostProcessResponse {
            message: format!(
                "Video post-processing completed in {:.2} seconds",
                processing_time
            ),
            output_path: record.output_path,
            offset,
        })
    }
}

/// 提取 16kHz 单声道音频并检测语音，有语音时返回波形
fn extract_speech_audio(video_path: &Path) -> AnalysisResult<Option<Waveform>> {
    let extractor = AudioExtractor::new(video_path)?;
    if !extractor.has_audio_track()? {
        return Ok(None);
    }
    let waveform = extractor.extract_wav(Some(VAD_SAMPLE_RATE), true)?.read()?;
    if SpeechDetector::default().has_speech(&waveform)? {
        Ok(Some(waveform))
    } else {
        Ok(None)
    }
}

/// 按固定步长选取关键帧并保存为 JPEG
fn extract_keyframes(video_path: &Path, output_dir: &Path, max_scenes: usize) -> AnalysisResult<ExtractedKeyframes> {
    let processor = VideoProcessor::new(video_path)?;
    let info = processor.get_video_info()?;
    let frame_count = processor.count_frames()?;

    let indices = select_keyframe_indices(frame_count, max_scenes);
    let keyframes = build_keyframes(processor.extract_frames_at(&indices)?);
    let paths = save_keyframes(&keyframes, output_dir)?;

    let metadata = keyframes
        .iter()
        .zip(&paths)
        .enumerate()
        .map(|(i, (keyframe, path))| KeyframeMetadata {
            frame: keyframe_label(i + 1),
            frame_index: keyframe.index,
            timestamp: keyframe.index as f64 / info.fps,
            path: path.to_string_lossy().to_string(),
            scene_difference: keyframe.scene_difference,
        })
        .collect();

    Ok(ExtractedKeyframes {
        info,
        frame_count,
        paths,
        metadata,
    })
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("序列化 JSON 失败")?;
    tokio::fs::write(path, json)
        .await
        .context(format!("写入文件失败: {}", path.display()))?;
    Ok(())
}
