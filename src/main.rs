use clap::{Parser, Subcommand};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use video_song::{
    config::{ConfigLoader, ExtendedConfig},
    handler::{self, AppState},
    postprocess::combine_audio,
    MediaLayout, OpenAiClient, Services, SunoClient, VideoPipeline,
};

/// 视频配乐工具 - 分析视频内容，生成匹配的歌曲并合成到视频中
#[derive(Parser, Debug)]
#[command(name = "video-song")]
#[command(about = "视频配乐工具：关键帧描述、语音转写、AI 生成歌曲、音画对齐", long_about = None)]
struct Args {
    /// 配置文件路径（可选，支持 .ini 格式）
    /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Web 服务模式：启动 HTTP 服务器
    Serve {
        /// 监听地址（默认从环境变量 FC_SERVER_PORT 读取，如果不存在则使用 0.0.0.0:9000）
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// CLI 模式：处理本地视频文件
    Process {
        /// 输入视频文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 媒体目录
        /// 可通过环境变量 VIDEO_SONG_MEDIA_DIR 或配置文件设置
        #[arg(long)]
        media_dir: Option<PathBuf>,

        /// 最多提取的关键帧数量
        /// 可通过环境变量 VIDEO_SONG_MAX_SCENES 或配置文件设置
        #[arg(long)]
        max_scenes: Option<usize>,

        /// 处理完成后继续生成歌曲并合成最终视频
        #[arg(long)]
        generate: bool,
    },
    /// 对齐模式：把本地音频按画面变化对齐后合成到视频中
    Align {
        /// 输入视频文件路径
        #[arg(long)]
        video: PathBuf,

        /// 输入音频文件路径
        #[arg(long)]
        audio: PathBuf,

        /// 输出视频文件路径
        #[arg(short, long)]
        output: PathBuf,

        /// 偏移搜索步长（秒）
        #[arg(long)]
        step: Option<f64>,

        /// 能量峰值检测的分块大小（采样点）
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// 生成默认配置文件
    Init {
        /// 配置文件路径
        #[arg(default_value = "video-song.ini")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = ConfigLoader::load_extended_config(args.config.as_deref())
        .context("加载配置失败")?;

    // RUST_LOG 优先于配置中的日志级别
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Commands::Serve { bind } => {
            // 优先使用命令行参数，其次使用环境变量 FC_SERVER_PORT，最后使用默认值 9000
            let bind_addr = bind.unwrap_or_else(|| {
                std::env::var("FC_SERVER_PORT")
                    .map(|port| format!("0.0.0.0:{}", port))
                    .unwrap_or_else(|_| "0.0.0.0:9000".to_string())
            });
            let pipeline = build_pipeline(config)?;
            start_web_server(&bind_addr, pipeline).await?;
        }
        Commands::Process {
            input,
            media_dir,
            max_scenes,
            generate,
        } => {
            let mut config = config;
            config.process = ConfigLoader::load_config(args.config.as_deref(), max_scenes, None, None)
                .context("加载配置失败")?;
            if let Some(media_dir) = media_dir {
                config.media_dir = media_dir;
            }

            println!(
                "使用配置: media_dir={}, max_scenes={}, chunk_size={}, step={:.2}s",
                config.media_dir.display(),
                config.process.max_scenes,
                config.process.energy_chunk_size,
                config.process.offset_step
            );

            let pipeline = build_pipeline(config)?;
            let video_id = pipeline.import_video(&input).await?;
            println!("视频 ID: {}", video_id);

            let result = pipeline
                .process_video(&video_id)
                .await
                .context("处理视频失败")?;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if generate {
                let song = pipeline
                    .generate_song(&video_id, &result.suno_prompt)
                    .await
                    .context("生成歌曲失败")?;
                println!("{}", song.message);

                let output = pipeline
                    .post_process(&video_id)
                    .await
                    .context("后期合成失败")?;
                println!("{} (偏移 {:.2}秒): {}", output.message, output.offset, output.output_path);
            }
        }
        Commands::Align {
            video,
            audio,
            output,
            step,
            chunk_size,
        } => {
            let process = ConfigLoader::load_config(args.config.as_deref(), None, chunk_size, step)
                .context("加载配置失败")?;

            let (output_path, report) = tokio::task::spawn_blocking(move || {
                combine_audio(&video, &audio, &output, process.energy_chunk_size, process.offset_step)
            })
            .await
            .context("对齐任务异常退出")?
            .context("音画对齐失败")?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            println!("输出文件: {}", output_path.display());
        }
        Commands::Init { path } => {
            ConfigLoader::create_default_config(&path)?;
            println!("已创建配置文件: {}", path.display());
        }
    }

    Ok(())
}

/// 根据配置创建外部服务客户端和流水线
fn build_pipeline(config: ExtendedConfig) -> Result<VideoPipeline> {
    let openai = Arc::new(OpenAiClient::new(config.openai).context("创建 OpenAI 客户端失败")?);
    let suno = Arc::new(SunoClient::new(config.suno).context("创建 Suno 客户端失败")?);

    let services = Services {
        speech_to_text: openai.clone(),
        frame_describer: openai.clone(),
        prompt_writer: openai,
        song_generator: suno,
    };

    Ok(VideoPipeline::new(
        MediaLayout::new(config.media_dir),
        services,
        config.process,
    ))
}

async fn start_web_server(bind: &str, pipeline: VideoPipeline) -> Result<()> {
    tokio::fs::create_dir_all(pipeline.layout().root())
        .await
        .context(format!("创建媒体目录失败: {}", pipeline.layout().root().display()))?;

    let app = handler::router(AppState { pipeline });

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("绑定地址失败: {}", bind))?;

    tracing::info!("Web 服务器启动在: http://{}", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("可用端点:");
    tracing::info!("  • 健康检查: GET  http://{}/health", bind);
    tracing::info!("  • 上传视频: POST http://{}/upload_video", bind);
    tracing::info!("  • 处理视频: POST http://{}/process_video", bind);
    tracing::info!("  • 生成歌曲: POST http://{}/generate", bind);
    tracing::info!("  • 后期合成: POST http://{}/post_process", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    axum::serve(listener, app)
        .await
        .context("启动服务器失败")?;

    Ok(())
}
