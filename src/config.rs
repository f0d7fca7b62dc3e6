use anyhow::Result;
use configparser::ini::Ini;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use crate::openai::OpenAiConfig;
use crate::processor::ProcessConfig;
use crate::suno::SunoConfig;

/// 扩展配置（媒体目录、外部服务、日志）
#[derive(Debug, Clone)]
pub struct ExtendedConfig {
    /// 流水线配置
    pub process: ProcessConfig,
    /// 媒体文件根目录
    pub media_dir: PathBuf,
    pub openai: OpenAiConfig,
    pub suno: SunoConfig,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
}

/// INI 配置文件，读取时先查指定节，再查 [DEFAULT]
struct IniFile {
    ini: Ini,
}

impl IniFile {
    fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", config_path.display()));
        }
        let mut ini = Ini::new();
        ini.load(config_path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e))?;
        Ok(Self { ini })
    }

    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get(section, key)
            .or_else(|| self.ini.get("DEFAULT", key))
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, section: &str, key: &str) -> Option<T> {
        self.get(section, key).and_then(|v| v.parse().ok())
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_value(name).and_then(|v| v.parse().ok())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 加载流水线配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn load_config(
        config_file: Option<&Path>,
        max_scenes: Option<usize>,
        energy_chunk_size: Option<usize>,
        offset_step: Option<f64>,
    ) -> Result<ProcessConfig> {
        let file = Self::locate(config_file)?;
        Ok(Self::process_config(file.as_ref(), max_scenes, energy_chunk_size, offset_step))
    }

    /// 加载扩展配置（媒体目录、OpenAI、Suno、日志）
    pub fn load_extended_config(config_file: Option<&Path>) -> Result<ExtendedConfig> {
        let file = Self::locate(config_file)?;
        let file = file.as_ref();
        let file_value = |section: &str, key: &str| file.and_then(|f| f.get(section, key));

        let process = Self::process_config(file, None, None, None);

        let media_dir = env_value("VIDEO_SONG_MEDIA_DIR")
            .or_else(|| file_value("video_song", "media_dir"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("media"));

        let default_openai = OpenAiConfig::default();
        let openai = OpenAiConfig {
            api_key: env_value("OPEN_AI_SECRET_KEY")
                .or_else(|| file_value("openai", "openai_api_key"))
                .unwrap_or_default(),
            base_url: env_value("OPENAI_BASE_URL")
                .or_else(|| file_value("openai", "openai_base_url"))
                .unwrap_or(default_openai.base_url),
            chat_model: file_value("openai", "gpt_model").unwrap_or(default_openai.chat_model),
            vision_model: file_value("openai", "vision_model").unwrap_or(default_openai.vision_model),
            whisper_model: file_value("openai", "whisper_model").unwrap_or(default_openai.whisper_model),
            timeout: file
                .and_then(|f| f.parse("openai", "request_timeout_secs"))
                .map(Duration::from_secs)
                .unwrap_or(default_openai.timeout),
            max_retries: file
                .and_then(|f| f.parse("openai", "max_retries"))
                .unwrap_or(default_openai.max_retries),
            ..default_openai
        };

        let default_suno = SunoConfig::default();
        let suno = SunoConfig {
            cookie: env_value("SUNO_COOKIE")
                .or_else(|| file_value("suno", "suno_cookie"))
                .unwrap_or_default(),
            base_url: env_value("SUNO_BASE_URL")
                .or_else(|| file_value("suno", "suno_base_url"))
                .unwrap_or(default_suno.base_url),
            model: file_value("suno", "suno_model").unwrap_or(default_suno.model),
            timeout: file
                .and_then(|f| f.parse("suno", "request_timeout_secs"))
                .map(Duration::from_secs)
                .unwrap_or(default_suno.timeout),
            max_retries: file
                .and_then(|f| f.parse("suno", "max_retries"))
                .unwrap_or(default_suno.max_retries),
            ..default_suno
        };

        let log_level = env_value("LOG_LEVEL")
            .or_else(|| file_value("logging", "level"))
            .unwrap_or_else(|| "info".to_string());

        Ok(ExtendedConfig {
            process,
            media_dir,
            openai,
            suno,
            log_level,
        })
    }

    fn process_config(
        file: Option<&IniFile>,
        max_scenes: Option<usize>,
        energy_chunk_size: Option<usize>,
        offset_step: Option<f64>,
    ) -> ProcessConfig {
        let defaults = ProcessConfig::default();
        ProcessConfig {
            max_scenes: max_scenes
                .or_else(|| env_parse("VIDEO_SONG_MAX_SCENES"))
                .or_else(|| file.and_then(|f| f.parse("video_song", "max_scenes")))
                .unwrap_or(defaults.max_scenes),
            energy_chunk_size: energy_chunk_size
                .or_else(|| env_parse("VIDEO_SONG_ENERGY_CHUNK_SIZE"))
                .or_else(|| file.and_then(|f| f.parse("video_song", "energy_chunk_size")))
                .unwrap_or(defaults.energy_chunk_size),
            offset_step: offset_step
                .or_else(|| env_parse("VIDEO_SONG_OFFSET_STEP"))
                .or_else(|| file.and_then(|f| f.parse("video_song", "offset_step")))
                .unwrap_or(defaults.offset_step),
            transcription_chunk_bytes: env_parse("VIDEO_SONG_TRANSCRIPTION_CHUNK_BYTES")
                .or_else(|| file.and_then(|f| f.parse("video_song", "transcription_chunk_bytes")))
                .unwrap_or(defaults.transcription_chunk_bytes),
            make_instrumental: env_value("VIDEO_SONG_MAKE_INSTRUMENTAL")
                .or_else(|| file.and_then(|f| f.get("video_song", "make_instrumental")))
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.make_instrumental),
        }
    }

    /// 指定了配置文件时必须能读取，否则依次尝试默认位置
    fn locate(config_file: Option<&Path>) -> Result<Option<IniFile>> {
        match config_file {
            Some(path) => IniFile::load(path).map(Some),
            None => Ok(Self::default_locations()
                .into_iter()
                .find(|p| p.exists())
                .and_then(|p| IniFile::load(&p).ok())),
        }
    }

    /// 默认配置文件位置，按优先级排列
    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![
            PathBuf::from("video-song.ini"),
            PathBuf::from(".video-song.ini"),
        ];
        if let Some(home) = env::var_os("HOME") {
            locations.push(PathBuf::from(home).join(".video-song.ini"));
        }
        locations.push(PathBuf::from("/etc/video-song.ini"));
        locations
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let process = ProcessConfig::default();
        let openai = OpenAiConfig::default();
        let suno = SunoConfig::default();

        let mut config_parser = Ini::new();
        config_parser.set("video_song", "media_dir", Some("media".to_string()));
        config_parser.set("video_song", "max_scenes", Some(process.max_scenes.to_string()));
        config_parser.set("video_song", "energy_chunk_size", Some(process.energy_chunk_size.to_string()));
        config_parser.set("video_song", "offset_step", Some(process.offset_step.to_string()));
        config_parser.set(
            "video_song",
            "transcription_chunk_bytes",
            Some(process.transcription_chunk_bytes.to_string()),
        );
        config_parser.set("video_song", "make_instrumental", Some(process.make_instrumental.to_string()));
        config_parser.set("openai", "openai_api_key", Some("".to_string()));
        config_parser.set("openai", "openai_base_url", Some(openai.base_url));
        config_parser.set("openai", "gpt_model", Some(openai.chat_model));
        config_parser.set("openai", "vision_model", Some(openai.vision_model));
        config_parser.set("openai", "whisper_model", Some(openai.whisper_model));
        config_parser.set("openai", "request_timeout_secs", Some(openai.timeout.as_secs().to_string()));
        config_parser.set("openai", "max_retries", Some(openai.max_retries.to_string()));
        config_parser.set("suno", "suno_cookie", Some("".to_string()));
        config_parser.set("suno", "suno_base_url", Some(suno.base_url));
        config_parser.set("suno", "suno_model", Some(suno.model));
        config_parser.set("suno", "request_timeout_secs", Some(suno.timeout.as_secs().to_string()));
        config_parser.set("suno", "max_retries", Some(suno.max_retries.to_string()));
        config_parser.set("logging", "level", Some("info".to_string()));

        config_parser.write(config_path)
            .map_err(|e| anyhow::anyhow!("写入配置文件失败: {}: {}", config_path.display(), e))?;

        Ok(())
    }
}
