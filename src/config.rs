use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default config file picked up from the working directory.
const CWD_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Directory holding persisted conversations
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<String>,

    /// Directory served for non-API paths
    #[arg(long)]
    pub static_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub models: ModelConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub static_dir: String,
    pub body_limit_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
}

/// Model identifiers and prompt text handed to the router at startup.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub llm_model_id: String,
    pub stt_model_id: String,
    pub system_prompt: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 8787)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.static_dir", "public")?
            .set_default("server.body_limit_bytes", 25 * 1024 * 1024)?
            .set_default("inference.base_url", "http://127.0.0.1:8788/ai")?
            .set_default("models.llm_model_id", "@cf/meta/llama-3.1-8b-instruct")?
            .set_default("models.stt_model_id", "@cf/openai/whisper")?
            .set_default("models.system_prompt", DEFAULT_SYSTEM_PROMPT)?
            .set_default("storage.data_dir", "data/sessions")?;

        // 2. Config file: explicit path must exist, ./config.yaml is optional
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if Path::new(CWD_CONFIG_FILE).exists() {
            builder = builder.add_source(File::with_name(CWD_CONFIG_FILE).required(false));
        }

        // 3. Environment variables, e.g. RELAY_SERVER__PORT=9000
        builder = builder.add_source(
            Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their clap-level env fallbacks) win
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(dir) = cli.data_dir {
            builder = builder.set_override("storage.data_dir", dir)?;
        }
        if let Some(dir) = cli.static_dir {
            builder = builder.set_override("server.static_dir", dir)?;
        }

        let cfg = builder.build()?;
        let app: Self = cfg.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.inference.base_url.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "inference.base_url cannot be empty".to_string(),
            ));
        }
        if self.models.llm_model_id.trim().is_empty() || self.models.stt_model_id.trim().is_empty()
        {
            return Err(config::ConfigError::Message(
                "models.llm_model_id and models.stt_model_id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, friendly voice assistant. \
Keep answers short and conversational, since they will be read aloud.";
