use clap::Parser;
use std::path::PathBuf;

/// Server settings. Every flag can also come from the environment.
#[derive(Parser, Clone)]
#[command(name = "server", about = "Portfolio backend: search, chat, analytics and resume downloads")]
pub struct ServerConfig {
    /// Index directory path
    #[arg(long, env = "FOLIO_INDEX_DIR", default_value = "./index")]
    pub index: String,
    /// Host to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Port to bind
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
    /// Comma-separated allowed origins; any origin when unset
    #[arg(long, env = "CORS_ALLOW_ORIGIN")]
    pub cors_allow_origin: Option<String>,
    /// Take client addresses from x-forwarded-for / x-real-ip. Only safe behind a proxy that sets them.
    #[arg(long, env = "TRUST_PROXY")]
    pub trust_proxy: bool,
    /// Name used in chat prompts, e.g. "Ada" for "Ada's projects"
    #[arg(long, env = "OWNER_NAME", default_value = folio_core::prompt::DEFAULT_OWNER)]
    pub owner_name: String,

    /// HMAC secret for resume download tokens
    #[arg(long, env = "RESUME_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,
    #[arg(long, env = "RESUME_TOKEN_TTL", default_value_t = 300)]
    pub token_ttl_secs: i64,
    #[arg(long, env = "RESUME_PATH", default_value = "./public/resume/resume.pdf")]
    pub resume_path: PathBuf,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-3.5-turbo")]
    pub openai_model: String,
    /// Requests allowed per client within the chat window
    #[arg(long, env = "CHAT_RATE_LIMIT", default_value_t = 20)]
    pub chat_rate_limit: usize,
    #[arg(long, env = "CHAT_RATE_WINDOW_SECS", default_value_t = 900)]
    pub chat_rate_window_secs: u64,

    /// REST endpoint of the key-value store
    #[arg(long, env = "KV_REST_API_URL")]
    pub kv_url: Option<String>,
    #[arg(long, env = "KV_REST_API_TOKEN", hide_env_values = true)]
    pub kv_token: Option<String>,
    /// Salt mixed into hashed client addresses
    #[arg(long, env = "IP_SALT", default_value = "folio", hide_env_values = true)]
    pub ip_salt: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            index: "./index".into(),
            host: "0.0.0.0".into(),
            port: 8080,
            cors_allow_origin: None,
            trust_proxy: false,
            owner_name: folio_core::prompt::DEFAULT_OWNER.into(),
            token_secret: None,
            token_ttl_secs: 300,
            resume_path: PathBuf::from("./public/resume/resume.pdf"),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".into(),
            openai_model: "gpt-3.5-turbo".into(),
            chat_rate_limit: 20,
            chat_rate_window_secs: 900,
            kv_url: None,
            kv_token: None,
            ip_salt: "folio".into(),
        }
    }
}

impl ServerConfig {
    pub fn kv_configured(&self) -> bool {
        self.kv_url.as_deref().is_some_and(|u| !u.is_empty()) && self.kv_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn chat_configured(&self) -> bool {
        self.openai_api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}
