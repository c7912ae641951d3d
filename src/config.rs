use config::{Config, ConfigError, File};
use serde::{Deserialize, Deserializer};

fn deserialize_allowed_origins<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }
    match StringOrVec::deserialize(deserializer) {
        Ok(StringOrVec::String(s)) => Ok(s.split(',').map(|x| x.trim().to_string()).filter(|x| !x.is_empty()).collect()),
        Ok(StringOrVec::Vec(v)) => Ok(v),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub cors: CorsConfig,
    pub encryption: EncryptionConfig,
    pub report: ReportConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default = "default_expiration_minutes")]
    pub expiration_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(deserialize_with = "deserialize_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Secret for the field-level cipher. Changing it makes every stored
/// personal field unreadable.
#[derive(Debug, Clone, Deserialize)]
pub struct EncryptionConfig {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub api_key: String,
    #[serde(default = "default_report_base_url")]
    pub base_url: String,
    #[serde(default = "default_report_model")]
    pub model: String,
    #[serde(default = "default_report_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_report_temperature")]
    pub temperature: f32,
    #[serde(default = "default_report_timeout_secs")]
    pub timeout_secs: u64,
}

/// Administrator account created at start-up when missing.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_email: default_admin_email(),
            admin_password: default_admin_password(),
            admin_name: default_admin_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: String,
}

fn default_expiration_minutes() -> i64 {
    30
}

fn default_report_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_report_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_report_max_tokens() -> u32 {
    800
}

fn default_report_temperature() -> f32 {
    0.7
}

fn default_report_timeout_secs() -> u64 {
    60
}

fn default_admin_email() -> String {
    "admin@bot.com".to_string()
}

fn default_admin_password() -> String {
    "admin".to_string()
}

fn default_admin_name() -> String {
    "administrator".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config.toml").required(false))
            .add_source(config::Environment::with_prefix("CLINIC").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
