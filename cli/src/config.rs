use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use server::config::EngineConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_BOT_USER_ID: &str = "bulk-invite-bot";

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid engine configuration: {0}")]
    Invalid(#[from] server::config::ConfigError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    engine: EngineConfig,
    #[serde(default)]
    logging: LoggingConfig,
    bot_user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    level: Option<String>,
    file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Some("info".to_string()),
            file: None,
        }
    }
}

impl AppConfig {
    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    /// User id the job posts as.
    pub fn bot_user_id(&self) -> &str {
        self.bot_user_id.as_deref().unwrap_or(DEFAULT_BOT_USER_ID)
    }
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }
}

/// Standard location of `config.toml`, `~/.config/bulk-invite` on Unix.
pub fn default_config_path() -> Option<PathBuf> {
    let mut dir = if cfg!(unix) {
        dirs::home_dir().map(|mut home| {
            home.push(".config");
            home
        })
    } else {
        None
    }
    .or_else(dirs::config_dir)?;

    dir.push("bulk-invite");
    dir.push("config.toml");
    Some(dir)
}

/// Loads the configuration file (optional), then environment overrides of
/// the form `BULK_INVITE__ENGINE__LOCK_TTL_SECS`.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigLoadError> {
    dotenv::dotenv().ok();

    let mut builder = Config::builder();
    match path {
        Some(path) => {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        None => {
            if let Some(path) = default_config_path() {
                builder = builder.add_source(
                    File::from(path)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }
    }

    let config = builder
        .add_source(
            Environment::with_prefix("BULK_INVITE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<AppConfig>()?;

    config.engine.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_sections() {
        let file = write_config("");

        let config = assert_ok!(load(Some(file.path())));

        assert_eq!(config.bot_user_id(), "bulk-invite-bot");
        assert_eq!(config.logging().level(), "info");
        assert_none!(config.logging().file());
        assert_eq!(config.engine().lock_ttl().as_secs(), 1800);
    }

    #[test]
    fn test_reads_sections() {
        let file = write_config(
            r#"
bot_user_id = "announcer"

[engine]
lock_ttl_secs = 60
max_concurrent_jobs = 2

[logging]
level = "debug"
file = "bulk-invite.log"
"#,
        );

        let config = assert_ok!(load(Some(file.path())));

        assert_eq!(config.bot_user_id(), "announcer");
        assert_eq!(config.engine().lock_ttl().as_secs(), 60);
        assert_eq!(config.engine().max_concurrent_jobs(), Some(2));
        assert_eq!(config.logging().level(), "debug");
        assert_eq!(config.logging().file(), Some("bulk-invite.log"));
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let file = write_config("[engine]\nlock_ttl_secs = 0\n");

        assert_matches!(load(Some(file.path())), Err(ConfigLoadError::Invalid(_)));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert_matches!(
            load(Some(Path::new("/nonexistent/bulk-invite.toml"))),
            Err(ConfigLoadError::Load(_))
        );
    }
}
