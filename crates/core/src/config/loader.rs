use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// `REELPRESS_WORKER__CONCURRENCY=4` overrides `worker.concurrency`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("REELPRESS_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[server]
port = 9000

[queue]
visibility_timeout_secs = 120
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.queue.visibility_timeout_secs, 120);
    }

    #[test]
    fn test_config_without_optional_sections_validates() {
        let config = load_config_from_str("[server]\nport = 8080\n").unwrap();
        assert_eq!(config.notifier.timeout_secs, 10);
        assert!(config.notifier.webhook_url.is_none());
        crate::config::validate_config(&config).unwrap();
    }

    #[test]
    fn test_load_config_from_str_bad_type() {
        let toml = r#"
[worker]
concurrency = "many"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
host = "127.0.0.1"
port = 3000

[database]
path = "/var/lib/reelpress/jobs.db"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(
            config.database.path.to_str().unwrap(),
            "/var/lib/reelpress/jobs.db"
        );
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
[worker]
concurrency = 2
"#,
            )?;
            jail.set_env("REELPRESS_WORKER__CONCURRENCY", "6");
            jail.set_env("REELPRESS_NOTIFIER__WEBHOOK_URL", "http://hooks.local/done");

            let config = load_config(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.worker.concurrency, 6);
            assert_eq!(
                config.notifier.webhook_url.as_deref(),
                Some("http://hooks.local/done")
            );
            Ok(())
        });
    }
}
