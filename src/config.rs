use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::auth::Credentials;
use crate::reply::MessageFormat;

/// Configuration file structure for the build bot.
///
/// Loaded once at startup and read-only afterwards. Older deployments wrote
/// lowercase keys (`hipchaturl`, `ngrokurl`); those are still accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// HipChat room notification URL that replies are posted to
    #[serde(alias = "hipchaturl")]
    pub hipchat_url: String,

    /// Port the webhook listener binds to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL of this service
    #[serde(default, alias = "ngrokurl")]
    pub base_url: Option<String>,

    /// Format used for chat replies
    #[serde(default)]
    pub message_format: MessageFormat,

    /// First token every chat command must start with
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// TeamCity server and account
    pub teamcity: Credentials,

    /// Outbound HTTP behaviour
    #[serde(default)]
    pub http: HttpConfig,

    /// Background watching of kicked builds
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    /// Deadline for every outbound request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries for idempotent TeamCity reads
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between retries, multiplied by the attempt number
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WatchConfig {
    /// Poll kicked builds until they finish and announce the result
    #[serde(default = "default_watch_enabled")]
    pub enabled: bool,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: default_watch_enabled(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl WatchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

const MAX_RETRY_DELAY_MS: u64 = 60_000;

fn default_port() -> u16 {
    8080
}

fn default_command_prefix() -> String {
    "/build".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_watch_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    2
}

impl Config {
    /// Load configuration from a file.
    ///
    /// The format follows the extension: `.yaml`/`.yml`, `.toml` or `.json`.
    /// Anything else is tried as YAML, then TOML, then JSON.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, does not parse, or names URLs that
    /// are not valid.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        let config: Self = match extension {
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            _ => serde_yaml::from_str(&contents)
                .or_else(|_| toml::from_str(&contents))
                .or_else(|_| serde_json::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.hipchat_url)
            .with_context(|| format!("Invalid hipchat-url: {}", self.hipchat_url))?;
        Url::parse(&self.teamcity.url)
            .with_context(|| format!("Invalid teamcity url: {}", self.teamcity.url))?;
        if self.command_prefix.trim().is_empty() {
            bail!("command-prefix must not be empty");
        }
        if self.http.request_timeout_secs == 0 {
            bail!("http.request-timeout-secs must be at least 1");
        }
        if self.http.retry_delay_ms > MAX_RETRY_DELAY_MS {
            bail!(
                "http.retry-delay-ms must be at most {MAX_RETRY_DELAY_MS}, got {}",
                self.http.retry_delay_ms
            );
        }
        if self.watch.interval_secs == 0 {
            bail!("watch.interval-secs must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_yaml_config_with_defaults() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        let yaml_content = r#"
hipchat-url: https://example.hipchat.com/v2/room/42/notification?auth_token=abc
teamcity:
  url: https://teamcity.example.com/
  username: builder
  password: s3cret
"#;
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.command_prefix, "/build");
        assert_eq!(config.message_format, MessageFormat::Html);
        assert_eq!(config.teamcity.username, "builder");
        assert_eq!(config.http.request_timeout_secs, 30);
        assert_eq!(config.http.max_retries, 2);
        assert!(config.watch.enabled);
        assert_eq!(config.watch.interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_load_legacy_lowercase_keys() {
        let mut temp_file = NamedTempFile::with_suffix(".yml").unwrap();
        let yaml_content = r#"
hipchaturl: https://example.hipchat.com/v2/room/42/notification
port: 9090
ngrokurl: https://6011fb9f.ngrok.io
teamcity:
  url: https://teamcity.example.com/
  username: builder
  password: s3cret
"#;
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(
            config.base_url,
            Some("https://6011fb9f.ngrok.io".to_string())
        );
        assert!(config.hipchat_url.contains("room/42"));
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
hipchat-url = "https://example.hipchat.com/v2/room/1/notification"
message-format = "text"
command-prefix = "/tc"

[teamcity]
url = "https://teamcity.example.com/"
username = "builder"
password = "s3cret"

[http]
max-retries = 0

[watch]
enabled = false
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.message_format, MessageFormat::Text);
        assert_eq!(config.command_prefix, "/tc");
        assert_eq!(config.http.max_retries, 0);
        assert_eq!(config.http.request_timeout_secs, 30);
        assert!(!config.watch.enabled);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = Config::load(Path::new("does-not-exist.yaml"));
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to read config file"));
    }

    #[test]
    fn test_load_missing_teamcity_section_fails() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "hipchat-url: https://example.hipchat.com/\n").unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_invalid_url_fails() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        let yaml_content = r#"
hipchat-url: not a url
teamcity:
  url: https://teamcity.example.com/
  username: builder
  password: s3cret
"#;
        write!(temp_file, "{}", yaml_content).unwrap();

        let err = Config::load(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("hipchat-url"));
    }

    fn load_with_extra(extra: &str) -> Result<Config> {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        let yaml_content = format!(
            r#"
hipchat-url: https://example.hipchat.com/v2/room/42/notification
teamcity:
  url: https://teamcity.example.com/
  username: builder
  password: s3cret
{extra}
"#
        );
        write!(temp_file, "{}", yaml_content).unwrap();
        Config::load(temp_file.path())
    }

    #[test]
    fn test_zero_watch_interval_fails() {
        let err = load_with_extra("watch:\n  interval-secs: 0").unwrap_err();
        assert!(err.to_string().contains("watch.interval-secs"));
    }

    #[test]
    fn test_zero_request_timeout_fails() {
        let err = load_with_extra("http:\n  request-timeout-secs: 0").unwrap_err();
        assert!(err.to_string().contains("http.request-timeout-secs"));
    }

    #[test]
    fn test_oversized_retry_delay_fails() {
        let err = load_with_extra("http:\n  retry-delay-ms: 18446744073709551615").unwrap_err();
        assert!(err.to_string().contains("http.retry-delay-ms"));

        let config = load_with_extra("http:\n  retry-delay-ms: 60000").unwrap();
        assert_eq!(config.http.retry_delay(), Duration::from_secs(60));
    }
}
