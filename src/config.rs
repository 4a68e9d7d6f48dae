//! Configuration file handling.
//!
//! Every section has defaults, so an empty file (or no file at all) is a
//! valid configuration. The configuration is loaded once at startup and shared
//! read-only afterwards.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EventcError, Result};
use crate::repo::DiffOptions;
use crate::shortener::{ShortenerRule, default_rules};

pub const DEFAULT_CONFIG_PATH: &str = "git-eventc.toml";
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
pub const DEFAULT_MERGE_THRESHOLD: usize = 5;
pub const DEFAULT_COMMIT_ID_SIZE: usize = 7;
pub const DEFAULT_SIMILARITY: u8 = 50;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EventcConfig {
    /// Number of commits from which a push is reported as one commit-group.
    pub merge_threshold: usize,
    /// Number of characters commit ids are truncated to.
    pub commit_id_size: usize,
    pub notify: NotifyConfig,
    pub diff: DiffConfig,
    pub shortener: ShortenerConfig,
    pub webhook: WebhookConfig,
    pub hook: HookConfig,
    pub logging: LoggingConfig,
}

impl Default for EventcConfig {
    fn default() -> Self {
        Self {
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            commit_id_size: DEFAULT_COMMIT_ID_SIZE,
            notify: NotifyConfig::default(),
            diff: DiffConfig::default(),
            shortener: ShortenerConfig::default(),
            webhook: WebhookConfig::default(),
            hook: HookConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Where canonical events are delivered.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotifyConfig {
    /// `host:port` of the notification daemon. Events are only logged when unset.
    pub host: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            host: None,
            connect_timeout_secs: 5,
        }
    }
}

/// Rename/copy detection used when listing the files a commit touched.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DiffConfig {
    pub find_renames: bool,
    pub rename_threshold: u8,
    pub find_copies: bool,
    pub copy_threshold: u8,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            find_renames: true,
            rename_threshold: DEFAULT_SIMILARITY,
            find_copies: true,
            copy_threshold: DEFAULT_SIMILARITY,
        }
    }
}

impl DiffConfig {
    pub fn options(&self) -> DiffOptions {
        DiffOptions {
            rename_threshold: self.find_renames.then_some(self.rename_threshold),
            copy_threshold: self.find_copies.then_some(self.copy_threshold),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ShortenerConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
    #[serde(rename = "rule")]
    pub rules: Vec<ShortenerRule>,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: 5,
            rules: default_rules(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebhookConfig {
    pub bind_address: String,
    /// Per project (or project group) secrets. `None` disables verification
    /// entirely; an empty secret disables it for that project only.
    pub secrets: Option<HashMap<String, String>>,
    /// Extra headers sent with enrichment lookups, per project or group.
    pub api_headers: HashMap<String, BTreeMap<String, String>>,
    pub api_timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            secrets: None,
            api_headers: HashMap::new(),
            api_timeout_secs: 10,
        }
    }
}

impl WebhookConfig {
    /// Headers for enrichment lookups; the project entry wins over the group one.
    pub fn api_headers_for(&self, group: &str, project: Option<&str>) -> Vec<(String, String)> {
        project
            .and_then(|p| self.api_headers.get(p))
            .or_else(|| self.api_headers.get(group))
            .map(|headers| {
                headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Settings of the post-receive hook. Each value can also come from
/// `git config git-eventc.<key>` in the pushed repository.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HookConfig {
    pub repository_name: Option<String>,
    pub repository_url: Option<String>,
    pub project_group: Option<String>,
    pub project_name: Option<String>,
    pub pusher: Option<String>,
    pub commit_url: Option<String>,
    pub diff_url: Option<String>,
    pub branch_url: Option<String>,
    pub tag_url: Option<String>,
    pub extra_data: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Also write logs to rolling files in this directory.
    pub directory: Option<PathBuf>,
    pub rotation: String,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            rotation: "daily".to_string(),
            max_files: 5,
        }
    }
}

impl EventcConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("diff.rename_threshold", self.diff.rename_threshold),
            ("diff.copy_threshold", self.diff.copy_threshold),
        ] {
            if value > 100 {
                return Err(EventcError::ConfigError(format!(
                    "{} must be between 0 and 100, got {}",
                    name, value
                )));
            }
        }

        let mut names = HashSet::new();
        for rule in &self.shortener.rules {
            if !names.insert(rule.name.as_str()) {
                return Err(EventcError::ConfigError(format!(
                    "duplicate shortener rule '{}'",
                    rule.name
                )));
            }
        }

        Ok(())
    }

    /// Applies `BIND_ADDRESS` and `EVENTC_HOST` from the environment.
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(bind_address) = env("BIND_ADDRESS") {
            self.webhook.bind_address = bind_address;
        }
        if let Some(host) = env("EVENTC_HOST") {
            self.notify.host = Some(host);
        }
    }
}

/// Load and parse the configuration file
pub fn load_config(path: &Path) -> Result<EventcConfig> {
    let config_str = fs::read_to_string(path).map_err(|e| {
        EventcError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: EventcConfig = toml::from_str(&config_str).map_err(|e| {
        EventcError::ConfigError(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    config.validate()?;
    Ok(config)
}

/// Resolves the configuration the way both binaries do: `GIT_EVENTC_CONFIG`
/// must point at a readable file when set, the default path is optional.
pub fn load_from_env(env: impl Fn(&str) -> Option<String>) -> Result<EventcConfig> {
    let mut config = match env("GIT_EVENTC_CONFIG") {
        Some(path) => load_config(Path::new(&path))?,
        None => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                load_config(path)?
            } else {
                EventcConfig::default()
            }
        }
    };
    config.apply_env_overrides(env);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    #[test]
    fn empty_file_gives_defaults() {
        let config: EventcConfig = toml::from_str("").unwrap();
        assert_eq!(config.merge_threshold, 5);
        assert_eq!(config.commit_id_size, 7);
        assert!(!config.shortener.enabled);
        assert_eq!(config.shortener.rules.len(), default_rules().len());
        assert!(config.webhook.secrets.is_none());
        assert_eq!(config.diff.options().rename_threshold, Some(50));
        assert_eq!(config.diff.options().copy_threshold, Some(50));
    }

    #[test]
    fn parses_full_file() {
        let config: EventcConfig = toml::from_str(
            r#"
            merge_threshold = 3
            commit_id_size = 12

            [notify]
            host = "localhost:7100"

            [diff]
            find_copies = false
            rename_threshold = 80

            [shortener]
            enabled = true

            [[shortener.rule]]
            name = "example"
            http_method = "POST"
            endpoint = "https://sho.rt/api"
            body_field_name = "long"
            url_prefix_filter = "https://github.com/"
            expected_status = 201
            response_header_name = "Location"

            [webhook.secrets]
            myproject = "s3cret"
            open = ""

            [webhook.api_headers.myproject]
            Authorization = "token abc"

            [hook]
            repository_name = "demo"
            commit_url = "https://git.example.com/{repository}/commit/{id}"
            "#,
        )
        .unwrap();

        assert_eq!(config.merge_threshold, 3);
        assert_eq!(config.commit_id_size, 12);
        assert_eq!(config.notify.host.as_deref(), Some("localhost:7100"));
        assert_eq!(config.diff.options().rename_threshold, Some(80));
        assert_eq!(config.diff.options().copy_threshold, None);
        assert_eq!(config.shortener.rules.len(), 1);
        let rule = &config.shortener.rules[0];
        assert_eq!(rule.http_method, HttpMethod::Post);
        assert_eq!(rule.expected_status, Some(201));
        let secrets = config.webhook.secrets.as_ref().unwrap();
        assert_eq!(secrets.get("open").map(String::as_str), Some(""));
        assert_eq!(
            config.webhook.api_headers_for("group", Some("myproject")),
            vec![("Authorization".to_string(), "token abc".to_string())]
        );
        assert_eq!(config.hook.repository_name.as_deref(), Some("demo"));
    }

    #[test]
    fn api_headers_fall_back_to_group() {
        let mut config = WebhookConfig::default();
        config.api_headers.insert(
            "group".to_string(),
            BTreeMap::from([("X-Token".to_string(), "g".to_string())]),
        );
        assert_eq!(config.api_headers_for("group", Some("other")).len(), 1);
        assert!(config.api_headers_for("nothing", None).is_empty());
    }

    #[test]
    fn rejects_out_of_range_similarity() {
        let mut config = EventcConfig::default();
        config.diff.copy_threshold = 101;
        assert!(matches!(
            config.validate(),
            Err(EventcError::ConfigError(_))
        ));
    }

    #[test]
    fn rejects_duplicate_rule_names() {
        let mut config = EventcConfig::default();
        let rule = config.shortener.rules[0].clone();
        config.shortener.rules.push(rule);
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_bind_address_and_host() {
        let mut config = EventcConfig::default();
        config.apply_env_overrides(|key| match key {
            "BIND_ADDRESS" => Some("0.0.0.0:9000".to_string()),
            "EVENTC_HOST" => Some("eventd:7100".to_string()),
            _ => None,
        });
        assert_eq!(config.webhook.bind_address, "0.0.0.0:9000");
        assert_eq!(config.notify.host.as_deref(), Some("eventd:7100"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = load_from_env(|key| {
            (key == "GIT_EVENTC_CONFIG").then(|| "/nonexistent/git-eventc.toml".to_string())
        });
        assert!(matches!(result, Err(EventcError::ConfigError(_))));
    }
}
