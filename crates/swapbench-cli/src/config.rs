use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use swapbench_core::client::MIN_TIMEOUT;
use swapbench_core::{
    CredentialError, DetectionOrder, Endpoints, ModelType, Provider, RetryPolicy, StaticCredentials,
    SwapOptions, ThortfulAuth,
};
use thiserror::Error;

/// Used when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "swapbench.toml";

const DEFAULT_RESTORATION_MODEL: &str = "codeformer-v0.1.0.pth";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
    #[error("request timeout of {}s is below the {}s minimum", .0.as_secs(), MIN_TIMEOUT.as_secs())]
    TimeoutTooShort(Duration),
    #[error("max_attempts must be at least 1")]
    NoAttempts,
    #[error("no providers selected")]
    NoProviders,
}

/// On-disk shape of `swapbench.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    segmind_api_key: Option<String>,
    thortful_auth: Option<PathBuf>,
    segmind_base_url: Option<String>,
    thortful_url: Option<String>,
    source_dir: Option<PathBuf>,
    target_dir: Option<PathBuf>,
    results_dir: Option<PathBuf>,
    log_path: Option<PathBuf>,
    providers: Option<Vec<String>>,
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    retry_timeout_factor: Option<f64>,
    backoff_ms: Option<u64>,
    request_delay_ms: Option<u64>,
    download_urls: Option<bool>,
    template_id: Option<String>,
    source_face_index: Option<u32>,
    target_face_index: Option<u32>,
    restoration_model: Option<String>,
    detection_order: Option<String>,
    model_type: Option<String>,
}

/// Resolved run configuration: file, then `SWAPBENCH_*` environment, then defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub segmind_api_key: Option<String>,
    /// Cached Thortful session headers (`thortful_auth.json`).
    pub thortful_auth: Option<PathBuf>,
    pub endpoints: Endpoints,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub results_dir: PathBuf,
    pub log_path: PathBuf,
    pub providers: Vec<Provider>,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_timeout_factor: f64,
    pub backoff: Duration,
    pub request_delay: Duration,
    /// Download URL results so they are kept alongside byte results.
    pub download_urls: bool,
    pub options: SwapOptions,
}

impl Config {
    /// Load from `path`, or from `swapbench.toml` when no path is given
    /// and that file exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => read_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => read_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let results_root = PathBuf::from("test-results");

        let segmind_api_key = env("SWAPBENCH_SEGMIND_API_KEY")
            .or_else(|| env("SEGMIND_API_KEY"))
            .or_else(|| env("REACT_APP_SEGMIND_API_KEY"))
            .or(file.segmind_api_key)
            .filter(|k| !k.trim().is_empty());

        let mut endpoints = Endpoints::default();
        if let Some(base) = env("SWAPBENCH_SEGMIND_BASE_URL").or(file.segmind_base_url) {
            endpoints.segmind_base = base;
        }
        if let Some(url) = env("SWAPBENCH_THORTFUL_URL").or(file.thortful_url) {
            endpoints.thortful = url;
        }

        let providers = match env("SWAPBENCH_PROVIDERS") {
            Some(list) => parse_providers(list.split(','))?,
            None => match file.providers {
                Some(list) => parse_providers(list.iter().map(String::as_str))?,
                None => vec![Provider::V2, Provider::V43],
            },
        };

        let options = SwapOptions {
            source_face_index: file.source_face_index.unwrap_or(0),
            target_face_index: file.target_face_index.unwrap_or(0),
            restoration_model: Some(
                file.restoration_model
                    .unwrap_or_else(|| DEFAULT_RESTORATION_MODEL.to_string()),
            )
            .filter(|m| !m.is_empty()),
            detection_order: Some(parse_opt("detection_order", file.detection_order)?.unwrap_or(DetectionOrder::BigToSmall)),
            model_type: parse_opt("model_type", file.model_type)?,
            template_id: env("SWAPBENCH_TEMPLATE_ID").or(file.template_id),
        };

        Ok(Self {
            segmind_api_key,
            thortful_auth: env("SWAPBENCH_THORTFUL_AUTH")
                .map(PathBuf::from)
                .or(file.thortful_auth),
            endpoints,
            source_dir: env_path(&env, "SWAPBENCH_SOURCE_DIR")
                .or(file.source_dir)
                .unwrap_or_else(|| results_root.join("source-images")),
            target_dir: env_path(&env, "SWAPBENCH_TARGET_DIR")
                .or(file.target_dir)
                .unwrap_or_else(|| results_root.join("target-images")),
            results_dir: env_path(&env, "SWAPBENCH_RESULTS_DIR")
                .or(file.results_dir)
                .unwrap_or_else(|| results_root.join("results")),
            log_path: env_path(&env, "SWAPBENCH_LOG_PATH")
                .or(file.log_path)
                .unwrap_or_else(|| results_root.join("test_log.csv")),
            providers,
            timeout: Duration::from_secs(env_parse(&env, "SWAPBENCH_TIMEOUT_SECS")?.or(file.timeout_secs).unwrap_or(120)),
            max_attempts: env_parse(&env, "SWAPBENCH_MAX_ATTEMPTS")?.or(file.max_attempts).unwrap_or(2),
            retry_timeout_factor: file.retry_timeout_factor.unwrap_or(1.5),
            backoff: Duration::from_millis(file.backoff_ms.unwrap_or(0)),
            request_delay: Duration::from_millis(
                env_parse(&env, "SWAPBENCH_REQUEST_DELAY_MS")?
                    .or(file.request_delay_ms)
                    .unwrap_or(2000),
            ),
            download_urls: env_flag(&env, "SWAPBENCH_DOWNLOAD_URLS")?
                .or(file.download_urls)
                .unwrap_or(true),
            options,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout < MIN_TIMEOUT {
            return Err(ConfigError::TimeoutTooShort(self.timeout));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        if !self.retry_timeout_factor.is_finite() || self.retry_timeout_factor < 1.0 {
            return Err(ConfigError::Invalid {
                key: "retry_timeout_factor".into(),
                value: self.retry_timeout_factor.to_string(),
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.timeout)
            .with_max_attempts(self.max_attempts)
            .with_retry_timeout_factor(self.retry_timeout_factor)
            .with_backoff(self.backoff)
    }

    /// Credentials for every provider that has them configured.
    pub fn credentials(&self) -> Result<StaticCredentials, CredentialError> {
        let mut creds = StaticCredentials::new();
        if let Some(key) = &self.segmind_api_key {
            creds = creds.with_segmind_key(key.clone());
        }
        if let Some(path) = &self.thortful_auth {
            creds = creds.with_thortful(ThortfulAuth::load(path)?);
        }
        Ok(creds)
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_providers<'a>(names: impl Iterator<Item = &'a str>) -> Result<Vec<Provider>, ConfigError> {
    let mut providers = Vec::new();
    for name in names.map(str::trim).filter(|n| !n.is_empty()) {
        let provider = Provider::from_str(name).map_err(|_| ConfigError::Invalid {
            key: "providers".into(),
            value: name.to_string(),
        })?;
        if !providers.contains(&provider) {
            providers.push(provider);
        }
    }
    Ok(providers)
}

fn parse_opt<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.parse().map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value: v.clone(),
            })
        })
        .transpose()
}

fn env_path(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<PathBuf> {
    env(key).map(PathBuf::from)
}

/// `1/true/yes/on` or `0/false/no/off`, case-insensitive.
fn env_flag(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>, ConfigError> {
    env(key)
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key: key.to_string(),
                value: v.clone(),
            }),
        })
        .transpose()
}

fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError> {
    parse_opt(key, env(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(toml_text: &str, env: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let file: FileConfig = toml::from_str(toml_text).unwrap();
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::resolve(file, |k| env.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = resolve("", &[]).unwrap();
        assert_eq!(config.providers, [Provider::V2, Provider::V43]);
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.request_delay, Duration::from_secs(2));
        assert_eq!(config.log_path, PathBuf::from("test-results/test_log.csv"));
        assert_eq!(config.options.restoration_model.as_deref(), Some("codeformer-v0.1.0.pth"));
        assert_eq!(config.options.detection_order, Some(DetectionOrder::BigToSmall));
        assert!(config.segmind_api_key.is_none());
        assert!(config.download_urls);
        config.validate().unwrap();
    }

    #[test]
    fn test_file_values() {
        let config = resolve(
            r#"
            segmind_api_key = "file-key"
            providers = ["v4", "V4.3", "v4"]
            timeout_secs = 90
            request_delay_ms = 500
            template_id = "card-77"
            detection_order = "left-to-right"
            model_type = "quality"
            restoration_model = ""
            "#,
            &[],
        )
        .unwrap();
        assert_eq!(config.segmind_api_key.as_deref(), Some("file-key"));
        assert_eq!(config.providers, [Provider::V4, Provider::V43]);
        assert_eq!(config.timeout, Duration::from_secs(90));
        assert_eq!(config.request_delay, Duration::from_millis(500));
        assert_eq!(config.options.template_id.as_deref(), Some("card-77"));
        assert_eq!(config.options.detection_order, Some(DetectionOrder::LeftToRight));
        assert_eq!(config.options.model_type, Some(ModelType::Quality));
        assert_eq!(config.options.restoration_model, None);
    }

    #[test]
    fn test_env_overrides_file() {
        let config = resolve(
            r#"
            segmind_api_key = "file-key"
            timeout_secs = 90
            "#,
            &[
                ("REACT_APP_SEGMIND_API_KEY", "legacy-key"),
                ("SWAPBENCH_TIMEOUT_SECS", "150"),
                ("SWAPBENCH_PROVIDERS", "thortful, v2"),
                ("SWAPBENCH_DOWNLOAD_URLS", "0"),
            ],
        )
        .unwrap();
        assert_eq!(config.segmind_api_key.as_deref(), Some("legacy-key"));
        assert_eq!(config.timeout, Duration::from_secs(150));
        assert_eq!(config.providers, [Provider::Thortful, Provider::V2]);
        assert!(!config.download_urls);
        assert_eq!(config.retry_policy().timeout_for(2), Duration::from_secs(225));
    }

    #[test]
    fn test_download_flag_spellings() {
        for off in ["0", "false", "No", "off"] {
            let config = resolve("", &[("SWAPBENCH_DOWNLOAD_URLS", off)]).unwrap();
            assert!(!config.download_urls, "{off} should disable downloads");
        }
        for on in ["1", "TRUE", "yes", "on"] {
            let config = resolve("download_urls = false", &[("SWAPBENCH_DOWNLOAD_URLS", on)]).unwrap();
            assert!(config.download_urls, "{on} should enable downloads");
        }
        assert!(matches!(
            resolve("", &[("SWAPBENCH_DOWNLOAD_URLS", "sometimes")]),
            Err(ConfigError::Invalid { ref key, .. }) if key == "SWAPBENCH_DOWNLOAD_URLS"
        ));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            resolve(r#"providers = ["v5"]"#, &[]),
            Err(ConfigError::Invalid { ref key, .. }) if key == "providers"
        ));
        assert!(matches!(
            resolve("", &[("SWAPBENCH_MAX_ATTEMPTS", "many")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(toml::from_str::<FileConfig>("timeout = 5").is_err());
    }

    #[test]
    fn test_validate() {
        let short = resolve("timeout_secs = 30", &[]).unwrap();
        assert!(matches!(short.validate(), Err(ConfigError::TimeoutTooShort(_))));

        let zero = resolve("max_attempts = 0", &[]).unwrap();
        assert!(matches!(zero.validate(), Err(ConfigError::NoAttempts)));

        let none = resolve("providers = []", &[]).unwrap();
        assert!(matches!(none.validate(), Err(ConfigError::NoProviders)));

        let factor = resolve("retry_timeout_factor = 0.5", &[]).unwrap();
        assert!(matches!(factor.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_load_file_and_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let auth = dir.path().join("thortful_auth.json");
        std::fs::write(
            &auth,
            r#"{"API_KEY":"k","API_SECRET":"s","user_token":"t","x-thortful-customer-id":"c"}"#,
        )
        .unwrap();
        let path = dir.path().join("swapbench.toml");
        std::fs::write(
            &path,
            format!("segmind_api_key = \"abc\"\nthortful_auth = {:?}\n", auth.display().to_string()),
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        let creds = config.credentials().unwrap();
        assert!(creds.covers(Provider::V2));
        assert!(creds.covers(Provider::Thortful));

        assert!(matches!(
            Config::load(Some(&dir.path().join("missing.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }
}
