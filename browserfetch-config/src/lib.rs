//! Loader for browserfetch configuration with YAML + environment overlays.
//!
//! Precedence, lowest first: built-in defaults, YAML files and snippets in the
//! order they were added, then `BROWSERFETCH__`-prefixed environment variables
//! (`__` separates nested keys, e.g. `BROWSERFETCH__LIMITS__MAX_CONCURRENCY=2`).
//! `${VAR}` placeholders in string values are expanded after merging.
//!
//! The browser sandbox toggle is deliberately not part of the file schema: it
//! is read from `BROWSERFETCH_NO_SANDBOX` and only the exact value `"1"`
//! disables the sandbox.
use browserfetch_common::SandboxMode;
use browserfetch_common::StealthLevel;
use browserfetch_common::limits::{InvalidLimit, ResourceLimits};
use browserfetch_common::observability::LogFormat;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use url::Url;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "BROWSERFETCH";

/// Environment variable that turns the browser OS sandbox off.
pub const NO_SANDBOX_ENV: &str = "BROWSERFETCH_NO_SANDBOX";

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),
    #[error(transparent)]
    Limits(#[from] InvalidLimit),
    #[error("invalid webdriver_url '{url}': {reason}")]
    WebDriverUrl { url: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserfetchConfig {
    /// WebDriver endpoint (Chromedriver) the browser sessions connect to.
    pub webdriver_url: String,
    pub headless: bool,
    pub stealth: StealthLevel,
    pub limits: ResourceLimits,
    pub logging: LoggingConfig,
    /// Filled from [`NO_SANDBOX_ENV`], never from files.
    #[serde(skip)]
    pub sandbox: SandboxMode,
}

impl Default for BrowserfetchConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            headless: true,
            stealth: StealthLevel::default(),
            limits: ResourceLimits::default(),
            logging: LoggingConfig::default(),
            sandbox: SandboxMode::Enabled,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub emit_stderr: bool,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            format: LogFormat::Text,
            emit_stderr: false,
            filter: "info".into(),
        }
    }
}

/// Parse the sandbox toggle. Anything but the literal `"1"` keeps the sandbox.
pub fn parse_no_sandbox(raw: Option<&str>) -> SandboxMode {
    match raw {
        Some("1") => SandboxMode::Disabled,
        _ => SandboxMode::Enabled,
    }
}

/// Read [`NO_SANDBOX_ENV`] from the process environment.
pub fn sandbox_mode_from_env() -> SandboxMode {
    parse_no_sandbox(std::env::var(NO_SANDBOX_ENV).ok().as_deref())
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) if s.contains('$') => {
            let mut cur = std::mem::take(s);
            for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                let expanded = shellexpand::env(&cur)
                    .map(|cow| cow.into_owned())
                    .unwrap_or_else(|_| cur.clone());
                if expanded == cur {
                    break;
                }
                cur = expanded;
            }
            *s = cur;
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hiding the `config` crate wiring.
pub struct BrowserfetchConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for BrowserfetchConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserfetchConfigLoader {
    /// Start from built-in defaults; environment overrides are applied at [`load`](Self::load).
    ///
    /// ```
    /// use browserfetch_config::BrowserfetchConfigLoader;
    ///
    /// let cfg = BrowserfetchConfigLoader::new().load().expect("defaults load");
    /// assert_eq!(cfg.limits.max_concurrency, 4);
    /// assert!(cfg.headless);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a required YAML/TOML/JSON file; format is inferred from the suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, so env-only deployments need no file.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use browserfetch_common::StealthLevel;
    /// use browserfetch_config::BrowserfetchConfigLoader;
    ///
    /// let cfg = BrowserfetchConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// stealth: maximum
    /// limits:
    ///   max_concurrency: 2
    ///   max_cache_bytes: 1048576
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.stealth, StealthLevel::Maximum);
    /// assert_eq!(cfg.limits.max_concurrency, 2);
    /// assert_eq!(cfg.limits.max_chars, 500_000);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Merge all sources, expand `${VAR}` placeholders, and validate limits.
    pub fn load(self) -> Result<BrowserfetchConfig, ConfigLoadError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let mut typed: BrowserfetchConfig = serde_json::from_value(v)
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;

        typed.limits.validate()?;
        Url::parse(&typed.webdriver_url).map_err(|e| ConfigLoadError::WebDriverUrl {
            url: typed.webdriver_url.clone(),
            reason: e.to_string(),
        })?;
        typed.sandbox = sandbox_mode_from_env();

        Ok(typed)
    }
}
