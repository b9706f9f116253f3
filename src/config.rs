use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "RetinaAI";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_CLASSIFIER_FIELD: &str = "file";
pub const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CLASSIFIER_RETRIES: u32 = 2;
pub const DEFAULT_CLASSIFIER_RETRY_DELAY_MS: u64 = 2000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

const DB_FILE_NAME: &str = "retina.db";
const UPLOADS_DIR_NAME: &str = "uploads";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "retina_ai=info,retina_ai_lib=info,tower_http=info"
}

/// Default data directory: the platform data dir, or `./data` when none exists.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Outbound classifier settings. `url = None` disables prediction.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub url: Option<String>,
    pub field_name: String,
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: None,
            field_name: DEFAULT_CLASSIFIER_FIELD.to_string(),
            timeout: Duration::from_secs(DEFAULT_CLASSIFIER_TIMEOUT_SECS),
            retries: DEFAULT_CLASSIFIER_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_CLASSIFIER_RETRY_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub classifier: ClassifierConfig,
    pub max_upload_bytes: usize,
    pub session_ttl: chrono::Duration,
    pub password_iterations: u32,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            data_dir: default_data_dir(),
            classifier: ClassifierConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            session_ttl: chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            password_iterations: crate::auth::DEFAULT_PBKDF2_ITERATIONS,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup. Unset or blank keys use the
    /// default; malformed values log a warning and use the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let bind_addr = parse_or(get("RETINA_BIND_ADDR"), "RETINA_BIND_ADDR", defaults.bind_addr);
        let data_dir = get("RETINA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let classifier = ClassifierConfig {
            url: get("RETINA_CLASSIFIER_URL"),
            field_name: get("RETINA_CLASSIFIER_FIELD")
                .unwrap_or_else(|| DEFAULT_CLASSIFIER_FIELD.to_string()),
            timeout: Duration::from_secs(parse_or(
                get("RETINA_CLASSIFIER_TIMEOUT_SECS"),
                "RETINA_CLASSIFIER_TIMEOUT_SECS",
                DEFAULT_CLASSIFIER_TIMEOUT_SECS,
            )),
            retries: parse_or(
                get("RETINA_CLASSIFIER_RETRIES"),
                "RETINA_CLASSIFIER_RETRIES",
                DEFAULT_CLASSIFIER_RETRIES,
            ),
            retry_delay: Duration::from_millis(parse_or(
                get("RETINA_CLASSIFIER_RETRY_DELAY_MS"),
                "RETINA_CLASSIFIER_RETRY_DELAY_MS",
                DEFAULT_CLASSIFIER_RETRY_DELAY_MS,
            )),
        };

        let max_upload_bytes = parse_or(
            get("RETINA_MAX_UPLOAD_BYTES"),
            "RETINA_MAX_UPLOAD_BYTES",
            DEFAULT_MAX_UPLOAD_BYTES,
        );
        let ttl_hours = parse_or(
            get("RETINA_SESSION_TTL_HOURS"),
            "RETINA_SESSION_TTL_HOURS",
            DEFAULT_SESSION_TTL_HOURS,
        );
        let password_iterations = parse_or(
            get("RETINA_PASSWORD_ITERATIONS"),
            "RETINA_PASSWORD_ITERATIONS",
            defaults.password_iterations,
        );

        Self {
            bind_addr,
            data_dir,
            classifier,
            max_upload_bytes,
            session_ttl: chrono::Duration::hours(ttl_hours.max(1)),
            password_iterations: password_iterations.max(1),
            admin_email: get("RETINA_ADMIN_EMAIL"),
            admin_password: get("RETINA_ADMIN_PASSWORD"),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join(UPLOADS_DIR_NAME)
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Debug,
{
    match raw {
        None => default,
        Some(value) => match value.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!(key, value = %value, ?default, "Malformed config value, using default");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.bind_addr.port(), 3000);
        assert!(config.classifier.url.is_none());
        assert_eq!(config.classifier.field_name, "file");
        assert_eq!(config.classifier.timeout, Duration::from_secs(30));
        assert_eq!(config.classifier.retries, 2);
        assert_eq!(config.classifier.retry_delay, Duration::from_millis(2000));
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.session_ttl, chrono::Duration::hours(24));
        assert!(config.admin_email.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("RETINA_BIND_ADDR", "127.0.0.1:8080"),
            ("RETINA_DATA_DIR", "/tmp/retina"),
            ("RETINA_CLASSIFIER_URL", "http://model:5000/predict"),
            ("RETINA_CLASSIFIER_FIELD", "image"),
            ("RETINA_CLASSIFIER_TIMEOUT_SECS", "5"),
            ("RETINA_CLASSIFIER_RETRIES", "0"),
            ("RETINA_SESSION_TTL_HOURS", "2"),
            ("RETINA_ADMIN_EMAIL", "root@example.com"),
        ]);
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/retina/retina.db"));
        assert_eq!(config.uploads_dir(), PathBuf::from("/tmp/retina/uploads"));
        assert_eq!(config.classifier.url.as_deref(), Some("http://model:5000/predict"));
        assert_eq!(config.classifier.field_name, "image");
        assert_eq!(config.classifier.timeout, Duration::from_secs(5));
        assert_eq!(config.classifier.retries, 0);
        assert_eq!(config.session_ttl, chrono::Duration::hours(2));
        assert_eq!(config.admin_email.as_deref(), Some("root@example.com"));
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = config_from(&[
            ("RETINA_BIND_ADDR", "not-an-addr"),
            ("RETINA_CLASSIFIER_TIMEOUT_SECS", "soon"),
            ("RETINA_MAX_UPLOAD_BYTES", "-4"),
        ]);
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.classifier.timeout, Duration::from_secs(30));
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn blank_url_disables_classifier() {
        let config = config_from(&[("RETINA_CLASSIFIER_URL", "   ")]);
        assert!(config.classifier.url.is_none());
    }

    #[test]
    fn app_name_is_retina() {
        assert_eq!(APP_NAME, "RetinaAI");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
