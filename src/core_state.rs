//! Shared application state.
//!
//! `CoreState` is built once at startup and handed to the axum router
//! behind an `Arc`. It holds no connection: each request opens its own
//! SQLite handle from the configured path.

use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{self, AuthError};
use crate::classifier::{ClassifierError, HttpClassifier, RetinaClassifier, UnconfiguredClassifier};
use crate::config::AppConfig;
use crate::db;

pub struct CoreState {
    pub config: AppConfig,
    classifier: Arc<dyn RetinaClassifier>,
}

impl CoreState {
    /// Build state from configuration. Creates the data and upload
    /// directories and picks the HTTP classifier when a URL is set.
    pub fn new(config: AppConfig) -> Result<Self, CoreError> {
        let classifier: Arc<dyn RetinaClassifier> = match config.classifier.url.as_deref() {
            Some(url) => Arc::new(HttpClassifier::new(url, &config.classifier)?),
            None => {
                tracing::warn!("RETINA_CLASSIFIER_URL not set, prediction disabled");
                Arc::new(UnconfiguredClassifier)
            }
        };
        Self::with_classifier(config, classifier)
    }

    /// Build state around an explicit classifier (tests, alternative backends).
    pub fn with_classifier(
        config: AppConfig,
        classifier: Arc<dyn RetinaClassifier>,
    ) -> Result<Self, CoreError> {
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(config.uploads_dir())?;
        Ok(Self { config, classifier })
    }

    /// Open a fresh connection to the application database.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.config.db_path()).map_err(CoreError::Database)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.config.uploads_dir()
    }

    pub fn classifier(&self) -> Arc<dyn RetinaClassifier> {
        Arc::clone(&self.classifier)
    }

    /// Create the first admin from `RETINA_ADMIN_EMAIL` / `RETINA_ADMIN_PASSWORD`
    /// when no admin exists yet.
    pub fn seed_admin(&self) -> Result<bool, CoreError> {
        let (Some(email), Some(password)) = (
            self.config.admin_email.as_deref(),
            self.config.admin_password.as_deref(),
        ) else {
            return Ok(false);
        };
        let mut conn = self.open_db()?;
        let created = auth::seed_admin(&mut conn, email, password, self.config.password_iterations)?;
        Ok(created)
    }

    /// Drop expired sessions. Run at startup.
    pub fn purge_expired_sessions(&self) -> Result<usize, CoreError> {
        let conn = self.open_db()?;
        Ok(db::purge_expired_sessions(&conn, &db::now_timestamp())?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Classifier setup error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::MockClassifier;

    fn test_config(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            data_dir: dir.to_path_buf(),
            password_iterations: 1_000,
            ..AppConfig::default()
        }
    }

    #[test]
    fn new_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(&tmp.path().join("nested"));
        let state = CoreState::new(config).unwrap();
        assert!(state.uploads_dir().is_dir());
        assert!(!state.classifier().is_configured());
    }

    #[test]
    fn configured_url_enables_classifier() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(tmp.path());
        config.classifier.url = Some("http://127.0.0.1:9/predict".into());
        let state = CoreState::new(config).unwrap();
        assert!(state.classifier().is_configured());
    }

    #[test]
    fn open_db_creates_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let state =
            CoreState::with_classifier(test_config(tmp.path()), Arc::new(MockClassifier::new("Mild", 0.5)))
                .unwrap();
        let conn = state.open_db().unwrap();
        assert_eq!(db::count_admins(&conn).unwrap(), 0);
        assert!(state.config.db_path().exists());
    }

    #[test]
    fn seed_admin_requires_both_values() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(tmp.path());
        config.admin_email = Some("root@example.com".into());
        let state = CoreState::with_classifier(config, Arc::new(UnconfiguredClassifier)).unwrap();
        assert!(!state.seed_admin().unwrap());
    }

    #[test]
    fn seed_admin_runs_once() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(tmp.path());
        config.admin_email = Some("root@example.com".into());
        config.admin_password = Some("admin-password".into());
        let state = CoreState::with_classifier(config, Arc::new(UnconfiguredClassifier)).unwrap();
        assert!(state.seed_admin().unwrap());
        assert!(!state.seed_admin().unwrap());
    }
}
