use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};

use super::{parse_response, ClassifierError, ImageUpload, Prediction, RetinaClassifier};
use crate::config::ClassifierConfig;

/// HTTP client for the hosted classifier.
///
/// Each attempt is bounded by `timeout`. Only timeouts are retried, after a
/// fixed `retry_delay`; connection failures and error statuses fail at once.
pub struct HttpClassifier {
    url: String,
    field_name: String,
    client: reqwest::blocking::Client,
    timeout: Duration,
    retries: u32,
    retry_delay: Duration,
}

impl HttpClassifier {
    pub fn new(url: &str, config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::HttpClient(e.to_string()))?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            field_name: config.field_name.clone(),
            client,
            timeout: config.timeout,
            retries: config.retries,
            retry_delay: config.retry_delay,
        })
    }

    fn attempt(&self, image: &ImageUpload) -> Result<Prediction, ClassifierError> {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)
            .map_err(|e| ClassifierError::HttpClient(e.to_string()))?;
        let form = Form::new().part(self.field_name.clone(), part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClassifierError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().map_err(|e| self.map_send_error(e))?;
        parse_response(&body)
    }

    fn map_send_error(&self, e: reqwest::Error) -> ClassifierError {
        if e.is_timeout() {
            ClassifierError::Timeout { attempts: 1 }
        } else if e.is_connect() {
            ClassifierError::Connection(self.url.clone())
        } else {
            ClassifierError::HttpClient(e.to_string())
        }
    }
}

impl RetinaClassifier for HttpClassifier {
    fn classify(&self, image: &ImageUpload) -> Result<Prediction, ClassifierError> {
        let max_attempts = self.retries + 1;
        let mut attempt = 1;
        loop {
            match self.attempt(image) {
                Err(ClassifierError::Timeout { .. }) if attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        timeout_secs = self.timeout.as_secs_f64(),
                        delay_ms = self.retry_delay.as_millis() as u64,
                        "Classifier timed out, retrying"
                    );
                    std::thread::sleep(self.retry_delay);
                    attempt += 1;
                }
                Err(ClassifierError::Timeout { .. }) => {
                    tracing::error!(attempts = attempt, "Classifier timed out, giving up");
                    return Err(ClassifierError::Timeout { attempts: attempt });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Classifier request failed");
                    return Err(e);
                }
                Ok(prediction) => {
                    tracing::info!(
                        attempt,
                        prediction = %prediction.prediction,
                        confidence = prediction.confidence,
                        "Classifier answered"
                    );
                    return Ok(prediction);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Multipart, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// How the stub should behave for each incoming request.
    #[derive(Clone, Copy)]
    enum Behaviour {
        /// Sleep past the client timeout for the first N requests, then answer.
        SlowFirst(u32),
        AlwaysSlow,
        ServerError,
    }

    #[derive(Clone)]
    struct Stub {
        hits: Arc<AtomicU32>,
        behaviour: Behaviour,
    }

    async fn stub_handler(
        State(stub): State<Stub>,
        mut multipart: Multipart,
    ) -> (StatusCode, Json<serde_json::Value>) {
        let n = stub.hits.fetch_add(1, Ordering::SeqCst) + 1;

        let mut saw_file = false;
        while let Ok(Some(field)) = multipart.next_field().await {
            if field.name() == Some("file") {
                saw_file = !field.bytes().await.unwrap_or_default().is_empty();
            }
        }
        if !saw_file {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"detail": "no file"})),
            );
        }

        let slow = match stub.behaviour {
            Behaviour::SlowFirst(k) => n <= k,
            Behaviour::AlwaysSlow => true,
            Behaviour::ServerError => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"detail": "model crashed"})),
                )
            }
        };
        if slow {
            tokio::time::sleep(Duration::from_millis(800)).await;
        }
        (
            StatusCode::OK,
            Json(serde_json::json!({"prediction": "Severe", "confidence": 88.0})),
        )
    }

    async fn start_stub(behaviour: Behaviour) -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route("/predict", post(stub_handler))
            .with_state(Stub {
                hits: hits.clone(),
                behaviour,
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/predict"), hits)
    }

    fn fast_config(retries: u32) -> ClassifierConfig {
        ClassifierConfig {
            url: None,
            field_name: "file".into(),
            timeout: Duration::from_millis(250),
            retries,
            retry_delay: Duration::from_millis(20),
        }
    }

    fn image() -> ImageUpload {
        ImageUpload {
            bytes: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0],
            file_name: "fundus.png".into(),
            content_type: "image/png".into(),
        }
    }

    async fn classify_blocking(
        url: String,
        config: ClassifierConfig,
    ) -> Result<Prediction, ClassifierError> {
        tokio::task::spawn_blocking(move || {
            let client = HttpClassifier::new(&url, &config)?;
            client.classify(&image())
        })
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn answers_on_first_attempt() {
        let (url, hits) = start_stub(Behaviour::SlowFirst(0)).await;
        let p = classify_blocking(url, fast_config(2)).await.unwrap();
        assert_eq!(p.prediction, "Severe");
        assert!((p.confidence - 0.88).abs() < 1e-9);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn retries_after_timeout() {
        let (url, hits) = start_stub(Behaviour::SlowFirst(1)).await;
        let p = classify_blocking(url, fast_config(2)).await.unwrap();
        assert_eq!(p.prediction, "Severe");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn gives_up_after_retries() {
        let (url, hits) = start_stub(Behaviour::AlwaysSlow).await;
        let err = classify_blocking(url, fast_config(2)).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Timeout { attempts: 3 }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn server_error_is_not_retried() {
        let (url, hits) = start_stub(Behaviour::ServerError).await;
        let err = classify_blocking(url, fast_config(2)).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Upstream { status: 500, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn configured_field_name_is_used() {
        let (url, _) = start_stub(Behaviour::SlowFirst(0)).await;
        let mut config = fast_config(0);
        config.field_name = "image".into();
        let err = classify_blocking(url, config).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Upstream { status: 400, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn connection_refused_maps_to_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = classify_blocking(format!("http://{addr}/predict"), fast_config(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifierError::Connection(_)));
    }
}
