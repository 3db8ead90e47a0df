//! Completion callbacks fired when a saga reaches a terminal step.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::action::SagaOutcome;
use crate::error::{Result, SagaError};

/// Receives the final outcome of every checkout saga.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    /// Releases whoever is waiting on `order_id`.
    async fn release(&self, order_id: &str, outcome: SagaOutcome) -> Result<()>;
}

#[async_trait]
impl<T: CompletionNotifier + ?Sized> CompletionNotifier for Arc<T> {
    async fn release(&self, order_id: &str, outcome: SagaOutcome) -> Result<()> {
        (**self).release(order_id, outcome).await
    }
}

/// Releases checkouts through the gateway's `/release` endpoint, for an
/// orchestrator running in a different process from the gateway.
#[derive(Debug, Clone)]
pub struct HttpReleaseNotifier {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpReleaseNotifier {
    const TIMEOUT: Duration = Duration::from_secs(5);

    /// `base_url` is the gateway root, e.g. `http://gateway:5000`.
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| SagaError::InvalidCallbackUrl(base_url.to_string()))?;
        let client = reqwest::Client::builder().timeout(Self::TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    /// `{base}/release/{order_id}/{status}` with each segment percent-encoded.
    fn release_url(&self, order_id: &str, outcome: SagaOutcome) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("release")
                .push(order_id)
                .push(&outcome.status_code().to_string());
        }
        url
    }
}

#[async_trait]
impl CompletionNotifier for HttpReleaseNotifier {
    #[tracing::instrument(skip(self))]
    async fn release(&self, order_id: &str, outcome: SagaOutcome) -> Result<()> {
        let url = self.release_url(order_id, outcome);
        let response = self.client.post(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SagaError::ReleaseRejected {
                order_id: order_id.to_string(),
                status: status.as_u16(),
            });
        }
        tracing::debug!(%url, "checkout released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, extract::Path, http::StatusCode, routing::post};
    use std::sync::Mutex;

    async fn spawn_gateway(seen: Arc<Mutex<Vec<(String, u16)>>>) -> String {
        let app = Router::new().route(
            "/release/{order_id}/{status}",
            post(move |Path((order_id, status)): Path<(String, u16)>| {
                let seen = seen.clone();
                async move {
                    if order_id == "unknown" {
                        return StatusCode::BAD_REQUEST;
                    }
                    seen.lock().unwrap().push((order_id, status));
                    StatusCode::OK
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_http_release_posts_status() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let notifier = HttpReleaseNotifier::new(&spawn_gateway(seen.clone()).await).unwrap();

        notifier.release("o1", SagaOutcome::Success).await.unwrap();
        notifier.release("o2", SagaOutcome::Failure).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![("o1".to_string(), 200), ("o2".to_string(), 400)]);
    }

    #[tokio::test]
    async fn test_http_release_reports_rejection() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let notifier = HttpReleaseNotifier::new(&spawn_gateway(seen).await).unwrap();

        let result = notifier.release("unknown", SagaOutcome::Success).await;
        assert!(matches!(
            result,
            Err(SagaError::ReleaseRejected { status: 400, .. })
        ));
    }

    #[test]
    fn test_release_url_trims_trailing_slash() {
        let notifier = HttpReleaseNotifier::new("http://gateway:5000/").unwrap();
        assert_eq!(
            notifier.release_url("abc", SagaOutcome::Failure).as_str(),
            "http://gateway:5000/release/abc/400"
        );
    }

    #[test]
    fn test_release_url_encodes_order_id() {
        let notifier = HttpReleaseNotifier::new("http://gateway:5000/api").unwrap();
        assert_eq!(
            notifier.release_url("a/b?c", SagaOutcome::Success).as_str(),
            "http://gateway:5000/api/release/a%2Fb%3Fc/200"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpReleaseNotifier::new("not a url"),
            Err(SagaError::InvalidCallbackUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_http_release_delivers_awkward_order_id() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let notifier = HttpReleaseNotifier::new(&spawn_gateway(seen.clone()).await).unwrap();

        notifier.release("a/b c", SagaOutcome::Success).await.unwrap();
        assert_eq!(seen.lock().unwrap().clone(), vec![("a/b c".to_string(), 200)]);
    }
}
