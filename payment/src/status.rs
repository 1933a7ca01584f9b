//! Session status callbacks.

use std::time::Duration;

use async_trait::async_trait;
use chainpay_types::SessionId;
use serde::{Deserialize, Serialize};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

const NOTIFY_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Hears about every session that reaches a terminal state.
#[async_trait]
pub trait StatusCallback: Send + Sync {
    async fn on_status(&self, session_id: &SessionId, success: bool);
}

/// Body posted to a status endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotification {
    pub session_id: SessionId,
    pub success: bool,
}

/// Posts a [`StatusNotification`] to a fixed URL.
///
/// Without a URL every notification is dropped. Delivery failures are
/// logged and never reach the session.
pub struct HttpStatusNotifier {
    url: Option<String>,
    client: reqwest::Client,
}

impl HttpStatusNotifier {
    pub fn new(url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .connect_timeout(NOTIFY_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { url, client }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    async fn post(&self, url: &str, notification: &StatusNotification) -> Result<(), String> {
        let response = self
            .client
            .post(url)
            .json(notification)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP status {}", response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl StatusCallback for HttpStatusNotifier {
    async fn on_status(&self, session_id: &SessionId, success: bool) {
        let Some(url) = &self.url else {
            return;
        };
        let notification = StatusNotification {
            session_id: session_id.clone(),
            success,
        };
        match self.post(url, &notification).await {
            Ok(()) => tracing::debug!(session = %session_id, success, url, "status sent"),
            Err(error) => {
                tracing::warn!(
                    session = %session_id,
                    success,
                    url,
                    %error,
                    "status callback failed"
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    #[test]
    fn notification_uses_camel_case() {
        let json = serde_json::to_value(StatusNotification {
            session_id: SessionId::from("s1"),
            success: true,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "sessionId": "s1", "success": true }));
    }

    #[tokio::test]
    async fn missing_url_is_a_no_op() {
        let notifier = HttpStatusNotifier::new(None);
        notifier.on_status(&SessionId::from("s1"), false).await;
        assert!(notifier.url().is_none());
    }

    #[tokio::test]
    async fn posts_notification() {
        let received: Arc<Mutex<Vec<StatusNotification>>> = Arc::default();
        let sink = Arc::clone(&received);
        let router = Router::new().route(
            "/status",
            post(move |Json(body): Json<StatusNotification>| async move {
                sink.lock().unwrap().push(body);
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        HttpStatusNotifier::new(Some(format!("http://{addr}/status")))
            .on_status(&SessionId::from("s1"), true)
            .await;

        let received = received.lock().unwrap();
        assert_eq!(
            *received,
            vec![StatusNotification {
                session_id: SessionId::from("s1"),
                success: true
            }]
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        HttpStatusNotifier::new(Some("http://127.0.0.1:9/status".into()))
            .on_status(&SessionId::from("s1"), true)
            .await;
    }
}
