// HTTP messaging gateway
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use sendflow_core::domain::Destination;
use sendflow_core::error::{AppError, Result};
use sendflow_core::port::{DeliveryError, MessagingGateway};

/// Connect timeout only; a send itself is not bounded in time
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout of the readiness probe
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Wire body of `POST {base}/messages`
#[derive(Debug, Serialize)]
struct OutgoingMessage<'a> {
    address: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

/// Gateway adapter speaking JSON over HTTP
///
/// - 2xx: delivered
/// - 422 with an image attached: the image could not be attached
/// - other 4xx: the destination rejected the message
/// - 5xx and network errors: transport failure
pub struct HttpMessagingGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMessagingGateway {
    /// Create a gateway client for `base_url` (e.g. `http://127.0.0.1:8088`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl MessagingGateway for HttpMessagingGateway {
    async fn send(
        &self,
        destination: &Destination,
        message: &str,
        image_ref: Option<&str>,
    ) -> std::result::Result<(), DeliveryError> {
        let body = OutgoingMessage {
            address: &destination.address,
            text: message,
            image: image_ref,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(destination_id = %destination.id, status = status.as_u16(), "Gateway accepted message");
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        let reason = if detail.trim().is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            format!("HTTP {}: {}", status.as_u16(), detail.trim())
        };

        if status.as_u16() == 422 && image_ref.is_some() {
            Err(DeliveryError::Image(reason))
        } else if status.is_client_error() {
            Err(DeliveryError::Rejected(reason))
        } else {
            Err(DeliveryError::Transport(reason))
        }
    }

    async fn check_ready(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Gateway health check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "Gateway unreachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use tokio_test::assert_err;

    type Received = Arc<Mutex<Vec<Value>>>;

    async fn receive(State(received): State<Received>, Json(body): Json<Value>) -> StatusCode {
        let address = body["address"].as_str().unwrap_or_default().to_string();
        let image = body["image"].as_str().map(str::to_string);
        received.lock().unwrap().push(body);

        match (address.as_str(), image.as_deref()) {
            ("chat:blocked", _) => StatusCode::FORBIDDEN,
            ("chat:down", _) => StatusCode::BAD_GATEWAY,
            (_, Some("img/broken.png")) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::OK,
        }
    }

    /// Local stand-in for the gateway service
    async fn spawn_gateway() -> (String, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/messages", post(receive))
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), received)
    }

    #[tokio::test]
    async fn test_send_posts_json_body() {
        let (url, received) = spawn_gateway().await;
        let gateway = HttpMessagingGateway::new(format!("{}/", url)).unwrap();
        assert_eq!(gateway.base_url(), url);

        let destination = Destination::new("g1", "Group 1", "chat:1");
        gateway
            .send(&destination, "Runner 49.90", Some("img/shoe.png"))
            .await
            .unwrap();
        gateway.send(&destination, "Tote", None).await.unwrap();

        let bodies = received.lock().unwrap().clone();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["address"], "chat:1");
        assert_eq!(bodies[0]["text"], "Runner 49.90");
        assert_eq!(bodies[0]["image"], "img/shoe.png");
        assert!(bodies[1].get("image").is_none());
    }

    #[tokio::test]
    async fn test_error_statuses_map_to_delivery_errors() {
        let (url, _) = spawn_gateway().await;
        let gateway = HttpMessagingGateway::new(url).unwrap();

        let blocked = Destination::new("g2", "Blocked", "chat:blocked");
        let err = assert_err!(gateway.send(&blocked, "hi", None).await);
        assert!(matches!(err, DeliveryError::Rejected(_)));
        assert!(err.to_string().contains("403"));

        let down = Destination::new("g3", "Down", "chat:down");
        let err = assert_err!(gateway.send(&down, "hi", None).await);
        assert!(matches!(err, DeliveryError::Transport(_)));

        let ok = Destination::new("g1", "Group 1", "chat:1");
        let err = gateway
            .send(&ok, "hi", Some("img/broken.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Image(_)));
    }

    #[tokio::test]
    async fn test_readiness() {
        let (url, _) = spawn_gateway().await;
        assert!(HttpMessagingGateway::new(url).unwrap().check_ready().await);

        // Nothing listens on port 9 (discard) in the test environment
        let gateway = HttpMessagingGateway::new("http://127.0.0.1:9").unwrap();
        assert!(!gateway.check_ready().await);

        let destination = Destination::new("g1", "Group 1", "chat:1");
        let err = assert_err!(gateway.send(&destination, "hi", None).await);
        assert!(matches!(err, DeliveryError::Transport(_)));
    }
}
