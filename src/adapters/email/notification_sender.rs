use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::{
    domain::entities::notification::NotificationRequest,
    use_cases::notification::{DeliveryFailure, NotificationSender},
};

const RESPONSE_BODY_CAP: usize = 1024;

/// Posts notification requests to the transactional email function.
#[derive(Clone)]
pub struct HttpNotificationSender {
    client: Client,
    endpoint: Url,
    service_role_key: SecretString,
}

impl HttpNotificationSender {
    pub fn new(client: Client, endpoint: Url, service_role_key: SecretString) -> Self {
        Self {
            client,
            endpoint,
            service_role_key,
        }
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn send(&self, request: &NotificationRequest) -> Result<(), DeliveryFailure> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.service_role_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| DeliveryFailure::transport(format!("HTTP error: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = read_body_capped(response, RESPONSE_BODY_CAP).await;
        Err(DeliveryFailure::http(
            status.as_u16(),
            format!("Notification sender returned {}: {}", status, body),
        ))
    }
}

async fn read_body_capped(mut response: reqwest::Response, cap: usize) -> String {
    let mut buf = Vec::with_capacity(cap.min(4096));

    while let Ok(Some(chunk)) = response.chunk().await {
        let remaining = cap.saturating_sub(buf.len());
        if remaining == 0 {
            break;
        }
        let take = chunk.len().min(remaining);
        buf.extend_from_slice(&chunk[..take]);
    }

    String::from_utf8_lossy(&buf).into_owned()
}
