//! Push Notification Gateway Client
//!
//! HTTP client for the external push gateway. Dispatch is best-effort; the
//! only signal the delivery core acts on is the per-target outcome, in
//! particular the permanently-invalid outcome that deactivates a target.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PushSettings;
use crate::domain::{PushGateway, PushNotification, PushOutcome};

/// HTTP push gateway client (FCM-style batch dispatch).
pub struct HttpPushGateway {
    http: reqwest::Client,
    base_url: String,
    server_key: String,
}

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    registration_ids: &'a [String],
    title: &'a str,
    body: &'a str,
    data: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    results: Vec<DispatchResult>,
}

#[derive(Debug, Deserialize)]
struct DispatchResult {
    #[serde(default)]
    error: Option<String>,
}

impl DispatchResult {
    fn into_outcome(self) -> PushOutcome {
        match self.error.as_deref() {
            None => PushOutcome::Delivered,
            // Gateway error codes for a permanently dead registration.
            Some("NotRegistered") | Some("InvalidRegistration") | Some("MismatchSenderId") => {
                PushOutcome::Invalid
            }
            Some(_) => PushOutcome::Failed,
        }
    }
}

impl HttpPushGateway {
    pub fn new(settings: &PushSettings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            server_key: settings.server_key.clone(),
        })
    }

    async fn request(
        &self,
        addresses: &[String],
        notification: &PushNotification,
    ) -> Result<Vec<PushOutcome>, reqwest::Error> {
        let response = self
            .http
            .post(format!("{}/v1/send", self.base_url))
            .bearer_auth(&self.server_key)
            .json(&DispatchRequest {
                registration_ids: addresses,
                title: &notification.title,
                body: &notification.body,
                data: &notification.data,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<DispatchResponse>()
            .await?;

        Ok(response
            .results
            .into_iter()
            .map(|r| r.into_outcome())
            .collect())
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn dispatch(
        &self,
        addresses: &[String],
        notification: &PushNotification,
    ) -> Vec<PushOutcome> {
        if addresses.is_empty() {
            return Vec::new();
        }

        match self.request(addresses, notification).await {
            Ok(outcomes) if outcomes.len() == addresses.len() => outcomes,
            Ok(outcomes) => {
                tracing::warn!(
                    expected = addresses.len(),
                    got = outcomes.len(),
                    "Push gateway returned a short result list"
                );
                // Treat unmatched targets as transient failures.
                let mut padded = outcomes;
                padded.resize(addresses.len(), PushOutcome::Failed);
                padded
            }
            Err(e) => {
                tracing::warn!(targets = addresses.len(), error = %e, "Push dispatch failed");
                vec![PushOutcome::Failed; addresses.len()]
            }
        }
    }
}
