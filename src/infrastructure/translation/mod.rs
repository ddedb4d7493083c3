//! Translation Service Client
//!
//! HTTP client for the external translation collaborator. Translation is
//! best-effort end to end: every failure path returns the original text so a
//! translation outage can never fail a message send.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::TranslationSettings;
use crate::domain::TranslationClient;

/// HTTP translation client.
pub struct HttpTranslationClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translated_text: String,
}

impl HttpTranslationClient {
    pub fn new(settings: &TranslationSettings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    async fn request(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, reqwest::Error> {
        let response = self
            .http
            .post(format!("{}/v1/translate", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&TranslateRequest {
                text,
                source_lang,
                target_lang,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<TranslateResponse>()
            .await?;

        Ok(response.translated_text)
    }
}

#[async_trait]
impl TranslationClient for HttpTranslationClient {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> String {
        if source_lang == target_lang {
            return text.to_string();
        }

        match self.request(text, source_lang, target_lang).await {
            Ok(translated) => translated,
            Err(e) => {
                // Degrade to the original text rather than failing the send.
                tracing::warn!(
                    source_lang = source_lang,
                    target_lang = target_lang,
                    error = %e,
                    "Translation failed, serving original text"
                );
                text.to_string()
            }
        }
    }
}
