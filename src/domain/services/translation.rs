//! Translation collaborator traits.

use async_trait::async_trait;

use crate::shared::error::AppError;

/// External translation service.
///
/// Translation is strictly best-effort: implementations return the original
/// text on any failure and never surface an error into the message path.
#[async_trait]
pub trait TranslationClient: Send + Sync {
    /// Translate `text` from `source_lang` to `target_lang`.
    ///
    /// Returns the translated text, or the original text when the service is
    /// unreachable or rejects the request.
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> String;
}

/// Cache for on-demand room message translations, keyed by
/// (message id, target language) so one translation is paid once per pair.
#[async_trait]
pub trait TranslationCache: Send + Sync {
    async fn get(&self, message_id: i64, target_lang: &str) -> Result<Option<String>, AppError>;

    async fn put(
        &self,
        message_id: i64,
        target_lang: &str,
        translated: &str,
    ) -> Result<(), AppError>;
}
