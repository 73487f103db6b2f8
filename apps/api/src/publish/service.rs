//! `publish(generation, account)`: resolves the generated artifact and the
//! account credential, then hands both to the [`PublishAdapter`].

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::store::GenerationStore;
use crate::media::MediaStore;
use crate::models::generation::{GenerationStatus, MediaKind};
use crate::publish::adapter::{PostContent, PublishAdapter};
use crate::publish::credentials::CredentialSource;
use crate::publish::errors::{PublishErrorCode, PublishResult};

pub struct PublishService {
    generations: Arc<dyn GenerationStore>,
    credentials: Arc<dyn CredentialSource>,
    media: Arc<dyn MediaStore>,
    adapter: PublishAdapter,
}

impl PublishService {
    pub fn new(
        generations: Arc<dyn GenerationStore>,
        credentials: Arc<dyn CredentialSource>,
        media: Arc<dyn MediaStore>,
        adapter: PublishAdapter,
    ) -> Self {
        Self {
            generations,
            credentials,
            media,
            adapter,
        }
    }

    /// Lookup problems are request errors. Everything that happens at the
    /// platform comes back as a [`PublishResult`].
    pub async fn publish(
        &self,
        generation_id: Uuid,
        account_id: Uuid,
        caption: Option<String>,
    ) -> Result<PublishResult, AppError> {
        let generation = self
            .generations
            .get_generation(generation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Generation {generation_id} not found")))?;

        if generation.status() != Some(GenerationStatus::Completed) {
            return Err(AppError::Conflict(format!(
                "Generation {generation_id} is {} and cannot be published",
                generation.status
            )));
        }

        let credential = self
            .credentials
            .credential(account_id)
            .await?
            .filter(|c| c.user_id == generation.user_id)
            .ok_or_else(|| AppError::NotFound(format!("Platform account {account_id} not found")))?;

        if credential.is_expired(Utc::now()) {
            return Ok(PublishResult::failed(
                PublishErrorCode::TokenExpired,
                "platform access token has expired, reconnect the account",
            ));
        }

        let caption = caption.unwrap_or_default();
        let content = match generation.media() {
            MediaKind::Text => PostContent {
                text: generation.result_text.clone().unwrap_or(caption),
                media: None,
            },
            MediaKind::Image | MediaKind::Video => {
                let Some(locator) = generation.result_url.as_deref() else {
                    return Ok(PublishResult::failed(
                        PublishErrorCode::MediaUploadFailed,
                        "generation has no stored media",
                    ));
                };
                match self.media.fetch(locator).await {
                    Ok(blob) => PostContent {
                        text: caption,
                        media: Some(blob),
                    },
                    Err(e) => {
                        warn!(generation_id = %generation_id, error = %e, "Failed to read generated media");
                        return Ok(PublishResult::failed(
                            PublishErrorCode::MediaUploadFailed,
                            format!("could not read generated media: {e}"),
                        ));
                    }
                }
            }
        };

        let result = self.adapter.publish(&credential, &content).await;
        info!(
            generation_id = %generation_id,
            account_id = %account_id,
            platform = %credential.platform,
            success = result.success,
            error_code = result.error_code.map(|c| c.as_str()).unwrap_or("none"),
            "Publish attempt finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::generation::GenerationStatus;
    use crate::publish::credentials::PlatformCredential;
    use crate::testing::{MemoryStore, Reply, ScriptedTransport};

    fn service(store: &Arc<MemoryStore>, transport: &Arc<ScriptedTransport>) -> PublishService {
        PublishService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            PublishAdapter::new(
                transport.clone(),
                "https://social.example.com".to_string(),
                Duration::from_secs(5),
            ),
        )
    }

    fn account(store: &MemoryStore, user_id: Uuid) -> PlatformCredential {
        let credential = PlatformCredential {
            account_id: Uuid::new_v4(),
            user_id,
            platform: "instagram".to_string(),
            author_id: "ig_123".to_string(),
            access_token: "token".to_string(),
            expires_at: None,
        };
        store.add_credential(credential.clone());
        credential
    }

    #[tokio::test]
    async fn test_completed_image_is_uploaded_and_posted() {
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Reply::status(
            200,
            r#"{"upload_url": "https://upload.example.com/1", "media_id": "m"}"#,
        ));
        transport.push(Reply::status(200, ""));
        transport.push(Reply::status(201, r#"{"id": "post_1"}"#));

        let user = Uuid::new_v4();
        let generation = store.add_generation(user, GenerationStatus::Completed);
        store.add_media(generation.result_url.as_deref().unwrap(), b"png-bytes");
        let credential = account(&store, user);

        let result = service(&store, &transport)
            .publish(generation.id, credential.account_id, Some("Glow".to_string()))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.platform_post_id.as_deref(), Some("post_1"));
    }

    #[tokio::test]
    async fn test_unfinished_generation_is_conflict() {
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(ScriptedTransport::default());
        let user = Uuid::new_v4();
        let generation = store.add_generation(user, GenerationStatus::Processing);
        let credential = account(&store, user);

        let err = service(&store, &transport)
            .publish(generation.id, credential.account_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_account_of_other_user_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(ScriptedTransport::default());
        let generation = store.add_generation(Uuid::new_v4(), GenerationStatus::Completed);
        let credential = account(&store, Uuid::new_v4());

        let err = service(&store, &transport)
            .publish(generation.id, credential.account_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_expired_token_short_circuits() {
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(ScriptedTransport::default());
        let user = Uuid::new_v4();
        let generation = store.add_generation(user, GenerationStatus::Completed);
        let mut credential = account(&store, user);
        credential.account_id = Uuid::new_v4();
        credential.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        store.add_credential(credential.clone());

        let result = service(&store, &transport)
            .publish(generation.id, credential.account_id, None)
            .await
            .unwrap();
        assert_eq!(result.error_code, Some(PublishErrorCode::TokenExpired));
        assert!(!result.is_retryable);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_media_is_retryable_upload_failure() {
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(ScriptedTransport::default());
        let user = Uuid::new_v4();
        let generation = store.add_generation(user, GenerationStatus::Completed);
        let credential = account(&store, user);

        let result = service(&store, &transport)
            .publish(generation.id, credential.account_id, None)
            .await
            .unwrap();
        assert_eq!(result.error_code, Some(PublishErrorCode::MediaUploadFailed));
        assert!(result.is_retryable);
    }
}
