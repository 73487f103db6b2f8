//! Publish Adapter: two-phase media upload, then post creation.
//!
//! Phase 1 (only with media): init returns an upload handle, then the raw
//! bytes are PUT to it. Either sub-step failing yields `media_upload_failed`.
//! Phase 2: create the post, referencing the media handle if there is one.
//!
//! Every request runs under `request_timeout`; hitting it yields `timeout`.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::media::MediaBlob;
use crate::publish::credentials::PlatformCredential;
use crate::publish::errors::{PublishErrorCode, PublishResult};
use crate::publish::transport::{
    HttpMethod, PlatformRequest, PlatformResponse, PlatformTransport, RequestBody, TransportError,
};

#[derive(Debug, Clone)]
pub struct PostContent {
    pub text: String,
    pub media: Option<MediaBlob>,
}

#[derive(Debug, Deserialize)]
struct UploadHandle {
    upload_url: String,
    media_id: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: String,
    #[serde(default)]
    permalink: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlatformErrorBody {
    message: String,
}

pub struct PublishAdapter {
    transport: Arc<dyn PlatformTransport>,
    api_base: String,
    request_timeout: Duration,
}

impl PublishAdapter {
    pub fn new(
        transport: Arc<dyn PlatformTransport>,
        api_base: String,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            api_base: api_base.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub async fn publish(&self, credential: &PlatformCredential, content: &PostContent) -> PublishResult {
        let media_id = match &content.media {
            Some(media) => match self.upload_media(credential, media).await {
                Ok(media_id) => Some(media_id),
                Err(message) => {
                    warn!(
                        account_id = %credential.account_id,
                        platform = %credential.platform,
                        error = %message,
                        "Media upload failed"
                    );
                    return PublishResult::failed(PublishErrorCode::MediaUploadFailed, message);
                }
            },
            None => None,
        };

        self.create_post(credential, &content.text, media_id).await
    }

    async fn upload_media(
        &self,
        credential: &PlatformCredential,
        media: &MediaBlob,
    ) -> Result<String, String> {
        let init = self
            .send(PlatformRequest {
                method: HttpMethod::Post,
                url: format!("{}/v1/media/uploads", self.api_base),
                bearer_token: credential.access_token.clone(),
                body: RequestBody::Json(json!({
                    "owner": credential.author_id,
                    "platform": credential.platform,
                    "content_type": media.content_type,
                    "size_bytes": media.bytes.len(),
                })),
            })
            .await
            .map_err(|e| format!("upload init failed: {e}"))?;
        if !init.is_success() {
            return Err(format!(
                "upload init returned {}: {}",
                init.status,
                error_message(&init)
            ));
        }
        let handle: UploadHandle = serde_json::from_str(&init.body)
            .map_err(|e| format!("upload init returned no usable handle: {e}"))?;

        let put = self
            .send(PlatformRequest {
                method: HttpMethod::Put,
                url: handle.upload_url,
                bearer_token: credential.access_token.clone(),
                body: RequestBody::Binary {
                    bytes: media.bytes.clone(),
                    content_type: media.content_type.clone(),
                },
            })
            .await
            .map_err(|e| format!("media upload failed: {e}"))?;
        if !put.is_success() {
            return Err(format!(
                "media upload returned {}: {}",
                put.status,
                error_message(&put)
            ));
        }

        Ok(handle.media_id)
    }

    async fn create_post(
        &self,
        credential: &PlatformCredential,
        text: &str,
        media_id: Option<String>,
    ) -> PublishResult {
        let media_ids: Vec<String> = media_id.into_iter().collect();
        let result = self
            .send(PlatformRequest {
                method: HttpMethod::Post,
                url: format!("{}/v1/posts", self.api_base),
                bearer_token: credential.access_token.clone(),
                body: RequestBody::Json(json!({
                    "author": credential.author_id,
                    "platform": credential.platform,
                    "text": text,
                    "media_ids": media_ids,
                })),
            })
            .await;

        let response = match result {
            Ok(response) => response,
            Err(TransportError::Timeout) => {
                return PublishResult::failed(
                    PublishErrorCode::Timeout,
                    format!("post creation exceeded {}s", self.request_timeout.as_secs()),
                );
            }
            Err(TransportError::Network(message)) => {
                return PublishResult::failed(PublishErrorCode::NetworkError, message);
            }
            Err(TransportError::Other(message)) => {
                return PublishResult::failed(PublishErrorCode::Unknown, message);
            }
        };

        if !response.is_success() {
            let code = PublishErrorCode::from_status(response.status, &response.body);
            warn!(
                account_id = %credential.account_id,
                status = response.status,
                code = code.as_str(),
                "Post creation rejected"
            );
            return PublishResult::failed(code, error_message(&response));
        }

        match serde_json::from_str::<CreatedPost>(&response.body) {
            Ok(post) => {
                info!(
                    account_id = %credential.account_id,
                    platform = %credential.platform,
                    post_id = %post.id,
                    "Post published"
                );
                PublishResult::published(post.id, post.permalink)
            }
            // The post exists on the platform; must not be retried.
            Err(e) => PublishResult::failed(
                PublishErrorCode::Unknown,
                format!("post created but response unreadable: {e}"),
            ),
        }
    }

    async fn send(&self, request: PlatformRequest) -> Result<PlatformResponse, TransportError> {
        match tokio::time::timeout(self.request_timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

fn error_message(response: &PlatformResponse) -> String {
    serde_json::from_str::<PlatformErrorBody>(&response.body)
        .map(|b| b.message)
        .unwrap_or_else(|_| response.body.chars().take(200).collect())
}
