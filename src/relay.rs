//! Relay channel collaborator.
//!
//! The bridge never owns the relay transport; it posts through this trait
//! and receives inbound messages through its channel bundle. The webhook
//! implementation here is the default transport the binary wires in.

use futures::future::BoxFuture;
use serde_json::json;

/// One message posted to the linked relay channel.
#[derive(Debug, Clone)]
pub struct RelayPost {
    pub author: String,
    pub avatar_url: Option<String>,
    pub text: String,
}

/// Outbound side of the relay collaborator.
pub trait Relay: Send + Sync {
    fn post(&self, post: RelayPost) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Webhook-backed relay transport.
pub struct WebhookRelay {
    client: reqwest::Client,
    url: String,
}

impl WebhookRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl Relay for WebhookRelay {
    fn post(&self, post: RelayPost) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let body = json!({
                "username": post.author,
                "avatar_url": post.avatar_url,
                "content": post.text,
            });
            self.client
                .post(&self.url)
                .json(&body)
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
    }
}
