//! Persistence collaborator.
//!
//! The bridge reads and writes a small set of per-guild fields; the real
//! repository lives outside this crate. Writes are fire-and-forget with
//! in-memory state authoritative until restart.

use std::collections::HashMap;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::common::types::GuildFields;

/// Repository of per-guild persisted fields.
pub trait GuildStore: Send + Sync {
    fn get<'a>(&'a self, guild_id: &'a str)
        -> BoxFuture<'a, anyhow::Result<Option<GuildFields>>>;

    fn save<'a>(
        &'a self,
        guild_id: &'a str,
        fields: GuildFields,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// In-memory store used by the binary and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<String, GuildFields>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GuildStore for MemoryStore {
    fn get<'a>(
        &'a self,
        guild_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<GuildFields>>> {
        Box::pin(async move { Ok(self.inner.read().await.get(guild_id).cloned()) })
    }

    fn save<'a>(
        &'a self,
        guild_id: &'a str,
        fields: GuildFields,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.inner.write().await.insert(guild_id.to_string(), fields);
            Ok(())
        })
    }
}
