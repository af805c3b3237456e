//! Single-slot memory carried between runs.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::context::RunContext;
use crate::error::Result;

/// Opaque blob loaded before a run and replaced after it.
#[async_trait]
pub trait Memory: Send + Sync {
    /// Current blob, empty when nothing was stored yet.
    async fn load(&self, ctx: &RunContext) -> Result<Vec<u8>>;

    /// Replaces the blob wholesale.
    async fn save(&self, ctx: &RunContext, data: &[u8]) -> Result<()>;

    async fn clear(&self, ctx: &RunContext) -> Result<()>;
}

/// Process-local [`Memory`]. Readers share the lock, writers hold it exclusively.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<Vec<u8>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Memory for InMemoryStore {
    async fn load(&self, ctx: &RunContext) -> Result<Vec<u8>> {
        ctx.check()?;
        Ok(self.data.read().await.clone())
    }

    async fn save(&self, ctx: &RunContext, data: &[u8]) -> Result<()> {
        ctx.check()?;
        let copy = data.to_vec();
        *self.data.write().await = copy;
        Ok(())
    }

    async fn clear(&self, ctx: &RunContext) -> Result<()> {
        ctx.check()?;
        self.data.write().await.clear();
        Ok(())
    }
}
