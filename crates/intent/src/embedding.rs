//! Embedding lookup seam and its health cache.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingHealth {
    pub ok: bool,
    pub message: String,
}

/// Text → vector.  An empty vector means "no embedding available".
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn health(&self) -> EmbeddingHealth;
}

#[async_trait]
impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn health(&self) -> EmbeddingHealth {
        (**self).health().await
    }
}

/// Always-offline embedder.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEmbedder;

#[async_trait]
impl Embedder for NoEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(Vec::new())
    }

    async fn health(&self) -> EmbeddingHealth {
        EmbeddingHealth {
            ok: false,
            message: "no embedding backend configured".to_string(),
        }
    }
}

/// Caches the last health probe for `ttl`; the probe is only re-run by a read
/// that finds the cached value stale.
pub struct CachedHealth<E> {
    embedder: E,
    ttl: Duration,
    last: Mutex<Option<(Instant, EmbeddingHealth)>>,
}

impl<E: Embedder> CachedHealth<E> {
    pub fn new(embedder: E, ttl: Duration) -> Self {
        Self {
            embedder,
            ttl,
            last: Mutex::new(None),
        }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn health(&self) -> EmbeddingHealth {
        self.health_at(Instant::now()).await
    }

    pub async fn health_at(&self, now: Instant) -> EmbeddingHealth {
        if let Some(cached) = self.fresh(now) {
            return cached;
        }
        let health = self.embedder.health().await;
        debug!(ok = health.ok, message = %health.message, "embedding health refreshed");
        if let Ok(mut slot) = self.last.lock() {
            *slot = Some((now, health.clone()));
        }
        health
    }

    fn fresh(&self, now: Instant) -> Option<EmbeddingHealth> {
        let slot = self.last.lock().ok()?;
        let (at, health) = slot.as_ref()?;
        (now.saturating_duration_since(*at) <= self.ttl).then(|| health.clone())
    }
}
