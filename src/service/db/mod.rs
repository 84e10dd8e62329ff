use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::base::types::{Res, Void};

pub mod surreal;

// Traits.

/// Generic key-value memory trait that storage backends must implement.
///
/// Values are whole JSON documents; callers read, modify, and write back the
/// complete value for a key.
#[async_trait]
pub trait GenericMemoryClient: Send + Sync + 'static {
    /// Gets the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Res<Option<Value>>;

    /// Stores `value` under `key`, replacing whatever was there.
    async fn put(&self, key: &str, value: &Value) -> Void;
}

// Structs.

/// Memory client for twim-bot.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct MemoryClient {
    /// The memory client instance.
    pub inner: Arc<dyn GenericMemoryClient>,
}

impl Deref for MemoryClient {
    type Target = dyn GenericMemoryClient;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl MemoryClient {
    pub fn new(inner: Arc<dyn GenericMemoryClient>) -> Self {
        Self { inner }
    }
}
