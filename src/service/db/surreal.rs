//! SurrealDB implementation of the key-value memory.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
};
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    types::{Res, Void},
};

use super::{GenericMemoryClient, MemoryClient};

const TABLE: &str = "memory";

// Extra methods on `MemoryClient` applied by the surreal implementation.

impl MemoryClient {
    /// Connect to the database configured in `config`.
    pub async fn surreal(config: &Config) -> Res<Self> {
        let client = SurrealMemoryClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }

    /// Create an in-process, in-memory database.
    pub async fn surreal_memory() -> Res<Self> {
        let client = SurrealMemoryClient::connect("mem://", None, "twim", "bot").await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// One key of the memory, with its value encoded as JSON text.
///
/// Keeping the JSON as text preserves object key order through the database.
#[derive(Debug, Serialize, Deserialize)]
struct MemoryRecord {
    data: String,
}

/// SurrealDB memory client.
#[derive(Clone)]
pub struct SurrealMemoryClient {
    db: Surreal<Any>,
}

impl SurrealMemoryClient {
    /// Create a new memory client from the configuration.
    #[instrument(name = "SurrealMemoryClient::new", skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        let credentials = match (&config.db_username, &config.db_password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        };

        Self::connect(&config.db_endpoint, credentials, &config.db_namespace, &config.db_database).await
    }

    async fn connect(endpoint: &str, credentials: Option<(&str, &str)>, namespace: &str, database: &str) -> Res<Self> {
        let db = any::connect(endpoint).await?;

        // Authenticate only when credentials were provided; embedded databases need none.
        if let Some((username, password)) = credentials {
            db.signin(Root { username, password }).await?;
        }

        db.use_ns(namespace).use_db(database).await?;

        info!("Memory database `{}` initialized successfully.", endpoint);

        Ok(Self { db })
    }
}

#[async_trait]
impl GenericMemoryClient for SurrealMemoryClient {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Res<Option<Value>> {
        let record: Option<MemoryRecord> = self.db.select((TABLE, key)).await?;

        match record {
            Some(record) => Ok(Some(serde_json::from_str(&record.data)?)),
            None => {
                debug!("Memory key `{}` not found.", key);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, value))]
    async fn put(&self, key: &str, value: &Value) -> Void {
        let record = MemoryRecord { data: serde_json::to_string(value)? };

        let _: Option<MemoryRecord> = self.db.upsert((TABLE, key)).content(record).await?;

        Ok(())
    }
}
