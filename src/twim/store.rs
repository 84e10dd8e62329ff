//! The reconciling post store on top of the key-value memory.

use std::sync::Arc;

use anyhow::anyhow;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::{
    base::types::{Res, Void},
    service::db::MemoryClient,
};

use super::post::{Post, PostCollection};

/// Key of the legacy envelope object.
const LEGACY_ENVELOPE: &str = "twim";

/// Post store.
///
/// Every mutation reads the whole collection, merges, and writes it back.
/// Those cycles are serialized, so concurrent upserts for different keys never
/// lose each other; for the same key the last writer wins.
///
/// This is trivially cloneable; clones share the same serialization lock.
#[derive(Clone)]
pub struct PostStore {
    memory: MemoryClient,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl PostStore {
    pub fn new(memory: MemoryClient, key: impl Into<String>) -> Self {
        Self {
            memory,
            key: key.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// The whole collection; empty if nothing has been persisted yet.
    #[instrument(skip(self))]
    pub async fn get(&self) -> Res<PostCollection> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// A single post by origin event id.
    #[instrument(skip(self))]
    pub async fn post(&self, key: &str) -> Res<Option<Post>> {
        Ok(self.get().await?.shift_remove(key))
    }

    /// Merge one post into the collection, keeping every other entry.
    #[instrument(skip(self, post))]
    pub async fn upsert(&self, key: &str, post: Post) -> Void {
        let _guard = self.lock.lock().await;

        let mut collection = self.load().await?;
        collection.insert(key.to_string(), post);

        self.save(&collection).await
    }

    /// Overwrite the message of an existing post.
    ///
    /// Returns `false`, and writes nothing, when the key is unknown.
    #[instrument(skip(self, message))]
    pub async fn replace_message(&self, key: &str, message: &str) -> Res<bool> {
        let _guard = self.lock.lock().await;

        let mut collection = self.load().await?;

        let Some(post) = collection.get_mut(key) else {
            debug!("No post stored for `{}`.", key);
            return Ok(false);
        };

        post.message = message.to_string();
        self.save(&collection).await?;

        Ok(true)
    }

    /// Replace the collection with an empty one.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Void {
        let _guard = self.lock.lock().await;
        self.save(&PostCollection::new()).await
    }

    /// Migrate a legacy list-shaped collection to the keyed shape, in place.
    ///
    /// Returns whether anything was migrated. Absent or already keyed data is left alone.
    #[instrument(skip(self))]
    pub async fn reconcile_legacy_shape(&self) -> Res<bool> {
        let _guard = self.lock.lock().await;

        let Some(value) = self.memory.get(&self.key).await? else {
            debug!("Nothing stored under `{}`; no reconciliation needed.", self.key);
            return Ok(false);
        };

        let Some(items) = legacy_items(&value) else {
            debug!("Collection `{}` is already keyed.", self.key);
            return Ok(false);
        };

        let migrated = migrate(items)?;
        info!("Migrated {} legacy posts under `{}`.", migrated.len(), self.key);

        self.memory.put(&self.key, &Value::Object(migrated)).await?;

        Ok(true)
    }

    async fn load(&self) -> Res<PostCollection> {
        match self.memory.get(&self.key).await? {
            None => Ok(PostCollection::new()),
            Some(value) => match legacy_items(&value) {
                Some(items) => Ok(serde_json::from_value(Value::Object(migrate(items)?))?),
                None => Ok(serde_json::from_value(value)?),
            },
        }
    }

    async fn save(&self, collection: &PostCollection) -> Void {
        self.memory.put(&self.key, &serde_json::to_value(collection)?).await
    }
}

/// The posts of a legacy list-shaped value: a bare list, or a list inside the `{"twim": [...]}` envelope.
fn legacy_items(value: &Value) -> Option<&[Value]> {
    match value {
        Value::Array(items) => Some(items.as_slice()),
        Value::Object(map) if map.len() == 1 => match map.get(LEGACY_ENVELOPE) {
            Some(Value::Array(items)) => Some(items.as_slice()),
            _ => None,
        },
        _ => None,
    }
}

/// Key every legacy post by its embedded event id, keeping all of its fields as they are.
fn migrate(items: &[Value]) -> Res<Map<String, Value>> {
    let mut migrated = Map::new();

    for item in items {
        let key = item
            .get("event_id")
            .or_else(|| item.get("origin_event_id"))
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Legacy post without an event id: {}", item))?;

        migrated.insert(key.to_string(), item.clone());
    }

    Ok(migrated)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn post(id: &str, message: &str) -> Post {
        Post {
            origin_event_id: id.to_string(),
            author_display_name: "Alice".to_string(),
            author_id: "@alice:example.org".to_string(),
            room_id: "!room:example.org".to_string(),
            message: message.to_string(),
            image_ref: None,
            mirror_event_id: None,
        }
    }

    async fn store() -> PostStore {
        PostStore::new(MemoryClient::surreal_memory().await.unwrap(), "twim")
    }

    fn legacy() -> Value {
        json!({
            "twim": [
                { "nick": "Alice", "mxid": "@alice:example.org", "message": "TWIM: one", "event_id": "$1", "room": "!room:example.org" },
                { "nick": "Bob", "mxid": "@bob:example.org", "message": "TWIM: two", "event_id": "$2", "room": "!room:example.org", "image": "mxc://x/y" },
            ]
        })
    }

    #[tokio::test]
    async fn empty_store_reads_as_an_empty_collection() {
        assert!(store().await.get().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upserts_with_distinct_keys_keep_every_entry() {
        let store = store().await;

        for i in 0..5 {
            let key = format!("${i}");
            store.upsert(&key, post(&key, &format!("message {i}"))).await.unwrap();
        }
        store.upsert("$2", post("$2", "latest")).await.unwrap();

        let collection = store.get().await.unwrap();
        let keys: Vec<_> = collection.keys().cloned().collect();

        assert_eq!(keys, vec!["$0", "$1", "$2", "$3", "$4"]);
        assert_eq!(collection["$2"].message, "latest");
    }

    #[tokio::test]
    async fn concurrent_upserts_do_not_lose_entries() {
        let store = store().await;

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let key = format!("${i}");
                    store.upsert(&key, post(&key, "concurrent")).await.unwrap();
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.get().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn replace_message_updates_only_known_keys() {
        let store = store().await;
        store.upsert("$1", post("$1", "before")).await.unwrap();

        assert!(store.replace_message("$1", "after").await.unwrap());
        assert!(!store.replace_message("$unknown", "ignored").await.unwrap());

        let collection = store.get().await.unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection["$1"].message, "after");
    }

    #[tokio::test]
    async fn post_looks_up_a_single_entry() {
        let store = store().await;
        store.upsert("$1", post("$1", "hello")).await.unwrap();

        assert_eq!(store.post("$1").await.unwrap().map(|p| p.message), Some("hello".to_string()));
        assert_eq!(store.post("$2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_empties_the_collection() {
        let store = store().await;
        store.upsert("$1", post("$1", "hello")).await.unwrap();

        store.clear().await.unwrap();

        assert!(store.get().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reconcile_is_a_no_op_without_data() {
        let store = store().await;

        assert!(!store.reconcile_legacy_shape().await.unwrap());
        assert_eq!(store.memory.get("twim").await.unwrap(), None);
    }

    #[tokio::test]
    async fn reconcile_migrates_the_legacy_envelope_and_is_idempotent() {
        let store = store().await;
        store.memory.put("twim", &legacy()).await.unwrap();

        assert!(store.reconcile_legacy_shape().await.unwrap());
        let once = store.memory.get("twim").await.unwrap().unwrap();

        assert!(!store.reconcile_legacy_shape().await.unwrap());
        let twice = store.memory.get("twim").await.unwrap().unwrap();

        assert_eq!(once, twice);
        assert_eq!(once["$1"]["nick"], "Alice");
        assert_eq!(once["$2"]["image"], "mxc://x/y");

        let collection = store.get().await.unwrap();
        let keys: Vec<_> = collection.keys().cloned().collect();
        assert_eq!(keys, vec!["$1", "$2"]);
        assert_eq!(collection["$2"].author_display_name, "Bob");
        assert_eq!(collection["$2"].image_ref.as_deref(), Some("mxc://x/y"));
    }

    #[tokio::test]
    async fn reconcile_migrates_a_bare_list() {
        let store = store().await;
        store.memory.put("twim", &legacy()["twim"]).await.unwrap();

        assert!(store.reconcile_legacy_shape().await.unwrap());

        let collection = store.get().await.unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection["$1"].message, "TWIM: one");
    }

    #[tokio::test]
    async fn reconcile_leaves_keyed_data_alone() {
        let store = store().await;
        store.upsert("$1", post("$1", "hello")).await.unwrap();
        let before = store.memory.get("twim").await.unwrap();

        assert!(!store.reconcile_legacy_shape().await.unwrap());

        assert_eq!(store.memory.get("twim").await.unwrap(), before);
    }

    #[tokio::test]
    async fn legacy_data_is_readable_before_reconciliation() {
        let store = store().await;
        store.memory.put("twim", &legacy()).await.unwrap();

        assert_eq!(store.get().await.unwrap().len(), 2);
    }

    #[test]
    fn legacy_post_without_an_id_is_an_error() {
        assert!(migrate(&[json!({ "message": "orphan" })]).is_err());
    }
}
