pub mod matrix;

use std::{collections::HashMap, ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::base::types::{Res, Void};

// Types.

/// A raw timeline event together with the room it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomEvent {
    pub room_id: String,
    pub raw: Value,
}

/// The user power levels of a room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerLevels {
    pub users: HashMap<String, i64>,
    pub users_default: i64,
}

impl PowerLevels {
    /// The power level of `user_id` in the room.
    pub fn level_of(&self, user_id: &str) -> i64 {
        self.users.get(user_id).copied().unwrap_or(self.users_default)
    }
}

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines everything the bot needs from a chat connector.
/// Implementing this trait allows different transports to be used with the
/// twim-bot, and lets tests drive the bot without a homeserver.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot user ID.
    ///
    /// Events sent by this user are never processed.
    fn bot_user_id(&self) -> &str;

    /// Wait for, and return, the next batch of timeline events.
    async fn sync(&self) -> Res<Vec<RoomEvent>>;

    /// Send a markdown message to a room, returning the new event's ID.
    async fn send_message(&self, room_id: &str, text: &str) -> Res<String>;

    /// React to a message with an emoji.
    async fn react_to_message(&self, room_id: &str, event_id: &str, emoji: &str) -> Void;

    /// Replace the body of a message the bot sent earlier.
    async fn edit_message(&self, room_id: &str, event_id: &str, text: &str) -> Void;

    /// Get the display name of a user, falling back to the user ID.
    async fn get_display_name(&self, user_id: &str) -> Res<String>;

    /// Get the power levels of a room.
    async fn get_power_levels(&self, room_id: &str) -> Res<PowerLevels>;

    /// Fetch a single raw event, e.g. the event a reply or reaction links to.
    async fn get_event(&self, room_id: &str, event_id: &str) -> Res<Value>;

    /// Join a room by ID or alias, returning its canonical room ID.
    async fn join_room(&self, room_id_or_alias: &str) -> Res<String>;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
