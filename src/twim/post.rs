//! The recorded update and the persisted collection of them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One recorded TWIM update.
///
/// Legacy records used shorter field names; they are accepted on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Id of the message that triggered the post. Primary key, never changes.
    #[serde(alias = "event_id")]
    pub origin_event_id: String,
    /// Author's display name at the time of posting.
    #[serde(alias = "nick")]
    pub author_display_name: String,
    /// Author's user id.
    #[serde(alias = "mxid")]
    pub author_id: String,
    /// Room the post originated in.
    #[serde(alias = "room")]
    pub room_id: String,
    /// Body of the update; edits overwrite it.
    pub message: String,
    /// Content reference of an attached image.
    #[serde(default, alias = "image", skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    /// Id of the copy sent to the echo room, once that send succeeded.
    #[serde(default, alias = "echo_event_id", skip_serializing_if = "Option::is_none")]
    pub mirror_event_id: Option<String>,
}

/// Mirroring state of a recorded post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    /// Recorded, but no mirror has been confirmed (yet).
    PendingMirror,
    /// The echo room copy exists.
    Mirrored,
}

impl Post {
    pub fn mirror_state(&self) -> MirrorState {
        if self.mirror_event_id.is_some() { MirrorState::Mirrored } else { MirrorState::PendingMirror }
    }
}

/// All recorded posts keyed by origin event id, in insertion order.
///
/// Re-inserting an existing key overwrites the post in place and keeps its position.
pub type PostCollection = IndexMap<String, Post>;
