//! Chat service integration for the Matrix client-server API.
//!
//! This module provides functionality for talking to a Matrix homeserver:
//! - Receiving timeline events through the `/sync` long-poll
//! - Sending messages, reactions, and edits
//! - Looking up profiles, power levels, single events, and rooms

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use pulldown_cmark::{Options, Parser, html};
use reqwest::{StatusCode, Url};
use ruma::{
    EventId, OwnedEventId, OwnedRoomId, OwnedUserId, RoomId, RoomOrAliasId, TransactionId, UserId,
    events::{
        AnySyncTimelineEvent, StaticEventContent,
        reaction::ReactionEventContent,
        relation::{Annotation, Replacement},
        room::{
            message::{MessageType, Relation, RoomMessageEventContent, RoomMessageEventContentWithoutRelation},
            power_levels::RoomPowerLevelsEventContent,
        },
    },
    serde::Raw,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    types::{Res, Void},
};

use super::{ChatClient, GenericChatClient, PowerLevels, RoomEvent};

/// Timeout for ordinary (non-sync) requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Extra methods on `ChatClient` applied by the matrix implementation.

impl ChatClient {
    /// Creates a new Matrix chat client.
    pub async fn matrix(config: &Config) -> Res<Self> {
        let client = MatrixChatClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Wire types.

#[derive(Debug, Deserialize)]
struct WhoAmIResponse {
    user_id: OwnedUserId,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    event_id: OwnedEventId,
}

#[derive(Debug, Deserialize)]
struct JoinResponse {
    room_id: OwnedRoomId,
}

#[derive(Debug, Deserialize)]
struct DisplayNameResponse {
    displayname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    next_batch: String,
    #[serde(default)]
    rooms: SyncRooms,
}

#[derive(Debug, Default, Deserialize)]
struct SyncRooms {
    #[serde(default)]
    join: HashMap<OwnedRoomId, JoinedRoom>,
}

#[derive(Debug, Default, Deserialize)]
struct JoinedRoom {
    #[serde(default)]
    timeline: Timeline,
}

#[derive(Debug, Default, Deserialize)]
struct Timeline {
    #[serde(default)]
    events: Vec<Raw<AnySyncTimelineEvent>>,
}

// Structs.

/// Matrix client implementation.
pub struct MatrixChatClient {
    homeserver: Url,
    access_token: String,
    bot_user_id: OwnedUserId,
    client: reqwest::Client,
    sync_timeout_ms: u64,
    next_batch: Mutex<Option<String>>,
}

impl MatrixChatClient {
    /// Create a new Matrix chat client.
    ///
    /// Resolves the bot's own user ID and skips the room history, so that
    /// only events arriving after startup are processed.
    #[instrument(name = "MatrixChatClient::new", skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        let homeserver = Url::parse(&config.matrix_homeserver)?;
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let access_token = config.matrix_access_token.clone();

        // Get the bot's user ID.

        let whoami: WhoAmIResponse = {
            let mut url = homeserver.clone();
            extend_client_path(&mut url, &["account", "whoami"])?;
            client.get(url).bearer_auth(&access_token).send().await?.error_for_status()?.json().await?
        };

        let mut result = Self {
            homeserver,
            access_token,
            bot_user_id: whoami.user_id,
            client,
            sync_timeout_ms: config.sync_timeout_ms,
            next_batch: Mutex::new(None),
        };

        info!("Matrix bot user ID: {}", result.bot_user_id);

        // Skip everything that happened before startup.

        let initial = result.sync_once(None, 0).await?;
        *result.next_batch.get_mut() = Some(initial.next_batch);

        Ok(result)
    }

    /// Build a client-server API URL from path segments; segments are percent-encoded.
    fn url(&self, segments: &[&str]) -> Res<Url> {
        let mut url = self.homeserver.clone();
        extend_client_path(&mut url, segments)?;

        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Res<T> {
        let response = self.client.get(url).bearer_auth(&self.access_token).send().await?.error_for_status()?;

        Ok(response.json().await?)
    }

    async fn put_json<T: DeserializeOwned>(&self, url: Url, body: &Value) -> Res<T> {
        let response = self.client.put(url).bearer_auth(&self.access_token).json(body).send().await?.error_for_status()?;

        Ok(response.json().await?)
    }

    async fn post_json<T: DeserializeOwned>(&self, url: Url, body: &Value) -> Res<T> {
        let response = self.client.post(url).bearer_auth(&self.access_token).json(body).send().await?.error_for_status()?;

        Ok(response.json().await?)
    }

    async fn sync_once(&self, since: Option<&str>, timeout_ms: u64) -> Res<SyncResponse> {
        let mut url = self.url(&["sync"])?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeout", &timeout_ms.to_string());
            if let Some(since) = since {
                query.append_pair("since", since);
            }
        }

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT + Duration::from_millis(timeout_ms))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn send_event<C>(&self, room_id: &RoomId, content: &C) -> Res<OwnedEventId>
    where
        C: StaticEventContent + Serialize,
    {
        let txn_id = TransactionId::new();
        let url = self.url(&["rooms", room_id.as_str(), "send", C::TYPE, txn_id.as_str()])?;

        let response: SendResponse = self.put_json(url, &serde_json::to_value(content)?).await?;

        Ok(response.event_id)
    }
}

#[async_trait]
impl GenericChatClient for MatrixChatClient {
    fn bot_user_id(&self) -> &str {
        self.bot_user_id.as_str()
    }

    #[instrument(skip(self))]
    async fn sync(&self) -> Res<Vec<RoomEvent>> {
        let since = self.next_batch.lock().await.clone();

        let response = self.sync_once(since.as_deref(), self.sync_timeout_ms).await?;
        *self.next_batch.lock().await = Some(response.next_batch);

        let mut events = Vec::new();

        for (room_id, room) in response.rooms.join {
            for raw in room.timeline.events {
                events.push(RoomEvent {
                    room_id: room_id.to_string(),
                    raw: raw.deserialize_as::<Value>()?,
                });
            }
        }

        debug!("Received {} timeline events.", events.len());

        Ok(events)
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, room_id: &str, text: &str) -> Res<String> {
        let room_id = RoomId::parse(room_id)?;

        let event_id = self
            .send_event(&room_id, &message_content(text))
            .await
            .map_err(|e| anyhow!("Failed to send message: {}", e))?;

        Ok(event_id.to_string())
    }

    #[instrument(skip(self))]
    async fn react_to_message(&self, room_id: &str, event_id: &str, emoji: &str) -> Void {
        let room_id = RoomId::parse(room_id)?;
        let event_id = EventId::parse(event_id)?;

        self.send_event(&room_id, &reaction_content(event_id, emoji))
            .await
            .map_err(|e| anyhow!("Failed to react to message: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn edit_message(&self, room_id: &str, event_id: &str, text: &str) -> Void {
        let room_id = RoomId::parse(room_id)?;
        let event_id = EventId::parse(event_id)?;

        self.send_event(&room_id, &edit_content(event_id, text))
            .await
            .map_err(|e| anyhow!("Failed to edit message: {}", e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_display_name(&self, user_id: &str) -> Res<String> {
        let user_id = UserId::parse(user_id)?;
        let url = self.url(&["profile", user_id.as_str(), "displayname"])?;

        let response = self.client.get(url).bearer_auth(&self.access_token).send().await?;

        // Users without a profile are addressed by their ID.
        if response.status() == StatusCode::NOT_FOUND {
            debug!("No profile for `{}`.", user_id);
            return Ok(user_id.to_string());
        }

        let profile: DisplayNameResponse = response.error_for_status()?.json().await?;

        Ok(profile.displayname.filter(|name| !name.is_empty()).unwrap_or_else(|| user_id.to_string()))
    }

    #[instrument(skip(self))]
    async fn get_power_levels(&self, room_id: &str) -> Res<PowerLevels> {
        let room_id = RoomId::parse(room_id)?;
        let content: RoomPowerLevelsEventContent = self.get_json(self.url(&["rooms", room_id.as_str(), "state", "m.room.power_levels"])?).await?;

        Ok(PowerLevels::from(content))
    }

    #[instrument(skip(self))]
    async fn get_event(&self, room_id: &str, event_id: &str) -> Res<Value> {
        let room_id = RoomId::parse(room_id)?;
        let event_id = EventId::parse(event_id)?;

        let mut event: Value = self.get_json(self.url(&["rooms", room_id.as_str(), "event", event_id.as_str()])?).await?;

        if let Some(object) = event.as_object_mut() {
            object.entry("room_id").or_insert_with(|| Value::String(room_id.to_string()));
        }

        Ok(event)
    }

    #[instrument(skip(self))]
    async fn join_room(&self, room_id_or_alias: &str) -> Res<String> {
        let room = RoomOrAliasId::parse(room_id_or_alias)?;
        let response: JoinResponse = self.post_json(self.url(&["join", room.as_str()])?, &json!({})).await?;

        info!("Joined `{}` as `{}`.", room_id_or_alias, response.room_id);

        Ok(response.room_id.to_string())
    }
}

// Event content builders.

/// Render markdown into the HTML flavour Matrix clients display.
fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut output = String::new();
    html::push_html(&mut output, Parser::new_ext(text, options));

    output.trim_end().to_string()
}

/// Content of a markdown message: the markdown as plain body, and its HTML rendering.
fn message_content(text: &str) -> RoomMessageEventContent {
    RoomMessageEventContent::text_html(text, markdown_to_html(text))
}

/// Content of an annotation reaction.
fn reaction_content(event_id: OwnedEventId, emoji: &str) -> ReactionEventContent {
    ReactionEventContent::new(Annotation::new(event_id, emoji.to_string()))
}

/// Content of an edit that replaces `event_id` with `text`.
fn edit_content(event_id: OwnedEventId, text: &str) -> RoomMessageEventContent {
    let html = markdown_to_html(text);
    let new_content = RoomMessageEventContentWithoutRelation::new(MessageType::text_html(text, html.clone()));

    let mut content = RoomMessageEventContent::text_html(format!("* {}", text), format!("* {}", html));
    content.relates_to = Some(Relation::Replacement(Replacement::new(event_id, new_content)));

    content
}

/// Append `/_matrix/client/v3/{segments}` to the homeserver URL; segments are percent-encoded.
fn extend_client_path(url: &mut Url, segments: &[&str]) -> Void {
    url.path_segments_mut()
        .map_err(|_| anyhow!("Homeserver URL cannot be a base."))?
        .pop_if_empty()
        .extend(["_matrix", "client", "v3"])
        .extend(segments);

    Ok(())
}

impl From<RoomPowerLevelsEventContent> for PowerLevels {
    fn from(content: RoomPowerLevelsEventContent) -> Self {
        Self {
            users: content.users.into_iter().map(|(user_id, level)| (user_id.to_string(), i64::from(level))).collect(),
            users_default: i64::from(content.users_default),
        }
    }
}

// Tests.
