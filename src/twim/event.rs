//! Normalization of raw Matrix timeline events.
//!
//! Every event the bot cares about is turned into one [`ChatEvent`] variant;
//! anything else is dropped here.

use std::sync::LazyLock;

use regex::Regex;
use ruma::events::{
    AnySyncMessageLikeEvent, AnySyncTimelineEvent, SyncMessageLikeEvent,
    room::{
        MediaSource,
        message::{MessageFormat, MessageType, Relation},
    },
};
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use super::post::Post;

/// Matches a message that starts with the trigger token, bare or as the start of the first paragraph.
static TWIM_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:<p>)?TWIM(?:[:\s]|</p>|$)").expect("valid regex"));

/// Matches the leading trigger token and the separator after it, keeping any paragraph tags around it.
static TWIM_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?P<open><p>)?TWIM(?::\s*|\s+|$|(?P<close></p>))").expect("valid regex"));

// Normalized events.

/// A message that can become the subject of a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub event_id: String,
    pub room_id: String,
    pub sender: String,
    /// Plain-text body.
    pub body: String,
    /// Rich (HTML) body, when the sender provided one.
    pub formatted_body: Option<String>,
    /// Content reference of an attached image.
    pub image_ref: Option<String>,
}

impl Message {
    /// The preferred representation of the body: rich when available, plain otherwise.
    pub fn text(&self) -> &str {
        self.formatted_body.as_deref().unwrap_or(&self.body)
    }

    /// Whether the message is tagged as a TWIM update.
    pub fn is_twim(&self) -> bool {
        is_twim(&self.body) || self.formatted_body.as_deref().is_some_and(is_twim)
    }

    /// The text to record: the representation carrying the trigger, with the trigger removed.
    pub fn captured_text(&self) -> String {
        capture(&self.body, self.formatted_body.as_deref(), &self.sender)
    }

    /// Build the post this message represents.
    pub fn to_post(&self, author_display_name: &str) -> Post {
        Post {
            origin_event_id: self.event_id.clone(),
            author_display_name: author_display_name.to_string(),
            author_id: self.sender.clone(),
            room_id: self.room_id.clone(),
            message: self.captured_text(),
            image_ref: self.image_ref.clone(),
            mirror_event_id: None,
        }
    }
}

/// A replacement of an earlier message's body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub event_id: String,
    pub room_id: String,
    pub sender: String,
    /// The event being edited.
    pub target: String,
    pub body: String,
    pub formatted_body: Option<String>,
}

impl Edit {
    /// The preferred representation of the new body.
    pub fn text(&self) -> &str {
        self.formatted_body.as_deref().unwrap_or(&self.body)
    }

    /// The new text to record, captured the same way as a fresh message.
    pub fn captured_text(&self) -> String {
        capture(&self.body, self.formatted_body.as_deref(), &self.sender)
    }
}

/// An emoji annotation on an earlier event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub event_id: String,
    pub room_id: String,
    pub sender: String,
    /// The event being reacted to.
    pub target: String,
    pub key: String,
}

impl Reaction {
    /// Whether this reaction is `glyph`, ignoring canonical-equivalence and presentation variants.
    pub fn is_glyph(&self, glyph: &str) -> bool {
        normalize_glyph(&self.key) == normalize_glyph(glyph)
    }
}

/// The closed set of inbound events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A plain text (or notice / emote) message.
    Message(Message),
    /// An image message.
    Image(Message),
    /// A reply; the subject of a reply is the event it links to.
    Reply { message: Message, in_reply_to: String },
    Edit(Edit),
    Reaction(Reaction),
}

impl ChatEvent {
    pub fn event_id(&self) -> &str {
        match self {
            ChatEvent::Message(m) | ChatEvent::Image(m) | ChatEvent::Reply { message: m, .. } => &m.event_id,
            ChatEvent::Edit(e) => &e.event_id,
            ChatEvent::Reaction(r) => &r.event_id,
        }
    }

    pub fn sender(&self) -> &str {
        match self {
            ChatEvent::Message(m) | ChatEvent::Image(m) | ChatEvent::Reply { message: m, .. } => &m.sender,
            ChatEvent::Edit(e) => &e.sender,
            ChatEvent::Reaction(r) => &r.sender,
        }
    }

    /// The message carried by this event itself.
    ///
    /// Edits and reactions carry none. For a reply this is the reply's own
    /// message; resolving the linked event is up to the caller.
    pub fn into_subject(self) -> Option<Message> {
        match self {
            ChatEvent::Message(m) | ChatEvent::Image(m) | ChatEvent::Reply { message: m, .. } => Some(m),
            ChatEvent::Edit(_) | ChatEvent::Reaction(_) => None,
        }
    }
}

/// Normalize a raw timeline event received in `room_id`.
///
/// Returns `None` for events of no interest (state events, redactions, malformed content).
pub fn parse(room_id: &str, raw: &Value) -> Option<ChatEvent> {
    let event: AnySyncTimelineEvent = serde_json::from_value(raw.clone()).ok()?;

    let AnySyncTimelineEvent::MessageLike(event) = event else {
        return None;
    };

    match event {
        AnySyncMessageLikeEvent::Reaction(SyncMessageLikeEvent::Original(reaction)) => {
            let annotation = reaction.content.relates_to;

            Some(ChatEvent::Reaction(Reaction {
                event_id: reaction.event_id.to_string(),
                room_id: room_id.to_string(),
                sender: reaction.sender.to_string(),
                target: annotation.event_id.to_string(),
                key: annotation.key,
            }))
        }
        AnySyncMessageLikeEvent::RoomMessage(SyncMessageLikeEvent::Original(message)) => {
            let event_id = message.event_id.to_string();
            let sender = message.sender.to_string();
            let content = message.content;

            let in_reply_to = match content.relates_to {
                Some(Relation::Replacement(replacement)) => {
                    let (body, formatted_body) = bodies(&replacement.new_content.msgtype);

                    return Some(ChatEvent::Edit(Edit {
                        event_id,
                        room_id: room_id.to_string(),
                        sender,
                        target: replacement.event_id.to_string(),
                        body,
                        formatted_body,
                    }));
                }
                Some(Relation::Reply { in_reply_to }) => Some(in_reply_to.event_id.to_string()),
                _ => None,
            };

            let (body, formatted_body) = bodies(&content.msgtype);
            let image_ref = match &content.msgtype {
                MessageType::Image(image) => Some(match &image.source {
                    MediaSource::Plain(uri) => uri.to_string(),
                    MediaSource::Encrypted(file) => file.url.to_string(),
                }),
                _ => None,
            };

            let message = Message {
                event_id,
                room_id: room_id.to_string(),
                sender,
                body,
                formatted_body,
                image_ref: image_ref.clone(),
            };

            Some(match in_reply_to {
                Some(in_reply_to) => ChatEvent::Reply { message, in_reply_to },
                None if image_ref.is_some() => ChatEvent::Image(message),
                None => ChatEvent::Message(message),
            })
        }
        _ => None,
    }
}

/// The plain body and, if present, the HTML body of a message.
fn bodies(msgtype: &MessageType) -> (String, Option<String>) {
    let formatted = match msgtype {
        MessageType::Text(content) => content.formatted.as_ref(),
        MessageType::Notice(content) => content.formatted.as_ref(),
        MessageType::Emote(content) => content.formatted.as_ref(),
        _ => None,
    };

    let formatted_body = formatted.filter(|formatted| matches!(formatted.format, MessageFormat::Html)).map(|formatted| formatted.body.clone());

    (msgtype.body().to_string(), formatted_body)
}

/// The text to record for a message with `body` and `formatted_body`.
///
/// The rich body is kept unless only the plain body carries the trigger.
fn capture(body: &str, formatted_body: Option<&str>, author_id: &str) -> String {
    match formatted_body {
        Some(rich) if is_twim(rich) || !is_twim(body) => strip_trigger(rich, author_id),
        _ => strip_trigger(body, author_id),
    }
}

/// Whether `text` starts with the trigger token.
pub fn is_twim(text: &str) -> bool {
    TWIM_PREFIX.is_match(text)
}

/// Remove the leading trigger token, and one trigger token linked to the author's profile.
pub fn strip_trigger(text: &str, author_id: &str) -> String {
    let text = TWIM_TOKEN.replacen(text, 1, "${open}${close}");

    let linked = format!(r#"<a href="https://matrix.to/#/{}">TWIM</a>:?\s*"#, regex::escape(author_id));

    match Regex::new(&linked) {
        Ok(linked) => linked.replacen(&text, 1, "").into_owned(),
        Err(_) => text.into_owned(),
    }
}

/// Canonically decompose `glyph` and drop emoji presentation selectors.
pub fn normalize_glyph(glyph: &str) -> String {
    glyph.nfd().filter(|c| !matches!(c, '\u{FE0E}' | '\u{FE0F}')).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const ROOM: &str = "!room:example.org";

    fn text(event_id: &str, body: &str) -> Value {
        json!({
            "type": "m.room.message",
            "event_id": event_id,
            "sender": "@alice:example.org",
            "origin_server_ts": 0,
            "content": { "msgtype": "m.text", "body": body },
        })
    }

    #[test]
    fn parses_a_plain_message() {
        let event = parse(ROOM, &text("$1", "TWIM: hello")).unwrap();

        match event {
            ChatEvent::Message(m) => {
                assert_eq!(m.event_id, "$1");
                assert_eq!(m.room_id, ROOM);
                assert_eq!(m.text(), "TWIM: hello");
                assert!(m.is_twim());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn prefers_the_formatted_body() {
        let raw = json!({
            "type": "m.room.message",
            "event_id": "$1",
            "sender": "@alice:example.org",
            "origin_server_ts": 0,
            "content": {
                "msgtype": "m.text",
                "body": "TWIM: **bold**",
                "format": "org.matrix.custom.html",
                "formatted_body": "TWIM: <strong>bold</strong>",
            },
        });

        let message = parse(ROOM, &raw).unwrap().into_subject().unwrap();

        assert_eq!(message.text(), "TWIM: <strong>bold</strong>");
        assert_eq!(message.body, "TWIM: **bold**");
    }

    #[test]
    fn parses_an_image_with_its_content_reference() {
        let raw = json!({
            "type": "m.room.message",
            "event_id": "$img",
            "sender": "@alice:example.org",
            "origin_server_ts": 0,
            "content": { "msgtype": "m.image", "body": "screenshot.png", "url": "mxc://example.org/abc" },
        });

        match parse(ROOM, &raw).unwrap() {
            ChatEvent::Image(m) => assert_eq!(m.image_ref.as_deref(), Some("mxc://example.org/abc")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_a_reply_with_its_linked_event() {
        let raw = json!({
            "type": "m.room.message",
            "event_id": "$reply",
            "sender": "@bob:example.org",
            "origin_server_ts": 0,
            "content": {
                "msgtype": "m.text",
                "body": "> <@alice:example.org> TWIM: hello\n\nnice",
                "m.relates_to": { "m.in_reply_to": { "event_id": "$parent" } },
            },
        });

        match parse(ROOM, &raw).unwrap() {
            ChatEvent::Reply { message, in_reply_to } => {
                assert_eq!(in_reply_to, "$parent");
                assert_eq!(message.event_id, "$reply");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn detects_edits_structurally() {
        let raw = json!({
            "type": "m.room.message",
            "event_id": "$edit",
            "sender": "@alice:example.org",
            "origin_server_ts": 0,
            "content": {
                "msgtype": "m.text",
                "body": "* TWIM: fixed typo",
                "m.new_content": { "msgtype": "m.text", "body": "TWIM: fixed typo" },
                "m.relates_to": { "rel_type": "m.replace", "event_id": "$1" },
            },
        });

        match parse(ROOM, &raw).unwrap() {
            ChatEvent::Edit(edit) => {
                assert_eq!(edit.target, "$1");
                assert_eq!(edit.text(), "TWIM: fixed typo");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_a_reaction() {
        let raw = json!({
            "type": "m.reaction",
            "event_id": "$r",
            "sender": "@alice:example.org",
            "origin_server_ts": 0,
            "content": { "m.relates_to": { "rel_type": "m.annotation", "event_id": "$1", "key": "⭕" } },
        });

        match parse(ROOM, &raw).unwrap() {
            ChatEvent::Reaction(r) => {
                assert_eq!(r.target, "$1");
                assert!(r.is_glyph("⭕"));
                assert!(!r.is_glyph("👍"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ignores_other_event_types() {
        let raw = json!({
            "type": "m.room.member",
            "event_id": "$m",
            "sender": "@alice:example.org",
            "origin_server_ts": 0,
            "content": { "membership": "join" },
        });

        assert_eq!(parse(ROOM, &raw), None);
        assert_eq!(parse(ROOM, &json!({ "nonsense": true })), None);
    }

    #[test]
    fn trigger_predicate_is_anchored_and_case_sensitive() {
        assert!(is_twim("TWIM"));
        assert!(is_twim("TWIM: hello"));
        assert!(is_twim("TWIM hello"));
        assert!(is_twim("TWIM:hello"));
        assert!(!is_twim("twim: hello"));
        assert!(!is_twim("hello TWIM"));
        assert!(!is_twim("TWIMBLE"));
    }

    #[test]
    fn strips_the_trigger_once() {
        assert_eq!(strip_trigger("TWIM", "@a:b"), "");
        assert_eq!(strip_trigger("TWIM: fixed a bug", "@a:b"), "fixed a bug");
        assert_eq!(strip_trigger("TWIM TWIM: twice", "@a:b"), "TWIM: twice");
        assert_eq!(strip_trigger("no marker", "@a:b"), "no marker");
    }

    #[test]
    fn strips_a_trigger_linked_to_the_author() {
        let text = r#"<a href="https://matrix.to/#/@alice:example.org">TWIM</a>: released v2"#;

        assert_eq!(strip_trigger(text, "@alice:example.org"), "released v2");
        assert_eq!(strip_trigger(text, "@bob:example.org"), text);
    }

    #[test]
    fn glyph_comparison_tolerates_presentation_variants() {
        assert_eq!(normalize_glyph("\u{2B55}\u{FE0F}"), normalize_glyph("\u{2B55}"));
        assert_eq!(normalize_glyph("e\u{301}"), normalize_glyph("\u{E9}"));
    }

    #[test]
    fn to_post_records_the_stripped_text() {
        let message = parse(ROOM, &text("$1", "TWIM: shipped feature X")).unwrap().into_subject().unwrap();
        let post = message.to_post("Alice");

        assert_eq!(post.origin_event_id, "$1");
        assert_eq!(post.message, "shipped feature X");
        assert_eq!(post.author_display_name, "Alice");
        assert_eq!(post.author_id, "@alice:example.org");
        assert_eq!(post.room_id, ROOM);
        assert_eq!(post.mirror_event_id, None);
    }

    fn multi_paragraph(event_id: &str) -> Value {
        json!({
            "type": "m.room.message",
            "event_id": event_id,
            "sender": "@alice:example.org",
            "origin_server_ts": 0,
            "content": {
                "msgtype": "m.text",
                "body": "TWIM: shipped\n\nmore",
                "format": "org.matrix.custom.html",
                "formatted_body": "<p>TWIM: shipped</p>\n<p>more</p>",
            },
        })
    }

    #[test]
    fn trigger_inside_the_first_paragraph_is_detected_and_stripped() {
        assert!(is_twim("<p>TWIM: shipped</p>"));
        assert!(is_twim("<p>TWIM</p>"));
        assert!(!is_twim("<p>TWIMBLE</p>"));

        assert_eq!(strip_trigger("<p>TWIM: shipped</p>\n<p>more</p>", "@a:b"), "<p>shipped</p>\n<p>more</p>");
        assert_eq!(strip_trigger("<p>TWIM</p>", "@a:b"), "<p></p>");
    }

    #[test]
    fn multi_paragraph_html_post_is_recorded_without_the_trigger() {
        let message = parse(ROOM, &multi_paragraph("$1")).unwrap().into_subject().unwrap();

        assert!(message.is_twim());

        let post = message.to_post("Alice");
        assert_eq!(post.message, "<p>shipped</p>\n<p>more</p>");
        assert!(!post.message.contains("TWIM"));
    }

    #[test]
    fn falls_back_to_the_plain_body_when_only_it_carries_the_trigger() {
        let message = Message {
            event_id: "$1".to_string(),
            room_id: ROOM.to_string(),
            sender: "@alice:example.org".to_string(),
            body: "TWIM: **bold** news".to_string(),
            formatted_body: Some("<strong>TWIM</strong>: <strong>bold</strong> news".to_string()),
            image_ref: None,
        };

        assert!(message.is_twim());
        assert_eq!(message.captured_text(), "**bold** news");
    }

    #[test]
    fn untagged_messages_keep_their_rich_body() {
        let message = Message {
            event_id: "$1".to_string(),
            room_id: ROOM.to_string(),
            sender: "@alice:example.org".to_string(),
            body: "plain".to_string(),
            formatted_body: Some("<em>plain</em>".to_string()),
            image_ref: None,
        };

        assert_eq!(message.captured_text(), "<em>plain</em>");
    }
}
