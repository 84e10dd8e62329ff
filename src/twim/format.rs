//! Rendering of posts into the markdown digest.

use super::{event::strip_trigger, post::Post, post::PostCollection};

const MATRIX_TO: &str = "https://matrix.to/#/";

/// Link to a user's profile.
pub fn user_link(user_id: &str) -> String {
    format!("{MATRIX_TO}{user_id}")
}

/// Link to a specific event in a room.
pub fn event_link(room_id: &str, event_id: &str) -> String {
    format!("{MATRIX_TO}{room_id}/{event_id}")
}

/// Render one post as an attributed block quotation.
///
/// The trigger token is stripped once, an attached image is embedded with
/// the message as its caption, and every line of the body stays quoted.
pub fn render_one(post: &Post) -> String {
    let message = strip_trigger(&post.message, &post.author_id);

    let body = match &post.image_ref {
        Some(image_ref) => format!("![{}]({})", message, image_ref),
        None => message,
    };

    let attribution = format!(
        "[{}]({}) [reports that]({}):",
        post.author_display_name,
        user_link(&post.author_id),
        event_link(&post.room_id, &post.origin_event_id)
    );

    format!("{}\n\n> {}\n", attribution, body.replace('\n', "\n> "))
}

/// Render every post, in collection order, separated by line breaks.
pub fn render_all(collection: &PostCollection) -> String {
    collection.values().map(render_one).collect::<Vec<_>>().join("\n")
}
