//! Event handling and user interactions for twim-bot.
//!
//! This module turns inbound chat events into actions:
//! - Recording TWIM posts (fresh messages, replies, confirmations)
//! - Applying edits to recorded posts
//! - Running the `!get updates` / `!clear updates` commands

pub mod command;
pub mod edit;
pub mod post;
pub mod reaction;

use tracing::{debug, error, instrument};

use crate::{
    base::types::Void,
    runtime::Context,
    service::chat::RoomEvent,
    twim::event::{self, ChatEvent},
};

use command::Command;

/// Handles one inbound event to completion.
///
/// Failures are logged and the event is dropped; the caller keeps serving later events.
#[instrument(skip_all, fields(room_id = %event.room_id))]
pub async fn handle_event(ctx: &Context, event: RoomEvent) {
    // Process the event.
    let result = process_event(ctx, event).await;

    // Log any errors.
    if let Err(err) = &result {
        error!("Error while handling: {}", err);
    }
}

/// Normalize an inbound event and dispatch it to the matching handler.
pub async fn process_event(ctx: &Context, event: RoomEvent) -> Void {
    let Some(event) = event::parse(&event.room_id, &event.raw) else {
        debug!("Skipping event of no interest.");
        return Ok(());
    };

    if event.sender() == ctx.chat.bot_user_id() {
        debug!("Skipping own event `{}`.", event.event_id());
        return Ok(());
    }

    match event {
        ChatEvent::Message(message) | ChatEvent::Image(message) => {
            if let Some(command) = Command::parse(&message.body) {
                return command::handle_command(ctx, command, &message).await;
            }

            if message.is_twim() {
                return post::accept_post(ctx, message).await;
            }

            Ok(())
        }
        ChatEvent::Reply { message, in_reply_to } => post::handle_reply(ctx, message, &in_reply_to).await,
        ChatEvent::Edit(edit) => edit::handle_edit(ctx, edit).await,
        ChatEvent::Reaction(reaction) => reaction::handle_reaction(ctx, reaction).await,
    }
}
