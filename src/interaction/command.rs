//! The admin commands: listing and clearing the collected updates.

use tracing::{debug, info, instrument};

use crate::{
    base::{
        phrases,
        types::{Res, Void},
    },
    runtime::{Context, RoomTopology},
    twim::{event::Message, format},
};

/// A chat command, recognized at the start of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `!get updates`: reply with the digest.
    GetUpdates,
    /// `!clear updates`: empty the collection.
    ClearUpdates,
}

impl Command {
    pub fn parse(body: &str) -> Option<Self> {
        if body.starts_with("!get updates") {
            Some(Command::GetUpdates)
        } else if body.starts_with("!clear updates") {
            Some(Command::ClearUpdates)
        } else {
            None
        }
    }
}

/// Run `command` on behalf of the sender of `message`.
///
/// In the main room only admins may run commands; anyone else is silently ignored.
#[instrument(skip(ctx, message), fields(room_id = %message.room_id))]
pub async fn handle_command(ctx: &Context, command: Command, message: &Message) -> Void {
    if !is_permitted(ctx, &message.room_id, &message.sender).await? {
        debug!("`{}` may not run {:?} here; ignoring.", message.sender, command);
        return Ok(());
    }

    match command {
        Command::GetUpdates => {
            let collection = ctx.store.get().await?;

            let reply = if collection.is_empty() { phrases::NO_UPDATES.to_string() } else { format::render_all(&collection) };

            ctx.chat.send_message(&message.room_id, &reply).await?;
        }
        Command::ClearUpdates => {
            ctx.store.clear().await?;
            info!("Updates cleared by `{}`.", message.sender);

            ctx.chat.send_message(&message.room_id, phrases::UPDATES_CLEARED).await?;
        }
    }

    Ok(())
}

/// Whether `user_id` may run commands in `room_id`.
async fn is_permitted(ctx: &Context, room_id: &str, user_id: &str) -> Res<bool> {
    if ctx.rooms.name_of(room_id) != Some(RoomTopology::MAIN) {
        return Ok(true);
    }

    let levels = ctx.chat.get_power_levels(room_id).await?;

    Ok(levels.level_of(user_id) >= ctx.config.admin_power_level)
}
