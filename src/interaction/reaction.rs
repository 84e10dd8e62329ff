//! Author confirmation through the confirmation glyph.

use tracing::{debug, error, instrument};

use crate::{
    base::types::Void,
    runtime::Context,
    twim::event::{self, ChatEvent, Reaction},
};

use super::post::{accept_post, resolve_reply};

/// Accept the reacted-to message when its own author reacts with the confirmation glyph.
#[instrument(skip_all, fields(target = %reaction.target))]
pub async fn handle_reaction(ctx: &Context, reaction: Reaction) -> Void {
    if !reaction.is_glyph(&ctx.config.confirmation_emoji) {
        debug!("Reaction `{}` is not the confirmation glyph; ignoring.", reaction.key);
        return Ok(());
    }

    let raw = match ctx.chat.get_event(&reaction.room_id, &reaction.target).await {
        Ok(raw) => raw,
        Err(err) => {
            error!("Could not resolve reacted-to event `{}`: {}", reaction.target, err);
            return Ok(());
        }
    };

    let Some(linked) = event::parse(&reaction.room_id, &raw) else {
        error!("Reacted-to event `{}` is not a message.", reaction.target);
        return Ok(());
    };

    if linked.sender() != reaction.sender {
        debug!("Reaction by `{}` on a message by `{}`; ignoring.", reaction.sender, linked.sender());
        return Ok(());
    }

    // A confirmed reply stands for the message it replies to.
    let subject = match linked {
        ChatEvent::Reply { message, in_reply_to } => match resolve_reply(ctx, &message.room_id, &in_reply_to).await {
            Ok(subject) => subject,
            Err(err) => {
                error!("Could not resolve the message `{}` replied to: {}", in_reply_to, err);
                return Ok(());
            }
        },
        other => other.into_subject(),
    };

    match subject {
        Some(subject) => accept_post(ctx, subject).await,
        None => {
            debug!("Reacted-to event `{}` cannot be a post; ignoring.", reaction.target);
            Ok(())
        }
    }
}
