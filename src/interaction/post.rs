//! Accepting posts: fresh TWIM messages, replies, and author-confirmed messages.

use tracing::{debug, info, instrument};

use crate::{
    base::{
        phrases,
        types::{NonFatal, Res, Void},
    },
    runtime::Context,
    twim::{
        event::{self, ChatEvent, Message},
        format,
    },
};

/// Record `subject` as a post, confirm it, mirror it, and acknowledge it.
///
/// Accepting an already stored post again overwrites it; an existing mirror is
/// edited in place rather than duplicated.
#[instrument(skip_all, fields(event_id = %subject.event_id))]
pub async fn accept_post(ctx: &Context, subject: Message) -> Void {
    let display_name = ctx.chat.get_display_name(&subject.sender).await?;

    let mut post = subject.to_post(&display_name);
    let key = post.origin_event_id.clone();

    post.mirror_event_id = ctx.store.post(&key).await?.and_then(|previous| previous.mirror_event_id);
    ctx.store.upsert(&key, post.clone()).await?;

    info!("Recorded post `{}` from `{}`.", key, post.author_id);

    ctx.chat
        .react_to_message(&post.room_id, &key, &ctx.config.confirmation_emoji)
        .await
        .non_fatal("reacting to an accepted post");

    if let Some(echo) = ctx.rooms.echo() {
        let rendered = format::render_one(&post);

        match &post.mirror_event_id {
            Some(mirror) => {
                debug!("Updating mirror `{}` of `{}`.", mirror, key);
                ctx.chat.edit_message(echo, mirror, &rendered).await?;
            }
            None => {
                let mirror = ctx.chat.send_message(echo, &rendered).await?;
                debug!("Mirrored `{}` as `{}`.", key, mirror);

                post.mirror_event_id = Some(mirror);
                ctx.store.upsert(&key, post.clone()).await?;
            }
        }
    }

    ctx.chat.send_message(&post.room_id, &phrases::acknowledgement(&post.author_display_name)).await?;

    Ok(())
}

/// Handle a reply: the message it links to is the candidate post.
#[instrument(skip_all, fields(event_id = %reply.event_id))]
pub async fn handle_reply(ctx: &Context, reply: Message, in_reply_to: &str) -> Void {
    match resolve_reply(ctx, &reply.room_id, in_reply_to).await? {
        Some(subject) if subject.is_twim() => accept_post(ctx, subject).await,
        _ => {
            debug!("Linked event `{}` is not a TWIM post; ignoring reply.", in_reply_to);
            Ok(())
        }
    }
}

/// The message a reply links to.
///
/// `None` when the linked event is not a message, or is an edit.
pub async fn resolve_reply(ctx: &Context, room_id: &str, in_reply_to: &str) -> Res<Option<Message>> {
    let raw = ctx.chat.get_event(room_id, in_reply_to).await?;

    match event::parse(room_id, &raw) {
        None => {
            debug!("Linked event `{}` is not a message.", in_reply_to);
            Ok(None)
        }
        Some(ChatEvent::Edit(_)) => {
            debug!("Linked event `{}` is an edit.", in_reply_to);
            Ok(None)
        }
        Some(parent) => Ok(parent.into_subject()),
    }
}
