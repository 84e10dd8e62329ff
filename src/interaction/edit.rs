//! Applying edits to recorded posts.

use tracing::{debug, info, instrument};

use crate::{
    base::types::Void,
    runtime::Context,
    twim::{
        event::Edit,
        format,
        post::Post,
    },
};

/// Overwrite the message of the edited post, and update its mirror.
///
/// Edits of posts that were never recorded, or by anyone but the author, are ignored.
#[instrument(skip_all, fields(target = %edit.target))]
pub async fn handle_edit(ctx: &Context, edit: Edit) -> Void {
    let Some(post) = ctx.store.post(&edit.target).await? else {
        debug!("Edit for unknown post `{}`; ignoring.", edit.target);
        return Ok(());
    };

    if post.author_id != edit.sender {
        debug!("Edit of `{}` by `{}`, who is not the author; ignoring.", edit.target, edit.sender);
        return Ok(());
    }

    let message = edit.captured_text();

    if !ctx.store.replace_message(&edit.target, &message).await? {
        return Ok(());
    }

    info!("Updated post `{}`.", edit.target);

    let (Some(echo), Some(mirror)) = (ctx.rooms.echo(), &post.mirror_event_id) else {
        return Ok(());
    };

    let updated = Post { message, ..post.clone() };
    ctx.chat.edit_message(echo, mirror, &format::render_one(&updated)).await?;

    Ok(())
}
