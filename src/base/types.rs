//! Shared result aliases and error classification.

use tracing::warn;

/// The error type used throughout the bot.
pub type Err = anyhow::Error;
/// A result with the bot's error type.
pub type Res<T> = Result<T, Err>;
/// A result carrying no value.
pub type Void = Res<()>;

/// Explicit classification for side effects whose failure must not abort the
/// surrounding operation.
///
/// Only the confirmation reaction is treated this way; every other failure
/// propagates with `?`.
pub trait NonFatal<T> {
    /// Log the error (if any) at warn level, and continue with `None`.
    fn non_fatal(self, what: &str) -> Option<T>;
}

impl<T> NonFatal<T> for Res<T> {
    fn non_fatal(self, what: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Non-fatal failure while {}: {}", what, err);
                None
            }
        }
    }
}
