//! Library root for `twim-bot`.
//!
//! Twim-bot is a Matrix bot that collects "This Week In Matrix" updates:
//! - Records messages tagged `TWIM` as posts, keyed by their event ID
//! - Lets authors confirm a message retroactively with a reaction
//! - Follows edits, and mirrors every post into an echo room
//! - Renders all collected posts into a digest on request
//!
//! The bot integrates with a Matrix homeserver for chat and SurrealDB for
//! storage. The architecture is built around extensible traits that allow
//! for different implementations of each service.

#[deny(missing_docs)]
pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;
pub mod twim;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::{debug, info};

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the twim-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with memory and chat clients
/// - Starts the main event loop for processing events
pub async fn start(config: Config) -> Void {
    info!("Starting twim-bot ...");

    // Start the crypto provider.
    if crypto::ring::default_provider().install_default().is_err() {
        debug!("A rustls crypto provider is already installed; keeping it.");
    }

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
