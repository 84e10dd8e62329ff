//! Runtime services and shared state for the twim-bot.

use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    interaction,
    service::{chat::ChatClient, db::MemoryClient},
    twim::store::PostStore,
};

/// Pause after a failed sync before polling again.
const SYNC_RETRY_DELAY: Duration = Duration::from_secs(5);

/// The canonical IDs of the rooms the bot treats specially.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomTopology {
    /// The room in which commands are admin-gated.
    pub main: Option<String>,
    /// The room accepted posts are mirrored into.
    pub echo: Option<String>,
}

impl RoomTopology {
    /// Name of the main room.
    pub const MAIN: &'static str = "main";
    /// Name of the echo room.
    pub const ECHO: &'static str = "echo";

    /// Join the configured rooms and record their canonical IDs.
    ///
    /// A room that cannot be joined is left out, which disables what depends on it.
    #[instrument(skip_all)]
    pub async fn resolve(config: &Config, chat: &ChatClient) -> Self {
        Self {
            main: Self::join(chat, config.main_room.as_deref(), Self::MAIN).await,
            echo: Self::join(chat, config.echo_room.as_deref(), Self::ECHO).await,
        }
    }

    async fn join(chat: &ChatClient, room: Option<&str>, name: &str) -> Option<String> {
        let room = room?;

        match chat.join_room(room).await {
            Ok(room_id) => Some(room_id),
            Err(err) => {
                warn!("Could not join the {} room `{}`, it will be ignored: {}", name, room, err);
                None
            }
        }
    }

    /// The configured name of `room_id`, if it is one of the special rooms.
    pub fn name_of(&self, room_id: &str) -> Option<&'static str> {
        if self.main.as_deref() == Some(room_id) {
            Some(Self::MAIN)
        } else if self.echo.as_deref() == Some(room_id) {
            Some(Self::ECHO)
        } else {
            None
        }
    }

    /// The echo room, if there is one.
    pub fn echo(&self) -> Option<&str> {
        self.echo.as_deref()
    }
}

/// Everything a handler needs, passed explicitly into every handler.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Context {
    /// The configuration for the application.
    pub config: Config,
    /// The post store.
    pub store: PostStore,
    /// The chat client instance.
    pub chat: ChatClient,
    /// The special rooms.
    pub rooms: RoomTopology,
}

/// Runtime service that hosts the bot.
#[derive(Clone)]
pub struct Runtime {
    /// The shared handler context.
    pub context: Context,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the memory.
        let memory = MemoryClient::surreal(&config).await?;

        // Initialize the chat client.
        let chat = ChatClient::matrix(&config).await?;

        // Find the special rooms.
        let rooms = RoomTopology::resolve(&config, &chat).await;

        let store = PostStore::new(memory, config.memory_key.clone());

        Ok(Self {
            context: Context { config, store, chat, rooms },
        })
    }

    /// Reconcile stored data once, then serve events until interrupted.
    pub async fn start(&self) -> Void {
        self.startup().await?;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down ...");
                    return Ok(());
                }
                result = self.tick() => {
                    if let Err(err) = result {
                        error!("Sync failed: {}", err);
                        tokio::time::sleep(SYNC_RETRY_DELAY).await;
                    }
                }
            }
        }
    }

    /// The startup signal: migrate legacy data.
    #[instrument(skip_all)]
    pub async fn startup(&self) -> Void {
        if self.context.store.reconcile_legacy_shape().await? {
            info!("Legacy post collection migrated.");
        }

        Ok(())
    }

    /// Fetch one batch of events and handle each of them, in arrival order.
    pub async fn tick(&self) -> Void {
        let events = self.context.chat.sync().await?;

        for event in events {
            interaction::handle_event(&self.context, event).await;
        }

        Ok(())
    }
}
