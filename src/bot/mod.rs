//! # Bot Module
//!
//! Discord side of the bot: slash command registration, interaction dispatch
//! and tracking of the bot's own voice state.
//!
//! The [`MusicBot`] handler owns an [`AppContext`] built once in `main`. Command
//! logic lives in [`music`] and only sees the traits of
//! [`crate::audio::player`]; [`handlers`] adapts serenity interactions to it.

use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub mod commands;
pub mod diagnostics;
pub mod handlers;
pub mod music;

use crate::{audio::lavalink_client::LavalinkNode, config::Config};

/// Shared state of the running application.
pub struct AppContext {
    pub config: Config,
    pub node: Arc<LavalinkNode>,
    /// Cancelled on shutdown; every command gets a child token.
    pub shutdown: CancellationToken,
}

pub struct MusicBot {
    app: Arc<AppContext>,
}

impl MusicBot {
    pub fn new(app: Arc<AppContext>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🎵 {} está conectado!", ready.user.name);

        let registered = match self.app.config.guild_id {
            Some(guild_id) => {
                commands::register_guild_commands(&ctx, GuildId::new(guild_id))
                    .await
            }
            None => commands::register_global_commands(&ctx).await,
        };

        match registered {
            Ok(()) => info!("✅ Comandos registrados"),
            Err(e) => error!("Error al registrar comandos: {:?}", e),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            let name = command.data.name.clone();
            if let Err(e) = handlers::handle_command(&ctx, command, &self.app).await {
                error!("No se pudo responder al comando /{}: {:?}", name, e);
            }
        }
    }

    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        self.app
            .node
            .on_voice_state_update(guild_id, new.channel_id)
            .await;
    }
}
