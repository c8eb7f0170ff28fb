use anyhow::Result;
use serenity::{
    all::Cache,
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    audio::{player::VoiceStates, resolver::RequestContext},
    bot::{
        diagnostics::UNKNOWN_ERROR,
        music::{Music, Reply, DEFAULT_VOLUME},
        AppContext,
    },
    ui::embeds,
};

/// Voice states as seen by the gateway cache.
pub struct CacheVoiceStates(pub Arc<Cache>);

impl VoiceStates for CacheVoiceStates {
    fn channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        self.0.guild(guild_id)?.voice_states.get(&user_id)?.channel_id
    }
}

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    app: &AppContext,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(
            ctx,
            &command,
            Reply::Diagnostic("This command can only be used in a server.".to_string()),
        )
        .await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let request = RequestContext {
        caller: command.user.id,
        guild: guild_id,
        cancel: app.shutdown.child_token(),
    };
    let voice = CacheVoiceStates(ctx.cache.clone());
    let music = Music {
        players: app.node.as_ref(),
        tracks: app.node.as_ref(),
        voice: &voice,
    };

    // La búsqueda puede tardar más que el plazo de respuesta de Discord.
    let deferred = command.data.name == "play";
    if deferred {
        command.defer(&ctx.http).await?;
    }

    let outcome = match command.data.name.as_str() {
        "play" => match string_option(&command, "query") {
            Some(query) => music.play(&request, query).await,
            None => Ok(Reply::Diagnostic("Missing search query.".to_string())),
        },
        "stop" => music.stop(&request).await,
        "skip" => music.skip(&request).await,
        "resume" => music.resume(&request).await,
        "pause" => music.pause(&request).await,
        "position" => music.position(&request).await,
        "queue" => music.queue(&request).await,
        "shuffle" => music.shuffle(&request).await,
        "volume" => {
            let volume = integer_option(&command, "volume").unwrap_or(DEFAULT_VOLUME);
            music.volume(&request, volume).await
        }
        "disconnect" => music.disconnect(&request).await,
        other => Ok(Reply::Diagnostic(format!("Unknown command: /{}", other))),
    };

    let reply = outcome.unwrap_or_else(|e| {
        error!(
            "Error en comando /{} (guild {}): {:?}",
            command.data.name, guild_id, e
        );
        Reply::Diagnostic(UNKNOWN_ERROR.to_string())
    });

    if deferred {
        edit(ctx, &command, reply).await
    } else {
        respond(ctx, &command, reply).await
    }
}

async fn respond(ctx: &Context, command: &CommandInteraction, reply: Reply) -> Result<()> {
    let message = match reply {
        Reply::Text(text) => CreateInteractionResponseMessage::new().content(text),
        Reply::Embed { title, fields } => CreateInteractionResponseMessage::new()
            .embed(embeds::create_list_embed(&title, &fields)),
        Reply::Diagnostic(text) => {
            CreateInteractionResponseMessage::new().embed(embeds::create_error_embed(&text))
        }
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, reply: Reply) -> Result<()> {
    let edit = match reply {
        Reply::Text(text) => EditInteractionResponse::new().content(text),
        Reply::Embed { title, fields } => {
            EditInteractionResponse::new().embed(embeds::create_list_embed(&title, &fields))
        }
        Reply::Diagnostic(text) => {
            EditInteractionResponse::new().embed(embeds::create_error_embed(&text))
        }
    };

    command.edit_response(&ctx.http, edit).await?;
    Ok(())
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_i64())
}
