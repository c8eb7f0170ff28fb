use anyhow::Result;
use serenity::{
    all::Command,
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

/// Registra comandos para una guild específica
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        stop_command(),
        skip_command(),
        resume_command(),
        pause_command(),
        position_command(),
        queue_command(),
        shuffle_command(),
        volume_command(),
        disconnect_command(),
    ]
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Plays music")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL or search terms",
            )
            .required(true),
        )
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stops the current track")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skips the current track")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resumes the player.")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pauses the player.")
}

fn position_command() -> CreateCommand {
    CreateCommand::new("position").description("Shows the track position")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Shows the current queue")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Shuffles track queue")
}

// Sin min/max: el rango lo valida el handler para poder responder.
fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Sets the player volume (0 - 1000%)")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Integer,
            "volume",
            "Volume in percent (default 40)",
        ))
}

fn disconnect_command() -> CreateCommand {
    CreateCommand::new("disconnect")
        .description("Disconnects from the current voice channel connected to")
}
