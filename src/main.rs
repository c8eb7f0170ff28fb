use anyhow::{Context, Result};
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod ui;

use crate::audio::lavalink_client::LavalinkNode;
use crate::audio::rest::RestClient;
use crate::audio::server::LavalinkProcess;
use crate::bot::{AppContext, MusicBot};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lavabot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Lavabot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let rest = Arc::new(RestClient::new(&config)?);

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&rest).await;
    }

    // Servidor de audio
    let mut process = None;
    if config.lavalink_spawn {
        let mut server = LavalinkProcess::start(&config)?;
        if let Err(e) = server.wait_ready(&rest, config.startup_timeout()).await {
            server.stop().await.ok();
            return Err(e);
        }
        process = Some(server);
    } else {
        info!("Usando servidor Lavalink externo en {}", config.rest_url());
    }

    let result = run(config, rest).await;

    if let Some(server) = process {
        if let Err(e) = server.stop().await {
            warn!("Error al detener Lavalink: {:?}", e);
        }
    }

    result
}

async fn run(config: Config, rest: Arc<RestClient>) -> Result<()> {
    let shutdown = CancellationToken::new();

    let user_id = Http::new(&config.discord_token)
        .get_current_user()
        .await
        .context("No se pudo obtener el usuario del bot")?
        .id;

    // Conectar a Lavalink
    let songbird = Songbird::serenity();
    let node = LavalinkNode::connect(
        &config,
        rest,
        songbird.clone(),
        user_id,
        shutdown.child_token(),
    );

    let result = serve(config, node.clone(), songbird, shutdown.clone()).await;

    // El websocket se cierra también si el cliente no llegó a arrancar.
    shutdown.cancel();
    node.close().await;

    result
}

async fn serve(
    config: Config,
    node: Arc<LavalinkNode>,
    songbird: Arc<Songbird>,
    shutdown: CancellationToken,
) -> Result<()> {
    node.wait_ready(config.startup_timeout())
        .await
        .context("Lavalink no envió la sesión a tiempo")?;
    info!("✅ Lavalink conectado");

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let token = config.discord_token.clone();
    let app = Arc::new(AppContext {
        config,
        node,
        shutdown: shutdown.clone(),
    });

    let mut client = Client::builder(&token, intents)
        .event_handler(MusicBot::new(app))
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown.cancel();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
        return Err(why.into());
    }
    Ok(())
}

async fn health_check(rest: &RestClient) -> Result<()> {
    match rest.version().await {
        Ok(version) => {
            println!("OK (Lavalink {})", version.trim());
            Ok(())
        }
        Err(e) => anyhow::bail!("Lavalink no responde: {}", e),
    }
}
