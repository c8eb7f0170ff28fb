use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use rand::seq::SliceRandom;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::{error::JoinError, Songbird};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    http::HeaderValue,
    protocol::Message,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::error::EngineError;
use crate::audio::player::{Player, PlayerDirectory, PlayerSnapshot, TrackSearch};
use crate::audio::protocol::{
    IncomingMessage, LoadResult, NodeEvent, PlayerState, SessionUpdate, Track, UpdatePlayer,
    UpdatePlayerTrack, VoiceState,
};
use crate::audio::rest::RestClient;
use crate::config::Config;

type PlayerMap = DashMap<GuildId, Arc<LavalinkPlayer>>;

/// Discord voice close codes after which the voice session is gone for good.
const CLOSE_DISCONNECTED: u16 = 4014;
const CLOSE_SESSION_NO_LONGER_VALID: u16 = 4006;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Client of a single Lavalink node.
///
/// Owns the per-guild players and the websocket task that keeps their state in
/// sync with the node's events.
pub struct LavalinkNode {
    rest: Arc<RestClient>,
    songbird: Arc<Songbird>,
    players: Arc<PlayerMap>,
    user_id: UserId,
    websocket_url: String,
    password: String,
    search_prefix: String,
    default_volume: u16,
    resume_timeout: u64,
    shutdown: CancellationToken,
    socket_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl LavalinkNode {
    /// Starts the websocket task. Player operations fail with
    /// [`EngineError::NotReady`] until the node has sent `ready`.
    pub fn connect(
        config: &Config,
        rest: Arc<RestClient>,
        songbird: Arc<Songbird>,
        user_id: UserId,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let node = Arc::new(Self {
            rest,
            songbird,
            players: Arc::new(DashMap::new()),
            user_id,
            websocket_url: config.websocket_url(),
            password: config.lavalink_password.clone(),
            search_prefix: config.search_prefix.clone(),
            default_volume: config.default_volume,
            resume_timeout: config.lavalink_resume_timeout,
            shutdown,
            socket_task: parking_lot::Mutex::new(None),
        });

        info!("Conectando a Lavalink en {}", node.websocket_url);
        let task = tokio::spawn(node.clone().run_socket());
        *node.socket_task.lock() = Some(task);

        node
    }

    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), EngineError> {
        self.rest.wait_ready(timeout).await
    }

    /// Stops the websocket task and forgets every player.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let task = self.socket_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("La tarea del websocket de Lavalink falló: {:?}", e);
            }
        }
        self.players.clear();
        info!("Cliente Lavalink cerrado");
    }

    /// Tracks the bot's own voice state. Leaving voice ends the guild's session.
    pub async fn on_voice_state_update(&self, guild_id: GuildId, channel_id: Option<ChannelId>) {
        match channel_id {
            Some(channel_id) => {
                if let Some(player) = self.players.get(&guild_id) {
                    player.set_channel(channel_id);
                }
            }
            None => {
                if let Some((_, player)) = self.players.remove(&guild_id) {
                    info!("Bot desconectado en guild {}, destruyendo player", guild_id);
                    if let Err(e) = self.rest.destroy_player(player.guild_id).await {
                        warn!("No se pudo destruir el player de {}: {}", guild_id, e);
                    }
                }
            }
        }
    }

    async fn run_socket(self: Arc<Self>) {
        let mut backoff = Duration::from_secs(1);
        let mut resume_session: Option<String> = None;

        while !self.shutdown.is_cancelled() {
            match self.socket_session(resume_session.as_deref()).await {
                Ok(()) => {
                    info!("Websocket de Lavalink cerrado");
                    backoff = Duration::from_secs(1);
                }
                Err(e) => warn!("Websocket de Lavalink falló: {}", e),
            }

            resume_session = self.rest.session_id().or(resume_session);
            self.rest.set_session_id(None);

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
            info!("Reconectando a Lavalink...");
        }

        self.rest.set_session_id(None);
    }

    async fn socket_session(&self, resume_session: Option<&str>) -> Result<(), EngineError> {
        let mut request = self.websocket_url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("Authorization", header(&self.password)?);
        headers.insert("User-Id", header(&self.user_id.to_string())?);
        headers.insert(
            "Client-Name",
            header(concat!("lavabot/", env!("CARGO_PKG_VERSION")))?,
        );
        if let Some(session_id) = resume_session {
            headers.insert("Session-Id", header(session_id)?);
        }

        let (mut socket, _) = tokio_tungstenite::connect_async(request).await?;
        debug!("Websocket de Lavalink conectado");

        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => None,
                message = socket.next() => Some(message),
            };
            let Some(message) = next else {
                socket.close(None).await.ok();
                return Ok(());
            };

            match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<IncomingMessage>(text.as_str()) {
                        Ok(message) => self.handle_message(message).await,
                        Err(e) => warn!("Mensaje de Lavalink inválido: {} ({})", e, text.as_str()),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!("Lavalink cerró el websocket: {:?}", frame);
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            }
        }
    }

    async fn handle_message(&self, message: IncomingMessage) {
        match message {
            IncomingMessage::Ready {
                resumed,
                session_id,
            } => {
                info!("Sesión de Lavalink lista: {} (resumed={})", session_id, resumed);
                if !resumed && !self.players.is_empty() {
                    warn!(
                        "La sesión anterior no se reanudó, descartando {} players",
                        self.players.len()
                    );
                    self.players.clear();
                }
                self.rest.set_session_id(Some(session_id));

                let update = SessionUpdate {
                    resuming: true,
                    timeout: self.resume_timeout,
                };
                if let Err(e) = self.rest.update_session(&update).await {
                    warn!("No se pudo activar la reanudación de sesión: {}", e);
                }
            }
            IncomingMessage::PlayerUpdate { guild_id, state } => {
                if let Some(player) = parse_guild(&guild_id).and_then(|id| self.player(id)) {
                    player.update_position(&state);
                }
            }
            IncomingMessage::Stats(stats) => {
                debug!(
                    "Lavalink stats: {} players ({} playing), uptime {}s",
                    stats.players,
                    stats.playing_players,
                    stats.uptime / 1000
                );
            }
            IncomingMessage::Event(event) => self.handle_event(event),
            IncomingMessage::Unknown => debug!("Operación de Lavalink desconocida"),
        }
    }

    fn handle_event(&self, event: NodeEvent) {
        match event {
            NodeEvent::TrackStartEvent { guild_id, track } => {
                info!("▶️ Reproduciendo: {} en guild {}", track.info.title, guild_id);
            }
            NodeEvent::TrackEndEvent {
                guild_id,
                track,
                reason,
            } => {
                debug!("Track terminó en guild {}: {:?}", guild_id, reason);
                if !reason.may_start_next() {
                    return;
                }
                if let Some(player) = parse_guild(&guild_id).and_then(|id| self.player(id)) {
                    tokio::spawn(async move {
                        if let Err(e) = player.advance_after(&track).await {
                            error!("Error al reproducir siguiente track: {}", e);
                        }
                    });
                }
            }
            NodeEvent::TrackExceptionEvent {
                guild_id,
                track,
                exception,
            } => {
                error!(
                    "❌ Error en track '{}' para guild {}: {} ({})",
                    track.info.title,
                    guild_id,
                    exception.message.unwrap_or_default(),
                    exception.cause
                );
            }
            NodeEvent::TrackStuckEvent {
                guild_id,
                track,
                threshold_ms,
            } => {
                warn!(
                    "Track '{}' atascado en guild {} ({}ms)",
                    track.info.title, guild_id, threshold_ms
                );
            }
            NodeEvent::WebSocketClosedEvent {
                guild_id,
                code,
                reason,
                by_remote,
            } => {
                warn!(
                    "🔌 Voz cerrada en guild {}: {} {} (remoto={})",
                    guild_id, code, reason, by_remote
                );
                if code == CLOSE_DISCONNECTED || code == CLOSE_SESSION_NO_LONGER_VALID {
                    if let Some(id) = parse_guild(&guild_id) {
                        self.players.remove(&id);
                    }
                }
            }
            NodeEvent::Unknown => debug!("Evento de Lavalink desconocido"),
        }
    }

    fn player(&self, guild_id: GuildId) -> Option<Arc<LavalinkPlayer>> {
        self.players.get(&guild_id).map(|p| p.value().clone())
    }

    fn search_identifier(&self, query: &str) -> String {
        if url::Url::parse(query).is_ok() {
            query.to_string()
        } else {
            format!("{}:{}", self.search_prefix, query)
        }
    }
}

#[async_trait]
impl PlayerDirectory for LavalinkNode {
    async fn get(&self, guild_id: GuildId) -> Result<Option<Arc<dyn Player>>, EngineError> {
        if self.rest.session_id().is_none() {
            return Err(EngineError::NotReady);
        }
        Ok(self.player(guild_id).map(|p| p as Arc<dyn Player>))
    }

    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn Player>, EngineError> {
        if self.rest.session_id().is_none() {
            return Err(EngineError::NotReady);
        }

        let (connection, _call) = self
            .songbird
            .join_gateway(guild_id, channel_id)
            .await
            .map_err(|e| EngineError::Voice(e.to_string()))?;

        let update = UpdatePlayer {
            volume: Some(self.default_volume),
            voice: Some(VoiceState {
                token: connection.token,
                endpoint: connection.endpoint,
                session_id: connection.session_id,
            }),
            ..Default::default()
        };
        if let Err(e) = self.rest.update_player(guild_id, &update).await {
            if let Err(leave) = self.songbird.remove(guild_id).await {
                warn!("No se pudo salir del canal de voz: {:?}", leave);
            }
            return Err(e);
        }

        let player = self
            .players
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(LavalinkPlayer::new(
                    guild_id,
                    channel_id,
                    self.default_volume,
                    self.rest.clone(),
                    self.songbird.clone(),
                    Arc::downgrade(&self.players),
                ))
            })
            .value()
            .clone();
        player.set_channel(channel_id);

        info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(player)
    }
}

#[async_trait]
impl TrackSearch for LavalinkNode {
    async fn load_track(&self, query: &str) -> Result<Option<Track>, EngineError> {
        let identifier = self.search_identifier(query);
        match self.rest.load_tracks(&identifier).await? {
            LoadResult::Error(exception) => {
                warn!(
                    "Error al cargar '{}': {} ({})",
                    identifier,
                    exception.message.unwrap_or_default(),
                    exception.severity
                );
                Ok(None)
            }
            LoadResult::Empty {} => {
                debug!("No se encontraron resultados para: {}", identifier);
                Ok(None)
            }
            result => Ok(result.into_first_track()),
        }
    }
}

fn header(value: &str) -> Result<HeaderValue, EngineError> {
    HeaderValue::from_str(value).map_err(|e| {
        EngineError::Socket(tokio_tungstenite::tungstenite::Error::HttpFormat(e.into()))
    })
}

fn parse_guild(id: &str) -> Option<GuildId> {
    id.parse::<u64>().ok().filter(|id| *id != 0).map(GuildId::new)
}


#[derive(Debug)]
struct LocalState {
    channel_id: ChannelId,
    current: Option<Track>,
    queue: VecDeque<Track>,
    paused: bool,
    volume: u16,
    position: Duration,
    position_at: Instant,
}

impl LocalState {
    fn new(channel_id: ChannelId, volume: u16) -> Self {
        Self {
            channel_id,
            current: None,
            queue: VecDeque::new(),
            paused: false,
            volume,
            position: Duration::ZERO,
            position_at: Instant::now(),
        }
    }

    fn position_now(&self) -> Option<Duration> {
        let track = self.current.as_ref()?;
        let mut position = self.position;
        if !self.paused {
            position += self.position_at.elapsed();
        }
        if !track.info.is_stream {
            position = position.min(track.duration());
        }
        Some(position)
    }

    fn set_position(&mut self, position: Duration) {
        self.position = position;
        self.position_at = Instant::now();
    }

    /// Appends `track` and returns its 1-based queue position.
    fn enqueue(&mut self, track: Track) -> usize {
        self.queue.push_back(track);
        self.queue.len()
    }

    /// Whether `ended` is still the track this player is playing. A stale end
    /// event (after a skip or stop) must not advance the queue.
    fn is_current(&self, ended: &Track) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| current.encoded == ended.encoded)
    }

    fn next(&self) -> Option<Track> {
        self.queue.front().cloned()
    }

    /// Records that the node accepted `track`.
    fn started(&mut self, track: Track) {
        self.current = Some(track);
        self.paused = false;
        self.set_position(Duration::ZERO);
    }

    /// Records that the node accepted the head of the queue and dequeues it.
    fn started_next(&mut self) -> Option<Track> {
        let next = self.queue.pop_front()?;
        self.started(next.clone());
        Some(next)
    }

    fn stopped(&mut self) {
        self.current = None;
        self.paused = false;
        self.set_position(Duration::ZERO);
    }
}

/// A guild's player with a client-side queue.
///
/// Mutating operations are serialized per guild by `ops`; `state` is only held
/// for short synchronous sections and only changed once the node accepted the
/// request.
pub struct LavalinkPlayer {
    guild_id: GuildId,
    rest: Arc<RestClient>,
    songbird: Arc<Songbird>,
    players: Weak<PlayerMap>,
    ops: tokio::sync::Mutex<()>,
    state: parking_lot::Mutex<LocalState>,
}

impl LavalinkPlayer {
    fn new(
        guild_id: GuildId,
        channel_id: ChannelId,
        volume: u16,
        rest: Arc<RestClient>,
        songbird: Arc<Songbird>,
        players: Weak<PlayerMap>,
    ) -> Self {
        Self {
            guild_id,
            rest,
            songbird,
            players,
            ops: tokio::sync::Mutex::new(()),
            state: parking_lot::Mutex::new(LocalState::new(channel_id, volume)),
        }
    }

    fn set_channel(&self, channel_id: ChannelId) {
        self.state.lock().channel_id = channel_id;
    }

    fn update_position(&self, update: &PlayerState) {
        self.state
            .lock()
            .set_position(Duration::from_millis(update.position));
    }

    /// Sends `track` to the node. The caller holds `ops`.
    async fn send_track(&self, track: &Track) -> Result<(), EngineError> {
        let update = UpdatePlayer {
            track: Some(UpdatePlayerTrack {
                encoded: Some(track.encoded.clone()),
            }),
            paused: Some(false),
            ..Default::default()
        };
        self.rest.update_player(self.guild_id, &update).await
    }

    /// Stops the node's player. The caller holds `ops`.
    async fn halt(&self) -> Result<(), EngineError> {
        let update = UpdatePlayer {
            track: Some(UpdatePlayerTrack { encoded: None }),
            ..Default::default()
        };
        self.rest.update_player(self.guild_id, &update).await?;
        self.state.lock().stopped();
        Ok(())
    }

    /// Starts the next queued track once `ended` finished on its own.
    async fn advance_after(&self, ended: &Track) -> Result<(), EngineError> {
        let _guard = self.ops.lock().await;

        let next = {
            let state = self.state.lock();
            if !state.is_current(ended) {
                return Ok(());
            }
            state.next()
        };

        let Some(next) = next else {
            self.state.lock().stopped();
            debug!("Cola vacía en guild {}", self.guild_id);
            return Ok(());
        };

        if let Err(e) = self.send_track(&next).await {
            // El track terminado ya no suena; el siguiente queda en cola.
            self.state.lock().stopped();
            return Err(e);
        }
        self.state.lock().started_next();
        Ok(())
    }

    async fn set_paused(&self, paused: bool) -> Result<(), EngineError> {
        let _guard = self.ops.lock().await;
        let update = UpdatePlayer {
            paused: Some(paused),
            ..Default::default()
        };
        self.rest.update_player(self.guild_id, &update).await?;

        let mut state = self.state.lock();
        if let Some(position) = state.position_now() {
            state.set_position(position);
        }
        state.paused = paused;
        Ok(())
    }
}

#[async_trait]
impl Player for LavalinkPlayer {
    fn voice_channel(&self) -> Option<ChannelId> {
        Some(self.state.lock().channel_id)
    }

    fn snapshot(&self) -> PlayerSnapshot {
        let state = self.state.lock();
        PlayerSnapshot {
            current: state.current.clone(),
            queue: state.queue.iter().cloned().collect(),
            status: PlayerSnapshot::status_of(state.current.as_ref(), state.paused),
            volume: state.volume,
            position: state.position_now(),
        }
    }

    async fn play(&self, track: Track) -> Result<usize, EngineError> {
        let _guard = self.ops.lock().await;

        let idle = self.state.lock().current.is_none();
        if idle {
            self.send_track(&track).await?;
            self.state.lock().started(track);
            return Ok(0);
        }

        Ok(self.state.lock().enqueue(track))
    }

    async fn stop(&self) -> Result<(), EngineError> {
        let _guard = self.ops.lock().await;
        self.halt().await
    }

    async fn skip(&self) -> Result<Option<Track>, EngineError> {
        let _guard = self.ops.lock().await;

        let next = self.state.lock().next();
        match next {
            Some(track) => {
                self.send_track(&track).await?;
                Ok(self.state.lock().started_next())
            }
            None => {
                self.halt().await?;
                Ok(None)
            }
        }
    }

    async fn pause(&self) -> Result<(), EngineError> {
        self.set_paused(true).await
    }

    async fn resume(&self) -> Result<(), EngineError> {
        self.set_paused(false).await
    }

    async fn set_volume(&self, volume: f32) -> Result<(), EngineError> {
        let _guard = self.ops.lock().await;
        let percent = (volume * 100.0).round().clamp(0.0, 1000.0) as u16;
        let update = UpdatePlayer {
            volume: Some(percent),
            ..Default::default()
        };
        self.rest.update_player(self.guild_id, &update).await?;
        self.state.lock().volume = percent;
        Ok(())
    }

    async fn shuffle(&self) -> Result<(), EngineError> {
        let _guard = self.ops.lock().await;
        let mut state = self.state.lock();
        state.queue.make_contiguous().shuffle(&mut rand::thread_rng());
        Ok(())
    }

    /// Leaves voice even when the node could not be reached, but only forgets
    /// the player once both teardowns succeeded so a retry stays possible.
    async fn disconnect(&self) -> Result<(), EngineError> {
        let _guard = self.ops.lock().await;

        let destroyed = self.rest.destroy_player(self.guild_id).await;
        let left = match self.songbird.remove(self.guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(EngineError::Voice(e.to_string())),
        };
        destroyed?;
        left?;

        if let Some(players) = self.players.upgrade() {
            players.remove_if(&self.guild_id, |_, player| std::ptr::eq(player.as_ref(), self));
        }

        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::PlayerStatus;
    use crate::audio::protocol::tests::track;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GUILD: u64 = 7;
    const PLAYER_PATH: &str = "/v4/sessions/s1/players/7";

    fn state_with(current: Option<Track>, paused: bool, position_ms: u64) -> LocalState {
        LocalState {
            current,
            paused,
            position: Duration::from_millis(position_ms),
            position_at: Instant::now() - Duration::from_secs(2),
            ..LocalState::new(ChannelId::new(1), 100)
        }
    }

    /// Node that accepts every player update and delete.
    async fn accepting_node() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(PLAYER_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(PLAYER_PATH))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        server
    }

    /// Node that answers every request with 404.
    async fn failing_node() -> MockServer {
        MockServer::start().await
    }

    fn player_on(server: &MockServer, players: &Arc<PlayerMap>) -> Arc<LavalinkPlayer> {
        let address = server.address();
        let config = Config {
            lavalink_host: address.ip().to_string(),
            lavalink_port: address.port(),
            ..Config::default()
        };
        let rest = RestClient::new(&config).unwrap();
        rest.set_session_id(Some("s1".to_string()));

        let guild_id = GuildId::new(GUILD);
        let player = Arc::new(LavalinkPlayer::new(
            guild_id,
            ChannelId::new(1),
            100,
            Arc::new(rest),
            Songbird::serenity(),
            Arc::downgrade(players),
        ));
        players.insert(guild_id, player.clone());
        player
    }

    fn titles(player: &LavalinkPlayer) -> (Option<String>, Vec<String>) {
        let snapshot = player.snapshot();
        (
            snapshot.current.map(|t| t.info.title),
            snapshot.queue.into_iter().map(|t| t.info.title).collect(),
        )
    }

    async fn sent_tracks(server: &MockServer) -> Vec<serde_json::Value> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.method.as_str() == "PATCH")
            .map(|request| request.body_json::<serde_json::Value>().unwrap()["track"].clone())
            .collect()
    }

    #[test]
    fn test_position_advances_while_playing() {
        let state = state_with(Some(track("a", "https://example.com/a")), false, 1_000);
        let position = state.position_now().unwrap();
        assert!(position >= Duration::from_millis(3_000));
    }

    #[test]
    fn test_position_frozen_while_paused() {
        let state = state_with(Some(track("a", "https://example.com/a")), true, 1_000);
        assert_eq!(state.position_now(), Some(Duration::from_millis(1_000)));
    }

    #[test]
    fn test_position_clamped_to_track_length() {
        let state = state_with(Some(track("a", "https://example.com/a")), false, 214_900);
        assert_eq!(state.position_now(), Some(Duration::from_millis(215_000)));
    }

    #[test]
    fn test_no_position_without_track() {
        let state = state_with(None, false, 5_000);
        assert_eq!(state.position_now(), None);
        assert_eq!(
            PlayerSnapshot::status_of(state.current.as_ref(), state.paused),
            PlayerStatus::Stopped
        );
    }

    #[test]
    fn test_stale_end_event_is_not_current() {
        let mut state = LocalState::new(ChannelId::new(1), 100);
        state.started(track("a", "https://example.com/a"));

        assert!(state.is_current(&track("a", "https://example.com/other")));
        assert!(!state.is_current(&track("b", "https://example.com/a")));

        state.stopped();
        assert!(!state.is_current(&track("a", "https://example.com/a")));
    }

    #[test]
    fn test_started_next_dequeues_in_order() {
        let mut state = LocalState::new(ChannelId::new(1), 100);
        assert_eq!(state.enqueue(track("a", "https://example.com/a")), 1);
        assert_eq!(state.enqueue(track("b", "https://example.com/b")), 2);
        state.paused = true;

        let next = state.started_next().unwrap();
        assert_eq!(next.info.title, "a");
        assert_eq!(state.current.as_ref().unwrap().info.title, "a");
        assert_eq!(state.queue.len(), 1);
        assert!(!state.paused);

        state.started_next();
        assert!(state.started_next().is_none());
        assert_eq!(state.current.as_ref().unwrap().info.title, "b");
    }

    #[test]
    fn test_parse_guild() {
        assert_eq!(parse_guild("42"), Some(GuildId::new(42)));
        assert_eq!(parse_guild("0"), None);
        assert_eq!(parse_guild("nope"), None);
    }

    #[tokio::test]
    async fn test_play_starts_then_queues() {
        let server = accepting_node().await;
        let player = player_on(&server, &Arc::new(DashMap::new()));

        assert_eq!(player.play(track("a", "https://example.com/a")).await.unwrap(), 0);
        assert_eq!(player.play(track("b", "https://example.com/b")).await.unwrap(), 1);
        assert_eq!(player.play(track("c", "https://example.com/c")).await.unwrap(), 2);

        assert_eq!(
            titles(&player),
            (Some("a".to_string()), vec!["b".to_string(), "c".to_string()])
        );
        assert_eq!(sent_tracks(&server).await.len(), 1);
    }

    #[tokio::test]
    async fn test_play_failure_leaves_player_idle() {
        let server = failing_node().await;
        let player = player_on(&server, &Arc::new(DashMap::new()));

        assert!(player.play(track("a", "https://example.com/a")).await.is_err());
        assert_eq!(titles(&player), (None, vec![]));
    }

    #[tokio::test]
    async fn test_skip_starts_next_track() {
        let server = accepting_node().await;
        let player = player_on(&server, &Arc::new(DashMap::new()));
        player.state.lock().started(track("a", "https://example.com/a"));
        player.state.lock().enqueue(track("b", "https://example.com/b"));

        let next = player.skip().await.unwrap();

        assert_eq!(next.map(|t| t.info.title), Some("b".to_string()));
        assert_eq!(titles(&player), (Some("b".to_string()), vec![]));
        assert_eq!(sent_tracks(&server).await, vec![serde_json::json!({ "encoded": "enc:b" })]);
    }

    #[tokio::test]
    async fn test_skip_with_empty_queue_halts() {
        let server = accepting_node().await;
        let player = player_on(&server, &Arc::new(DashMap::new()));
        player.state.lock().started(track("a", "https://example.com/a"));

        assert!(player.skip().await.unwrap().is_none());
        assert_eq!(titles(&player), (None, vec![]));
        assert_eq!(sent_tracks(&server).await, vec![serde_json::json!({ "encoded": null })]);
    }

    #[tokio::test]
    async fn test_failed_skip_keeps_queue() {
        let server = failing_node().await;
        let player = player_on(&server, &Arc::new(DashMap::new()));
        player.state.lock().started(track("a", "https://example.com/a"));
        player.state.lock().enqueue(track("b", "https://example.com/b"));

        assert!(player.skip().await.is_err());
        assert_eq!(titles(&player), (Some("a".to_string()), vec!["b".to_string()]));
    }

    #[tokio::test]
    async fn test_advance_after_finished_track() {
        let server = accepting_node().await;
        let player = player_on(&server, &Arc::new(DashMap::new()));
        let a = track("a", "https://example.com/a");
        player.state.lock().started(a.clone());
        player.state.lock().enqueue(track("b", "https://example.com/b"));

        player.advance_after(&a).await.unwrap();

        assert_eq!(titles(&player), (Some("b".to_string()), vec![]));
    }

    #[tokio::test]
    async fn test_advance_ignores_stale_track() {
        let server = accepting_node().await;
        let player = player_on(&server, &Arc::new(DashMap::new()));
        player.state.lock().started(track("b", "https://example.com/b"));
        player.state.lock().enqueue(track("c", "https://example.com/c"));

        player
            .advance_after(&track("a", "https://example.com/a"))
            .await
            .unwrap();

        assert_eq!(titles(&player), (Some("b".to_string()), vec!["c".to_string()]));
        assert!(sent_tracks(&server).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_advance_keeps_next_track_queued() {
        let server = failing_node().await;
        let player = player_on(&server, &Arc::new(DashMap::new()));
        let a = track("a", "https://example.com/a");
        player.state.lock().started(a.clone());
        player.state.lock().enqueue(track("b", "https://example.com/b"));

        assert!(player.advance_after(&a).await.is_err());
        assert_eq!(titles(&player), (None, vec!["b".to_string()]));
    }

    #[tokio::test]
    async fn test_volume_kept_after_node_accepts() {
        let server = accepting_node().await;
        let player = player_on(&server, &Arc::new(DashMap::new()));

        player.set_volume(0.4).await.unwrap();

        assert_eq!(player.snapshot().volume, 40);
    }

    #[tokio::test]
    async fn test_volume_unchanged_when_node_rejects() {
        let server = failing_node().await;
        let player = player_on(&server, &Arc::new(DashMap::new()));

        assert!(player.set_volume(2.5).await.is_err());
        assert_eq!(player.snapshot().volume, 100);
    }

    #[tokio::test]
    async fn test_disconnect_forgets_player() {
        let server = accepting_node().await;
        let players = Arc::new(DashMap::new());
        let player = player_on(&server, &players);

        player.disconnect().await.unwrap();

        assert!(players.get(&GuildId::new(GUILD)).is_none());
    }

    #[tokio::test]
    async fn test_failed_disconnect_keeps_player() {
        let server = failing_node().await;
        let players = Arc::new(DashMap::new());
        let player = player_on(&server, &players);

        assert!(player.disconnect().await.is_err());
        assert!(players.get(&GuildId::new(GUILD)).is_some());
    }

    #[tokio::test]
    async fn test_close_after_node_never_became_ready() {
        let server = failing_node().await;
        let address = server.address();
        let config = Config {
            lavalink_host: address.ip().to_string(),
            lavalink_port: address.port(),
            ..Config::default()
        };
        let rest = Arc::new(RestClient::new(&config).unwrap());
        let node = LavalinkNode::connect(
            &config,
            rest,
            Songbird::serenity(),
            UserId::new(1),
            CancellationToken::new(),
        );

        assert!(node.wait_ready(Duration::from_millis(100)).await.is_err());

        tokio::time::timeout(Duration::from_secs(5), node.close())
            .await
            .expect("socket task kept running");
        assert!(node.socket_task.lock().is_none());
    }
}
