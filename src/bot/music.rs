//! Slash command handlers.
//!
//! Each handler declares what it needs from the player, resolves it, performs
//! one operation and produces exactly one [`Reply`]. Resolution failures become
//! diagnostics; engine errors during the operation are returned as `Err` for
//! the gateway layer to report.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use crate::audio::player::{Player, PlayerDirectory, PlayerStatus, TrackSearch, VoiceStates};
use crate::audio::precondition::Precondition;
use crate::audio::resolver::{resolve, ConnectBehavior, RequestContext, RetrieveRequest};
use crate::bot::diagnostics::diagnostic;
use crate::ui::embeds::format_duration;

pub const DEFAULT_VOLUME: i64 = 40;
pub const MAX_VOLUME: i64 = 1000;

/// Discord rejects embeds with more fields than this.
const MAX_EMBED_FIELDS: usize = 25;

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Embed {
        title: String,
        fields: Vec<(String, String)>,
    },
    /// A failed requirement, rendered as an error embed.
    Diagnostic(String),
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }
}

/// The collaborators a command needs, borrowed for one invocation.
pub struct Music<'a> {
    pub players: &'a dyn PlayerDirectory,
    pub tracks: &'a dyn TrackSearch,
    pub voice: &'a dyn VoiceStates,
}

impl Music<'_> {
    async fn player(
        &self,
        ctx: &RequestContext,
        connect: ConnectBehavior,
        preconditions: &[Precondition],
    ) -> Result<Arc<dyn Player>, Reply> {
        let request = RetrieveRequest::new(connect, preconditions);
        resolve(self.players, self.voice, ctx, &request)
            .await
            .map_err(|failure| {
                info!(
                    "Requisito no cumplido en guild {} por {}: {:?}",
                    ctx.guild, ctx.caller, failure
                );
                Reply::Diagnostic(diagnostic(&failure).to_string())
            })
    }

    pub async fn play(&self, ctx: &RequestContext, query: &str) -> Result<Reply> {
        let player = match self.player(ctx, ConnectBehavior::AllowJoin, &[]).await {
            Ok(player) => player,
            Err(reply) => return Ok(reply),
        };

        let Some(track) = self.tracks.load_track(query).await? else {
            return Ok(Reply::text("😖 No results."));
        };

        let uri = track.display_uri().to_string();
        let position = player.play(track).await?;

        if position == 0 {
            Ok(Reply::Text(format!("🔈 Playing: {}", uri)))
        } else {
            Ok(Reply::Text(format!("🔈 Added to queue: {}", uri)))
        }
    }

    pub async fn stop(&self, ctx: &RequestContext) -> Result<Reply> {
        let player = match self
            .player(ctx, ConnectBehavior::None, &[Precondition::Playing])
            .await
        {
            Ok(player) => player,
            Err(reply) => return Ok(reply),
        };

        if player.snapshot().current.is_none() {
            return Ok(Reply::text("Nothing playing!"));
        }

        player.stop().await?;
        Ok(Reply::text("Stopped playing."))
    }

    pub async fn skip(&self, ctx: &RequestContext) -> Result<Reply> {
        let player = match self
            .player(
                ctx,
                ConnectBehavior::None,
                &[Precondition::Playing, Precondition::QueueNotEmpty],
            )
            .await
        {
            Ok(player) => player,
            Err(reply) => return Ok(reply),
        };

        if player.snapshot().current.is_none() {
            return Ok(Reply::text("Nothing playing!"));
        }

        match player.skip().await? {
            Some(track) => Ok(Reply::Text(format!(
                "Skipped. Now playing: {}",
                track.display_uri()
            ))),
            None => Ok(Reply::text(
                "Skipped. Stopped playing because the queue is now empty.",
            )),
        }
    }

    pub async fn resume(&self, ctx: &RequestContext) -> Result<Reply> {
        let player = match self
            .player(ctx, ConnectBehavior::None, &[Precondition::Paused])
            .await
        {
            Ok(player) => player,
            Err(reply) => return Ok(reply),
        };

        player.resume().await?;
        Ok(Reply::text("Resumed."))
    }

    pub async fn pause(&self, ctx: &RequestContext) -> Result<Reply> {
        let player = match self
            .player(ctx, ConnectBehavior::None, &[Precondition::NotPaused])
            .await
        {
            Ok(player) => player,
            Err(reply) => return Ok(reply),
        };

        // Another command may have paused it since resolution.
        if player.snapshot().status == PlayerStatus::Paused {
            return Ok(Reply::text("Player is already paused."));
        }

        player.pause().await?;
        Ok(Reply::text("Paused."))
    }

    pub async fn position(&self, ctx: &RequestContext) -> Result<Reply> {
        let player = match self
            .player(ctx, ConnectBehavior::None, &[Precondition::Playing])
            .await
        {
            Ok(player) => player,
            Err(reply) => return Ok(reply),
        };

        let snapshot = player.snapshot();
        let Some(track) = snapshot.current else {
            return Ok(Reply::text("Nothing playing!"));
        };

        let position = format_duration(snapshot.position.unwrap_or_default());
        let duration = if track.info.is_stream {
            "LIVE".to_string()
        } else {
            format_duration(track.duration())
        };
        Ok(Reply::Text(format!("Position: {} / {}.", position, duration)))
    }

    pub async fn queue(&self, ctx: &RequestContext) -> Result<Reply> {
        let player = match self
            .player(ctx, ConnectBehavior::None, &[Precondition::QueueNotEmpty])
            .await
        {
            Ok(player) => player,
            Err(reply) => return Ok(reply),
        };

        let queue = player.snapshot().queue;
        if queue.is_empty() {
            return Ok(Reply::text("Nothing in queue!"));
        }

        let shown = if queue.len() > MAX_EMBED_FIELDS {
            MAX_EMBED_FIELDS - 1
        } else {
            queue.len()
        };
        let mut fields: Vec<(String, String)> = queue
            .iter()
            .take(shown)
            .map(|track| (track.info.title.clone(), track.display_uri().to_string()))
            .collect();
        if queue.len() > shown {
            fields.push((
                "…".to_string(),
                format!("and {} more tracks", queue.len() - shown),
            ));
        }

        Ok(Reply::Embed {
            title: "Queued Tracks".to_string(),
            fields,
        })
    }

    pub async fn shuffle(&self, ctx: &RequestContext) -> Result<Reply> {
        let player = match self
            .player(ctx, ConnectBehavior::None, &[Precondition::QueueNotEmpty])
            .await
        {
            Ok(player) => player,
            Err(reply) => return Ok(reply),
        };

        if player.snapshot().queue.is_empty() {
            return Ok(Reply::text("Nothing in queue!"));
        }

        if let Err(e) = player.shuffle().await {
            error!("Error al mezclar la cola en guild {}: {}", ctx.guild, e);
            return Err(e.into());
        }
        Ok(Reply::text("Tracks shuffled!"))
    }

    pub async fn volume(&self, ctx: &RequestContext, volume: i64) -> Result<Reply> {
        if !(0..=MAX_VOLUME).contains(&volume) {
            return Ok(Reply::text("Volume out of range: 0% - 1000%!"));
        }

        let player = match self.player(ctx, ConnectBehavior::None, &[]).await {
            Ok(player) => player,
            Err(reply) => return Ok(reply),
        };

        let previous = player.snapshot().volume;
        player.set_volume(volume as f32 / 100.0).await?;
        info!("🔊 Volumen en guild {}: {}% -> {}%", ctx.guild, previous, volume);
        Ok(Reply::Text(format!("Volume updated: {}%", volume)))
    }

    pub async fn disconnect(&self, ctx: &RequestContext) -> Result<Reply> {
        let player = match self.player(ctx, ConnectBehavior::None, &[]).await {
            Ok(player) => player,
            Err(reply) => return Ok(reply),
        };

        player.disconnect().await?;
        Ok(Reply::text("Disconnected."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::fake::{Call, FakeDirectory, FakePlayer, FakeState};
    use crate::audio::player::{MockTrackSearch, MockVoiceStates};
    use crate::audio::protocol::tests::track;
    use crate::audio::protocol::Track;
    use crate::audio::resolver::RetrieveFailure;
    use pretty_assertions::assert_eq;
    use serenity::all::{ChannelId, GuildId, UserId};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const GUILD: u64 = 1;
    const CHANNEL: u64 = 2;

    fn ctx() -> RequestContext {
        RequestContext {
            caller: UserId::new(3),
            guild: GuildId::new(GUILD),
            cancel: CancellationToken::new(),
        }
    }

    fn in_channel() -> MockVoiceStates {
        let mut voice = MockVoiceStates::new();
        voice
            .expect_channel_of()
            .returning(|_, _| Some(ChannelId::new(CHANNEL)));
        voice
    }

    fn no_search() -> MockTrackSearch {
        let mut tracks = MockTrackSearch::new();
        tracks.expect_load_track().never();
        tracks
    }

    fn player_with(state: FakeState) -> Arc<FakePlayer> {
        FakePlayer::new(GuildId::new(GUILD), ChannelId::new(CHANNEL), state)
    }

    fn playing(queue: Vec<Track>) -> FakeState {
        FakeState {
            current: Some(track("now", "https://example.com/now")),
            queue,
            volume: 100,
            ..Default::default()
        }
    }

    fn diagnostic_for(failure: RetrieveFailure) -> Reply {
        Reply::Diagnostic(diagnostic(&failure).to_string())
    }

    #[tokio::test]
    async fn test_play_starts_when_idle() {
        let directory = FakeDirectory::default();
        let voice = in_channel();
        let mut tracks = MockTrackSearch::new();
        tracks
            .expect_load_track()
            .withf(|query| query == "never gonna give you up")
            .returning(|_| Ok(Some(track("rick", "https://youtu.be/dQw4w9WgXcQ"))));
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        let reply = music.play(&ctx(), "never gonna give you up").await.unwrap();

        assert_eq!(reply, Reply::text("🔈 Playing: https://youtu.be/dQw4w9WgXcQ"));
        assert_eq!(directory.joins.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_play_enqueues_when_busy() {
        let player = player_with(playing(vec![]));
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let mut tracks = MockTrackSearch::new();
        tracks
            .expect_load_track()
            .returning(|_| Ok(Some(track("next", "https://example.com/next"))));
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        let reply = music.play(&ctx(), "next").await.unwrap();

        assert_eq!(reply, Reply::text("🔈 Added to queue: https://example.com/next"));
        assert!(directory.joins.lock().is_empty());
    }

    #[tokio::test]
    async fn test_play_allowed_while_paused() {
        let player = player_with(FakeState {
            paused: true,
            ..playing(vec![])
        });
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let mut tracks = MockTrackSearch::new();
        tracks
            .expect_load_track()
            .returning(|_| Ok(Some(track("next", "https://example.com/next"))));
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        let reply = music.play(&ctx(), "next").await.unwrap();

        assert_eq!(reply, Reply::text("🔈 Added to queue: https://example.com/next"));
    }

    #[tokio::test]
    async fn test_play_without_results_mutates_nothing() {
        let player = player_with(FakeState::default());
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let mut tracks = MockTrackSearch::new();
        tracks.expect_load_track().returning(|_| Ok(None));
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        let reply = music.play(&ctx(), "neverland").await.unwrap();

        assert_eq!(reply, Reply::text("😖 No results."));
        assert!(player.calls().is_empty());
    }

    #[tokio::test]
    async fn test_play_requires_caller_in_voice() {
        let directory = FakeDirectory::default();
        let mut voice = MockVoiceStates::new();
        voice.expect_channel_of().returning(|_, _| None);
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        let reply = music.play(&ctx(), "anything").await.unwrap();

        assert_eq!(
            reply,
            diagnostic_for(RetrieveFailure::CallerNotInVoiceChannel)
        );
    }

    #[tokio::test]
    async fn test_stop() {
        let player = player_with(playing(vec![]));
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(music.stop(&ctx()).await.unwrap(), Reply::text("Stopped playing."));
        assert_eq!(player.calls(), vec![Call::Stop]);
    }

    #[tokio::test]
    async fn test_stop_without_connection() {
        let directory = FakeDirectory::default();
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(
            music.stop(&ctx()).await.unwrap(),
            diagnostic_for(RetrieveFailure::BotNotConnected)
        );
    }

    #[tokio::test]
    async fn test_skip_to_next_track() {
        let player = player_with(playing(vec![track("next", "https://example.com/next")]));
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(
            music.skip(&ctx()).await.unwrap(),
            Reply::text("Skipped. Now playing: https://example.com/next")
        );
    }

    #[tokio::test]
    async fn test_skip_when_nothing_follows() {
        let player = player_with(playing(vec![track("next", "https://example.com/next")]));
        player.skip_finds_nothing.store(true, Ordering::SeqCst);
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(
            music.skip(&ctx()).await.unwrap(),
            Reply::text("Skipped. Stopped playing because the queue is now empty.")
        );
    }

    #[tokio::test]
    async fn test_skip_checks_playing_before_queue() {
        let player = player_with(FakeState::default());
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(
            music.skip(&ctx()).await.unwrap(),
            diagnostic_for(RetrieveFailure::PreconditionFailed(Precondition::Playing))
        );
        assert!(player.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let player = player_with(playing(vec![]));
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(music.pause(&ctx()).await.unwrap(), Reply::text("Paused."));
        assert_eq!(
            music.pause(&ctx()).await.unwrap(),
            diagnostic_for(RetrieveFailure::PreconditionFailed(Precondition::NotPaused))
        );
        assert_eq!(music.resume(&ctx()).await.unwrap(), Reply::text("Resumed."));
        assert_eq!(player.calls(), vec![Call::Pause, Call::Resume]);
    }

    #[tokio::test]
    async fn test_resume_rejected_when_not_paused() {
        let player = player_with(playing(vec![]));
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(
            music.resume(&ctx()).await.unwrap(),
            diagnostic_for(RetrieveFailure::PreconditionFailed(Precondition::Paused))
        );
        assert!(player.calls().is_empty());
    }

    #[tokio::test]
    async fn test_position() {
        let player = player_with(FakeState {
            position: Some(Duration::from_secs(83)),
            ..playing(vec![])
        });
        let directory = FakeDirectory::with_player(player);
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(
            music.position(&ctx()).await.unwrap(),
            Reply::text("Position: 1:23 / 3:35.")
        );
    }

    #[tokio::test]
    async fn test_queue_lists_tracks_in_order() {
        let player = player_with(playing(vec![
            track("first", "https://example.com/1"),
            track("second", "https://example.com/2"),
        ]));
        let directory = FakeDirectory::with_player(player);
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(
            music.queue(&ctx()).await.unwrap(),
            Reply::Embed {
                title: "Queued Tracks".to_string(),
                fields: vec![
                    ("first".to_string(), "https://example.com/1".to_string()),
                    ("second".to_string(), "https://example.com/2".to_string()),
                ],
            }
        );
    }

    #[tokio::test]
    async fn test_long_queue_fits_in_one_embed() {
        let queue = (0..40)
            .map(|i| track(&format!("t{}", i), "https://example.com/t"))
            .collect();
        let directory = FakeDirectory::with_player(player_with(playing(queue)));
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        let Reply::Embed { fields, .. } = music.queue(&ctx()).await.unwrap() else {
            panic!("expected an embed");
        };
        assert_eq!(fields.len(), MAX_EMBED_FIELDS);
        assert_eq!(fields[24].1, "and 16 more tracks");
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let directory = FakeDirectory::with_player(player_with(playing(vec![])));
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(
            music.queue(&ctx()).await.unwrap(),
            diagnostic_for(RetrieveFailure::PreconditionFailed(Precondition::QueueNotEmpty))
        );
        assert_eq!(
            music.shuffle(&ctx()).await.unwrap(),
            diagnostic_for(RetrieveFailure::PreconditionFailed(Precondition::QueueNotEmpty))
        );
    }

    #[tokio::test]
    async fn test_shuffle() {
        let player = player_with(playing(vec![
            track("a", "https://example.com/a"),
            track("b", "https://example.com/b"),
        ]));
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(music.shuffle(&ctx()).await.unwrap(), Reply::text("Tracks shuffled!"));
        assert_eq!(player.calls(), vec![Call::Shuffle]);
    }

    #[tokio::test]
    async fn test_volume_out_of_range_skips_resolution() {
        let directory = FakeDirectory::default();
        let voice = MockVoiceStates::new();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(
            music.volume(&ctx(), 1500).await.unwrap(),
            Reply::text("Volume out of range: 0% - 1000%!")
        );
        assert_eq!(
            music.volume(&ctx(), -1).await.unwrap(),
            Reply::text("Volume out of range: 0% - 1000%!")
        );
        assert_eq!(directory.lookups(), 0);
    }

    #[tokio::test]
    async fn test_volume_bounds_accepted() {
        let player = player_with(playing(vec![]));
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(music.volume(&ctx(), 0).await.unwrap(), Reply::text("Volume updated: 0%"));
        assert_eq!(
            music.volume(&ctx(), 1000).await.unwrap(),
            Reply::text("Volume updated: 1000%")
        );
        assert_eq!(
            music.volume(&ctx(), DEFAULT_VOLUME).await.unwrap(),
            Reply::text("Volume updated: 40%")
        );
        assert_eq!(
            player.calls(),
            vec![Call::Volume(0.0), Call::Volume(10.0), Call::Volume(0.4)]
        );
    }

    #[tokio::test]
    async fn test_disconnect() {
        let player = player_with(FakeState::default());
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };

        assert_eq!(music.disconnect(&ctx()).await.unwrap(), Reply::text("Disconnected."));
        assert_eq!(player.calls(), vec![Call::Disconnect]);
    }

    #[tokio::test]
    async fn test_cancelled_command_touches_nothing() {
        let player = player_with(playing(vec![]));
        let directory = FakeDirectory::with_player(player.clone());
        let voice = in_channel();
        let tracks = no_search();
        let music = Music { players: &directory, tracks: &tracks, voice: &voice };
        let ctx = ctx();
        ctx.cancel.cancel();

        assert_eq!(
            music.pause(&ctx).await.unwrap(),
            diagnostic_for(RetrieveFailure::Cancelled)
        );
        assert!(player.calls().is_empty());
        assert_eq!(directory.lookups(), 0);
    }
}
