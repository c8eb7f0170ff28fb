//! Collaborator contracts of the command layer.
//!
//! The command handlers only see these traits. [`LavalinkNode`] implements the
//! directory and the search, the serenity cache implements [`VoiceStates`], and
//! tests plug in fakes.
//!
//! [`LavalinkNode`]: crate::audio::lavalink_client::LavalinkNode

use async_trait::async_trait;
use serenity::all::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::error::EngineError;
use crate::audio::protocol::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Playing,
    Paused,
    Stopped,
}

/// Point-in-time view of a guild's player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    pub status: PlayerStatus,
    /// Percent, 0 - 1000.
    pub volume: u16,
    pub position: Option<Duration>,
}

impl PlayerSnapshot {
    /// Derives the status from the current track and the paused flag.
    pub fn status_of(current: Option<&Track>, paused: bool) -> PlayerStatus {
        match (current, paused) {
            (None, _) => PlayerStatus::Stopped,
            (Some(_), true) => PlayerStatus::Paused,
            (Some(_), false) => PlayerStatus::Playing,
        }
    }
}

/// A guild's playback session on the audio node.
#[async_trait]
pub trait Player: Send + Sync {
    /// Voice channel the bot is connected to for this session.
    fn voice_channel(&self) -> Option<ChannelId>;

    fn snapshot(&self) -> PlayerSnapshot;

    /// Starts `track` if nothing is playing, otherwise appends it to the queue.
    /// Returns the queue position, 0 meaning it started immediately.
    async fn play(&self, track: Track) -> Result<usize, EngineError>;

    async fn stop(&self) -> Result<(), EngineError>;

    /// Advances to the next queued track and returns it, `None` when playback
    /// stopped because there was nothing left.
    async fn skip(&self) -> Result<Option<Track>, EngineError>;

    async fn pause(&self) -> Result<(), EngineError>;

    async fn resume(&self) -> Result<(), EngineError>;

    /// `volume` is a factor, 1.0 being 100%.
    async fn set_volume(&self, volume: f32) -> Result<(), EngineError>;

    async fn shuffle(&self) -> Result<(), EngineError>;

    /// Destroys the session and leaves the voice channel.
    async fn disconnect(&self) -> Result<(), EngineError>;
}

/// At most one player per guild, created on join.
#[async_trait]
pub trait PlayerDirectory: Send + Sync {
    async fn get(&self, guild_id: GuildId) -> Result<Option<Arc<dyn Player>>, EngineError>;

    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn Player>, EngineError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackSearch: Send + Sync {
    /// `Ok(None)` when nothing matched the query.
    async fn load_track(&self, query: &str) -> Result<Option<Track>, EngineError>;
}

/// Voice channel membership as seen by the gateway.
#[cfg_attr(test, mockall::automock)]
pub trait VoiceStates: Send + Sync {
    fn channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId>;
}
