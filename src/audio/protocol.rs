//! Wire types of the Lavalink v4 protocol, client side.
//!
//! Only the messages the bot reads or sends are modelled. Unknown websocket
//! operations and event types deserialize into `Unknown` so a newer node does
//! not break the event loop.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single audio track as returned by the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Base64-encoded track data, opaque to the bot.
    pub encoded: String,
    pub info: TrackInfo,
    #[serde(default)]
    pub plugin_info: serde_json::Value,
    #[serde(default)]
    pub user_data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    /// Length in milliseconds.
    pub length: u64,
    pub is_stream: bool,
    /// Start position in milliseconds.
    pub position: u64,
    pub title: String,
    pub uri: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub isrc: Option<String>,
    pub source_name: String,
}

impl Track {
    /// The track's URI, falling back to its title for sources without one.
    pub fn display_uri(&self) -> &str {
        self.info.uri.as_deref().unwrap_or(&self.info.title)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.info.length)
    }
}

/// Response of `GET /v4/loadtracks`.
#[derive(Debug, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "camelCase")]
pub enum LoadResult {
    Track(Track),
    Playlist(PlaylistData),
    Search(Vec<Track>),
    Empty {},
    Error(LoadException),
}

impl LoadResult {
    /// The track a `play` request should use: the loaded track, the first search
    /// hit, or the playlist's selected (else first) track.
    pub fn into_first_track(self) -> Option<Track> {
        match self {
            LoadResult::Track(track) => Some(track),
            LoadResult::Search(tracks) => tracks.into_iter().next(),
            LoadResult::Playlist(playlist) => {
                let selected = usize::try_from(playlist.info.selected_track).ok();
                let mut tracks = playlist.tracks;
                match selected {
                    Some(index) if index < tracks.len() => Some(tracks.swap_remove(index)),
                    _ => tracks.into_iter().next(),
                }
            }
            LoadResult::Empty {} | LoadResult::Error(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistData {
    pub info: PlaylistInfo,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub name: String,
    /// -1 when no track is selected.
    pub selected_track: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadException {
    pub message: Option<String>,
    pub severity: String,
    pub cause: String,
}

/// Error body returned by the REST API on non-2xx responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub message: Option<String>,
    pub path: String,
}

/// Messages received over the websocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum IncomingMessage {
    Ready {
        resumed: bool,
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    PlayerUpdate {
        #[serde(rename = "guildId")]
        guild_id: String,
        state: PlayerState,
    },
    Stats(Stats),
    Event(NodeEvent),
    #[serde(other)]
    Unknown,
}

/// Position report attached to `playerUpdate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// Unix timestamp in milliseconds.
    pub time: u64,
    /// Position in milliseconds.
    #[serde(default)]
    pub position: u64,
    pub connected: bool,
    /// -1 when not connected.
    pub ping: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub players: u32,
    pub playing_players: u32,
    /// Milliseconds.
    pub uptime: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum NodeEvent {
    TrackStartEvent {
        #[serde(rename = "guildId")]
        guild_id: String,
        track: Track,
    },
    TrackEndEvent {
        #[serde(rename = "guildId")]
        guild_id: String,
        track: Track,
        reason: TrackEndReason,
    },
    TrackExceptionEvent {
        #[serde(rename = "guildId")]
        guild_id: String,
        track: Track,
        exception: LoadException,
    },
    TrackStuckEvent {
        #[serde(rename = "guildId")]
        guild_id: String,
        track: Track,
        #[serde(rename = "thresholdMs")]
        threshold_ms: u64,
    },
    WebSocketClosedEvent {
        #[serde(rename = "guildId")]
        guild_id: String,
        code: u16,
        reason: String,
        #[serde(rename = "byRemote")]
        by_remote: bool,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Whether the next queued track should start after this end.
    pub fn may_start_next(self) -> bool {
        matches!(self, TrackEndReason::Finished | TrackEndReason::LoadFailed)
    }
}

/// Body of `PATCH /v4/sessions/{sessionId}/players/{guildId}`.
///
/// Absent fields are left untouched by the node.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<UpdatePlayerTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceState>,
}

/// `encoded: None` serializes as `null`, which stops the player.
#[derive(Debug, Serialize)]
pub struct UpdatePlayerTrack {
    pub encoded: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceState {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
}

/// Body of `PATCH /v4/sessions/{sessionId}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub resuming: bool,
    /// Seconds.
    pub timeout: u64,
}
