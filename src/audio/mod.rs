//! # Audio Module
//!
//! Everything between a slash command and the Lavalink node.
//!
//! ## Architecture
//!
//! ### [`player`] - Collaborator contracts
//! - [`player::Player`]: one guild's playback session
//! - [`player::PlayerDirectory`]: lookup and lazy creation of players
//! - [`player::TrackSearch`] and [`player::VoiceStates`]
//!
//! ### [`precondition`] and [`resolver`] - Command requirements
//! - Pure precondition checks over a [`player::PlayerSnapshot`]
//! - Player retrieval with connect/voice-state behavior and ordered
//!   preconditions
//!
//! ### [`lavalink_client`], [`rest`], [`protocol`] - Lavalink v4 client
//! - REST calls for track loading and player updates
//! - Websocket event loop with session resuming and queue advancement
//!
//! ### [`server`] - Local Lavalink process
//! - Spawns the jar, waits for it, forwards its output to the log

pub mod error;
pub mod lavalink_client;
pub mod player;
pub mod precondition;
pub mod protocol;
pub mod resolver;
pub mod rest;
pub mod server;
