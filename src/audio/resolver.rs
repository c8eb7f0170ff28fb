//! Player retrieval under a command's requirements.
//!
//! Connectivity and identity are checked before any precondition: a state check
//! only means something against a session the caller shares a channel with.

use serenity::all::{GuildId, UserId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::audio::player::{Player, PlayerDirectory, VoiceStates};
use crate::audio::precondition::Precondition;

/// Who issued a command, where, and the signal that aborts it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub caller: UserId,
    pub guild: GuildId,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    AllowJoin,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStateBehavior {
    RequireSameChannel,
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveRequest {
    pub connect: ConnectBehavior,
    pub voice_state: VoiceStateBehavior,
    /// Evaluated in order, the first failing one is reported.
    pub preconditions: Vec<Precondition>,
}

impl RetrieveRequest {
    pub fn new(connect: ConnectBehavior, preconditions: &[Precondition]) -> Self {
        Self {
            connect,
            voice_state: VoiceStateBehavior::RequireSameChannel,
            preconditions: preconditions.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieveFailure {
    CallerNotInVoiceChannel,
    BotNotConnected,
    VoiceChannelMismatch,
    PreconditionFailed(Precondition),
    EngineUnavailable,
    Cancelled,
}

pub type RetrieveResult = Result<Arc<dyn Player>, RetrieveFailure>;

pub async fn resolve(
    directory: &dyn PlayerDirectory,
    voice: &dyn VoiceStates,
    ctx: &RequestContext,
    request: &RetrieveRequest,
) -> RetrieveResult {
    if ctx.cancel.is_cancelled() {
        return Err(RetrieveFailure::Cancelled);
    }

    let existing = directory.get(ctx.guild).await.map_err(|e| {
        warn!("Nodo de audio no disponible para guild {}: {}", ctx.guild, e);
        RetrieveFailure::EngineUnavailable
    })?;

    let player = match (existing, request.connect) {
        (Some(player), _) => player,
        (None, ConnectBehavior::AllowJoin) => {
            let channel = voice
                .channel_of(ctx.guild, ctx.caller)
                .ok_or(RetrieveFailure::CallerNotInVoiceChannel)?;

            debug!("Uniéndose al canal {} en guild {}", channel, ctx.guild);
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(RetrieveFailure::Cancelled),
                joined = directory.join(ctx.guild, channel) => joined.map_err(|e| {
                    warn!("No se pudo unir al canal {} en guild {}: {}", channel, ctx.guild, e);
                    RetrieveFailure::EngineUnavailable
                })?,
            }
        }
        (None, ConnectBehavior::None) => return Err(RetrieveFailure::BotNotConnected),
    };

    if request.voice_state == VoiceStateBehavior::RequireSameChannel {
        let caller_channel = voice.channel_of(ctx.guild, ctx.caller);
        if caller_channel.is_none() || caller_channel != player.voice_channel() {
            return Err(RetrieveFailure::VoiceChannelMismatch);
        }
    }

    if !request.preconditions.is_empty() {
        let snapshot = player.snapshot();
        if let Some(failed) = request
            .preconditions
            .iter()
            .find(|precondition| !precondition.evaluate(&snapshot))
        {
            return Err(RetrieveFailure::PreconditionFailed(*failed));
        }
    }

    Ok(player)
}
