use crate::audio::precondition::Precondition;
use crate::audio::resolver::RetrieveFailure;

/// Shown when a command fails for a reason the user cannot act on.
pub const UNKNOWN_ERROR: &str = "Unknown error.";

/// User-facing text for a failed player retrieval.
///
/// The match is exhaustive on purpose: a new failure reason does not compile
/// until it has a message.
pub fn diagnostic(failure: &RetrieveFailure) -> &'static str {
    match failure {
        RetrieveFailure::CallerNotInVoiceChannel => "You must be in a voice channel.",
        RetrieveFailure::BotNotConnected => "The bot is not connected to any channel.",
        RetrieveFailure::VoiceChannelMismatch => {
            "You must be in the same voice channel as the bot."
        }
        RetrieveFailure::PreconditionFailed(Precondition::Playing) => {
            "The player is currently not playing any track."
        }
        RetrieveFailure::PreconditionFailed(Precondition::NotPaused) => {
            "The player is already paused."
        }
        RetrieveFailure::PreconditionFailed(Precondition::Paused) => "The player is not paused.",
        RetrieveFailure::PreconditionFailed(Precondition::QueueNotEmpty) => "The queue is empty.",
        RetrieveFailure::EngineUnavailable => "The audio node is unavailable, try again later.",
        RetrieveFailure::Cancelled => "The request was cancelled.",
    }
}
