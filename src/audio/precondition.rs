use crate::audio::player::{PlayerSnapshot, PlayerStatus};

/// A condition a command requires of the player before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precondition {
    Playing,
    NotPaused,
    Paused,
    QueueNotEmpty,
}

impl Precondition {
    pub fn evaluate(self, snapshot: &PlayerSnapshot) -> bool {
        match self {
            Precondition::Playing => snapshot.status == PlayerStatus::Playing,
            Precondition::NotPaused => snapshot.status != PlayerStatus::Paused,
            Precondition::Paused => snapshot.status == PlayerStatus::Paused,
            Precondition::QueueNotEmpty => !snapshot.queue.is_empty(),
        }
    }
}
