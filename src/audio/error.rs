use thiserror::Error;

/// Failures talking to the audio node or the voice gateway.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("request to the audio node failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("audio node answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("audio node websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("audio node session is not ready")]
    NotReady,

    #[error("voice gateway error: {0}")]
    Voice(String),

    #[error("invalid payload from the audio node: {0}")]
    Decode(#[from] serde_json::Error),
}
