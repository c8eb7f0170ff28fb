use reqwest::{Client, Response};
use serde::Serialize;
use serenity::all::GuildId;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::audio::error::EngineError;
use crate::audio::protocol::{ErrorResponse, LoadResult, SessionUpdate, UpdatePlayer};
use crate::config::Config;

/// REST half of the Lavalink v4 protocol.
///
/// Player routes need the session id handed out by the websocket's `ready`
/// message; until one is set they fail with [`EngineError::NotReady`].
pub struct RestClient {
    http: Client,
    base_url: String,
    password: String,
    session: watch::Sender<Option<String>>,
}

impl RestClient {
    pub fn new(config: &Config) -> Result<Self, EngineError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("lavabot/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.rest_url(),
            password: config.lavalink_password.clone(),
            session: watch::Sender::new(None),
        })
    }

    pub fn session_id(&self) -> Option<String> {
        self.session.borrow().clone()
    }

    pub fn set_session_id(&self, session_id: Option<String>) {
        self.session.send_replace(session_id);
    }

    /// Waits until the websocket has delivered a session id.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), EngineError> {
        let mut rx = self.session.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|session| session.is_some()))
            .await
            .map_err(|_| EngineError::NotReady)?
            .map_err(|_| EngineError::NotReady)?;
        Ok(())
    }

    /// `GET /version`, used as the liveness check of the node.
    pub async fn version(&self) -> Result<String, EngineError> {
        let response = self
            .http
            .get(format!("{}/version", self.base_url))
            .header("Authorization", &self.password)
            .send()
            .await?;
        Ok(check(response).await?.text().await?)
    }

    pub async fn load_tracks(&self, identifier: &str) -> Result<LoadResult, EngineError> {
        debug!("Cargando tracks para '{}'", identifier);
        let response = self
            .http
            .get(format!("{}/v4/loadtracks", self.base_url))
            .header("Authorization", &self.password)
            .query(&[("identifier", identifier)])
            .send()
            .await?;
        let body = check(response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn update_player(
        &self,
        guild_id: GuildId,
        update: &UpdatePlayer,
    ) -> Result<(), EngineError> {
        let session_id = self.session_id().ok_or(EngineError::NotReady)?;
        self.send_json(
            self.http.patch(format!(
                "{}/v4/sessions/{}/players/{}",
                self.base_url, session_id, guild_id
            )),
            update,
        )
        .await
    }

    pub async fn destroy_player(&self, guild_id: GuildId) -> Result<(), EngineError> {
        let session_id = self.session_id().ok_or(EngineError::NotReady)?;
        let response = self
            .http
            .delete(format!(
                "{}/v4/sessions/{}/players/{}",
                self.base_url, session_id, guild_id
            ))
            .header("Authorization", &self.password)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn update_session(&self, update: &SessionUpdate) -> Result<(), EngineError> {
        let session_id = self.session_id().ok_or(EngineError::NotReady)?;
        self.send_json(
            self.http
                .patch(format!("{}/v4/sessions/{}", self.base_url, session_id)),
            update,
        )
        .await
    }

    async fn send_json<T: Serialize>(
        &self,
        request: reqwest::RequestBuilder,
        body: &T,
    ) -> Result<(), EngineError> {
        let response = request
            .header("Authorization", &self.password)
            .json(body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// Turns a non-2xx response into [`EngineError::Status`], using the node's
/// error body when it has one.
async fn check(response: Response) -> Result<Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(error) => format!(
            "{} on {}",
            error.message.unwrap_or(error.error),
            error.path
        ),
        Err(_) if text.is_empty() => status.to_string(),
        Err(_) => text,
    };

    Err(EngineError::Status {
        status: status.as_u16(),
        message,
    })
}
