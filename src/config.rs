use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Registro de comandos por guild (desarrollo)

    // Nodo Lavalink
    pub lavalink_host: String,
    pub lavalink_port: u16,
    pub lavalink_password: String,
    pub lavalink_secure: bool,
    pub lavalink_resume_timeout: u64, // En segundos

    // Proceso del servidor de audio
    pub lavalink_spawn: bool,
    pub lavalink_jar: PathBuf,
    pub java_bin: String,
    pub lavalink_startup_timeout: u64, // En segundos

    // Reproducción
    pub search_prefix: String,
    pub default_volume: u16, // Porcentaje, 0 - 1000
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Nodo Lavalink
            lavalink_host: std::env::var("LAVALINK_HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            lavalink_port: std::env::var("LAVALINK_PORT")
                .unwrap_or_else(|_| "2333".to_string())
                .parse()?,
            lavalink_password: std::env::var("LAVALINK_PASSWORD")
                .unwrap_or_else(|_| "youshallnotpass".to_string()),
            lavalink_secure: std::env::var("LAVALINK_SECURE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
            lavalink_resume_timeout: std::env::var("LAVALINK_RESUME_TIMEOUT")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            // Proceso
            lavalink_spawn: std::env::var("LAVALINK_SPAWN")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            lavalink_jar: match std::env::var("LAVALINK_JAR") {
                Ok(val) if !val.trim().is_empty() => val.into(),
                _ => std::env::current_dir()?.join("Lavalink.jar"),
            },
            java_bin: std::env::var("JAVA_BIN").unwrap_or_else(|_| "java".to_string()),
            lavalink_startup_timeout: std::env::var("LAVALINK_STARTUP_TIMEOUT")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            // Reproducción
            search_prefix: std::env::var("SEARCH_PREFIX")
                .unwrap_or_else(|_| "ytsearch".to_string()),
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token and node password must not be empty
    /// - Node port must not be 0
    /// - Default volume must be between 0 and 1000 percent
    /// - Search prefix must not be empty
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.lavalink_password.is_empty() {
            anyhow::bail!("Lavalink password must not be empty");
        }

        if self.lavalink_port == 0 {
            anyhow::bail!("Lavalink port must be greater than 0");
        }

        if self.default_volume > 1000 {
            anyhow::bail!(
                "Default volume must be between 0 and 1000, got: {}",
                self.default_volume
            );
        }

        if self.search_prefix.trim().is_empty() {
            anyhow::bail!("Search prefix must not be empty");
        }

        if self.lavalink_startup_timeout == 0 {
            anyhow::bail!("Lavalink startup timeout must be greater than 0");
        }

        Ok(())
    }

    /// Base URL of the node's REST API.
    pub fn rest_url(&self) -> String {
        let scheme = if self.lavalink_secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.lavalink_host, self.lavalink_port)
    }

    /// URL of the node's event websocket.
    pub fn websocket_url(&self) -> String {
        let scheme = if self.lavalink_secure { "wss" } else { "ws" };
        format!(
            "{}://{}:{}/v4/websocket",
            scheme, self.lavalink_host, self.lavalink_port
        )
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.lavalink_startup_timeout)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and passwords are left out.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Lavalink: {} (spawn={}, jar={})\n  \
            Playback: {}% vol, search prefix '{}', resume {}s",
            self.guild_id
                .map_or("global".to_string(), |id| format!("in guild {}", id)),
            self.rest_url(),
            self.lavalink_spawn,
            self.lavalink_jar.display(),
            self.default_volume,
            self.search_prefix,
            self.lavalink_resume_timeout,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            lavalink_host: "127.0.0.1".to_string(),
            lavalink_port: 2333,
            lavalink_password: "youshallnotpass".to_string(),
            lavalink_secure: false,
            lavalink_resume_timeout: 60,

            lavalink_spawn: true,
            lavalink_jar: "Lavalink.jar".into(),
            java_bin: "java".to_string(),
            lavalink_startup_timeout: 60,

            search_prefix: "ytsearch".to_string(),
            default_volume: 100,
        }
    }
}
