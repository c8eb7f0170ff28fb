//! Supervision of the local Lavalink server process.

use anyhow::{Context, Result};
use async_process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use futures::{io::BufReader, AsyncBufReadExt, AsyncRead, StreamExt};
use std::time::Duration;
use tracing::{info, warn};

use crate::audio::rest::RestClient;
use crate::config::Config;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The spawned `java -jar Lavalink.jar` process.
///
/// Started before the engine client connects and killed after it closed. The
/// process output is forwarded to the log under the `lavalink` target.
pub struct LavalinkProcess {
    child: Child,
}

impl LavalinkProcess {
    pub fn start(config: &Config) -> Result<Self> {
        if !config.lavalink_jar.exists() {
            anyhow::bail!(
                "No se encontró el servidor de audio en {}",
                config.lavalink_jar.display()
            );
        }

        info!(
            "🎼 Iniciando servidor Lavalink: {} -jar {}",
            config.java_bin,
            config.lavalink_jar.display()
        );

        let mut child = Command::new(&config.java_bin)
            .arg("-jar")
            .arg(&config.lavalink_jar)
            .env("SERVER_PORT", config.lavalink_port.to_string())
            .env("LAVALINK_SERVER_PASSWORD", &config.lavalink_password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("No se pudo ejecutar {}", config.java_bin))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_stdout(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        Ok(Self { child })
    }

    /// Polls `GET /version` until the server answers or `timeout` elapses.
    pub async fn wait_ready(&mut self, rest: &RestClient, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(status) = self.child.try_status()? {
                anyhow::bail!("El servidor Lavalink terminó al iniciar: {}", status);
            }

            match rest.version().await {
                Ok(version) => {
                    info!("✅ Servidor Lavalink {} listo", version.trim());
                    return Ok(());
                }
                Err(e) if tokio::time::Instant::now() >= deadline => {
                    return Err(e).context("El servidor Lavalink no respondió a tiempo");
                }
                Err(_) => tokio::time::sleep(READY_POLL_INTERVAL).await,
            }
        }
    }

    pub async fn stop(mut self) -> Result<()> {
        if self.child.try_status()?.is_none() {
            self.child.kill().context("No se pudo detener Lavalink")?;
        }
        let status = self.child.status().await?;
        info!("Servidor Lavalink detenido ({})", status);
        Ok(())
    }
}

async fn forward_stdout(stdout: ChildStdout) {
    forward_lines(stdout, false).await;
}

async fn forward_stderr(stderr: ChildStderr) {
    forward_lines(stderr, true).await;
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, is_stderr: bool) {
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next().await {
        match line {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) if is_stderr => warn!(target: "lavalink", "{}", line),
            Ok(line) => info!(target: "lavalink", "{}", line),
            Err(e) => {
                warn!(target: "lavalink", "Salida de Lavalink ilegible: {}", e);
                break;
            }
        }
    }
}
