//! Browser process lifecycle: spawn, readiness poll, idempotent kill.
//!
//! `launch` starts the browser with a fresh temporary profile and waits for
//! the debugging endpoint to answer; `kill` is safe to call any number of
//! times from any number of tasks — the first caller terminates the process,
//! every other caller observes completion.

use crate::config::BrowserConfig;
use crate::error::{LaunchError, Result};
use anyhow::Context as _;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// How often the readiness poll retries the version endpoint.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Flags always passed to the browser, before any configured extras.
const BASE_FLAGS: &[&str] = &[
    "--disable-gpu",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--disable-default-apps",
];

/// Lifecycle state of a supervised browser process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserState {
    Starting,
    Ready,
    Killed,
}

/// Launches browser processes per the configured binary and flags.
pub struct Launcher {
    config: BrowserConfig,
}

impl Launcher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    /// Spawn the browser and wait for its debugging endpoint.
    ///
    /// Polls `/json/version` until it yields a WebSocket debugger URL, the
    /// child exits (`LaunchError::ProcessExited`), or the startup deadline
    /// passes (`LaunchError::Timeout`).
    pub async fn launch(&self) -> Result<BrowserHandle> {
        let user_data_dir =
            std::env::temp_dir().join(format!("lumen-profile-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&user_data_dir)
            .await
            .with_context(|| format!("failed to create {}", user_data_dir.display()))?;

        let mut cmd = Command::new(&self.config.binary);
        cmd.arg(format!("--remote-debugging-port={}", self.config.port))
            .arg(format!("--user-data-dir={}", user_data_dir.display()))
            .args(BASE_FLAGS)
            .args(&self.config.flags)
            .arg("about:blank")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if self.config.headless {
            cmd.arg("--headless=new");
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(error) => {
                let _ = tokio::fs::remove_dir_all(&user_data_dir).await;
                return Err(LaunchError::Spawn(error).into());
            }
        };
        tracing::info!(
            binary = %self.config.binary.display(),
            port = self.config.port,
            pid = child.id(),
            "browser spawned"
        );

        let started = Instant::now();
        let deadline = started + Duration::from_millis(self.config.startup_timeout_ms);
        let version_url = format!("http://127.0.0.1:{}/json/version", self.config.port);
        let http = reqwest::Client::new();

        loop {
            if let Some(status) = child.try_wait().context("failed to poll browser process")? {
                let _ = tokio::fs::remove_dir_all(&user_data_dir).await;
                return Err(LaunchError::ProcessExited {
                    status: status.code().unwrap_or(-1),
                }
                .into());
            }

            if let Some(ws_url) = probe_endpoint(&http, &version_url).await {
                tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "browser ready");
                return Ok(BrowserHandle::new(child, ws_url, user_data_dir));
            }

            if Instant::now() >= deadline {
                let _ = child.kill().await;
                let _ = tokio::fs::remove_dir_all(&user_data_dir).await;
                return Err(LaunchError::Timeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                }
                .into());
            }

            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

/// Ask the version endpoint for the debugger WebSocket URL.
async fn probe_endpoint(http: &reqwest::Client, version_url: &str) -> Option<String> {
    let response = http.get(version_url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    let body: serde_json::Value = response.json().await.ok()?;
    body.get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[derive(Debug)]
struct HandleInner {
    child: Option<Child>,
    state: BrowserState,
}

/// A supervised browser process and its debugging endpoint.
#[derive(Debug)]
pub struct BrowserHandle {
    inner: Mutex<HandleInner>,
    /// WebSocket URL of the remote debugging endpoint.
    pub ws_url: String,
    user_data_dir: PathBuf,
}

impl BrowserHandle {
    fn new(child: Child, ws_url: String, user_data_dir: PathBuf) -> Self {
        Self {
            inner: Mutex::new(HandleInner {
                child: Some(child),
                state: BrowserState::Ready,
            }),
            ws_url,
            user_data_dir,
        }
    }

    pub async fn state(&self) -> BrowserState {
        self.inner.lock().await.state
    }

    /// Terminate the browser and release its profile directory.
    ///
    /// Idempotent and safe under concurrent invocation: the child is taken
    /// out of the handle exactly once, so only the first caller performs the
    /// termination and every caller completes without error.
    pub async fn kill(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(mut child) = inner.child.take() else {
            return Ok(());
        };

        if let Err(error) = child.kill().await {
            // The process exiting on its own before we kill it still counts
            // as a successful termination.
            tracing::debug!(%error, "browser kill returned an error; treating as exited");
        }
        inner.state = BrowserState::Killed;
        drop(inner);

        if let Err(error) = tokio::fs::remove_dir_all(&self.user_data_dir).await {
            tracing::debug!(%error, dir = %self.user_data_dir.display(), "failed to remove profile dir");
        }
        tracing::info!("browser killed");
        Ok(())
    }
}
