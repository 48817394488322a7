//! Notification and progress reporting.
//!
//! [`TracingNotifier`] and [`IndicatifProgress`] report locally. When an
//! observer daemon is configured, [`DaemonClient`] forwards the same events
//! over HTTP from a detached task, so a slow or absent daemon never blocks
//! the pipeline. [`check_daemon`] is the opt-in startup check for setups
//! that must not run unobserved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::{Notifier, NotifyLevel, Progress, ProgressHandle};
use crate::error::Result;

/// Forward notifications to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Info => info!("{}", message),
            NotifyLevel::Warning => warn!("{}", message),
            NotifyLevel::Error => error!("{}", message),
            NotifyLevel::Debug => debug!("{}", message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum DaemonEvent {
    Notify {
        loglevel: NotifyLevel,
        message: String,
    },
    Progress {
        done: u64,
        total: u64,
        col: String,
    },
}

impl DaemonEvent {
    fn path(&self) -> &'static str {
        match self {
            DaemonEvent::Notify { .. } => "notify",
            DaemonEvent::Progress { .. } => "progress",
        }
    }
}

/// Handle to the detached daemon forwarder.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    tx: mpsc::UnboundedSender<DaemonEvent>,
}

impl DaemonClient {
    /// Start the forwarder task. Must be called inside a Tokio runtime.
    ///
    /// The task ends once every clone of the client is dropped.
    pub fn spawn(base_url: &str) -> Result<(Self, JoinHandle<()>)> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        let base = base_url.trim_end_matches('/').to_string();
        let (tx, mut rx) = mpsc::unbounded_channel::<DaemonEvent>();

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let url = format!("{}/{}", base, event.path());
                match http.post(&url).json(&event).send().await {
                    Ok(resp) if !resp.status().is_success() => {
                        debug!("Daemon rejected event at {}: {}", url, resp.status());
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Dropping daemon event for {}: {}", url, e),
                }
            }
        });

        Ok((Self { tx }, handle))
    }

    fn send(&self, event: DaemonEvent) {
        // Receiver gone means the forwarder stopped; nothing left to do.
        let _ = self.tx.send(event);
    }
}

/// Fail unless the daemon answers `GET /` with a success status.
pub async fn check_daemon(base_url: &str) -> Result<()> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let url = format!("{}/", base_url.trim_end_matches('/'));
    http.get(&url).send().await?.error_for_status()?;
    info!("Observer daemon is up at {}", base_url);
    Ok(())
}

/// Log locally and forward every notification to the daemon.
#[derive(Debug, Clone)]
pub struct DaemonNotifier {
    client: DaemonClient,
}

impl DaemonNotifier {
    pub fn new(client: DaemonClient) -> Self {
        Self { client }
    }
}

impl Notifier for DaemonNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        TracingNotifier.notify(level, message);
        self.client.send(DaemonEvent::Notify {
            loglevel: level,
            message: message.to_string(),
        });
    }
}

/// Progress reported to the daemon as `{done, total, col}`.
#[derive(Debug, Clone)]
pub struct DaemonProgress {
    client: DaemonClient,
}

impl DaemonProgress {
    pub fn new(client: DaemonClient) -> Self {
        Self { client }
    }
}

struct DaemonBar {
    client: DaemonClient,
    label: String,
    total: u64,
    done: AtomicU64,
}

impl Progress for DaemonProgress {
    fn start_bar(&self, label: &str, total: u64) -> Box<dyn ProgressHandle> {
        self.client.send(DaemonEvent::Progress {
            done: 0,
            total,
            col: label.to_string(),
        });
        Box::new(DaemonBar {
            client: self.client.clone(),
            label: label.to_string(),
            total,
            done: AtomicU64::new(0),
        })
    }
}

impl ProgressHandle for DaemonBar {
    fn increment(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        self.client.send(DaemonEvent::Progress {
            done,
            total: self.total,
            col: self.label.clone(),
        });
    }
}

/// Terminal progress bars.
#[derive(Debug, Clone, Default)]
pub struct IndicatifProgress {
    multi: MultiProgress,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

struct IndicatifBar(ProgressBar);

impl Progress for IndicatifProgress {
    fn start_bar(&self, label: &str, total: u64) -> Box<dyn ProgressHandle> {
        let bar = self.multi.add(ProgressBar::new(total));
        let style = ProgressStyle::with_template(
            "{prefix} [{wide_bar}] {percent}% [{pos}/{len}] {eta}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
        bar.set_style(style);
        bar.set_prefix(label.to_string());
        Box::new(IndicatifBar(bar))
    }
}

impl ProgressHandle for IndicatifBar {
    fn increment(&self) {
        self.0.inc(1);
    }

    fn finish(&self) {
        self.0.finish_and_clear();
    }
}

/// Progress sink that renders nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

struct NoBar;

impl Progress for NoProgress {
    fn start_bar(&self, _label: &str, _total: u64) -> Box<dyn ProgressHandle> {
        Box::new(NoBar)
    }
}

impl ProgressHandle for NoBar {
    fn increment(&self) {}
}

/// Notifier that keeps every message, for assertions in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    pub messages: std::sync::Mutex<Vec<(NotifyLevel, String)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn contains(&self, level: NotifyLevel, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_payload_shapes() {
        let notify = DaemonEvent::Notify {
            loglevel: NotifyLevel::Warning,
            message: "skipped".into(),
        };
        assert_eq!(notify.path(), "notify");
        assert_eq!(
            serde_json::to_value(&notify).unwrap(),
            serde_json::json!({"loglevel": "warning", "message": "skipped"})
        );

        let progress = DaemonEvent::Progress {
            done: 3,
            total: 10,
            col: "bots".into(),
        };
        assert_eq!(progress.path(), "progress");
        assert_eq!(
            serde_json::to_value(&progress).unwrap(),
            serde_json::json!({"done": 3, "total": 10, "col": "bots"})
        );
    }

    #[tokio::test]
    async fn test_daemon_notifier_never_blocks_without_daemon() {
        // Nothing listens on this port; delivery fails quietly.
        let (client, handle) = DaemonClient::spawn("http://127.0.0.1:9").unwrap();
        let notifier = DaemonNotifier::new(client.clone());
        notifier.notify(NotifyLevel::Info, "hello");
        let progress = DaemonProgress::new(client);
        let bar = progress.start_bar("bots", 2);
        bar.increment();
        bar.increment();
        drop(bar);
        drop(progress);
        drop(notifier);
        handle.await.unwrap();
    }

    async fn serve(status: axum::http::StatusCode) -> String {
        let app = axum::Router::new().route("/", axum::routing::get(move || async move { status }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_check_daemon() {
        let up = serve(axum::http::StatusCode::OK).await;
        check_daemon(&up).await.unwrap();
        check_daemon(&format!("{}/", up)).await.unwrap();

        let sick = serve(axum::http::StatusCode::SERVICE_UNAVAILABLE).await;
        let err = check_daemon(&sick).await.unwrap_err();
        assert_eq!(err.exit_code(), 8);

        assert!(check_daemon("http://127.0.0.1:9").await.is_err());
    }

    #[test]
    fn test_no_progress_is_inert() {
        let bar = NoProgress.start_bar("bots", 5);
        bar.increment();
        bar.finish();
    }
}
