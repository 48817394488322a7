//! Operator prompts.
//!
//! When a required field has no value and no default, the pipeline stops
//! and asks a human. [`HttpPrompt`] exposes the question on a tiny local
//! HTTP endpoint: `GET /` shows it, `POST /msg` answers it. The other
//! implementations cover terminals, scripted runs and "never ask".

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};

use crate::core::OperatorPrompt;
use crate::error::{MigrateError, Result};

/// Default bind address of the HTTP prompt.
pub const DEFAULT_PROMPT_BIND: &str = "127.0.0.1:34012";

/// Interpret an operator answer: `null`, `true` and `false` are literals,
/// everything else is a string.
pub fn resolve_input(answer: &str) -> Value {
    match answer {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_string()),
    }
}

/// Serve one question over HTTP and wait for the answer.
#[derive(Debug, Clone)]
pub struct HttpPrompt {
    bind: String,
}

impl Default for HttpPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_BIND)
    }
}

#[derive(Clone)]
struct PromptState {
    question: Arc<str>,
    answer: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

async fn show_question(State(state): State<PromptState>) -> String {
    state.question.to_string()
}

async fn receive_answer(State(state): State<PromptState>, body: String) -> &'static str {
    match state.answer.lock().await.take() {
        Some(tx) => {
            let _ = tx.send(body);
            "ok"
        }
        None => "already answered",
    }
}

impl HttpPrompt {
    pub fn new(bind: impl Into<String>) -> Self {
        Self { bind: bind.into() }
    }

    pub fn bind(&self) -> &str {
        &self.bind
    }
}

#[async_trait]
impl OperatorPrompt for HttpPrompt {
    async fn ask(&self, question: &str) -> Result<String> {
        let (answer_tx, answer_rx) = oneshot::channel();
        let state = PromptState {
            question: Arc::from(question),
            answer: Arc::new(Mutex::new(Some(answer_tx))),
        };

        let app = Router::new()
            .route("/", get(show_question))
            .route("/msg", post(receive_answer))
            .with_state(state);

        let listener = TcpListener::bind(&self.bind).await.map_err(|e| {
            MigrateError::Prompt(format!("cannot bind prompt server on {}: {}", self.bind, e))
        })?;
        let addr = listener.local_addr()?;
        info!("Operator input needed at http://{} : {}", addr, question);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let answer = answer_rx
            .await
            .map_err(|_| MigrateError::Prompt("prompt server stopped before an answer".into()));

        let _ = shutdown_tx.send(());
        match server.await {
            Ok(Err(e)) => debug!("Prompt server ended with error: {}", e),
            Err(e) => debug!("Prompt server task failed: {}", e),
            Ok(Ok(())) => {}
        }

        let answer = answer?;
        debug!("Operator answered {:?}", answer);
        Ok(answer)
    }
}

/// Ask on the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompt;

#[async_trait]
impl OperatorPrompt for StdinPrompt {
    async fn ask(&self, question: &str) -> Result<String> {
        let question = question.to_string();
        tokio::task::spawn_blocking(move || {
            dialoguer::Input::<String>::new()
                .with_prompt(question)
                .allow_empty(true)
                .interact_text()
                .map_err(|e| MigrateError::Prompt(e.to_string()))
        })
        .await
        .map_err(|e| MigrateError::Prompt(format!("prompt task failed: {}", e)))?
    }
}

/// Answer from a fixed queue; errors once the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far.
    pub async fn asked(&self) -> Vec<String> {
        self.asked.lock().await.clone()
    }
}

#[async_trait]
impl OperatorPrompt for ScriptedPrompt {
    async fn ask(&self, question: &str) -> Result<String> {
        self.asked.lock().await.push(question.to_string());
        self.answers
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| MigrateError::Prompt(format!("no scripted answer for: {}", question)))
    }
}

/// Never ask; every question is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessPrompt;

#[async_trait]
impl OperatorPrompt for HeadlessPrompt {
    async fn ask(&self, question: &str) -> Result<String> {
        Err(MigrateError::Prompt(format!(
            "operator input required in headless mode: {}",
            question
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_resolve_input() {
        assert_eq!(resolve_input("null"), Value::Null);
        assert_eq!(resolve_input("true"), Value::Bool(true));
        assert_eq!(resolve_input("false"), Value::Bool(false));
        assert_eq!(resolve_input("NULL"), Value::String("NULL".into()));
    }

    #[tokio::test]
    async fn test_scripted_prompt_drains_queue() {
        let prompt = ScriptedPrompt::new(["a"]);
        assert_eq!(prompt.ask("first?").await.unwrap(), "a");
        assert!(matches!(
            prompt.ask("second?").await,
            Err(MigrateError::Prompt(_))
        ));
        assert_eq!(prompt.asked().await, vec!["first?", "second?"]);
    }

    #[tokio::test]
    async fn test_headless_prompt_refuses() {
        let err = HeadlessPrompt.ask("value of owner?").await.unwrap_err();
        assert_eq!(err.exit_code(), 8);
    }

    #[tokio::test]
    async fn test_http_prompt_round_trip() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let prompt = HttpPrompt::new(format!("127.0.0.1:{}", port));
        let asking = tokio::spawn(async move { prompt.ask("What should owner be?").await });

        let base = format!("http://127.0.0.1:{}", port);
        let client = reqwest::Client::new();
        let mut question = None;
        for _ in 0..50 {
            if let Ok(resp) = client.get(&base).send().await {
                question = Some(resp.text().await.unwrap());
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(question.as_deref(), Some("What should owner be?"));

        client
            .post(format!("{}/msg", base))
            .body("alice")
            .send()
            .await
            .unwrap();

        let answer = asking.await.unwrap().unwrap();
        assert_eq!(answer, "alice");
    }
}
