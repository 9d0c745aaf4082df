use std::time::{Duration, Instant};

use askdb_core::{ConversationTurn, Value};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use crate::{StageDescriptor, StageError, StageKind, StageResult};

pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Calls one remote stage with the ordered conversation and returns its
/// structured result. Implementations never retry.
#[async_trait::async_trait]
pub trait StageAdapter: Send + Sync {
    async fn call(
        &self,
        stage: &StageDescriptor,
        turns: &[ConversationTurn],
    ) -> Result<StageResult, StageError>;

    async fn health(&self, _stage: &StageDescriptor) -> Result<(), StageError> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct StageClient {
    http: Client,
    timeout: Duration,
    token: Option<SecretString>,
}

impl StageClient {
    pub fn new() -> Result<Self, StageError> {
        Self::with_timeout(DEFAULT_STAGE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, StageError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StageError::Config(err.to_string()))?;
        Ok(Self {
            http,
            timeout,
            token: None,
        })
    }

    /// Sends `Authorization: Bearer <token>` on every stage request.
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let request = self.http.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    fn transport_error(&self, stage: StageKind, err: reqwest::Error, started: Instant) -> StageError {
        if err.is_timeout() {
            StageError::Timeout {
                stage,
                elapsed: started.elapsed().min(self.timeout),
            }
        } else {
            StageError::Transport {
                stage,
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait::async_trait]
impl StageAdapter for StageClient {
    async fn call(
        &self,
        stage: &StageDescriptor,
        turns: &[ConversationTurn],
    ) -> Result<StageResult, StageError> {
        let started = Instant::now();
        tracing::debug!(stage = %stage.kind, turns = turns.len(), "calling stage");

        let response = self
            .request(reqwest::Method::POST, stage.messages_url())
            .json(turns)
            .send()
            .await
            .map_err(|err| self.transport_error(stage.kind, err, started))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(stage = %stage.kind, status = status.as_u16(), "stage returned error status");
            return Err(StageError::Status {
                stage: stage.kind,
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    self.transport_error(stage.kind, err, started)
                } else {
                    StageError::Malformed {
                        stage: stage.kind,
                        reason: err.to_string(),
                    }
                }
            })?;
        let result = StageResult::parse(stage.kind, body)?;

        tracing::debug!(
            stage = %stage.kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage answered"
        );
        Ok(result)
    }

    async fn health(&self, stage: &StageDescriptor) -> Result<(), StageError> {
        let started = Instant::now();
        let response = self
            .request(reqwest::Method::GET, stage.health_url())
            .send()
            .await
            .map_err(|err| self.transport_error(stage.kind, err, started))?;
        let status = response.status();
        if !status.is_success() {
            return Err(StageError::Status {
                stage: stage.kind,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}
