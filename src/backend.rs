use crate::config::Config;
use crate::event::AppEvent;
use futures_util::StreamExt;
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use tokio::runtime::Handle;
use tracing::{debug, error};

#[derive(Debug)]
pub enum BackendError {
    NoRuntime(String),
    Http(reqwest::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuntime(message) => write!(f, "tokio runtime unavailable: {message}"),
            Self::Http(err) => write!(f, "http client error: {err}"),
        }
    }
}

impl std::error::Error for BackendError {}

// Talks to the lead server (patch stream) and the indexer (graph queries).
// Every call spawns onto the tokio runtime and reports back through the
// event channel; nothing here blocks the egui thread.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    config: Config,
    tx: mpsc::Sender<AppEvent>,
    runtime_handle: Handle,
    generation: Arc<AtomicU64>,
}

impl BackendClient {
    pub fn new(config: Config, tx: mpsc::Sender<AppEvent>) -> Result<Self, BackendError> {
        let runtime_handle =
            Handle::try_current().map_err(|err| BackendError::NoRuntime(err.to_string()))?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(BackendError::Http)?;

        Ok(Self {
            http,
            config,
            tx,
            runtime_handle,
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    // Kicks off a dashboard generation and returns its generation id. The
    // caller compares ids on incoming events to discard stale streams.
    pub fn generate(&self, prompt: String, instructions: String) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let http = self.http.clone();
        let url = self.config.generate_url.clone();
        let tx = self.tx.clone();

        self.runtime_handle.spawn(async move {
            debug!(generation, "starting generation request");
            let response = http
                .post(&url)
                .json(&json!({ "prompt": prompt, "instructions": instructions }))
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    error!(generation, %err, "generation request failed");
                    let _ = tx.send(AppEvent::StreamError {
                        generation,
                        message: err.to_string(),
                    });
                    return;
                }
            };

            if let Err(err) = response.error_for_status_ref() {
                let body = response.text().await.unwrap_or_default();
                let message = if body.trim().is_empty() {
                    err.to_string()
                } else {
                    format!("{err}: {}", body.trim())
                };
                let _ = tx.send(AppEvent::StreamError {
                    generation,
                    message,
                });
                return;
            }

            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        if tx
                            .send(AppEvent::StreamDelta {
                                generation,
                                chunk: bytes.to_vec(),
                            })
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(AppEvent::StreamError {
                            generation,
                            message: err.to_string(),
                        });
                        return;
                    }
                }
            }

            debug!(generation, "generation stream closed");
            let _ = tx.send(AppEvent::StreamEnd { generation });
        });

        generation
    }

    pub fn fetch_graph(&self, query: Option<String>) {
        let http = self.http.clone();
        let url = self.config.graph_url.clone();
        let timeout = self.config.request_timeout;
        let tx = self.tx.clone();

        self.runtime_handle.spawn(async move {
            let body = match &query {
                Some(query) => json!({ "query": query }),
                None => json!({}),
            };
            let result = http
                .post(&url)
                .timeout(timeout)
                .json(&body)
                .send()
                .await
                .and_then(|response| response.error_for_status());

            match result {
                Ok(response) => match response.json().await {
                    Ok(graph) => {
                        let _ = tx.send(AppEvent::GraphLoaded(graph));
                    }
                    Err(err) => {
                        let _ = tx.send(AppEvent::GraphError(format!(
                            "graph response was not valid JSON: {err}"
                        )));
                    }
                },
                Err(err) => {
                    error!(%err, "graph query failed");
                    let _ = tx.send(AppEvent::GraphError(err.to_string()));
                }
            }
        });
    }
}
