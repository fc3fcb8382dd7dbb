//! Worker executing backend jobs.
//!
//! [`SearchWorker`] turns each [`Action`] into admission-controlled backend
//! calls and reports the outcome as an [`Event`]. Feeding those events back
//! through [`handle_event`] closes the loop; [`SearchWorker::dispatch`] does
//! both until no job is left.

use super::backend::SearchBackend;
use crate::admission::AdmissionController;
use crate::app::{handle_event, Action, Event, StateEngine};
use crate::domain::{BackendError, BackendErrorKind, Result};
use crate::query::CompiledQuery;
use chrono::Utc;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Executes backend jobs on behalf of the event handler.
pub struct SearchWorker {
    backend: Arc<dyn SearchBackend>,
    engine: Arc<StateEngine>,
    admission: AdmissionController,
    call_timeout: Duration,
    acquire_timeout: Duration,
}

impl SearchWorker {
    /// Creates a worker with admission control taken from the engine's
    /// configuration.
    #[must_use]
    pub fn new(backend: Arc<dyn SearchBackend>, engine: Arc<StateEngine>) -> Self {
        let config = engine.config();
        let admission = AdmissionController::from_config(&config.rate_limit);
        let call_timeout = config.search.search_timeout();
        let acquire_timeout = config.search.acquire_timeout();
        Self {
            backend,
            engine,
            admission,
            call_timeout,
            acquire_timeout,
        }
    }

    /// Replaces the admission controller, e.g. to share one between workers.
    #[must_use]
    pub fn with_admission(mut self, admission: AdmissionController) -> Self {
        self.admission = admission;
        self
    }

    #[must_use]
    pub const fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Runs one job and reports its outcome.
    pub async fn execute(&self, action: Action) -> Event {
        let span = tracing::debug_span!("worker_execute", job = action.name());
        async move {
            match action {
                Action::Search { index, query } => self.run_search(&index, &query).await,
                Action::LoadFields { index, pattern } => self.load_fields(index, &pattern).await,
                Action::ListIndices { pattern } => self.list_indices(pattern).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Runs jobs and feeds their reports through the event handler until no
    /// follow-up job remains. Jobs of one round run concurrently.
    ///
    /// # Returns
    ///
    /// Whether any report changed what is on screen.
    ///
    /// # Errors
    ///
    /// The first error from [`handle_event`]; reports already handled stay
    /// applied.
    pub async fn dispatch(&self, mut actions: Vec<Action>) -> Result<bool> {
        let mut render = false;
        while !actions.is_empty() {
            let events = join_all(actions.drain(..).map(|a| self.execute(a))).await;
            for event in &events {
                let (changed, more) = handle_event(&self.engine, self.engine.config(), event, Utc::now())?;
                render |= changed;
                actions.extend(more);
            }
        }
        Ok(render)
    }

    /// Bounds one backend call by the configured call timeout.
    async fn bounded<T>(
        &self,
        job: &str,
        call: impl Future<Output = std::result::Result<T, BackendError>>,
    ) -> std::result::Result<T, BackendError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(BackendError::new(
                    BackendErrorKind::Timeout,
                    format!("{job} took longer than {:?}", self.call_timeout),
                ))
            })
    }

    async fn run_search(&self, index: &str, query: &CompiledQuery) -> Event {
        let handle = match self.engine.begin_search() {
            Ok(handle) => handle,
            Err(e) => {
                return Event::JobFailed {
                    job: "search".to_string(),
                    message: e.to_string(),
                }
            }
        };
        let generation = handle.generation();
        tracing::debug!(index, generation, size = query.size(), "search started");

        let outcome = self
            .admission
            .execute("search", self.acquire_timeout, handle.token(), || {
                self.bounded("search", self.backend.search(index, query))
            })
            .await;

        match outcome {
            Ok(documents) => {
                tracing::debug!(generation, hits = documents.len(), "search finished");
                Event::SearchCompleted { generation, documents }
            }
            Err(e) => Event::SearchFailed {
                generation,
                message: e.to_string(),
            },
        }
    }

    async fn load_fields(&self, index: String, pattern: &str) -> Event {
        let outcome = self
            .admission
            .execute("load_fields", self.acquire_timeout, &CancellationToken::new(), || {
                self.bounded("load_fields", self.backend.field_caps(&index, pattern))
            })
            .await;

        match outcome {
            Ok(fields) => Event::FieldsLoaded { index, fields },
            Err(e) => Event::JobFailed {
                job: "load_fields".to_string(),
                message: e.to_string(),
            },
        }
    }

    async fn list_indices(&self, pattern: String) -> Event {
        let outcome = self
            .admission
            .execute("list_indices", self.acquire_timeout, &CancellationToken::new(), || {
                self.bounded("list_indices", self.backend.list_indices(&pattern))
            })
            .await;

        match outcome {
            Ok(indices) => Event::IndicesListed { pattern, indices },
            Err(e) => Event::JobFailed {
                job: "list_indices".to_string(),
                message: e.to_string(),
            },
        }
    }
}
