// Entry points invoked by the front end

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{GenerationService, HealthService, HealthStatus, HistoryService};
use crate::error::{
    Completion, SelectRejected, ServiceError, SubmitRejected, GENERATE_FALLBACK, HEALTH_FALLBACK,
    HISTORY_FALLBACK,
};
use crate::history::{HistoryFetcher, RemoteHistoryEntry};
use crate::identity::UserIdentity;
use crate::session::{CallToken, SessionState};

#[derive(Default)]
struct GenerationSlot {
    state: SessionState,
    abort: Option<CancellationToken>,
}

impl GenerationSlot {
    fn abandon_call(&mut self, token: CallToken) -> bool {
        let abandoned = self.state.abandon_call(token);
        if abandoned {
            if let Some(abort) = self.abort.take() {
                abort.cancel();
            }
        }
        abandoned
    }
}

/// Abandons the call if the `submit` future is dropped before it commits.
struct PendingGeneration {
    session: Arc<Mutex<GenerationSlot>>,
    token: Option<CallToken>,
}

impl PendingGeneration {
    fn disarm(&mut self) {
        self.token = None;
    }
}

impl Drop for PendingGeneration {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        debug!(call = ?token, "submit dropped before completion");
        match self.session.try_lock() {
            Ok(mut slot) => {
                slot.abandon_call(token);
            }
            Err(_) => {
                let session = self.session.clone();
                if let Ok(handle) = Handle::try_current() {
                    handle.spawn(async move {
                        session.lock().await.abandon_call(token);
                    });
                }
            }
        }
    }
}

/// Drives the session and history state machines against the remote
/// services. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Controller {
    user_id: UserIdentity,
    generator: Arc<dyn GenerationService>,
    history_source: Arc<dyn HistoryService>,
    health_source: Arc<dyn HealthService>,
    session: Arc<Mutex<GenerationSlot>>,
    history: Arc<Mutex<HistoryFetcher>>,
}

impl Controller {
    pub fn new(
        user_id: UserIdentity,
        generator: Arc<dyn GenerationService>,
        history_source: Arc<dyn HistoryService>,
        health_source: Arc<dyn HealthService>,
    ) -> Self {
        Self {
            user_id,
            generator,
            history_source,
            health_source,
            session: Arc::new(Mutex::new(GenerationSlot::default())),
            history: Arc::new(Mutex::new(HistoryFetcher::default())),
        }
    }

    pub fn with_backend<B>(user_id: UserIdentity, backend: Arc<B>) -> Self
    where
        B: GenerationService + HistoryService + HealthService + 'static,
    {
        Self::new(user_id, backend.clone(), backend.clone(), backend)
    }

    pub fn user_id(&self) -> &UserIdentity {
        &self.user_id
    }

    /// Snapshot of the session state.
    pub async fn session(&self) -> SessionState {
        self.session.lock().await.state.clone()
    }

    pub async fn set_prompt(&self, text: &str) {
        self.session.lock().await.state.set_prompt(text);
    }

    pub async fn apply_example(&self, index: usize) -> bool {
        self.session.lock().await.state.apply_example(index)
    }

    /// Submits `prompt` and waits for the generation to settle.
    ///
    /// Returns `Superseded` when the call was abandoned before its response
    /// could be committed. Dropping the returned future abandons the call.
    pub async fn submit(&self, prompt: &str) -> Result<Completion, SubmitRejected> {
        let (token, request, abort) = {
            let mut slot = self.session.lock().await;
            let (token, request) = slot.state.begin_submit(prompt, &self.user_id)?;
            let abort = CancellationToken::new();
            slot.abort = Some(abort.clone());
            (token, request, abort)
        };
        let mut pending = PendingGeneration {
            session: self.session.clone(),
            token: Some(token),
        };

        let outcome = tokio::select! {
            outcome = self.generator.generate(&request) => outcome,
            _ = abort.cancelled() => {
                debug!("generation call dropped after abandon");
                pending.disarm();
                return Ok(Completion::Superseded);
            }
        };

        let outcome = outcome.map_err(|err| {
            debug!(error = ?err, "generation request failed");
            err.to_service_error(GENERATE_FALLBACK)
        });

        let mut slot = self.session.lock().await;
        pending.disarm();
        let completion = slot.state.complete(token, outcome);
        if completion == Completion::Applied {
            slot.abort = None;
        }
        Ok(completion)
    }

    /// Submits whatever is currently in the prompt field.
    pub async fn submit_current(&self) -> Result<Completion, SubmitRejected> {
        let prompt = self.session.lock().await.state.prompt().to_string();
        self.submit(&prompt).await
    }

    pub async fn abandon_generation(&self) -> bool {
        let mut slot = self.session.lock().await;
        if let Some(abort) = slot.abort.take() {
            abort.cancel();
        }
        slot.state.abandon()
    }

    pub async fn select_history_entry(&self, id: u64) -> Result<(), SelectRejected> {
        self.session.lock().await.state.select_history_entry(id)
    }

    pub async fn clear_local_history(&self) {
        self.session.lock().await.state.clear_local_history();
    }

    /// Snapshot of the remote history view.
    pub async fn history(&self) -> HistoryFetcher {
        self.history.lock().await.clone()
    }

    /// Reloads the remote history for this session's user.
    pub async fn refresh_history(&self) -> Completion {
        let token = self.history.lock().await.begin_refresh();

        let outcome = self
            .history_source
            .history(&self.user_id)
            .await
            .map_err(|err| {
                debug!(error = ?err, "history request failed");
                err.to_service_error(HISTORY_FALLBACK)
            });

        self.history.lock().await.complete(token, outcome)
    }

    pub async fn clear_viewed_history(&self) {
        self.history.lock().await.clear_viewed();
    }

    pub async fn open_history_details(&self, id: &str) -> Option<RemoteHistoryEntry> {
        self.history.lock().await.open_details(id).cloned()
    }

    /// The entry whose details are open, if it is still in the loaded list.
    pub async fn history_details(&self) -> Option<RemoteHistoryEntry> {
        self.history.lock().await.selected().cloned()
    }

    pub async fn close_history_details(&self) {
        self.history.lock().await.close_details();
    }

    pub async fn health(&self) -> Result<HealthStatus, ServiceError> {
        self.health_source.health().await.map_err(|err| {
            debug!(error = ?err, "health request failed");
            err.to_service_error(HEALTH_FALLBACK)
        })
    }
}
