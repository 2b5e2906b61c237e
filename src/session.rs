// Manages prompt submission, generation lifecycle and the recent-generations ring

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::error::{Completion, SelectRejected, ServiceError, SubmitRejected, ValidationError};
use crate::identity::UserIdentity;

/// Maximum number of entries kept in the local ring.
pub const LOCAL_HISTORY_CAPACITY: usize = 5;

pub const EXAMPLE_PROMPTS: [&str; 10] = [
    "Modern minimalist living room with white walls and wooden floors",
    "Cozy Scandinavian bedroom with natural light",
    "Luxury kitchen with marble countertops and island",
    "Modern exterior of a house with large windows and garden",
    "Contemporary bathroom with freestanding bathtub",
    "Open concept living area with fireplace",
    "Minimalist home office with ergonomic furniture",
    "Rustic farmhouse kitchen with exposed beams",
    "Modern pool house with glass walls",
    "Japanese-inspired bedroom with tatami mats",
];

/// Identifies one outbound call. Only the holder of the current token may
/// commit a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallToken(u64);

impl CallToken {
    pub(crate) fn from_raw(seq: u64) -> Self {
        Self(seq)
    }
}

/// Payload for the generation service. The prompt is trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub user_id: UserIdentity,
}

impl GenerationRequest {
    pub fn new(prompt: &str, user_id: UserIdentity) -> Result<Self, ValidationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        Ok(Self {
            prompt: prompt.to_string(),
            user_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub image: String,
    pub prompt: String,
    pub timestamp: String,
    pub enhanced_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHistoryEntry {
    pub id: u64,
    pub prompt: String,
    pub timestamp: String,
    pub image: String,
}

/// Newest-first, never longer than [`LOCAL_HISTORY_CAPACITY`].
#[derive(Debug, Clone, Default)]
pub struct LocalHistoryRing {
    entries: VecDeque<LocalHistoryEntry>,
}

impl LocalHistoryRing {
    /// Prepends `entry`, returning the evicted oldest entry if the ring was full.
    pub fn push(&mut self, entry: LocalHistoryEntry) -> Option<LocalHistoryEntry> {
        self.entries.push_front(entry);
        if self.entries.len() > LOCAL_HISTORY_CAPACITY {
            self.entries.pop_back()
        } else {
            None
        }
    }

    pub fn get(&self, id: u64) -> Option<&LocalHistoryEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalHistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting,
    IdleWithResult,
    IdleWithError,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    prompt: String,
    phase: Phase,
    error: Option<String>,
    result: Option<GenerationResult>,
    ring: LocalHistoryRing,
    pending: Option<CallToken>,
    next_call: u64,
    next_entry_id: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            phase: Phase::Idle,
            error: None,
            result: None,
            ring: LocalHistoryRing::default(),
            pending: None,
            next_call: 1,
            next_entry_id: 1,
        }
    }
}

impl SessionState {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        self.result.as_ref()
    }

    pub fn history(&self) -> &LocalHistoryRing {
        &self.ring
    }

    pub fn is_submitting(&self) -> bool {
        self.phase == Phase::Submitting
    }

    pub fn can_submit(&self) -> bool {
        !self.is_submitting() && !self.prompt.trim().is_empty()
    }

    pub fn set_prompt(&mut self, text: impl Into<String>) {
        self.prompt = text.into();
    }

    /// Copies one of [`EXAMPLE_PROMPTS`] into the prompt field.
    pub fn apply_example(&mut self, index: usize) -> bool {
        if self.is_submitting() {
            return false;
        }
        match EXAMPLE_PROMPTS.get(index) {
            Some(example) => {
                self.prompt = example.to_string();
                true
            }
            None => false,
        }
    }

    /// Moves to `Submitting` and hands back the request to send.
    ///
    /// A second submit while one is outstanding is a no-op. An empty prompt
    /// leaves the phase untouched and records the validation message.
    pub fn begin_submit(
        &mut self,
        prompt: &str,
        user_id: &UserIdentity,
    ) -> Result<(CallToken, GenerationRequest), SubmitRejected> {
        if self.is_submitting() {
            debug!("submit ignored, generation already in flight");
            return Err(SubmitRejected::InFlight);
        }
        self.prompt = prompt.to_string();

        let request = match GenerationRequest::new(prompt, user_id.clone()) {
            Ok(request) => request,
            Err(err) => {
                self.error = Some(err.to_string());
                return Err(err.into());
            }
        };

        let token = CallToken(self.next_call);
        self.next_call += 1;
        self.pending = Some(token);
        self.phase = Phase::Submitting;
        self.error = None;
        info!(call = token.0, prompt_len = request.prompt.len(), "generation submitted");
        Ok((token, request))
    }

    /// Commits the outcome of the call identified by `token`.
    pub fn complete(
        &mut self,
        token: CallToken,
        outcome: Result<GenerationResult, ServiceError>,
    ) -> Completion {
        if self.pending != Some(token) {
            debug!(call = token.0, "discarding superseded generation response");
            return Completion::Superseded;
        }
        self.pending = None;

        match outcome {
            Ok(result) => {
                let entry = LocalHistoryEntry {
                    id: self.next_entry_id,
                    prompt: result.prompt.clone(),
                    timestamp: result.timestamp.clone(),
                    image: result.image.clone(),
                };
                self.next_entry_id += 1;
                if let Some(evicted) = self.ring.push(entry) {
                    debug!(entry = evicted.id, "evicted oldest recent generation");
                }
                self.result = Some(result);
                self.error = None;
                self.phase = Phase::IdleWithResult;
                info!(call = token.0, "generation completed");
            }
            Err(err) => {
                warn!(call = token.0, error = %err, "generation failed");
                self.error = Some(err.message);
                self.phase = Phase::IdleWithError;
            }
        }
        Completion::Applied
    }

    /// Gives up on the pending generation. Its response, if it ever arrives,
    /// is discarded.
    pub fn abandon(&mut self) -> bool {
        match self.pending {
            Some(token) => self.abandon_call(token),
            None => false,
        }
    }

    /// Like [`abandon`](Self::abandon), but only if `token` is still the
    /// pending call.
    pub fn abandon_call(&mut self, token: CallToken) -> bool {
        if self.pending != Some(token) {
            return false;
        }
        self.pending = None;
        info!(call = token.0, "generation abandoned");
        self.phase = if self.result.is_some() {
            Phase::IdleWithResult
        } else {
            Phase::Idle
        };
        true
    }

    /// Shows a recent generation again and puts its prompt back in the field.
    pub fn select_history_entry(&mut self, id: u64) -> Result<(), SelectRejected> {
        if self.is_submitting() {
            return Err(SelectRejected::InFlight);
        }
        let entry = self.ring.get(id).ok_or(SelectRejected::UnknownEntry(id))?;

        self.prompt = entry.prompt.clone();
        self.result = Some(GenerationResult {
            image: entry.image.clone(),
            prompt: entry.prompt.clone(),
            timestamp: entry.timestamp.clone(),
            enhanced_prompt: None,
        });
        if self.phase == Phase::Idle {
            self.phase = Phase::IdleWithResult;
        }
        Ok(())
    }

    pub fn clear_local_history(&mut self) {
        self.ring.clear();
    }
}
