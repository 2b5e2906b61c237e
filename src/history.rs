// Server-side history view, refreshed on demand

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Completion, ServiceError};
use crate::session::CallToken;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteHistoryEntry {
    pub id: String,
    pub user_id: String,
    pub prompt: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HistoryView {
    #[default]
    NotLoaded,
    Loading,
    Loaded(Vec<RemoteHistoryEntry>),
    Failed(ServiceError),
}

/// Remote history as last fetched. Independent of the local ring: a
/// successful generation only shows up here after the next refresh.
#[derive(Debug, Clone, Default)]
pub struct HistoryFetcher {
    view: HistoryView,
    latest: u64,
    details: Option<String>,
}

impl HistoryFetcher {
    pub fn view(&self) -> &HistoryView {
        &self.view
    }

    pub fn entries(&self) -> &[RemoteHistoryEntry] {
        match &self.view {
            HistoryView::Loaded(entries) => entries,
            _ => &[],
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.view, HistoryView::Loading)
    }

    /// Starts a refresh. Any refresh still in flight is superseded.
    pub fn begin_refresh(&mut self) -> CallToken {
        self.latest += 1;
        self.view = HistoryView::Loading;
        info!(call = self.latest, "history refresh issued");
        CallToken::from_raw(self.latest)
    }

    /// Replaces the view wholesale with the outcome of the most recent refresh.
    ///
    /// On failure the previous list is dropped rather than kept as a fallback.
    pub fn complete(
        &mut self,
        token: CallToken,
        outcome: Result<Vec<RemoteHistoryEntry>, ServiceError>,
    ) -> Completion {
        if token != CallToken::from_raw(self.latest) {
            debug!(call = ?token, latest = self.latest, "discarding superseded history response");
            return Completion::Superseded;
        }

        self.view = match outcome {
            Ok(entries) => {
                info!(count = entries.len(), "history loaded");
                HistoryView::Loaded(entries)
            }
            Err(err) => {
                warn!(error = %err, "history refresh failed");
                HistoryView::Failed(err)
            }
        };
        self.drop_stale_details();
        Completion::Applied
    }

    /// Empties the displayed list. The service is not contacted.
    pub fn clear_viewed(&mut self) {
        if let HistoryView::Loaded(entries) = &mut self.view {
            entries.clear();
        }
        self.details = None;
    }

    pub fn open_details(&mut self, id: &str) -> Option<&RemoteHistoryEntry> {
        let id = self.entries().iter().find(|entry| entry.id == id)?.id.clone();
        self.details = Some(id);
        self.selected()
    }

    pub fn close_details(&mut self) {
        self.details = None;
    }

    pub fn selected(&self) -> Option<&RemoteHistoryEntry> {
        let id = self.details.as_deref()?;
        self.entries().iter().find(|entry| entry.id == id)
    }

    fn drop_stale_details(&mut self) {
        if self.selected().is_none() {
            self.details = None;
        }
    }
}
