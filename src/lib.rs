pub mod api;
pub mod commands;
pub mod config;
pub mod display;
pub mod error;
pub mod history;
pub mod identity;
pub mod session;

pub use api::{GenerationService, HealthService, HealthStatus, HistoryService, HttpBackend};
pub use commands::Controller;
pub use config::Config;
pub use error::{
    ApiError, Completion, SelectRejected, ServiceError, SubmitRejected, ValidationError,
};
pub use history::{HistoryFetcher, HistoryView, RemoteHistoryEntry};
pub use identity::UserIdentity;
pub use session::{
    GenerationRequest, GenerationResult, LocalHistoryEntry, Phase, SessionState,
    LOCAL_HISTORY_CAPACITY,
};
