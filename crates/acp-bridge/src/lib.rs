//! HTTP surface of the control plane: the axum router over the engine
//! services, the session-status webhook, the label-filtered pull watcher,
//! and the WebSocket fan-out of progress events.

pub mod api_error;
pub mod http;
pub mod state;
pub mod watcher;

pub use api_error::ApiError;
pub use http::api_router;
pub use state::ApiState;
