pub mod auth;
pub mod comments;
pub mod error;
pub mod listing;
pub mod middleware;
pub mod policy;
pub mod posts;
pub mod routes;
pub mod state;
pub mod uploads;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
