//! HTTP surface of the Mediaflow job processor.

pub mod errors;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
