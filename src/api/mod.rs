//! HTTP API module
//!
//! Thin front end over the tracking manager and the price history store.
//! Handlers never touch the network; they only flip session state and read
//! from SQLite.

pub mod handlers;
mod server;
pub mod types;

pub use server::{build_router, ApiServer};
pub use types::{ApiResponse, Empty, HistoryQuery, StartTrackingRequest};
