//! Booking daemon library
//!
//! This module provides the components bookingd is assembled from:
//! - REST ingress for domain events and run inspection
//! - Storage and notification backend selection
//! - The periodic maintenance trigger
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
