//! API Routes
//!
//! Route handlers organized by functionality.

pub mod devices;
pub mod health;
pub mod telemetry;
pub mod write;
