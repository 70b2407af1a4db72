//! API endpoint handlers, one module per route.

pub mod calculate;
pub mod health;
pub mod upload;
