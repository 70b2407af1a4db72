//! API middleware.

pub mod request_log;
