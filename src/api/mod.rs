//! HTTP surface: upload endpoint, job polling, log streaming.

pub mod logs;
pub mod server;
pub mod types;
