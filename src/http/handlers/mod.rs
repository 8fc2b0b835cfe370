//! HTTP handlers for the mock server.

pub mod dispatch;

pub use dispatch::dispatch;
