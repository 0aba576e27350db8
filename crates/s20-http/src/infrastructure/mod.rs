//! Infrastructure layer for s20-http: the axum router and the listener.

pub mod http;

pub use http::{router, serve};
