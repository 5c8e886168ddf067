//! pace42 backend API — config loading and JSON error handling.
//!
//! - **config** — JSON config with `${VAR}` placeholders, validated once.
//! - **server** — axum router, `ApiError`, and the error-reporting middleware.
//! - **logger** — tracing-subscriber setup.
//!
//! The binary entry point is `src/main.rs`.

pub mod config;
pub mod error;
pub mod logger;
pub mod server;
