#![forbid(unsafe_code)]

//! Public entry point for the reusable TubeFetch Rust crate.
//!
//! The crate exposes the pieces the backend binary is assembled from: the
//! yt-dlp collaborators (resolver, extractor, catalog search), the pure
//! format-selection and filename-sanitization logic, and the runtime
//! configuration loader shared across binaries.

pub mod config;
pub mod extractor;
pub mod filename;
pub mod resolver;
pub mod search;
pub mod security;
pub mod selector;
