//! rsvp admission service library.
//!
//! This crate ships an `admission` binary, but the admission engine, storage
//! backends and HTTP router are exposed as a library for integration testing
//! and embedding.

pub mod admission;
pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod notify;
pub mod state;
pub mod store;
