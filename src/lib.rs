//! Library exports for smartmark, shared between the binary and tests.

pub mod app;
pub mod auth;
pub mod bookmarks;
pub mod config;
pub mod error;
pub mod models;
pub mod realtime;
pub mod startup;
pub mod state;
pub mod store;
pub mod utils;
