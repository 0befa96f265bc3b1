//! Backend for a developer network: accounts, token authentication,
//! profiles with experience and education history, and a post feed with
//! likes and comments.
//!
//! Requests are plain `http::Request<Vec<u8>>` values run through
//! [`App::dispatch`]. The native binary serves them with actix-web; on wasm32
//! the crate is a Spin HTTP component backed by Spin's key-value store.

pub mod auth;
pub mod config;
pub mod core;
pub mod github;
pub mod handlers;
pub mod models;
pub mod ownership;
pub mod posts;
pub mod profile;
pub mod users;

#[cfg(not(target_arch = "wasm32"))]
pub mod server;

#[cfg(target_arch = "wasm32")]
mod spin;

pub use handlers::App;
