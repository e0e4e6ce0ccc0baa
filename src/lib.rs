//! Offline cache engine for a single-page application shell.
//!
//! A [`engine::CacheWorker`] is one deployed version of a cache-first policy:
//! it precaches the shell on install, answers GET requests from its store
//! (falling back to the network and storing successful responses), and on
//! activation deletes every store left behind by earlier versions.
//! [`host::Registration`] drives workers through that lifecycle.

pub mod api;
pub mod config;
pub mod engine;
pub mod host;
pub mod http;
pub mod network;
pub mod storage;

pub use config::WorkerConfig;
pub use engine::{CacheWorker, Interception};
