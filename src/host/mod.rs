// Host: lifecycle dispatch and a local HTTP front for controlled clients.

pub mod registration;
pub mod server;

pub use registration::{ClientId, RegisterOutcome, Registration};
pub use server::CacheProxyServer;
