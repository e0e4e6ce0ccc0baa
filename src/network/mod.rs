// Network port: how the worker reaches origin servers.

pub mod http_network;
pub mod traits;

pub use http_network::HttpNetwork;
pub use traits::{Network, NetworkError};
