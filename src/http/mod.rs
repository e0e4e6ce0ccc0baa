// Request/response model shared by the store, the network port and the worker.

pub mod request;
pub mod response;

pub use request::{scheme_excluded, FetchRequest, RequestKey};
pub use response::CachedResponse;
