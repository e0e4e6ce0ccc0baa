pub mod proxy_api;
pub mod simple;
