//! Domain models

mod proxy;

pub use proxy::{Proxy, ProxyKind, DEFAULT_SUCCESS_RATE};
