//! Interception layer: proxies handed to callers, wrap/unwrap routines and
//! the interceptor that times every operation and keeps the registry in step
//! with the wrapped library.

pub mod error;
pub mod interceptor;
pub mod library;
pub mod proxy;

pub use error::{CloseError, InterceptError, Result};
pub use interceptor::{ProvenanceInterceptor, TeardownSummary};
pub use library::{DatasetShape, ObjectInfo, UnderlyingLibrary};
pub use proxy::{Proxy, ProxyTarget, WrapContext};
