//! HTTP surface of the pricing service.

pub mod http;

pub use http::{routes, serve};
