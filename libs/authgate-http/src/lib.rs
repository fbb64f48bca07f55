#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP client infrastructure for `authgate`
//!
//! This crate provides a hyper-based HTTP client with:
//! - Automatic TLS via rustls (HTTPS only by default)
//! - Connection pooling
//! - Per-request timeouts
//! - Default `User-Agent` and `Accept` headers
//! - Transparent response decompression (gzip, brotli, deflate)
//! - Relative URL resolution against a configured base URL
//! - A single auth-layer slot where request/response interception is plugged in
//!
//! The auth-layer slot is what the `authgate` crate uses to attach credentials
//! and to drive the refresh-and-replay protocol; this crate knows nothing about
//! sessions.
//!
//! # Example
//!
//! ```ignore
//! use authgate_http::{HttpClientBuilder, HttpClientConfig};
//! use std::time::Duration;
//!
//! let config = HttpClientConfig {
//!     base_url: Some("https://api.example.com/".parse()?),
//!     request_timeout: Duration::from_secs(10),
//!     ..HttpClientConfig::default()
//! };
//! let client = HttpClientBuilder::with_config(config).build()?;
//!
//! let cars: Vec<Car> = client.get("/api/cars").send().await?.json().await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;
mod tls;

pub use builder::{HttpClientBuilder, InnerService};
pub use client::HttpClient;
pub use config::{
    DEFAULT_USER_AGENT, HttpClientConfig, PoolConfig, TlsRootConfig, TransportSecurity,
};
pub use error::HttpError;
pub use request::RequestBuilder;
pub use response::{HttpResponse, ResponseBody};
