//! Tower layers of the client stack.

mod default_headers;

pub use default_headers::DefaultHeadersLayer;
