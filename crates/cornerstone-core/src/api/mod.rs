//! REST and OData reporting access for a Cornerstone tenant.
//!
//! This module provides the `ApiClient`, which obtains credentials from a
//! `SessionManager`, signs each request and unwraps the vendor's response
//! envelopes.

pub mod client;
pub mod envelope;
pub mod error;
pub mod odata;
pub mod paths;

pub use client::ApiClient;
pub use envelope::{EnvelopeKind, ResponseEnvelope};
pub use error::ApiError;
pub use odata::{Filter, Literal, ODataQuery};
pub use paths::ReportingView;
