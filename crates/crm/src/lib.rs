//! Follow Up Boss client - the single point of outbound CRM HTTP.
//!
//! Both entry points (the MCP tool gateway and the webhook receiver) hold
//! one immutable [`CrmClient`] for the process lifetime and issue every
//! CRM call through it. The client injects the API key, applies the
//! bounded request timeout, and maps non-success responses into the
//! shared error taxonomy. It never retries; rate-limit responses (429)
//! surface to the caller unmodified.

mod client;
mod envelope;
mod ops;

pub use client::CrmClient;
pub use envelope::ResponseShape;
pub use ops::{PageQuery, EVENT_SHAPE};
