//! Shared event contracts for the Causality ingestion pipeline.
//!
//! Defines the envelope wire/in-memory format, the payload variant union,
//! and the pure derivations (category/type, subject, partition) every
//! other crate in the workspace depends on.

pub mod envelope;
pub mod payload;

pub use envelope::{Envelope, Partition};
pub use payload::{sanitize_slug, DeviceContext, Payload};
