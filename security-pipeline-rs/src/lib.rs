//! # Security Pipeline
//!
//! Front door for data entering the knowledge graph. Each inbound request
//! passes, in order:
//!
//! 1. admission control ([`rate_limiter_rs`])
//! 2. payload size limits and string normalization ([`input_validation_rs`])
//! 3. schema validation against a registered schema
//! 4. threat scanning of free-text content ([`content_scanner_rs`]), with
//!    in-place remediation where the scanner recommends it
//!
//! Queries bound for the store are checked for structure and complexity and
//! built as parameterized queries ([`query_sanitizer_rs`]). Every failure
//! leaves as a sanitized [`ErrorResponse`](error_handling_rs::ErrorResponse).

pub mod boundary;
pub mod pipeline;
pub mod remediation;
pub mod request;

pub use boundary::ToBoundaryError;
pub use pipeline::SecurityPipeline;
pub use remediation::remediate;
pub use request::{AcceptedRequest, InboundRequest};
