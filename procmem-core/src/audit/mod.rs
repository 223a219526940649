//! Audit/redaction surface consumed by the executor's logging path: before
//! task stdout/stderr or tool-call arguments reach a trace sink, PII-shaped
//! substrings are tokenized so the stored text is reversible, and any
//! recorded caller network origin goes through a CIDR parse/serialize
//! round-trip.
//!
//! Same "redact before it leaves the process" posture as a field-matching
//! request-log scrubber, generalized from field-name matching to pattern
//! detection since this is a logging pass over free text, not a
//! structured-metadata object with known sensitive keys.

pub mod network;
pub mod pii;

pub use network::{parse_cidr, serialize_cidr};
pub use pii::{detokenize, tokenize, PiiMatch, Redactor};
