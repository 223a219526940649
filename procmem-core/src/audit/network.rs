//! CIDR parse/serialize round-trip for audit log entries that record a
//! caller's network origin. Thin wrapper over `ipnet` so the rest of the
//! crate depends on one narrow surface rather than the `ipnet` API
//! directly.

use ipnet::IpNet;

use crate::error::{Error, Result};

/// Parse a CIDR string (`"10.0.0.0/8"`, `"::1/128"`, ...) into an [`IpNet`].
pub fn parse_cidr(cidr: &str) -> Result<IpNet> {
    cidr.parse::<IpNet>().map_err(|e| Error::Validation(format!("invalid cidr '{cidr}': {e}")))
}

/// Render an [`IpNet`] back to its canonical CIDR string form.
#[must_use]
pub fn serialize_cidr(net: &IpNet) -> String {
    net.to_string()
}
