//! IPv4 address validation

use std::net::Ipv4Addr;

use thiserror::Error;

/// Malformed network address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid IPv4 address: {0:?}")]
pub struct AddressError(pub String);

/// Parse a dotted-quad IPv4 address, ignoring surrounding whitespace
///
/// # Errors
/// Returns `AddressError` if the text is not exactly four decimal octets.
pub fn validate_ipv4(addr: &str) -> Result<Ipv4Addr, AddressError> {
    let trimmed = addr.trim();
    if trimmed.split('.').any(|octet| octet.starts_with('+')) {
        return Err(AddressError(addr.to_string()));
    }
    trimmed
        .parse::<Ipv4Addr>()
        .map_err(|_| AddressError(addr.to_string()))
}
