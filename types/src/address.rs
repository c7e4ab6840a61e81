//! Chain address helpers.
//!
//! Addresses are 20-byte EVM-style accounts. The zero address doubles as the
//! marker for the chain's native asset wherever a token address is expected.

use std::str::FromStr;

use alloy_primitives::Address;

use crate::TypesError;

/// Token address used for native-asset balances.
pub const NATIVE_ASSET: Address = Address::ZERO;

/// Length of an address in hex characters, without prefix.
const ADDRESS_HEX_LEN: usize = 40;

/// Whether `s` is a well-formed hex address: 40 hex digits with an optional
/// `0x`/`0X` prefix. Checksum casing is not enforced.
pub fn is_hex_address(s: &str) -> bool {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    digits.len() == ADDRESS_HEX_LEN && digits.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse a hex address, rejecting anything [`is_hex_address`] rejects.
pub fn parse_address(s: &str) -> Result<Address, TypesError> {
    if !is_hex_address(s) {
        return Err(TypesError::InvalidAddress(s.to_string()));
    }
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    Address::from_str(digits).map_err(|_| TypesError::InvalidAddress(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_prefixed_and_bare_addresses() {
        assert!(is_hex_address("0x52908400098527886E0F7030069857D2E4169EE7"));
        assert!(is_hex_address("52908400098527886e0f7030069857d2e4169ee7"));
        assert!(is_hex_address("0X52908400098527886E0F7030069857D2E4169EE7"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_hex_address("not-an-address"));
        assert!(!is_hex_address("0x"));
        assert!(!is_hex_address("0x52908400098527886E0F7030069857D2E4169EE"));
        assert!(!is_hex_address("0x52908400098527886E0F7030069857D2E4169EE7a"));
        assert!(!is_hex_address("0xZZ908400098527886E0F7030069857D2E4169EE7"));
    }

    #[test]
    fn parse_round_trips_through_display() {
        let addr = parse_address("0x00000000000000000000000000000000000000ab").unwrap();
        assert_eq!(addr.to_string().to_lowercase(), "0x00000000000000000000000000000000000000ab");
    }

    #[test]
    fn parse_reports_offending_input() {
        let err = parse_address("nope").unwrap_err();
        assert!(matches!(err, TypesError::InvalidAddress(ref s) if s == "nope"));
    }

    #[test]
    fn native_asset_is_zero_address() {
        assert!(NATIVE_ASSET.is_zero());
    }
}
