//! IPv4 CIDR allowlist matching.
//!
//! A range is written `address/prefix`; the prefix defaults to 32 when
//! omitted. An address matches when it agrees with the range address on the
//! first `prefix` bits. A prefix of 0 matches every address.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr},
    str::FromStr,
};

use ipnetwork::Ipv4Network;

use crate::error::{HookError, Result};

/// Bitbucket's published webhook source ranges plus loopback for local
/// testing.
pub const DEFAULT_TRUSTED_RANGES: [&str; 7] = [
    "131.103.20.160/27",
    "165.254.145.0/26",
    "104.192.143.0/21",
    "127.0.0.1/32",
    "18.205.93.0/25",
    "18.234.32.128/25",
    "13.52.5.0/25",
];

/// A single IPv4 range.
///
/// Host bits in the base address are kept as written; they are masked off
/// when comparing, so `10.1.2.3/8` and `10.0.0.0/8` match the same set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange(Ipv4Network);

impl CidrRange {
    /// Parses `address/prefix` or a bare `address` (treated as `/32`).
    ///
    /// # Errors
    ///
    /// Returns `HookError::InvalidAddress` if the address is not a dotted
    /// quad or the prefix is not in `0..=32`.
    pub fn parse(input: &str) -> Result<Self> {
        input.parse()
    }

    /// Base address as written.
    pub fn address(&self) -> Ipv4Addr {
        self.0.ip()
    }

    /// Prefix length in bits.
    pub fn prefix(&self) -> u8 {
        self.0.prefix()
    }

    /// Whether `ip` falls inside the range.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.0.contains(ip)
    }
}

impl FromStr for CidrRange {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || HookError::invalid_address(s);
        let trimmed = s.trim();
        let (address, prefix) = match trimmed.split_once('/') {
            Some((address, prefix)) => (address, Some(prefix)),
            None => (trimmed, None),
        };

        // ipnetwork's own parser accepts truncated addresses ("10.1") and
        // dotted netmasks; only full dotted quads and numeric prefixes are
        // valid here.
        let address: Ipv4Addr = address.parse().map_err(|_| invalid())?;
        let prefix = match prefix {
            None => 32,
            Some(p) if !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()) => {
                p.parse::<u8>().map_err(|_| invalid())?
            },
            Some(_) => return Err(invalid()),
        };

        Ipv4Network::new(address, prefix).map(Self).map_err(|_| invalid())
    }
}

impl fmt::Display for CidrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0.ip(), self.0.prefix())
    }
}

/// Parses a dotted-quad IPv4 address.
fn parse_ipv4(input: &str) -> Result<Ipv4Addr> {
    input.trim().parse().map_err(|_| HookError::invalid_address(input))
}

/// Checks whether `ip` falls inside any of `ranges`.
///
/// Malformed entries (in `ip` or in a range) count as "no match" for that
/// range instead of failing the whole check. Returns on the first match;
/// an empty list never matches.
///
/// # Example
///
/// ```
/// use buildhook_core::is_in_any_range;
///
/// assert!(is_in_any_range("10.1.2.3", &["192.168.0.0/16", "10.0.0.0/8"]));
/// assert!(!is_in_any_range("10.1.2.3", &["not-a-range", "10.1.2.4"]));
/// ```
pub fn is_in_any_range<S: AsRef<str>>(ip: &str, ranges: &[S]) -> bool {
    let Ok(ip) = parse_ipv4(ip) else { return false };
    ranges
        .iter()
        .filter_map(|range| CidrRange::parse(range.as_ref()).ok())
        .any(|range| range.contains(ip))
}

/// The immutable allowlist of source ranges permitted to trigger builds.
///
/// Built once at startup and shared read-only across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedRanges {
    ranges: Vec<CidrRange>,
}

impl TrustedRanges {
    /// Parses every entry, failing on the first malformed one.
    ///
    /// # Errors
    ///
    /// Returns `HookError::InvalidAddress` naming the first entry that does
    /// not parse.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let ranges =
            entries.iter().map(|entry| CidrRange::parse(entry.as_ref())).collect::<Result<_>>()?;
        Ok(Self::new(ranges))
    }

    /// Creates an allowlist from already parsed ranges.
    pub fn new(ranges: Vec<CidrRange>) -> Self {
        Self { ranges }
    }

    /// Whether an IPv4 address is trusted.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }

    /// Whether a socket-level address is trusted.
    ///
    /// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are unwrapped; any other
    /// IPv6 address never matches.
    pub fn contains_ip(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => self.contains(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some_and(|v4| self.contains(v4)),
        }
    }

    /// Ranges in configuration order.
    pub fn ranges(&self) -> &[CidrRange] {
        &self.ranges
    }

    /// Number of ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the allowlist is empty (nothing is admitted).
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl Default for TrustedRanges {
    fn default() -> Self {
        Self::parse(&DEFAULT_TRUSTED_RANGES).unwrap_or_else(|_| Self::new(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prebuilt_ranges_match_like_parsed_ones() {
        let ranges =
            vec![CidrRange::parse("10.0.0.0/8").unwrap(), CidrRange::parse("192.0.2.7").unwrap()];
        let trusted = TrustedRanges::new(ranges);

        assert_eq!(trusted, TrustedRanges::parse(&["10.0.0.0/8", "192.0.2.7"]).unwrap());
        assert!(trusted.contains(Ipv4Addr::new(10, 20, 30, 40)));
        assert!(trusted.contains(Ipv4Addr::new(192, 0, 2, 7)));
        assert!(!trusted.contains(Ipv4Addr::new(192, 0, 2, 8)));
        assert!(TrustedRanges::new(Vec::new()).is_empty());
    }

    #[test]
    fn bare_address_is_single_host() {
        let range = CidrRange::parse("127.0.0.1").unwrap();
        assert_eq!(range.prefix(), 32);
        assert!(range.contains(Ipv4Addr::LOCALHOST));
        assert!(!range.contains(Ipv4Addr::new(127, 0, 0, 2)));
    }

    #[test]
    fn prefix_masks_host_bits() {
        let range = CidrRange::parse("131.103.20.160/27").unwrap();
        assert!(range.contains(Ipv4Addr::new(131, 103, 20, 160)));
        assert!(range.contains(Ipv4Addr::new(131, 103, 20, 191)));
        assert!(!range.contains(Ipv4Addr::new(131, 103, 20, 192)));
        assert!(!range.contains(Ipv4Addr::new(131, 103, 20, 159)));
    }

    #[test]
    fn base_address_with_host_bits_set_still_matches_block() {
        let range = CidrRange::parse("104.192.143.0/21").unwrap();
        assert!(range.contains(Ipv4Addr::new(104, 192, 136, 1)));
        assert!(range.contains(Ipv4Addr::new(104, 192, 143, 255)));
        assert!(!range.contains(Ipv4Addr::new(104, 192, 144, 0)));
    }

    #[test]
    fn zero_prefix_matches_everything() {
        let range = CidrRange::parse("0.0.0.0/0").unwrap();
        assert!(range.contains(Ipv4Addr::new(0, 0, 0, 0)));
        assert!(range.contains(Ipv4Addr::new(255, 255, 255, 255)));
        assert!(is_in_any_range("203.0.113.5", &["8.8.8.8/0"]));
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        for input in
            ["", "300.1.1.1/8", "10.0.0.0/33", "10.0.0.0/", "10.0.0.0/-1", "10.0.0.0/255.0.0.0"]
        {
            assert!(CidrRange::parse(input).is_err(), "expected {input:?} to be rejected");
        }
        for input in ["10.1/16", "10/8", "1.2.3", "10.0.0.0/999"] {
            assert!(CidrRange::parse(input).is_err(), "expected {input:?} to be rejected");
        }
        assert!(CidrRange::parse("::1/128").is_err());
    }

    #[test]
    fn display_round_trips_configuration_form() {
        let range = CidrRange::parse("18.205.93.0/25").unwrap();
        assert_eq!(range.to_string(), "18.205.93.0/25");
    }

    #[test]
    fn is_in_any_range_skips_malformed_entries() {
        assert!(is_in_any_range("127.0.0.1", &["bogus", "127.0.0.1/32"]));
        assert!(!is_in_any_range("127.0.0.1", &["bogus"]));
    }

    #[test]
    fn is_in_any_range_rejects_malformed_ip() {
        assert!(!is_in_any_range("localhost", &["0.0.0.0/0"]));
        assert!(!is_in_any_range("1.2.3", &["0.0.0.0/0"]));
    }

    #[test]
    fn is_in_any_range_empty_list_never_matches() {
        let empty: [&str; 0] = [];
        assert!(!is_in_any_range("127.0.0.1", &empty));
    }

    #[test]
    fn trusted_ranges_default_has_reference_entries() {
        let trusted = TrustedRanges::default();
        assert_eq!(trusted.len(), 7);
        assert!(trusted.contains(Ipv4Addr::LOCALHOST));
        assert!(trusted.contains(Ipv4Addr::new(18, 234, 32, 200)));
        assert!(!trusted.contains(Ipv4Addr::new(203, 0, 113, 5)));
    }

    #[test]
    fn trusted_ranges_parse_is_all_or_nothing() {
        let error = TrustedRanges::parse(&["10.0.0.0/8", "10.0.0.0/40"]).unwrap_err();
        assert_eq!(error, HookError::invalid_address("10.0.0.0/40"));
    }

    #[test]
    fn trusted_ranges_unwrap_ipv4_mapped_addresses() {
        let trusted = TrustedRanges::default();
        let mapped: IpAddr = "::ffff:127.0.0.1".parse().unwrap();
        let native: IpAddr = "::1".parse().unwrap();
        assert!(trusted.contains_ip(mapped));
        assert!(!trusted.contains_ip(native));
    }
}
