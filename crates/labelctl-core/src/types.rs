//! Shared value types used across the subsystem handlers.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use labelctl_proto::DecodeError;

use crate::error::ValidationError;

/// Labeling protocols the service can attach to a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelProtocol {
    /// RIPSO/IPv4 labels.
    Ripso,
    /// CIPSO/IPv4 labels.
    CipsoV4,
    /// CIPSO/IPv6 labels.
    CipsoV6,
    /// CALIPSO/IPv6 labels.
    Calipso,
    /// No label; traffic passes unlabeled.
    Unlabeled,
    /// Per-address selection between other protocols.
    AddressSelect,
}

impl LabelProtocol {
    pub(crate) const fn raw(self) -> u32 {
        match self {
            Self::Ripso => 1,
            Self::CipsoV4 => 2,
            Self::CipsoV6 => 3,
            Self::Calipso => 4,
            Self::Unlabeled => 5,
            Self::AddressSelect => 6,
        }
    }

    /// Maps a wire discriminant back to a protocol.
    ///
    /// Unknown discriminants are reported, not invented; callers skip the
    /// carrying entry so newer kernels stay readable.
    pub(crate) const fn from_raw(raw: u32) -> Result<Self, DecodeError> {
        match raw {
            1 => Ok(Self::Ripso),
            2 => Ok(Self::CipsoV4),
            3 => Ok(Self::CipsoV6),
            4 => Ok(Self::Calipso),
            5 => Ok(Self::Unlabeled),
            6 => Ok(Self::AddressSelect),
            other => Err(DecodeError::UnknownType(other)),
        }
    }
}

impl fmt::Display for LabelProtocol {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ripso => "ripso",
            Self::CipsoV4 => "cipso4",
            Self::CipsoV6 => "cipso6",
            Self::Calipso => "calipso",
            Self::Unlabeled => "unlabeled",
            Self::AddressSelect => "address-select",
        };
        formatter.write_str(name)
    }
}

/// Address-family scope of a domain mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    /// Applies to both IPv4 and IPv6 traffic.
    #[default]
    Any,
    /// IPv4 only.
    V4,
    /// IPv6 only.
    V6,
}

impl AddressFamily {
    pub(crate) const fn raw(self) -> u16 {
        match self {
            Self::Any => 0,
            Self::V4 => 2,
            Self::V6 => 10,
        }
    }

    pub(crate) const fn from_raw(raw: u16) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(Self::Any),
            2 => Ok(Self::V4),
            10 => Ok(Self::V6),
            other => Err(DecodeError::UnknownType(other as u32)),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::V4 => "ipv4",
            Self::V6 => "ipv6",
        };
        formatter.write_str(name)
    }
}

/// A network selector: an address plus a prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkSelector {
    /// Network address.
    pub address: IpAddr,
    /// Prefix length in bits.
    pub prefix: u8,
}

impl NetworkSelector {
    /// Builds a selector, rejecting a prefix longer than the family allows.
    pub fn new(address: IpAddr, prefix: u8) -> Result<Self, ValidationError> {
        let max = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(ValidationError::PrefixTooLong { prefix, max });
        }
        Ok(Self { address, prefix })
    }

    /// The network mask corresponding to this selector's prefix.
    #[must_use]
    pub fn mask_bytes(&self) -> Vec<u8> {
        match self.address {
            IpAddr::V4(_) => mask_bytes(self.prefix, 4),
            IpAddr::V6(_) => mask_bytes(self.prefix, 16),
        }
    }

    /// The address bytes in network order.
    #[must_use]
    pub fn address_bytes(&self) -> Vec<u8> {
        match self.address {
            IpAddr::V4(address) => address.octets().to_vec(),
            IpAddr::V6(address) => address.octets().to_vec(),
        }
    }

    pub(crate) fn from_v4_bytes(address: &[u8], mask: &[u8]) -> Result<Self, DecodeError> {
        let octets: [u8; 4] = address.try_into().map_err(|_| DecodeError::BadLength {
            declared: address.len(),
            expected: 4,
        })?;
        Ok(Self {
            address: IpAddr::V4(Ipv4Addr::from(octets)),
            prefix: prefix_from_mask(mask),
        })
    }

    pub(crate) fn from_v6_bytes(address: &[u8], mask: &[u8]) -> Result<Self, DecodeError> {
        let octets: [u8; 16] = address.try_into().map_err(|_| DecodeError::BadLength {
            declared: address.len(),
            expected: 16,
        })?;
        Ok(Self {
            address: IpAddr::V6(Ipv6Addr::from(octets)),
            prefix: prefix_from_mask(mask),
        })
    }
}

impl fmt::Display for NetworkSelector {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}", self.address, self.prefix)
    }
}

/// Failures parsing an `address/prefix` selector from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorParseError {
    /// The address portion is not a valid IP address.
    #[error("invalid network address: {0}")]
    Address(String),
    /// The prefix portion is not a number.
    #[error("invalid prefix length: {0}")]
    Prefix(String),
    /// The prefix is longer than the address family allows.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl FromStr for NetworkSelector {
    type Err = SelectorParseError;

    /// Parses `address` or `address/prefix`; a bare address gets the full
    /// prefix for its family.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (address_text, prefix_text) = match input.split_once('/') {
            Some((address, prefix)) => (address, Some(prefix)),
            None => (input, None),
        };
        let address: IpAddr = address_text
            .parse()
            .map_err(|_| SelectorParseError::Address(address_text.to_owned()))?;
        let prefix = match prefix_text {
            Some(text) => text
                .parse::<u8>()
                .map_err(|_| SelectorParseError::Prefix(text.to_owned()))?,
            None => match address {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            },
        };
        Ok(Self::new(address, prefix)?)
    }
}

fn mask_bytes(prefix: u8, width: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; width];
    let mut remaining = usize::from(prefix);
    for byte in &mut bytes {
        if remaining >= 8 {
            *byte = 0xff;
            remaining -= 8;
        } else {
            *byte = !(0xffu8.checked_shr(remaining as u32).unwrap_or(0xff));
            break;
        }
    }
    bytes
}

fn prefix_from_mask(mask: &[u8]) -> u8 {
    let mut prefix = 0u8;
    for byte in mask {
        if *byte == 0xff {
            prefix += 8;
        } else {
            prefix += byte.leading_ones() as u8;
            break;
        }
    }
    prefix
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("10.0.0.0/8", 8)]
    #[case("192.168.1.1", 32)]
    #[case("fd00::/64", 64)]
    fn parses_selectors_with_and_without_prefixes(#[case] input: &str, #[case] prefix: u8) {
        let selector: NetworkSelector = input.parse().unwrap();
        assert_eq!(selector.prefix, prefix);
    }

    #[test]
    fn rejects_prefixes_beyond_the_family_maximum() {
        assert!(matches!(
            "10.0.0.0/33".parse::<NetworkSelector>(),
            Err(SelectorParseError::Validation(
                ValidationError::PrefixTooLong { prefix: 33, max: 32 }
            ))
        ));
    }

    #[rstest]
    #[case(0, [0, 0, 0, 0])]
    #[case(8, [0xff, 0, 0, 0])]
    #[case(12, [0xff, 0xf0, 0, 0])]
    #[case(32, [0xff, 0xff, 0xff, 0xff])]
    fn masks_round_trip_through_prefix_lengths(#[case] prefix: u8, #[case] mask: [u8; 4]) {
        assert_eq!(mask_bytes(prefix, 4), mask);
        assert_eq!(prefix_from_mask(&mask), prefix);
    }

    #[test]
    fn unknown_protocol_discriminants_are_surfaced() {
        assert!(matches!(
            LabelProtocol::from_raw(99),
            Err(DecodeError::UnknownType(99))
        ));
        assert_eq!(LabelProtocol::from_raw(2), Ok(LabelProtocol::CipsoV4));
    }
}
