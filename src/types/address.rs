//! Hardware addresses for bulbs and sites.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::errors::Error;

/// Length in bytes of a device or site address.
pub const ADDR_LENGTH: usize = 6;

/// The 48-bit hardware address of a bulb.
///
/// The text form is 12 lowercase hex digits, which is also how selectors
/// address a single bulb.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use lightsd_rs::DeviceId;
///
/// let id = DeviceId::from_str("d073d501a0d5").unwrap();
/// assert_eq!(id.as_bytes(), &[0xd0, 0x73, 0xd5, 0x01, 0xa0, 0xd5]);
/// assert_eq!(id.to_string(), "d073d501a0d5");
/// assert!(DeviceId::from_str("kitchen").is_err());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId([u8; ADDR_LENGTH]);

impl DeviceId {
    pub const fn new(bytes: [u8; ADDR_LENGTH]) -> Self {
        DeviceId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDR_LENGTH] {
        &self.0
    }
}

/// The 48-bit identifier of a gateway's site (mesh network).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteId([u8; ADDR_LENGTH]);

impl SiteId {
    pub const fn new(bytes: [u8; ADDR_LENGTH]) -> Self {
        SiteId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDR_LENGTH] {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        parse_hex(s).map(DeviceId)
    }
}

impl FromStr for SiteId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        parse_hex(s).map(SiteId)
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for SiteId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Returns true if `s` has the shape of an address (12 hex digits).
pub(crate) fn looks_like_address(s: &str) -> bool {
    s.len() == ADDR_LENGTH * 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for b in bytes {
        write!(f, "{b:02x}")?;
    }
    Ok(())
}

fn parse_hex(s: &str) -> Result<[u8; ADDR_LENGTH], Error> {
    if !looks_like_address(s) {
        return Err(Error::InvalidDeviceId(s.to_string()));
    }

    let mut bytes = [0u8; ADDR_LENGTH];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
            .map_err(|_| Error::InvalidDeviceId(s.to_string()))?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uppercase() {
        let id = DeviceId::from_str("D073D5018FB6").unwrap();
        assert_eq!(id.to_string(), "d073d5018fb6");
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        assert!(DeviceId::from_str("d073d5").is_err());
        assert!(SiteId::from_str("d073d501a0d5ff").is_err());
    }

    #[test]
    fn test_serialize_as_string() {
        let id = DeviceId::new([0, 1, 2, 3, 4, 0xff]);
        assert_eq!(serde_json::to_value(id).unwrap(), "0001020304ff");
    }
}
