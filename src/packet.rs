//! # Packet Helpers
//!
//! IP version detection and the 4-byte address-family header that utun
//! devices put in front of every packet.

use crate::constants::AF_HEADER_LEN;
use crate::error::{DeviceError, Result};

// Darwin address families, fixed regardless of the build host
const DARWIN_AF_INET: u32 = 2;
const DARWIN_AF_INET6: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
    Unknown,
}

impl IpVersion {
    #[inline]
    pub fn from_packet(data: &[u8]) -> Self {
        if data.is_empty() {
            return IpVersion::Unknown;
        }
        match data[0] >> 4 {
            4 => IpVersion::V4,
            6 => IpVersion::V6,
            _ => IpVersion::Unknown,
        }
    }

    fn address_family(self) -> Option<u32> {
        match self {
            IpVersion::V4 => Some(DARWIN_AF_INET),
            IpVersion::V6 => Some(DARWIN_AF_INET6),
            IpVersion::Unknown => None,
        }
    }
}

/// Write the address-family header for `packet` into `out[..4]`.
/// Non-IP payloads are rejected.
pub fn encode_af_header(packet: &[u8], out: &mut [u8]) -> Result<()> {
    let family = IpVersion::from_packet(packet).address_family().ok_or_else(|| {
        DeviceError::InvalidParameter("payload is neither IPv4 nor IPv6".into())
    })?;
    if out.len() < AF_HEADER_LEN {
        return Err(DeviceError::BufferTooSmall { needed: AF_HEADER_LEN, got: out.len() });
    }
    out[..AF_HEADER_LEN].copy_from_slice(&family.to_be_bytes());
    Ok(())
}

/// Prefix `packet` with its address-family header.
pub fn add_af_header(packet: &[u8]) -> Result<Vec<u8>> {
    let mut framed = vec![0u8; AF_HEADER_LEN + packet.len()];
    encode_af_header(packet, &mut framed)?;
    framed[AF_HEADER_LEN..].copy_from_slice(packet);
    Ok(framed)
}

/// Borrow the payload behind an address-family header, checking that the
/// header names IPv4 or IPv6.
pub fn strip_af_header(frame: &[u8]) -> Result<&[u8]> {
    if frame.len() < AF_HEADER_LEN {
        return Err(DeviceError::InvalidParameter(format!(
            "frame of {} bytes has no address-family header",
            frame.len()
        )));
    }
    let family = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
    match family {
        DARWIN_AF_INET | DARWIN_AF_INET6 => Ok(&frame[AF_HEADER_LEN..]),
        other => Err(DeviceError::InvalidParameter(format!(
            "unsupported address family {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_version_detection() {
        assert_eq!(IpVersion::from_packet(&[0x45, 0x00, 0x00, 0x3c]), IpVersion::V4);
        assert_eq!(IpVersion::from_packet(&[0x60, 0x00, 0x00, 0x00]), IpVersion::V6);
        assert_eq!(IpVersion::from_packet(&[]), IpVersion::Unknown);
    }

    #[test]
    fn test_af_header_v4_and_v6() {
        let v4 = [0x45u8, 0, 0, 20];
        let framed = add_af_header(&v4).unwrap();
        assert_eq!(&framed[..4], &[0, 0, 0, 2]);
        assert_eq!(strip_af_header(&framed).unwrap(), &v4);

        let v6 = [0x60u8, 0, 0, 0];
        let framed = add_af_header(&v6).unwrap();
        assert_eq!(&framed[..4], &[0, 0, 0, 30]);
    }

    #[test]
    fn test_af_header_rejects_non_ip() {
        assert!(add_af_header(&[0x10, 0, 0, 0]).is_err());
        assert!(add_af_header(&[]).is_err());
        assert!(strip_af_header(&[0, 0, 0, 7, 0x45]).is_err());
        assert!(strip_af_header(&[0, 0]).is_err());
    }
}
