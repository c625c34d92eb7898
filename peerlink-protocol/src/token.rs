//! Connect token decoding
//!
//! The connect token is a fixed-size binary bearer credential issued by the
//! backend. Only the public portion is decoded here; the 1024-byte private
//! blob stays opaque to the client and travels to the server verbatim
//! inside the AUTH frame. Tokens are transported either as the raw 2048
//! bytes or as their URL-safe base64 form.

use crate::payload::{Payload, PayloadError};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;

/// Exact size of an encoded connect token.
pub const TOKEN_SIZE: usize = 2048;

/// Size of the token nonce.
pub const NONCE_SIZE: usize = 24;

/// Size of the encrypted private portion.
pub const PRIVATE_DATA_SIZE: usize = 1024;

/// Size of each direction key.
pub const KEY_SIZE: usize = 32;

/// Maximum number of server addresses a token may carry.
pub const MAX_SERVER_ADDRESSES: u32 = 32;

const ADDRESS_TYPE_IPV4: u8 = 1;
const ADDRESS_TYPE_IPV6: u8 = 2;

/// Token decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token length {actual}, expected {TOKEN_SIZE}")]
    InvalidLength { actual: usize },

    #[error("invalid token base64")]
    InvalidBase64,

    #[error("server address count {0} outside 1..={MAX_SERVER_ADDRESSES}")]
    AddressCountOutOfRange(u32),

    #[error("unknown server address type tag {0}")]
    UnknownAddressType(u8),

    #[error("malformed token layout: {0}")]
    Layout(#[from] PayloadError),
}

/// Decoded public portion of a connect token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectToken {
    /// Issuer version string.
    pub version: String,
    /// Protocol discriminator the server validates against.
    pub protocol_id: u64,
    /// Issue time, seconds since the issuer epoch.
    pub create_timestamp: u64,
    /// Expiry time, seconds since the issuer epoch.
    pub expire_timestamp: u64,
    /// Nonce for the private portion.
    pub nonce: [u8; NONCE_SIZE],
    /// Encrypted private portion, opaque to the client.
    pub private_data: Box<[u8; PRIVATE_DATA_SIZE]>,
    /// Connect timeout in seconds; non-positive disables the timeout.
    pub timeout_seconds: i32,
    /// Ranked server endpoints to try in order.
    pub server_addresses: Vec<SocketAddr>,
    /// Client to server traffic key.
    pub client_to_server_key: [u8; KEY_SIZE],
    /// Server to client traffic key.
    pub server_to_client_key: [u8; KEY_SIZE],
}

impl ConnectToken {
    /// Decode a raw 2048-byte token.
    ///
    /// Any other input length is rejected before field decoding begins.
    pub fn decode(bytes: &[u8]) -> Result<Self, TokenError> {
        if bytes.len() != TOKEN_SIZE {
            return Err(TokenError::InvalidLength {
                actual: bytes.len(),
            });
        }

        let mut payload = Payload::new(TOKEN_SIZE);
        payload.load(bytes);

        let version = payload.read_string();
        let protocol_id = payload.read_u64()?;
        let create_timestamp = payload.read_u64()?;
        let expire_timestamp = payload.read_u64()?;

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(payload.read_bytes(NONCE_SIZE)?);

        let mut private_data = Box::new([0u8; PRIVATE_DATA_SIZE]);
        private_data.copy_from_slice(payload.read_bytes(PRIVATE_DATA_SIZE)?);

        let timeout_seconds = payload.read_i32()?;

        let address_count = payload.read_u32()?;
        if address_count == 0 || address_count > MAX_SERVER_ADDRESSES {
            return Err(TokenError::AddressCountOutOfRange(address_count));
        }

        let mut server_addresses = Vec::with_capacity(address_count as usize);
        for _ in 0..address_count {
            server_addresses.push(read_address(&mut payload)?);
        }

        let mut client_to_server_key = [0u8; KEY_SIZE];
        client_to_server_key.copy_from_slice(payload.read_bytes(KEY_SIZE)?);
        let mut server_to_client_key = [0u8; KEY_SIZE];
        server_to_client_key.copy_from_slice(payload.read_bytes(KEY_SIZE)?);

        Ok(ConnectToken {
            version,
            protocol_id,
            create_timestamp,
            expire_timestamp,
            nonce,
            private_data,
            timeout_seconds,
            server_addresses,
            client_to_server_key,
            server_to_client_key,
        })
    }

    /// Decode a token from its URL-safe base64 transport form.
    pub fn from_base64(encoded: &str) -> Result<Self, TokenError> {
        let bytes = URL_SAFE
            .decode(encoded.trim())
            .map_err(|_| TokenError::InvalidBase64)?;
        Self::decode(&bytes)
    }

    /// URL-safe base64 transport form of a raw token.
    pub fn to_base64(bytes: &[u8]) -> String {
        URL_SAFE.encode(bytes)
    }
}

fn read_address(payload: &mut Payload) -> Result<SocketAddr, TokenError> {
    let tag = payload.read_u8()?;
    match tag {
        ADDRESS_TYPE_IPV4 => {
            let a = payload.read_u8()?;
            let b = payload.read_u8()?;
            let c = payload.read_u8()?;
            let d = payload.read_u8()?;
            let port = payload.read_u16()?;
            Ok(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::new(a, b, c, d)),
                port,
            ))
        }
        ADDRESS_TYPE_IPV6 => {
            let mut groups = [0u16; 8];
            for group in &mut groups {
                *group = payload.read_u16()?;
            }
            let port = payload.read_u16()?;
            let ip = Ipv6Addr::new(
                groups[0], groups[1], groups[2], groups[3], groups[4], groups[5], groups[6],
                groups[7],
            );
            Ok(SocketAddr::new(IpAddr::V6(ip), port))
        }
        other => Err(TokenError::UnknownAddressType(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal valid token buffer for tests.
    pub(crate) fn build_token(
        version: &str,
        protocol_id: u64,
        timeout_seconds: i32,
        addresses: &[SocketAddr],
    ) -> Vec<u8> {
        let mut payload = Payload::new(TOKEN_SIZE);
        payload.write_string(version).unwrap();
        payload.write_u64(protocol_id).unwrap();
        payload.write_u64(1_700_000_000).unwrap();
        payload.write_u64(1_700_000_600).unwrap();
        payload.write_bytes(&[0xAA; NONCE_SIZE]).unwrap();
        payload.write_bytes(&[0xBB; PRIVATE_DATA_SIZE]).unwrap();
        payload.write_i32(timeout_seconds).unwrap();
        payload.write_u32(addresses.len() as u32).unwrap();
        for address in addresses {
            match address {
                SocketAddr::V4(v4) => {
                    payload.write_u8(ADDRESS_TYPE_IPV4).unwrap();
                    payload.write_bytes(&v4.ip().octets()).unwrap();
                    payload.write_u16(v4.port()).unwrap();
                }
                SocketAddr::V6(v6) => {
                    payload.write_u8(ADDRESS_TYPE_IPV6).unwrap();
                    for group in v6.ip().segments() {
                        payload.write_u16(group).unwrap();
                    }
                    payload.write_u16(v6.port()).unwrap();
                }
            }
        }
        payload.write_bytes(&[0xCC; KEY_SIZE]).unwrap();
        payload.write_bytes(&[0xDD; KEY_SIZE]).unwrap();

        let mut bytes = payload.pack().to_vec();
        bytes.resize(TOKEN_SIZE, 0);
        bytes
    }

    #[test]
    fn test_decode_minimal_ipv4_token() {
        let addr: SocketAddr = "127.0.0.1:8889".parse().unwrap();
        let bytes = build_token("netcode 1.02", 1, 10, &[addr]);

        let token = ConnectToken::decode(&bytes).unwrap();
        assert_eq!(token.version, "netcode 1.02");
        assert_eq!(token.protocol_id, 1);
        assert_eq!(token.timeout_seconds, 10);
        assert_eq!(token.server_addresses, vec![addr]);
        assert_eq!(token.client_to_server_key, [0xCC; KEY_SIZE]);
        assert_eq!(token.server_to_client_key, [0xDD; KEY_SIZE]);
    }

    #[test]
    fn test_decode_ipv6_address() {
        let addr: SocketAddr = "[fe80::1]:9000".parse().unwrap();
        let bytes = build_token("netcode 1.02", 7, 5, &[addr]);

        let token = ConnectToken::decode(&bytes).unwrap();
        assert_eq!(token.server_addresses, vec![addr]);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert_eq!(
            ConnectToken::decode(&[0u8; 100]),
            Err(TokenError::InvalidLength { actual: 100 })
        );
        assert_eq!(
            ConnectToken::decode(&[0u8; TOKEN_SIZE + 1]),
            Err(TokenError::InvalidLength {
                actual: TOKEN_SIZE + 1
            })
        );
    }

    #[test]
    fn test_unknown_address_tag_fails_fast() {
        let addr: SocketAddr = "127.0.0.1:8889".parse().unwrap();
        let mut bytes = build_token("netcode 1.02", 1, 10, &[addr]);

        // Corrupt the type tag of the first address. Its offset is the
        // version string + NUL, the three u64 stamps, nonce, private blob,
        // timeout and count.
        let offset = "netcode 1.02".len() + 1 + 8 * 3 + NONCE_SIZE + PRIVATE_DATA_SIZE + 4 + 4;
        bytes[offset] = 9;

        assert_eq!(
            ConnectToken::decode(&bytes),
            Err(TokenError::UnknownAddressType(9))
        );
    }

    #[test]
    fn test_address_count_bounds() {
        let addr: SocketAddr = "127.0.0.1:8889".parse().unwrap();
        let mut bytes = build_token("netcode 1.02", 1, 10, &[addr]);
        let offset = "netcode 1.02".len() + 1 + 8 * 3 + NONCE_SIZE + PRIVATE_DATA_SIZE + 4;
        bytes[offset..offset + 4].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(
            ConnectToken::decode(&bytes),
            Err(TokenError::AddressCountOutOfRange(0))
        );

        bytes[offset..offset + 4].copy_from_slice(&33u32.to_le_bytes());
        assert_eq!(
            ConnectToken::decode(&bytes),
            Err(TokenError::AddressCountOutOfRange(33))
        );
    }

    #[test]
    fn test_base64_roundtrip() {
        let addr: SocketAddr = "10.0.0.2:40000".parse().unwrap();
        let bytes = build_token("netcode 1.02", 3, 15, &[addr]);

        let encoded = ConnectToken::to_base64(&bytes);
        let token = ConnectToken::from_base64(&encoded).unwrap();
        assert_eq!(token.server_addresses, vec![addr]);
        assert_eq!(token.protocol_id, 3);
    }

    #[test]
    fn test_bad_base64_rejected() {
        assert_eq!(
            ConnectToken::from_base64("!!not base64!!"),
            Err(TokenError::InvalidBase64)
        );
    }
}
