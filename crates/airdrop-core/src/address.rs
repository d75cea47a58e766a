//! Canonical claimant addresses.
//!
//! A claimant identifier (typically a public key) is decoded to raw bytes,
//! digested with SHA-256 and encoded with Bech32m ([BIP-350]) under a
//! configurable human-readable prefix, e.g. `drop1...`. The address is what
//! identity resolution uses to find the claimant's delivery destination.
//!
//! [BIP-350]: https://github.com/bitcoin/bips/blob/master/bip-0350.mediawiki

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::AddressError;
use crate::types::Hash256;

/// Bech32m checksum constant (BIP-350).
const BECH32M_CONST: u32 = 0x2bc830a3;

/// Bech32 character set for encoding 5-bit values.
const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Current address version.
pub const ADDRESS_VERSION: u8 = 0;

/// How a claimant identifier string maps to the bytes that are hashed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierEncoding {
    /// Standard base64, e.g. a serialized public key.
    #[default]
    Base64,
    /// The UTF-8 bytes of the string itself.
    Utf8,
}

impl IdentifierEncoding {
    /// Decode `identifier` into the bytes used for leaf and address hashing.
    pub fn decode(&self, identifier: &str) -> Result<Vec<u8>, AddressError> {
        match self {
            Self::Base64 => base64::engine::general_purpose::STANDARD
                .decode(identifier)
                .map_err(|_| AddressError::InvalidIdentifier),
            Self::Utf8 => Ok(identifier.as_bytes().to_vec()),
        }
    }
}

/// A Bech32m-encoded digest of a claimant identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CanonicalAddress {
    prefix: String,
    version: u8,
    digest: Hash256,
}

impl CanonicalAddress {
    /// Derive the address for already-decoded identifier bytes.
    pub fn derive(identifier: &[u8], prefix: &str) -> Result<Self, AddressError> {
        validate_prefix(prefix)?;
        Ok(Self {
            prefix: prefix.to_string(),
            version: ADDRESS_VERSION,
            digest: Hash256(Sha256::digest(identifier).into()),
        })
    }

    /// The SHA-256 digest encoded in this address.
    pub fn digest(&self) -> Hash256 {
        self.digest
    }

    /// The human-readable prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Encode this address as a Bech32m string.
    pub fn encode(&self) -> String {
        let data_5bit = to_five_bit(self.digest.as_bytes());

        let mut payload = Vec::with_capacity(1 + data_5bit.len());
        payload.push(self.version);
        payload.extend_from_slice(&data_5bit);

        let checksum = bech32m_create_checksum(&self.prefix, &payload);

        let mut result = String::with_capacity(self.prefix.len() + 1 + payload.len() + 6);
        result.push_str(&self.prefix);
        result.push('1');
        for &d in payload.iter().chain(checksum.iter()) {
            result.push(CHARSET[d as usize] as char);
        }
        result
    }
}

impl fmt::Display for CanonicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn validate_prefix(prefix: &str) -> Result<(), AddressError> {
    let valid = !prefix.is_empty()
        && prefix.len() <= 32
        && prefix.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(AddressError::InvalidPrefix(prefix.to_string()))
    }
}

// --- Bech32m internals ---

fn bech32m_polymod(values: &[u8]) -> u32 {
    const GEN: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];
    values.iter().fold(1u32, |chk, &v| {
        let top = chk >> 25;
        let mut next = ((chk & 0x1ffffff) << 5) ^ (v as u32);
        for (i, g) in GEN.iter().enumerate() {
            if (top >> i) & 1 != 0 {
                next ^= g;
            }
        }
        next
    })
}

fn prefix_expand(prefix: &str) -> Vec<u8> {
    prefix
        .bytes()
        .map(|c| c >> 5)
        .chain(std::iter::once(0))
        .chain(prefix.bytes().map(|c| c & 31))
        .collect()
}

fn bech32m_create_checksum(prefix: &str, data: &[u8]) -> [u8; 6] {
    let mut values = prefix_expand(prefix);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0; 6]);
    let polymod = bech32m_polymod(&values) ^ BECH32M_CONST;
    std::array::from_fn(|i| ((polymod >> (5 * (5 - i))) & 31) as u8)
}

/// Regroup bytes into 5-bit values, zero-padding the final group.
fn to_five_bit(bytes: &[u8]) -> Vec<u8> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity((bytes.len() * 8).div_ceil(5));
    for &b in bytes {
        acc = (acc << 8) | b as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(((acc >> bits) & 31) as u8);
        }
    }
    if bits > 0 {
        out.push(((acc << (5 - bits)) & 31) as u8);
    }
    out
}
