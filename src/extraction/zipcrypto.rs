//! Traditional PKWARE ("ZipCrypto") decryption strategies
//!
//! The ZIP library performs the actual decryption during extraction. Before a
//! password is handed to it, the zip backend pre-screens the password against
//! the 12-byte encryption header of each traditionally encrypted entry, which
//! rejects roughly 255 of 256 wrong passwords without touching entry data.
//!
//! The key schedule is expressed through [`DecryptStrategy`] so the CRC-32
//! step can be swapped: [`ReferenceDecrypter`] computes it bit by bit,
//! [`TableDecrypter`] uses a precomputed table. Both must produce identical
//! output; the strategy is chosen from configuration when the backend is
//! built.

use crate::config::ZipDecryption;
use std::sync::Arc;

/// Length of the encryption header preceding every encrypted entry's data
pub const ENCRYPTION_HEADER_LEN: usize = 12;

const CRC32_POLY: u32 = 0xEDB8_8320;

/// The three 32-bit keys of the ZipCrypto stream cipher
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZipCryptoKeys {
    k0: u32,
    k1: u32,
    k2: u32,
}

impl Default for ZipCryptoKeys {
    fn default() -> Self {
        Self {
            k0: 0x1234_5678,
            k1: 0x2345_6789,
            k2: 0x3456_7890,
        }
    }
}

/// One implementation of the ZipCrypto key schedule
pub trait DecryptStrategy: Send + Sync {
    /// One CRC-32 step: fold `byte` into `crc`
    fn crc32_update(&self, crc: u32, byte: u8) -> u32;

    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Advance the keys with one plaintext byte
    fn update_keys(&self, keys: &mut ZipCryptoKeys, byte: u8) {
        keys.k0 = self.crc32_update(keys.k0, byte);
        keys.k1 = keys
            .k1
            .wrapping_add(keys.k0 & 0xFF)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        keys.k2 = self.crc32_update(keys.k2, (keys.k1 >> 24) as u8);
    }

    /// Keystream byte for the current key state
    fn stream_byte(&self, keys: &ZipCryptoKeys) -> u8 {
        let temp = (keys.k2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    /// Initialize keys from a password
    fn init_keys(&self, password: &[u8]) -> ZipCryptoKeys {
        let mut keys = ZipCryptoKeys::default();
        for &b in password {
            self.update_keys(&mut keys, b);
        }
        keys
    }

    /// Decrypt `buf` in place, advancing the key state
    fn decrypt_block(&self, keys: &mut ZipCryptoKeys, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            let plain = *byte ^ self.stream_byte(keys);
            self.update_keys(keys, plain);
            *byte = plain;
        }
    }

    /// Encrypt `buf` in place, advancing the key state
    fn encrypt_block(&self, keys: &mut ZipCryptoKeys, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            let plain = *byte;
            *byte = plain ^ self.stream_byte(keys);
            self.update_keys(keys, plain);
        }
    }
}

/// Bitwise CRC-32, no lookup table
pub struct ReferenceDecrypter;

impl DecryptStrategy for ReferenceDecrypter {
    fn crc32_update(&self, crc: u32, byte: u8) -> u32 {
        let mut c = crc ^ u32::from(byte);
        for _ in 0..8 {
            c = if c & 1 != 0 {
                (c >> 1) ^ CRC32_POLY
            } else {
                c >> 1
            };
        }
        c
    }

    fn name(&self) -> &'static str {
        "reference"
    }
}

const fn crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut bit = 0;
        while bit < 8 {
            c = if c & 1 != 0 {
                (c >> 1) ^ CRC32_POLY
            } else {
                c >> 1
            };
            bit += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

static CRC32_TABLE: [u32; 256] = crc32_table();

/// Table-driven CRC-32
pub struct TableDecrypter;

impl DecryptStrategy for TableDecrypter {
    fn crc32_update(&self, crc: u32, byte: u8) -> u32 {
        (crc >> 8) ^ CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    }

    fn name(&self) -> &'static str {
        "table"
    }
}

/// Build the strategy selected in the configuration
pub fn strategy_for(kind: ZipDecryption) -> Arc<dyn DecryptStrategy> {
    match kind {
        ZipDecryption::Reference => Arc::new(ReferenceDecrypter),
        ZipDecryption::Table => Arc::new(TableDecrypter),
    }
}

/// Check a password against an entry's encryption header
///
/// The last decrypted header byte must equal one of the `check_bytes`
/// (writers use either the CRC high byte or the DOS time high byte,
/// depending on whether a data descriptor follows). `false` is a definitive
/// rejection; `true` only means the password is plausible.
pub fn password_matches_header(
    strategy: &dyn DecryptStrategy,
    password: &[u8],
    header: &[u8; ENCRYPTION_HEADER_LEN],
    check_bytes: &[u8],
) -> bool {
    let mut keys = strategy.init_keys(password);
    let mut buf = *header;
    strategy.decrypt_block(&mut keys, &mut buf);
    check_bytes.contains(&buf[ENCRYPTION_HEADER_LEN - 1])
}
