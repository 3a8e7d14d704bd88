//! Anchor-style discriminator computation.
//!
//! Multiple files in the wider ecosystem disagree on the exact
//! Kamino instruction-discriminator bytes; the canonical definition is
//! always recomputed from `SHA-256`, never copied as a literal byte table,
//! so this module is the single source of truth.

use sha2::{Digest, Sha256};

/// Anchor account discriminator = first 8 bytes of `SHA-256("account:" + PascalCaseName)`.
pub fn account_discriminator(type_name: &str) -> [u8; 8] {
    sha256_prefix8(&format!("account:{type_name}"))
}

/// Anchor instruction discriminator = first 8 bytes of `SHA-256("global:" + snake_case_name)`.
pub fn instruction_discriminator(snake_case_name: &str) -> [u8; 8] {
    sha256_prefix8(&format!("global:{snake_case_name}"))
}

fn sha256_prefix8(preimage: &str) -> [u8; 8] {
    let digest = Sha256::digest(preimage.as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Converts a `PascalCase` or `camelCase` identifier to `snake_case`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub fn to_hex(bytes: &[u8; 8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
