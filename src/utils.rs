//! Utility functions for identifiers and storage keys

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

// '#' is outside the bech32 charset, so a prefix scan never bleeds into another id
pub(crate) fn sequence_prefix(id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(id.len() + 1);
    key.extend_from_slice(id.as_bytes());
    key.push(b'#');
    key
}

/// Key of the `sequence`-th child row under `id`. Big-endian so sled iterates in order.
pub(crate) fn sequence_key(id: &str, sequence: u32) -> Vec<u8> {
    let mut key = sequence_prefix(id);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}
