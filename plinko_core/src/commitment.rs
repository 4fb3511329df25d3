use sha2::{Digest, Sha256};

/// Published before a server seed is used: lowercase hex SHA-256 of the seed.
pub fn commit(seed: &str) -> String {
    derive_hash_hex(seed.as_bytes())
}

pub fn derive_hash_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Checks a revealed seed against the commitment published for it.
pub fn verify_commitment(seed: &str, commitment: &str) -> bool {
    commit(seed).eq_ignore_ascii_case(commitment.trim())
}
