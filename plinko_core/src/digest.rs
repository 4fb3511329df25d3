use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};

use crate::error::PlinkoError;

// Keyed digest behind every outcome: HMAC-SHA256(key = server seed, message).
// Two interchangeable backends; both must agree on the conformance vectors below.

pub type HmacSha256 = Hmac<Sha256>;

pub const DIGEST_LEN: usize = 32;
pub type Digest = [u8; DIGEST_LEN];

pub trait Digester: Send + Sync {
    fn name(&self) -> &'static str;

    /// HMAC-SHA256 of `message` under `key`. Keys of any length are accepted.
    fn digest(&self, key: &[u8], message: &[u8]) -> Digest;
}

/// `ring`'s HMAC, backed by its assembly SHA-256 kernels.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceleratedDigester;

impl Digester for AcceleratedDigester {
    fn name(&self) -> &'static str {
        "accelerated"
    }

    fn digest(&self, key: &[u8], message: &[u8]) -> Digest {
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key);
        let tag = ring::hmac::sign(&key, message);
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(tag.as_ref());
        out
    }
}

/// RustCrypto `hmac` + `sha2`, pure Rust.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareDigester;

impl Digester for SoftwareDigester {
    fn name(&self) -> &'static str {
        "software"
    }

    fn digest(&self, key: &[u8], message: &[u8]) -> Digest {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
        mac.update(message);
        let res = mac.finalize().into_bytes();
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&res);
        out
    }
}

/// Which backend to run with. `Auto` probes the accelerated path first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestPreference {
    #[default]
    Auto,
    Accelerated,
    Software,
}

impl fmt::Display for DigestPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DigestPreference::Auto => "auto",
            DigestPreference::Accelerated => "accelerated",
            DigestPreference::Software => "software",
        };
        f.write_str(s)
    }
}

impl FromStr for DigestPreference {
    type Err = PlinkoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DigestPreference::Auto),
            "accelerated" | "native" => Ok(DigestPreference::Accelerated),
            "software" | "soft" => Ok(DigestPreference::Software),
            other => Err(PlinkoError::Validation(format!(
                "unknown digest backend '{other}' (expected auto, accelerated or software)"
            ))),
        }
    }
}

/// A known-answer test shared by both backends.
#[derive(Debug, Clone)]
pub struct ConformanceVector {
    pub name: &'static str,
    pub key: Vec<u8>,
    pub message: Vec<u8>,
    pub expected_hex: &'static str,
}

/// RFC 4231 cases (short, long and over-block keys) plus one pinned drop message.
pub fn conformance_vectors() -> Vec<ConformanceVector> {
    vec![
        ConformanceVector {
            name: "rfc4231-1",
            key: vec![0x0b; 20],
            message: b"Hi There".to_vec(),
            expected_hex: "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7",
        },
        ConformanceVector {
            name: "rfc4231-2",
            key: b"Jefe".to_vec(),
            message: b"what do ya want for nothing?".to_vec(),
            expected_hex: "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843",
        },
        ConformanceVector {
            name: "rfc4231-3",
            key: vec![0xaa; 20],
            message: vec![0xdd; 50],
            expected_hex: "773ea91e36800e46854db8ebd09181a72959098b3ef8c122d9635514ced565fe",
        },
        ConformanceVector {
            name: "rfc4231-4",
            key: (0x01..=0x19).collect(),
            message: vec![0xcd; 50],
            expected_hex: "82558a389a443c0ea4cc819899f2083a85f0faa3e578f8077a2e3ff46729665b",
        },
        ConformanceVector {
            name: "rfc4231-6",
            key: vec![0xaa; 131],
            message: b"Test Using Larger Than Block-Size Key - Hash Key First".to_vec(),
            expected_hex: "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54",
        },
        ConformanceVector {
            name: "rfc4231-7",
            key: vec![0xaa; 131],
            message: b"This is a test using a larger than block-size key and a larger than block-size data. The key needs to be hashed before being used by the HMAC algorithm.".to_vec(),
            expected_hex: "9b09ffa71b942fcb27635fbcd5b0e944bfdc63644f0713938a7f51535c3a35e2",
        },
        ConformanceVector {
            name: "drop-s-c-0-0",
            key: b"s".to_vec(),
            message: b"s:c:0:0".to_vec(),
            expected_hex: "a38fb1bc258d27eee8435240c6ba890007623d6d75ca91c0ed984fb66ddf91b4",
        },
    ]
}

/// Names of the vectors `digester` gets wrong. Empty means conformant.
pub fn conformance_failures(digester: &dyn Digester) -> Vec<&'static str> {
    conformance_vectors()
        .into_iter()
        .filter(|v| hex::encode(digester.digest(&v.key, &v.message)) != v.expected_hex)
        .map(|v| v.name)
        .collect()
}

/// Picks the backend for the process. Falling back is logged, never surfaced.
pub fn select_digester(preference: DigestPreference) -> Box<dyn Digester> {
    match preference {
        DigestPreference::Software => Box::new(SoftwareDigester),
        DigestPreference::Accelerated => Box::new(AcceleratedDigester),
        DigestPreference::Auto => {
            let failures = conformance_failures(&AcceleratedDigester);
            if failures.is_empty() {
                info!(backend = "accelerated", "digest backend selected");
                Box::new(AcceleratedDigester)
            } else {
                warn!(
                    ?failures,
                    "accelerated digest failed self-test, using software backend"
                );
                Box::new(SoftwareDigester)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_backends_pass_conformance() {
        assert!(conformance_failures(&AcceleratedDigester).is_empty());
        assert!(conformance_failures(&SoftwareDigester).is_empty());
    }

    #[test]
    fn test_backends_agree_on_varied_lengths() {
        for key_len in [0usize, 1, 32, 63, 64, 65, 200] {
            for msg_len in [0usize, 1, 55, 56, 64, 119, 120, 1000] {
                let key: Vec<u8> = (0..key_len).map(|i| (i * 7) as u8).collect();
                let msg: Vec<u8> = (0..msg_len).map(|i| (i * 13 + 1) as u8).collect();
                assert_eq!(
                    AcceleratedDigester.digest(&key, &msg),
                    SoftwareDigester.digest(&key, &msg),
                    "key {key_len} msg {msg_len}"
                );
            }
        }
    }

    #[test]
    fn test_auto_selects_accelerated() {
        let digester = select_digester(DigestPreference::Auto);
        assert_eq!(digester.name(), "accelerated");
        assert_eq!(select_digester(DigestPreference::Software).name(), "software");
    }

    #[test]
    fn test_preference_parsing() {
        assert_eq!("AUTO".parse::<DigestPreference>().unwrap(), DigestPreference::Auto);
        assert_eq!(
            "software".parse::<DigestPreference>().unwrap(),
            DigestPreference::Software
        );
        assert!("gpu".parse::<DigestPreference>().is_err());
    }
}
