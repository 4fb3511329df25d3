use serde::{Deserialize, Serialize};

use crate::commitment::commit;
use crate::digest::{Digest, Digester};

// Deterministic float stream using the provably-fair HMAC construction
// HMAC(server_seed, "server:client:nonce:drop_index[:batch]") -> 4 x u32 BE -> floats in [0,1)

pub const FLOATS_PER_DIGEST: usize = 4;

const TWO_POW_32: f64 = 4_294_967_296.0;

/// Everything that determines one drop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropSeeds {
    pub server_seed: String,
    pub client_seed: String,
    pub nonce: u64,
    pub drop_index: u64,
}

impl DropSeeds {
    pub fn new(
        server_seed: impl Into<String>,
        client_seed: impl Into<String>,
        nonce: u64,
        drop_index: u64,
    ) -> Self {
        Self {
            server_seed: server_seed.into(),
            client_seed: client_seed.into(),
            nonce,
            drop_index,
        }
    }

    /// `serverSeed:clientSeed:nonce:dropIndex`
    pub fn message(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.server_seed, self.client_seed, self.nonce, self.drop_index
        )
    }

    pub fn server_seed_hash_hex(&self) -> String {
        commit(&self.server_seed)
    }

    pub fn stream<'a>(&'a self, digester: &'a dyn Digester) -> FloatStream<'a> {
        FloatStream::new(digester, self)
    }

    pub fn next_floats(&self, digester: &dyn Digester, count: usize) -> Vec<f64> {
        derive_floats(digester, self, count)
    }
}

/// First 16 bytes of a digest as four big-endian u32 mapped to [0,1).
pub fn floats_from_digest(digest: &Digest) -> [f64; FLOATS_PER_DIGEST] {
    let mut out = [0.0; FLOATS_PER_DIGEST];
    for (slot, chunk) in out.iter_mut().zip(digest.chunks_exact(4)) {
        let v = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        *slot = f64::from(v) / TWO_POW_32;
    }
    out
}

/// Lazy, unbounded sequence of floats for one drop.
///
/// Batch 0 digests the bare message, batch `k` digests `message:k`. Only the
/// batch currently being read is held; `restart` replays from the first value.
pub struct FloatStream<'a> {
    digester: &'a dyn Digester,
    key: &'a [u8],
    message: String,
    next_batch: u64,
    buffer: [f64; FLOATS_PER_DIGEST],
    pos: usize,
    yielded: u64,
}

impl<'a> FloatStream<'a> {
    pub fn new(digester: &'a dyn Digester, seeds: &'a DropSeeds) -> Self {
        Self {
            digester,
            key: seeds.server_seed.as_bytes(),
            message: seeds.message(),
            next_batch: 0,
            buffer: [0.0; FLOATS_PER_DIGEST],
            pos: FLOATS_PER_DIGEST,
            yielded: 0,
        }
    }

    pub fn restart(&mut self) {
        self.next_batch = 0;
        self.pos = FLOATS_PER_DIGEST;
        self.yielded = 0;
    }

    /// Number of values handed out since creation or the last restart.
    pub fn consumed(&self) -> u64 {
        self.yielded
    }

    fn refill(&mut self) {
        let digest = if self.next_batch == 0 {
            self.digester.digest(self.key, self.message.as_bytes())
        } else {
            let chained = format!("{}:{}", self.message, self.next_batch);
            self.digester.digest(self.key, chained.as_bytes())
        };
        self.buffer = floats_from_digest(&digest);
        self.pos = 0;
        self.next_batch += 1;
    }
}

impl Iterator for FloatStream<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.pos == FLOATS_PER_DIGEST {
            self.refill();
        }
        let value = self.buffer[self.pos];
        self.pos += 1;
        self.yielded += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

pub fn derive_floats(digester: &dyn Digester, seeds: &DropSeeds, count: usize) -> Vec<f64> {
    seeds.stream(digester).take(count).collect()
}
