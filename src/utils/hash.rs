use sha3::{Digest, Keccak256};

// incremental keccak256 over streamed upload chunks
#[derive(Default)]
pub struct ChecksumWriter {
    hasher: Keccak256,
}

impl ChecksumWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    pub fn finalize(self) -> String {
        format!("0x{}", hex::encode(self.hasher.finalize()))
    }
}
