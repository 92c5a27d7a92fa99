use sha2::{Digest, Sha256};

const GROUPS: usize = 6;
const GROUP_BYTES: usize = 5;
const GROUP_MODULUS: u64 = 100_000;

/// Human-comparable fingerprint of two identity keys.
///
/// Both parties order the keys byte-wise before hashing, so either side
/// computes the same number. Rendered as six space-separated groups of
/// five digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafetyNumber(String);

impl SafetyNumber {
    pub fn generate(key1: &[u8; 32], key2: &[u8; 32]) -> Self {
        let (first, second) = if key1 <= key2 {
            (key1, key2)
        } else {
            (key2, key1)
        };

        let digest = Sha256::new()
            .chain_update(first)
            .chain_update(second)
            .finalize();

        let groups: Vec<String> = digest[..GROUPS * GROUP_BYTES]
            .chunks(GROUP_BYTES)
            .map(|chunk| {
                let value = chunk
                    .iter()
                    .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
                format!("{:05}", value % GROUP_MODULUS)
            })
            .collect();

        Self(groups.join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SafetyNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
