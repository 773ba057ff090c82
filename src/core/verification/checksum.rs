//! Checksum calculation for batch and table integrity
//!
//! Every batch is hashed over its encoded, uncompressed bytes. The table
//! checksum is the SHA-256 of the raw batch digests concatenated in sequence
//! order, so it does not depend on the order in which workers finish.

use crate::domain::{Result, TabportError};
use sha2::{Digest, Sha256};

/// Raw 32-byte SHA-256 digest of one batch
pub type BatchDigest = [u8; 32];

/// Checksum of a table with zero batches: SHA-256 of the empty byte string
pub const EMPTY_TABLE_CHECKSUM: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Calculate the raw SHA-256 digest of a batch payload
pub fn batch_digest(data: &[u8]) -> BatchDigest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Calculate SHA-256 checksum of raw bytes
///
/// # Arguments
///
/// * `data` - The raw bytes to calculate checksum for
///
/// # Returns
///
/// Returns a hex-encoded SHA-256 checksum string (64 characters).
///
/// # Examples
///
/// ```
/// use tabport::core::verification::checksum::calculate_checksum_bytes;
///
/// let checksum = calculate_checksum_bytes(b"");
/// assert_eq!(checksum.len(), 64);
/// ```
pub fn calculate_checksum_bytes(data: &[u8]) -> String {
    to_hex(&batch_digest(data))
}

/// Lowercase hex rendering of a digest
pub fn to_hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parse a 64-character hex digest
pub fn from_hex(hex: &str) -> Result<BatchDigest> {
    if hex.len() != 64 || !hex.is_ascii() {
        return Err(TabportError::Serialization(format!(
            "invalid digest '{hex}': expected 64 hex characters"
        )));
    }

    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| {
            TabportError::Serialization(format!("invalid digest '{hex}': not hexadecimal"))
        })?;
    }
    Ok(out)
}

/// Order-independent accumulator of per-batch digests
///
/// Batches are recorded by their sequence index in any order. Once every
/// slot is filled, [`finish`](Self::finish) hashes the digests in ascending
/// sequence order.
///
/// # Examples
///
/// ```
/// use tabport::core::verification::checksum::{batch_digest, ChecksumAccumulator};
///
/// let mut a = ChecksumAccumulator::new(2);
/// a.record(1, batch_digest(b"second")).unwrap();
/// a.record(0, batch_digest(b"first")).unwrap();
///
/// let mut b = ChecksumAccumulator::new(2);
/// b.record(0, batch_digest(b"first")).unwrap();
/// b.record(1, batch_digest(b"second")).unwrap();
///
/// assert_eq!(a.finish().unwrap(), b.finish().unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct ChecksumAccumulator {
    slots: Vec<Option<BatchDigest>>,
}

impl ChecksumAccumulator {
    pub fn new(batch_count: usize) -> Self {
        Self {
            slots: vec![None; batch_count],
        }
    }

    pub fn batch_count(&self) -> usize {
        self.slots.len()
    }

    /// Record the digest for batch `sequence`
    ///
    /// Recording the same sequence twice, or a sequence beyond the planned
    /// batch count, is an error.
    pub fn record(&mut self, sequence: usize, digest: BatchDigest) -> Result<()> {
        let count = self.slots.len();
        let slot = self.slots.get_mut(sequence).ok_or_else(|| {
            TabportError::Serialization(format!(
                "batch sequence {sequence} out of range (batch count {count})"
            ))
        })?;

        if slot.is_some() {
            return Err(TabportError::Serialization(format!(
                "digest for batch {sequence} recorded twice"
            )));
        }

        *slot = Some(digest);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Sequences that have no digest yet
    pub fn missing(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.is_none().then_some(i))
            .collect()
    }

    /// Compute the hex table checksum
    ///
    /// Fails if any batch slot is still empty.
    pub fn finish(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        for (sequence, slot) in self.slots.iter().enumerate() {
            let digest = slot.as_ref().ok_or_else(|| {
                TabportError::Serialization(format!("digest for batch {sequence} is missing"))
            })?;
            hasher.update(digest);
        }
        Ok(to_hex(&hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_checksum() {
        let acc = ChecksumAccumulator::new(0);
        assert_eq!(acc.finish().unwrap(), EMPTY_TABLE_CHECKSUM);
        assert_eq!(calculate_checksum_bytes(b""), EMPTY_TABLE_CHECKSUM);
    }

    #[test]
    fn test_order_independence() {
        let digests: Vec<BatchDigest> = (0..8)
            .map(|i| batch_digest(format!("batch {i}").as_bytes()))
            .collect();

        let mut forward = ChecksumAccumulator::new(8);
        for (i, d) in digests.iter().enumerate() {
            forward.record(i, *d).unwrap();
        }

        let mut reverse = ChecksumAccumulator::new(8);
        for (i, d) in digests.iter().enumerate().rev() {
            reverse.record(i, *d).unwrap();
        }

        assert_eq!(forward.finish().unwrap(), reverse.finish().unwrap());
    }

    #[test]
    fn test_chain_is_hash_of_concatenated_digests() {
        let d0 = batch_digest(b"a");
        let d1 = batch_digest(b"b");

        let mut acc = ChecksumAccumulator::new(2);
        acc.record(0, d0).unwrap();
        acc.record(1, d1).unwrap();

        let mut concatenated = d0.to_vec();
        concatenated.extend_from_slice(&d1);
        assert_eq!(acc.finish().unwrap(), calculate_checksum_bytes(&concatenated));
    }

    #[test]
    fn test_swapped_digests_change_checksum() {
        let mut a = ChecksumAccumulator::new(2);
        a.record(0, batch_digest(b"a")).unwrap();
        a.record(1, batch_digest(b"b")).unwrap();

        let mut b = ChecksumAccumulator::new(2);
        b.record(0, batch_digest(b"b")).unwrap();
        b.record(1, batch_digest(b"a")).unwrap();

        assert_ne!(a.finish().unwrap(), b.finish().unwrap());
    }

    #[test]
    fn test_duplicate_and_out_of_range() {
        let mut acc = ChecksumAccumulator::new(1);
        acc.record(0, batch_digest(b"x")).unwrap();
        assert!(acc.record(0, batch_digest(b"x")).is_err());
        assert!(acc.record(1, batch_digest(b"y")).is_err());
    }

    #[test]
    fn test_finish_with_missing_slot_fails() {
        let mut acc = ChecksumAccumulator::new(3);
        acc.record(1, batch_digest(b"x")).unwrap();
        assert!(!acc.is_complete());
        assert_eq!(acc.missing(), vec![0, 2]);
        assert!(acc.finish().is_err());
    }

    #[test]
    fn test_hex_round_trip() {
        let digest = batch_digest(b"hello");
        assert_eq!(from_hex(&to_hex(&digest)).unwrap(), digest);
        assert!(from_hex("abc").is_err());
        assert!(from_hex(&"zz".repeat(32)).is_err());
    }
}
