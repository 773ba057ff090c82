//! Data verification with checksums
//!
//! Every batch is hashed over its encoded, uncompressed bytes. A table's
//! checksum chains those digests in sequence order, so it does not depend
//! on which worker finished first.

pub mod checksum;

pub use checksum::{
    batch_digest, calculate_checksum_bytes, from_hex, to_hex, BatchDigest, ChecksumAccumulator,
    EMPTY_TABLE_CHECKSUM,
};
