//! FNV-1a, for fingerprints that must agree across processes.
//!
//! The standard library's default hasher is randomly keyed per process, so it cannot be used to
//! compare two mirrors. [`TableMirror::checksum`](crate::TableMirror::checksum) and the
//! reconnect jitter seed use [`FnvHasher`] instead. It detects change; it does not protect
//! against anyone.

use std::hash::Hasher;

const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const PRIME: u64 = 0x0100_0000_01b3;

/// 64-bit FNV-1a.
///
/// ```
/// use lurelands_sync::hash::FnvHasher;
/// use std::hash::{Hash, Hasher};
///
/// let mut left = FnvHasher::new();
/// let mut right = FnvHasher::new();
/// "pole_1".hash(&mut left);
/// "pole_1".hash(&mut right);
/// assert_eq!(left.finish(), right.finish());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FnvHasher(u64);

impl FnvHasher {
    /// An empty hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self(OFFSET_BASIS)
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0 = bytes
            .iter()
            .fold(self.0, |state, byte| (state ^ u64::from(*byte)).wrapping_mul(PRIME));
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn nothing_written_is_the_offset_basis() {
        assert_eq!(FnvHasher::new().finish(), OFFSET_BASIS);
    }

    #[test]
    fn matches_the_reference_vector() {
        let mut hasher = FnvHasher::new();
        hasher.write(b"a");
        assert_eq!(hasher.finish(), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn split_writes_equal_one_write() {
        let mut whole = FnvHasher::new();
        whole.write(b"fish_pond_1");
        let mut split = FnvHasher::new();
        split.write(b"fish_");
        split.write(b"pond_1");
        assert_eq!(whole.finish(), split.finish());
    }
}
