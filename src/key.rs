//! Key slicing (spec.md §3 "Key representation", GLOSSARY "Slice"/"Layer").
//!
//! Keys are arbitrary byte strings. Each layer of the trie consumes an
//! 8-byte chunk ("slice") of the key; a slice is compared as an unsigned
//! 64-bit integer loaded big-endian, which is bitwise identical to comparing
//! the original bytes lexicographically (zero-padding a short tail sorts it
//! before any longer key sharing that prefix, exactly like byte comparison
//! would).

pub const SLICE_LEN: usize = 8;

/// One 8-byte chunk of a key, plus how many of its bytes were meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySlice {
    pub slice: u64,
    pub len: u8,
}

impl KeySlice {
    /// Load the slice at `layer_offset` bytes into `key`. `len` is the
    /// number of real key bytes packed into this slice (0..=8); when
    /// `len == 8` there may or may not be more key bytes remaining at the
    /// next layer — call [`has_more`] to distinguish.
    pub fn at(key: &[u8], layer_offset: usize) -> KeySlice {
        let remaining = key.len().saturating_sub(layer_offset);
        let take = remaining.min(SLICE_LEN);
        let mut buf = [0u8; SLICE_LEN];
        if take > 0 {
            buf[..take].copy_from_slice(&key[layer_offset..layer_offset + take]);
        }
        KeySlice {
            slice: u64::from_be_bytes(buf),
            len: take as u8,
        }
    }

    /// Whether this key has more bytes beyond this full 8-byte slice.
    pub fn has_more(self, key_len: usize, layer_offset: usize) -> bool {
        self.len as usize == SLICE_LEN && key_len > layer_offset + SLICE_LEN
    }

    /// Pack a caller-provided suffix (used by border slots storing `<= 7`
    /// meaningful bytes, i.e. a genuinely terminal slice within a layer).
    pub fn from_bytes(bytes: &[u8]) -> KeySlice {
        debug_assert!(bytes.len() <= SLICE_LEN);
        let mut buf = [0u8; SLICE_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        KeySlice {
            slice: u64::from_be_bytes(buf),
            len: bytes.len() as u8,
        }
    }

    pub fn as_bytes(self) -> [u8; SLICE_LEN] {
        self.slice.to_be_bytes()
    }

    /// Only the meaningful prefix of [`as_bytes`].
    pub fn meaningful_bytes(self) -> Vec<u8> {
        self.as_bytes()[..self.len as usize].to_vec()
    }
}

impl PartialOrd for KeySlice {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeySlice {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.slice, self.len).cmp(&(other.slice, other.len))
    }
}

/// Lexicographic byte comparison, used for whole-key ordering in scans.
pub fn compare_keys(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_key_zero_pads() {
        let s = KeySlice::at(b"ab", 0);
        assert_eq!(s.len, 2);
        assert_eq!(&s.as_bytes()[..2], b"ab");
        assert_eq!(&s.as_bytes()[2..], &[0u8; 6]);
    }

    #[test]
    fn full_slice_reports_overflow_when_more_bytes_remain() {
        let key = b"aaaaaaaaa1"; // 10 bytes
        let s = KeySlice::at(key, 0);
        assert_eq!(s.len, 8);
        assert!(s.has_more(key.len(), 0));
    }

    #[test]
    fn exact_eight_byte_key_has_no_overflow() {
        let key = b"aaaaaaaa"; // 8 bytes
        let s = KeySlice::at(key, 0);
        assert_eq!(s.len, 8);
        assert!(!s.has_more(key.len(), 0));
    }

    #[test]
    fn slice_ordering_matches_byte_ordering() {
        let pairs: &[(&[u8], &[u8])] = &[
            (b"a", b"b"),
            (b"aa", b"ab"),
            (b"", b"a"),
            (b"abc", b"abd"),
        ];
        for (a, b) in pairs {
            let sa = KeySlice::at(a, 0);
            let sb = KeySlice::at(b, 0);
            assert_eq!(sa.cmp(&sb), a.cmp(b));
        }
    }
}
