#![no_std]

#[macro_use]
extern crate alloc;

use alloc::boxed::Box;

macro_rules! div_round_up {
    ($n:expr, $d:expr) => {
        ($n + ($d - 1)) / $d
    };
}

/// A bit-vector stored byte by byte.
/// Bit `i` lives in byte `i / 8` under the mask `1 << (i % 8)`,
/// which is also the on-disk layout.
pub struct Bitmap {
    bytes: Box<[u8]>,
    nbits: u32,
}

impl Bitmap {
    pub fn new(nbits: u32) -> Self {
        let size = div_round_up!(nbits as u64, u8::BITS as u64);
        Self {
            bytes: vec![0; size as usize].into(),
            nbits,
        }
    }

    /// Builds a bitmap of `nbits` bits from its byte representation.
    /// Missing trailing bytes read as zero.
    pub fn from_bytes(bytes: &[u8], nbits: u32) -> Self {
        let mut bitmap = Self::new(nbits);
        let len = bitmap.bytes.len().min(bytes.len());
        bitmap.bytes[..len].copy_from_slice(&bytes[..len]);
        bitmap
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of addressable bits.
    pub fn capacity(&self) -> u32 {
        self.nbits
    }

    /// Returns the bit of the `offset` position.
    /// true - 1
    /// false - 0
    pub fn test(&self, offset: u32) -> bool {
        let (idx, mask) = Self::locate(offset);
        (self.bytes[idx] & mask) != 0
    }

    /// Set the bit at the `offset` position to `val`,
    /// and return the value before it was set.
    pub fn test_and_set(&mut self, offset: u32, val: bool) -> bool {
        let (idx, mask) = Self::locate(offset);
        let byte = self.bytes[idx];
        self.bytes[idx] = if val { byte | mask } else { byte & !mask };
        (byte & mask) != 0
    }

    /// Returns the position of the first 0 at or after `offset`
    /// and before `end` (defaults to the capacity).
    /// None means not existing
    pub fn find_next_zero(&self, offset: u32, end: Option<u32>) -> Option<u32> {
        let end = end.map_or(self.nbits, |end| end.min(self.nbits));
        let mut pos = offset;
        while pos < end {
            let (idx, _) = Self::locate(pos);
            let byte = self.bytes[idx];
            if pos % u8::BITS == 0 && byte == u8::MAX {
                pos += u8::BITS;
                continue;
            }
            // Skip the bits of this byte that lie before `pos`.
            let skipped = pos % u8::BITS;
            let free = !byte >> skipped;
            if free == 0 {
                pos += u8::BITS - skipped;
                continue;
            }
            let found = pos + free.trailing_zeros();
            return if found < end { Some(found) } else { None };
        }
        None
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> u32 {
        (0..self.nbits).filter(|&i| self.test(i)).count() as u32
    }

    #[inline(always)]
    fn locate(offset: u32) -> (usize, u8) {
        ((offset / u8::BITS) as usize, 1 << (offset % u8::BITS))
    }
}
