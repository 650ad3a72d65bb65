//! Page-based packed integer storage.
//!
//! Values are appended into a staging page. When the page fills up it is
//! sealed: the page minimum is stored once and every value is stored as its
//! delta from that minimum, using the fewest bits that fit the largest delta.
//! Sealed pages keep O(1) random access.
//!
//! ```
//! use tessera::util::packed::PackedAppendBuffer;
//!
//! let mut buffer = PackedAppendBuffer::new(4);
//! for v in [10, 12, 11, 15] {
//!     buffer.add(v);
//! }
//!
//! let page = buffer.page(0).unwrap();
//! assert_eq!(page.min_value(), 10);
//! assert_eq!(page.bits_per_value(), 3);
//! assert_eq!(buffer.get(3), 15);
//! ```

use std::mem::size_of;

use crate::error::{Result, TesseraError};
use crate::storage::checksum::{ChecksumInput, ChecksumOutput};
use crate::storage::{StorageInput, StorageOutput};

/// Smallest encoding of a page: one byte each for the min value, the bits
/// per value and the length.
const MIN_ENCODED_PAGE_BYTES: u64 = 3;

/// Number of bits needed to represent `delta` (0 for 0).
pub fn bits_required(delta: u64) -> u8 {
    (u64::BITS - delta.leading_zeros()) as u8
}

fn mask(bits_per_value: u8) -> u64 {
    if bits_per_value == 64 {
        u64::MAX
    } else {
        (1u64 << bits_per_value) - 1
    }
}

fn words_for(len: usize, bits_per_value: u8) -> usize {
    (len * bits_per_value as usize).div_ceil(64)
}

fn unpack(packed: &[u64], bits_per_value: u8, index: usize) -> u64 {
    if bits_per_value == 0 {
        return 0;
    }
    let bit = index * bits_per_value as usize;
    let word = bit / 64;
    let shift = bit % 64;

    let mut value = packed[word] >> shift;
    if shift + bits_per_value as usize > 64 {
        value |= packed[word + 1] << (64 - shift);
    }
    value & mask(bits_per_value)
}

/// A sealed page: `min_value` plus bit-packed deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedPage {
    min_value: i64,
    bits_per_value: u8,
    len: usize,
    packed: Vec<u64>,
}

impl PackedPage {
    /// Seal a page of raw values.
    fn seal(values: &[i64]) -> Self {
        let (Some(&min), Some(&max)) = (values.iter().min(), values.iter().max()) else {
            return PackedPage {
                min_value: 0,
                bits_per_value: 0,
                len: 0,
                packed: Vec::new(),
            };
        };

        // A span wider than i64::MAX overflows; store such pages at full width.
        let bits_per_value = match max.checked_sub(min) {
            Some(delta) => bits_required(delta as u64),
            None => 64,
        };

        let mut packed = vec![0u64; words_for(values.len(), bits_per_value)];
        if bits_per_value > 0 {
            let m = mask(bits_per_value);
            let bpv = bits_per_value as usize;
            for (i, &value) in values.iter().enumerate() {
                let delta = (value.wrapping_sub(min) as u64) & m;
                let bit = i * bpv;
                let word = bit / 64;
                let shift = bit % 64;
                packed[word] |= delta << shift;
                if shift + bpv > 64 {
                    packed[word + 1] |= delta >> (64 - shift);
                }
            }
        }

        PackedPage {
            min_value: min,
            bits_per_value,
            len: values.len(),
            packed,
        }
    }

    pub fn min_value(&self) -> i64 {
        self.min_value
    }

    pub fn bits_per_value(&self) -> u8 {
        self.bits_per_value
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The stored delta for slot `index`.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    pub fn delta(&self, index: usize) -> u64 {
        assert!(
            index < self.len,
            "index {index} out of range for packed page of {} values",
            self.len
        );
        unpack(&self.packed, self.bits_per_value, index)
    }

    /// Reconstruct the value in slot `index`.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    pub fn get(&self, index: usize) -> i64 {
        self.min_value.wrapping_add(self.delta(index) as i64)
    }

    fn decode_into(&self, out: &mut Vec<i64>) {
        out.clear();
        out.extend((0..self.len).map(|i| {
            self.min_value
                .wrapping_add(unpack(&self.packed, self.bits_per_value, i) as i64)
        }));
    }

    fn ram_bytes_used(&self) -> usize {
        size_of::<Self>() + self.packed.capacity() * size_of::<u64>()
    }

    fn write_to<W: StorageOutput>(&self, out: &mut ChecksumOutput<W>) -> Result<()> {
        out.write_zlong(self.min_value)?;
        out.write_u8(self.bits_per_value)?;
        out.write_vint(self.len as u32)?;
        for &word in &self.packed {
            out.write_u64(word)?;
        }
        Ok(())
    }

    fn read_from<R: StorageInput>(input: &mut ChecksumInput<R>, page_size: usize) -> Result<Self> {
        let min_value = input.read_zlong()?;
        let bits_per_value = input.read_u8()?;
        if bits_per_value > 64 {
            return Err(input.corrupt(format!("invalid bits per value: {bits_per_value}")));
        }
        let len = input.read_vint()? as usize;
        if len == 0 || len > page_size {
            return Err(input.corrupt(format!(
                "invalid page length {len} for page size {page_size}"
            )));
        }
        let words = words_for(len, bits_per_value);
        if (words * 8) as u64 > input.remaining() {
            return Err(input.corrupt("packed page extends past end of file"));
        }
        let mut packed = Vec::with_capacity(words);
        for _ in 0..words {
            packed.push(input.read_u64()?);
        }
        Ok(PackedPage {
            min_value,
            bits_per_value,
            len,
            packed,
        })
    }
}

/// Append-only, page-based compressor for `i64` sequences.
///
/// Single writer: concurrent appends must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct PackedAppendBuffer {
    page_size: usize,
    pages: Vec<PackedPage>,
    pending: Vec<i64>,
    len: usize,
}

impl PackedAppendBuffer {
    /// Create a buffer that seals every `page_size` values.
    ///
    /// # Panics
    ///
    /// If `page_size` is zero.
    pub fn new(page_size: usize) -> Self {
        assert!(page_size > 0, "page size must be > 0");
        PackedAppendBuffer {
            page_size,
            pages: Vec::new(),
            pending: Vec::with_capacity(page_size.min(1024)),
            len: 0,
        }
    }

    /// Append a value.
    pub fn add(&mut self, value: i64) {
        self.pending.push(value);
        self.len += 1;
        if self.pending.len() == self.page_size {
            self.pages.push(PackedPage::seal(&self.pending));
            self.pending.clear();
        }
    }

    /// Get the value at a global index.
    ///
    /// # Panics
    ///
    /// If `index >= len()`.
    pub fn get(&self, index: usize) -> i64 {
        assert!(
            index < self.len,
            "index {index} out of range for buffer of {} values",
            self.len
        );
        self.get_in_page(index / self.page_size, index % self.page_size)
    }

    /// Get slot `index` of page `page`; the last page may still be open.
    ///
    /// # Panics
    ///
    /// If the page or the slot does not exist.
    pub fn get_in_page(&self, page: usize, index: usize) -> i64 {
        if page < self.pages.len() {
            self.pages[page].get(index)
        } else {
            assert!(
                page == self.pages.len() && index < self.pending.len(),
                "slot {index} of page {page} out of range"
            );
            self.pending[index]
        }
    }

    /// Lazy single-pass iterator; decodes one page at a time.
    pub fn iter(&self) -> PackedIter<'_> {
        PackedIter::new(&self.pages, &self.pending)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of sealed pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// A sealed page, or `None` if it is still open or does not exist.
    pub fn page(&self, index: usize) -> Option<&PackedPage> {
        self.pages.get(index)
    }

    /// Approximate heap usage.
    pub fn ram_bytes_used(&self) -> usize {
        size_of::<Self>()
            + self.pages.iter().map(PackedPage::ram_bytes_used).sum::<usize>()
            + self.pending.capacity() * size_of::<i64>()
    }

    /// Seal the trailing partial page and return the immutable values.
    pub fn freeze(mut self) -> PackedValues {
        if !self.pending.is_empty() {
            self.pages.push(PackedPage::seal(&self.pending));
        }
        PackedValues {
            page_size: self.page_size,
            pages: self.pages,
            len: self.len,
        }
    }
}

/// Immutable packed values, safe to share between threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedValues {
    page_size: usize,
    pages: Vec<PackedPage>,
    len: usize,
}

impl PackedValues {
    /// # Panics
    ///
    /// If `index >= len()`.
    pub fn get(&self, index: usize) -> i64 {
        assert!(
            index < self.len,
            "index {index} out of range for {} packed values",
            self.len
        );
        self.pages[index / self.page_size].get(index % self.page_size)
    }

    pub fn iter(&self) -> PackedIter<'_> {
        PackedIter::new(&self.pages, &[])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn pages(&self) -> &[PackedPage] {
        &self.pages
    }

    pub fn ram_bytes_used(&self) -> usize {
        size_of::<Self>() + self.pages.iter().map(PackedPage::ram_bytes_used).sum::<usize>()
    }

    /// Serialize into a checksummed output.
    pub fn write_to<W: StorageOutput>(&self, out: &mut ChecksumOutput<W>) -> Result<()> {
        out.write_vint(self.page_size as u32)?;
        out.write_vlong(self.len as u64)?;
        out.write_vint(self.pages.len() as u32)?;
        for page in &self.pages {
            page.write_to(out)?;
        }
        Ok(())
    }

    /// Read values written by [`PackedValues::write_to`].
    ///
    /// Counts are checked against the bytes left in `input` before anything
    /// is allocated.
    pub fn read_from<R: StorageInput>(input: &mut ChecksumInput<R>) -> Result<Self> {
        let page_size = input.read_vint()? as usize;
        if page_size == 0 {
            return Err(input.corrupt("packed page size is 0"));
        }
        let len = input.read_vlong()? as usize;
        let page_count = input.read_vint()? as usize;
        if page_count != len.div_ceil(page_size) {
            return Err(input.corrupt(format!(
                "{page_count} pages cannot hold {len} values of page size {page_size}"
            )));
        }
        if (page_count as u64).saturating_mul(MIN_ENCODED_PAGE_BYTES) > input.remaining() {
            return Err(input.corrupt(format!(
                "{page_count} packed pages extend past end of file"
            )));
        }

        let mut pages = Vec::with_capacity(page_count.min(1024));
        for i in 0..page_count {
            let page = PackedPage::read_from(input, page_size)?;
            let expected = if i + 1 < page_count {
                page_size
            } else {
                len - i * page_size
            };
            if page.len != expected {
                return Err(input.corrupt(format!(
                    "page {i} holds {} values, expected {expected}",
                    page.len
                )));
            }
            pages.push(page);
        }

        Ok(PackedValues {
            page_size,
            pages,
            len,
        })
    }

    /// Build from a slice, sealing every `page_size` values.
    pub fn from_values(page_size: usize, values: &[i64]) -> Self {
        let mut buffer = PackedAppendBuffer::new(page_size);
        for &v in values {
            buffer.add(v);
        }
        buffer.freeze()
    }
}

/// Iterator over packed values. Call `iter()` again to restart.
#[derive(Debug)]
pub struct PackedIter<'a> {
    pages: &'a [PackedPage],
    tail: &'a [i64],
    next_page: usize,
    decoded: Vec<i64>,
    pos: usize,
    in_tail: bool,
}

impl<'a> PackedIter<'a> {
    fn new(pages: &'a [PackedPage], tail: &'a [i64]) -> Self {
        PackedIter {
            pages,
            tail,
            next_page: 0,
            decoded: Vec::new(),
            pos: 0,
            in_tail: false,
        }
    }

    fn current(&self) -> &[i64] {
        if self.in_tail { self.tail } else { &self.decoded }
    }
}

impl Iterator for PackedIter<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        while self.pos >= self.current().len() {
            if self.next_page < self.pages.len() {
                self.pages[self.next_page].decode_into(&mut self.decoded);
                self.next_page += 1;
            } else if !self.in_tail && !self.tail.is_empty() {
                self.in_tail = true;
            } else {
                return None;
            }
            self.pos = 0;
        }
        let value = self.current()[self.pos];
        self.pos += 1;
        Some(value)
    }
}
