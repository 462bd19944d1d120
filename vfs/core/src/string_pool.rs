//! Byte-string interning.
//!
//! Strings are appended to a single buffer as `[len: u32][hash: u32][bytes]`
//! records and indexed by an open-addressing table of record offsets. A
//! [`StrRef`] is the record offset, so references stay valid when the index
//! is rebuilt.

use std::fmt;
use std::num::NonZeroU32;

use layerfs_io::{FsError, FsErrorKind, FsResult};
use xxhash_rust::xxh32::xxh32;

/// Bytes at the front of the buffer that never hold a record, so no record
/// offset can collide with the raw value of [`StrRef::EMPTY`].
const HEADER: usize = 8;
const RECORD_HEADER: usize = 8;
const MIN_BUCKETS: usize = 16;
const SEED: u32 = 0;

/// Handle to an interned string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrRef(NonZeroU32);

impl StrRef {
    /// The empty string. Always valid, even in a cleared pool.
    pub const EMPTY: StrRef = StrRef(NonZeroU32::MIN);

    pub fn raw(self) -> u32 {
        self.0.get()
    }

    /// `None` for the raw value 0, which no interned string ever has.
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(StrRef)
    }
}

impl fmt::Debug for StrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrRef({})", self.0)
    }
}

#[derive(Default)]
pub struct StringPool {
    buf: Vec<u8>,
    /// Record offsets; 0 marks an empty slot. Length is 0 or a power of two.
    buckets: Vec<u32>,
    count: usize,
}

impl fmt::Debug for StringPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringPool")
            .field("strings", &self.count)
            .field("bytes", &self.buf.len())
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct non-empty strings.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Size of the append buffer, headers included.
    pub fn bytes_used(&self) -> usize {
        self.buf.len()
    }

    /// Interns `bytes`, returning the existing reference if it is already
    /// present.
    ///
    /// On allocation failure the pool is left exactly as it was and
    /// `NoMemory` is returned.
    pub fn intern(&mut self, bytes: &[u8]) -> FsResult<StrRef> {
        if bytes.is_empty() {
            return Ok(StrRef::EMPTY);
        }
        let hash = xxh32(bytes, SEED);
        if let Some(found) = self.lookup(bytes, hash) {
            return Ok(found);
        }

        let len = u32::try_from(bytes.len())
            .map_err(|_| FsError::new(FsErrorKind::InvalidInput, "pool.intern.len"))?;
        let start = if self.buf.is_empty() { HEADER } else { self.buf.len() };
        let record_end = start
            .checked_add(RECORD_HEADER + bytes.len())
            .filter(|end| *end <= u32::MAX as usize)
            .ok_or_else(|| FsError::new(FsErrorKind::NoMemory, "pool.intern.full"))?;
        // `start` fits in u32 (checked above) and is at least HEADER.
        let interned = StrRef::from_raw(start as u32)
            .ok_or_else(|| FsError::new(FsErrorKind::InvalidData, "pool.intern.offset"))?;

        // Everything that can fail happens before the first mutation.
        self.buf
            .try_reserve(record_end - self.buf.len())
            .map_err(|_| FsError::new(FsErrorKind::NoMemory, "pool.intern.buffer"))?;
        if (self.count + 1) * 4 > self.buckets.len() * 3 {
            self.grow()?;
        }

        if self.buf.is_empty() {
            self.buf.resize(HEADER, 0);
        }
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(&hash.to_le_bytes());
        self.buf.extend_from_slice(bytes);

        self.place(interned.raw(), hash);
        self.count += 1;
        Ok(interned)
    }

    /// Looks `bytes` up without inserting.
    pub fn find(&self, bytes: &[u8]) -> Option<StrRef> {
        if bytes.is_empty() {
            return Some(StrRef::EMPTY);
        }
        self.lookup(bytes, xxh32(bytes, SEED))
    }

    /// The bytes behind `r`, or `None` if `r` does not point at a record of
    /// this pool.
    pub fn resolve(&self, r: StrRef) -> Option<&[u8]> {
        if r == StrRef::EMPTY {
            return Some(&[]);
        }
        let offset = r.raw() as usize;
        if offset < HEADER {
            return None;
        }
        let len = read_u32(&self.buf, offset)? as usize;
        let start = offset + RECORD_HEADER;
        self.buf.get(start..start.checked_add(len)?)
    }

    pub fn resolve_str(&self, r: StrRef) -> Option<&str> {
        std::str::from_utf8(self.resolve(r)?).ok()
    }

    /// Drops every string. All previously returned references except
    /// [`StrRef::EMPTY`] become invalid.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.buckets.clear();
        self.count = 0;
    }

    fn lookup(&self, bytes: &[u8], hash: u32) -> Option<StrRef> {
        if self.buckets.is_empty() {
            return None;
        }
        let mask = self.buckets.len() - 1;
        let mut slot = hash as usize & mask;
        loop {
            let offset = self.buckets[slot];
            if offset == 0 {
                return None;
            }
            if read_u32(&self.buf, offset as usize + 4) == Some(hash) {
                let r = StrRef::from_raw(offset)?;
                if self.resolve(r) == Some(bytes) {
                    return Some(r);
                }
            }
            slot = (slot + 1) & mask;
        }
    }

    /// Doubles the index and reinserts every record using its stored hash.
    fn grow(&mut self) -> FsResult<()> {
        let size = (self.buckets.len() * 2).max(MIN_BUCKETS);
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(size)
            .map_err(|_| FsError::new(FsErrorKind::NoMemory, "pool.grow"))?;
        buckets.resize(size, 0);

        let old = std::mem::replace(&mut self.buckets, buckets);
        for offset in old.into_iter().filter(|offset| *offset != 0) {
            let hash = read_u32(&self.buf, offset as usize + 4).unwrap_or_default();
            self.place(offset, hash);
        }
        Ok(())
    }

    fn place(&mut self, offset: u32, hash: u32) {
        let mask = self.buckets.len() - 1;
        let mut slot = hash as usize & mask;
        while self.buckets[slot] != 0 {
            slot = (slot + 1) & mask;
        }
        self.buckets[slot] = offset;
    }
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
