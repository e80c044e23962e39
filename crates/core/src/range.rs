//! Byte ranges and range bookkeeping.
//!
//! All ranges in this crate are half-open `[start, end)`. The only exception is
//! the HTTP `Content-Range` header, whose last byte position is inclusive;
//! [`ContentRange`] converts it at the boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A non-empty half-open byte interval `[start, end)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Create a range. Empty and inverted ranges are rejected.
    pub fn new(start: u64, end: u64) -> crate::Result<Self> {
        if end <= start {
            return Err(crate::Error::InvalidRange(format!(
                "[{start}, {end}) is empty or inverted"
            )));
        }
        Ok(Self { start, end })
    }

    /// Create a range of `len` bytes starting at `start`.
    pub fn with_len(start: u64, len: u64) -> crate::Result<Self> {
        let end = start.checked_add(len).ok_or_else(|| {
            crate::Error::InvalidRange(format!("{start} + {len} overflows u64"))
        })?;
        Self::new(start, end)
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes in the range (never zero).
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Always false; ranges cannot be empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether the two ranges share at least one byte.
    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether the range lies entirely inside `[0, size)`.
    pub fn fits_within(&self, size: u64) -> bool {
        self.end <= size
    }
}

impl fmt::Debug for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A set of pairwise disjoint byte ranges.
///
/// Adjacent ranges are kept separate so that every inserted range can be
/// removed again exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RangeSet {
    // start -> end
    ranges: BTreeMap<u64, u64>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ranges in the set.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of bytes covered.
    pub fn total_bytes(&self) -> u64 {
        self.ranges.iter().map(|(start, end)| end - start).sum()
    }

    /// Return an existing range that overlaps `range`, if any.
    pub fn find_overlap(&self, range: &ByteRange) -> Option<ByteRange> {
        // Ranges are disjoint and sorted, so the last range starting before
        // `range.end` has the greatest end among all candidates.
        let (&start, &end) = self.ranges.range(..range.end).next_back()?;
        (end > range.start).then_some(ByteRange { start, end })
    }

    /// Whether exactly this range is a member of the set.
    pub fn contains(&self, range: &ByteRange) -> bool {
        self.ranges.get(&range.start) == Some(&range.end)
    }

    /// Insert a range, failing with the conflicting range on overlap.
    pub fn insert(&mut self, range: ByteRange) -> Result<(), ByteRange> {
        if let Some(existing) = self.find_overlap(&range) {
            return Err(existing);
        }
        self.ranges.insert(range.start, range.end);
        Ok(())
    }

    /// Remove exactly this range. Returns false if it was not a member.
    pub fn remove(&mut self, range: &ByteRange) -> bool {
        if self.contains(range) {
            self.ranges.remove(&range.start);
            true
        } else {
            false
        }
    }

    /// Iterate over the ranges in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ByteRange> + '_ {
        self.ranges
            .iter()
            .map(|(&start, &end)| ByteRange { start, end })
    }

    /// Uncovered sub-ranges of `[0, size)`, in ascending order.
    pub fn gaps(&self, size: u64) -> Vec<ByteRange> {
        let mut gaps = Vec::new();
        let mut cursor = 0u64;
        for (&start, &end) in &self.ranges {
            if start >= size {
                break;
            }
            if start > cursor {
                gaps.push(ByteRange {
                    start: cursor,
                    end: start,
                });
            }
            cursor = cursor.max(end);
        }
        if cursor < size {
            gaps.push(ByteRange {
                start: cursor,
                end: size,
            });
        }
        gaps
    }

    /// Whether the set covers `[0, size)` exactly: contiguous from zero and
    /// nothing past `size`.
    pub fn covers_exactly(&self, size: u64) -> bool {
        let mut cursor = 0u64;
        for (&start, &end) in &self.ranges {
            if start != cursor {
                return false;
            }
            cursor = end;
        }
        cursor == size
    }
}

/// A parsed HTTP `Content-Range` request header: `bytes <first>-<last>/<total>`.
///
/// `last` is inclusive; `total` may be `*` when unknown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentRange {
    pub first: u64,
    pub last: u64,
    pub total: Option<u64>,
}

impl ContentRange {
    /// Convert to the equivalent half-open range `[first, last + 1)`.
    pub fn to_byte_range(&self) -> crate::Result<ByteRange> {
        let end = self.last.checked_add(1).ok_or_else(|| {
            crate::Error::InvalidContentRange("last byte position overflows".to_string())
        })?;
        ByteRange::new(self.first, end)
    }
}

impl FromStr for ContentRange {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let invalid = |msg: &str| crate::Error::InvalidContentRange(format!("{msg}: {s:?}"));

        let rest = s
            .trim()
            .strip_prefix("bytes ")
            .ok_or_else(|| invalid("unit must be bytes"))?;
        let (span, total) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing total"))?;
        let (first, last) = span
            .split_once('-')
            .ok_or_else(|| invalid("missing byte span"))?;

        let first: u64 = first.trim().parse().map_err(|_| invalid("bad first byte"))?;
        let last: u64 = last.trim().parse().map_err(|_| invalid("bad last byte"))?;
        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse::<u64>().map_err(|_| invalid("bad total"))?),
        };

        if last < first {
            return Err(invalid("last byte precedes first byte"));
        }
        if let Some(total) = total
            && last >= total
        {
            return Err(invalid("last byte is beyond total"));
        }

        Ok(Self { first, last, total })
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) => write!(f, "bytes {}-{}/{}", self.first, self.last, total),
            None => write!(f, "bytes {}-{}/*", self.first, self.last),
        }
    }
}
