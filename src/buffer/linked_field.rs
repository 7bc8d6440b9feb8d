//! Linked views into a shared parent buffer.
//!
//! A `LinkedFieldChain` carves a parent [`FixedBuffer`] into an ordered
//! sequence of logically independent regions. Each region tracks only its
//! start offset and current size; a mutation of one region shifts the start
//! offsets of every later region in the same chain. This is the arena +
//! index-arithmetic-tree rewrite of a tree of aliased mutable views: the
//! chain, not any individual field, owns mutable access to the parent.

use super::FixedBuffer;
use crate::error::BufferError;
use heapless::Vec;

struct FieldDescriptor {
    start: usize,
    size: usize,
    /// `Some(cap)` if this field has a fixed maximum size.
    fixed_cap: Option<usize>,
}

/// A chain of field views over a single parent buffer of capacity `N`,
/// holding at most `M` fields.
pub struct LinkedFieldChain<'a, const N: usize, const M: usize> {
    parent: &'a mut FixedBuffer<N>,
    fields: Vec<FieldDescriptor, M>,
}

impl<'a, const N: usize, const M: usize> LinkedFieldChain<'a, N, M> {
    pub fn new(parent: &'a mut FixedBuffer<N>) -> Self {
        Self {
            parent,
            fields: Vec::new(),
        }
    }

    /// Append a new, initially-empty field to the end of the chain.
    /// Returns the field's index, or `Err` if the chain is full or a
    /// fixed-length cap would make the chain's total exceed the parent's
    /// capacity.
    pub fn add_field(&mut self, fixed_cap: Option<usize>) -> Result<usize, BufferError> {
        let start = self.end_of_chain();
        if let Some(cap) = fixed_cap {
            if start + cap > N {
                return Err(BufferError::CapacityExceeded);
            }
        }
        self.fields
            .push(FieldDescriptor { start, size: 0, fixed_cap })
            .map_err(|_| BufferError::CapacityExceeded)?;
        Ok(self.fields.len() - 1)
    }

    fn end_of_chain(&self) -> usize {
        self.fields.last().map_or(0, |f| f.start + f.size)
    }

    pub fn field_len(&self, idx: usize) -> usize {
        self.fields.get(idx).map_or(0, |f| f.size)
    }

    pub fn field_slice(&self, idx: usize) -> Option<&[u8]> {
        let f = self.fields.get(idx)?;
        self.parent.get_pointer_to_index(f.start)?.get(..f.size)
    }

    /// Maximum size field `idx` could grow to: the parent's capacity minus
    /// every other field's reserved (fixed) capacity and this chain's
    /// earlier variable usage.
    pub fn max_size(&self, idx: usize) -> usize {
        if idx >= self.fields.len() {
            return 0;
        }
        let reserved_by_others: usize = self
            .fields
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, f)| f.fixed_cap.unwrap_or(f.size))
            .sum();
        N.saturating_sub(reserved_by_others)
    }

    /// Append `data` to field `idx`, shifting every later field's start
    /// rightward. Fails if any earlier fixed-length field is not yet full,
    /// if field `idx` is fixed-length and would overflow its cap, or if the
    /// parent buffer has no room.
    pub fn field_append(&mut self, idx: usize, data: &[u8]) -> Result<(), BufferError> {
        let field_count = self.fields.len();
        if idx >= field_count {
            return Err(BufferError::OutOfBounds);
        }
        for earlier in &self.fields[..idx] {
            if let Some(cap) = earlier.fixed_cap {
                if earlier.size < cap {
                    return Err(BufferError::OutOfBounds);
                }
            }
        }
        let insert_at = self.fields[idx].start + self.fields[idx].size;
        if let Some(cap) = self.fields[idx].fixed_cap {
            if self.fields[idx].size + data.len() > cap {
                return Err(BufferError::CapacityExceeded);
            }
        }
        if !self.parent.insert(insert_at, data) {
            return Err(BufferError::CapacityExceeded);
        }
        self.fields[idx].size += data.len();
        for later in &mut self.fields[idx + 1..] {
            later.start += data.len();
        }
        Ok(())
    }

    /// Remove the last `len` bytes of field `idx`. Rejected (per the
    /// non-terminal-fixed-field invariant) if `idx` is fixed-length and any
    /// later sibling is non-empty.
    pub fn field_truncate(&mut self, idx: usize, len: usize) -> Result<(), BufferError> {
        let field_count = self.fields.len();
        if idx >= field_count || len > self.fields[idx].size {
            return Err(BufferError::OutOfBounds);
        }
        if self.fields[idx].fixed_cap.is_some()
            && self.fields[idx + 1..].iter().any(|f| f.size > 0)
        {
            return Err(BufferError::OutOfBounds);
        }
        let remove_at = self.fields[idx].start + self.fields[idx].size - len;
        if !self.parent.remove(remove_at, len) {
            return Err(BufferError::OutOfBounds);
        }
        self.fields[idx].size -= len;
        for later in &mut self.fields[idx + 1..] {
            later.start -= len;
        }
        Ok(())
    }

    /// Total bytes consumed by the chain so far.
    pub fn total_len(&self) -> usize {
        self.end_of_chain()
    }

    /// Validate the chain invariant: total used bytes fit within the
    /// parent's capacity and fields appear in non-overlapping, ascending
    /// start order.
    pub fn is_valid(&self) -> bool {
        let mut expected_start = 0usize;
        for f in &self.fields {
            if f.start != expected_start {
                return false;
            }
            expected_start += f.size;
        }
        expected_start <= N
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_variable_fields_chain() {
        let mut parent: FixedBuffer<32> = FixedBuffer::new();
        let mut chain: LinkedFieldChain<32, 4> = LinkedFieldChain::new(&mut parent);
        let a = chain.add_field(None).unwrap();
        let b = chain.add_field(None).unwrap();
        chain.field_append(a, b"topic").unwrap();
        chain.field_append(b, b"payload").unwrap();
        assert_eq!(chain.field_slice(a).unwrap(), b"topic");
        assert_eq!(chain.field_slice(b).unwrap(), b"payload");
        assert!(chain.is_valid());
    }

    #[test]
    fn insert_into_earlier_field_shifts_later_start() {
        let mut parent: FixedBuffer<32> = FixedBuffer::new();
        let mut chain: LinkedFieldChain<32, 4> = LinkedFieldChain::new(&mut parent);
        let a = chain.add_field(None).unwrap();
        let b = chain.add_field(None).unwrap();
        chain.field_append(b, b"XYZ").unwrap();
        chain.field_append(a, b"AB").unwrap();
        assert_eq!(chain.field_slice(a).unwrap(), b"AB");
        assert_eq!(chain.field_slice(b).unwrap(), b"XYZ");
    }

    #[test]
    fn fixed_field_rejects_append_once_full() {
        let mut parent: FixedBuffer<32> = FixedBuffer::new();
        let mut chain: LinkedFieldChain<32, 4> = LinkedFieldChain::new(&mut parent);
        let a = chain.add_field(Some(2)).unwrap();
        chain.field_append(a, b"AB").unwrap();
        assert!(chain.field_append(a, b"C").is_err());
    }

    #[test]
    fn append_to_later_field_rejected_while_earlier_fixed_not_full() {
        let mut parent: FixedBuffer<32> = FixedBuffer::new();
        let mut chain: LinkedFieldChain<32, 4> = LinkedFieldChain::new(&mut parent);
        let a = chain.add_field(Some(4)).unwrap();
        let b = chain.add_field(None).unwrap();
        chain.field_append(a, b"A").unwrap();
        assert!(chain.field_append(b, b"Z").is_err());
    }

    #[test]
    fn truncate_fixed_field_rejected_while_later_sibling_nonempty() {
        let mut parent: FixedBuffer<32> = FixedBuffer::new();
        let mut chain: LinkedFieldChain<32, 4> = LinkedFieldChain::new(&mut parent);
        let a = chain.add_field(Some(4)).unwrap();
        let b = chain.add_field(None).unwrap();
        chain.field_append(a, b"ABCD").unwrap();
        chain.field_append(b, b"Z").unwrap();
        assert!(chain.field_truncate(a, 1).is_err());
    }
}
