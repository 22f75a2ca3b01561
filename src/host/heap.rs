use std::collections::BTreeMap;

/// Allocation granularity.
pub const ALIGN: u32 = 8;

/// A first-fit allocator over a growable address range.
///
/// Freed blocks are coalesced with their free neighbours, so a sequence of
/// paired allocations and frees always returns the heap to one free block.
#[derive(Debug)]
pub struct Heap {
    // Block start -> block size. Both maps hold aligned sizes.
    live: BTreeMap<u32, u32>,
    free: BTreeMap<u32, u32>,
    end: u32,
}

impl Heap {
    /// Creates a heap over `start..end`.
    pub fn new(start: u32, end: u32) -> Self {
        let mut heap = Heap {
            live: BTreeMap::new(),
            free: BTreeMap::new(),
            end: start,
        };
        heap.extend(end);
        heap
    }

    /// Returns the number of bytes in live blocks.
    pub fn in_use(&self) -> usize {
        self.live.values().map(|size| *size as usize).sum()
    }

    /// Returns the number of live blocks.
    pub fn live_blocks(&self) -> usize {
        self.live.len()
    }

    /// Makes `self.end..end` available for allocation.
    pub fn extend(&mut self, end: u32) {
        if end <= self.end {
            return;
        }

        let start = self.end;
        self.end = end;
        self.insert_free(start, end - start);
    }

    /// Allocates `size` bytes.
    ///
    /// Zero-sized requests still get a unique block.
    pub fn alloc(&mut self, size: u32) -> Option<u32> {
        let size = align(size.max(1))?;
        let (&start, &len) = self.free.iter().find(|(_, len)| **len >= size)?;
        self.free.remove(&start);
        if len > size {
            self.free.insert(start + size, len - size);
        }

        self.live.insert(start, size);
        Some(start)
    }

    /// Releases the block starting at `ptr`.
    ///
    /// Returns `false` when `ptr` is not the start of a live block.
    pub fn free(&mut self, ptr: u32) -> bool {
        match self.live.remove(&ptr) {
            Some(size) => {
                self.insert_free(ptr, size);
                true
            }
            None => false,
        }
    }

    /// Checks that `ptr..ptr + len` lies inside one live block.
    pub fn is_live(&self, ptr: u32, len: u32) -> bool {
        match self.live.range(..=ptr).next_back() {
            Some((&start, &size)) => ptr as u64 + len as u64 <= start as u64 + size as u64,
            None => false,
        }
    }

    fn insert_free(&mut self, mut start: u32, mut len: u32) {
        if let Some(next_len) = self.free.remove(&(start + len)) {
            len += next_len;
        }

        let prev = self.free.range(..start).next_back().map(|(s, l)| (*s, *l));
        if let Some((prev_start, prev_len)) = prev {
            if prev_start + prev_len == start {
                self.free.remove(&prev_start);
                start = prev_start;
                len += prev_len;
            }
        }

        self.free.insert(start, len);
    }
}

fn align(size: u32) -> Option<u32> {
    size.checked_add(ALIGN - 1).map(|n| n & !(ALIGN - 1))
}
