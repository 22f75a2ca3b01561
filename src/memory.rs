//! Typed access to the linear memory shared with the native module.

use core::cell::Cell;
use core::ops::Range;

use crate::abi::{self, ptr_t, NativeModule};
use crate::{Error, Result};

/// A block of linear memory returned by the native allocator.
///
/// The type is neither `Copy` nor `Clone`: [`LinearMemory::free`] consumes it,
/// so every block is released at most once.
#[must_use = "an allocation must be returned to `LinearMemory::free`"]
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    ptr: ptr_t,
    len: u32,
}

impl Allocation {
    /// Returns the address of the block.
    #[inline]
    pub fn ptr(&self) -> ptr_t {
        self.ptr
    }

    /// Returns the requested length of the block.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Checks that the block has zero requested length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Typed access to the linear memory shared with a [`NativeModule`].
///
/// Views into the memory are never cached: every access re-reads the
/// current memory from the module, so growth never leaves a stale view.
/// Addresses stay valid across growth.
///
/// Any access outside of the memory poisons the bridge and every later
/// operation fails with [`Error::RegionPoisoned`].
pub struct LinearMemory<M> {
    module: M,
    outstanding: usize,
    poisoned: Cell<bool>,
}

impl<M: NativeModule> LinearMemory<M> {
    /// Wraps a native module.
    pub fn new(module: M) -> Self {
        LinearMemory {
            module,
            outstanding: 0,
            poisoned: Cell::new(false),
        }
    }

    /// Returns the wrapped module.
    #[inline]
    pub fn module(&self) -> &M {
        &self.module
    }

    /// Returns the wrapped module for calling entry points.
    pub(crate) fn native(&mut self) -> Result<&mut M> {
        self.check_poisoned()?;
        Ok(&mut self.module)
    }

    /// Returns the current size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.module.memory().len()
    }

    /// Returns the current size in pages.
    #[inline]
    pub fn pages(&self) -> u32 {
        (self.size() / abi::PAGE_SIZE as usize) as u32
    }

    /// Returns the number of allocations not yet freed.
    #[inline]
    pub fn outstanding_allocations(&self) -> usize {
        self.outstanding
    }

    /// Checks that an out-of-bounds access made the memory unusable.
    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.get()
    }

    /// Grows the memory by `pages` and returns the previous size in pages.
    pub fn grow(&mut self, pages: u32) -> Result<u32> {
        self.check_poisoned()?;
        let previous = self.module.memory_grow(pages).ok_or(Error::OutOfMemory { pages })?;
        log::debug!("linear memory grown from {} to {} page(s)", previous, previous + pages);
        Ok(previous)
    }

    /// Allocates `size` bytes with the native allocator.
    pub fn allocate(&mut self, size: u32) -> Result<Allocation> {
        self.check_poisoned()?;
        let ptr = self.module.malloc(size)?;
        if ptr == 0 {
            return Err(Error::AllocationFailed { size });
        }

        // A block past the end of memory means the allocator is broken.
        self.check_range(ptr, size)?;

        self.outstanding += 1;
        log::trace!("malloc({}) -> {:#x}", size, ptr);
        Ok(Allocation { ptr, len: size })
    }

    /// Allocates a block and copies `bytes` into it.
    pub fn allocate_bytes(&mut self, bytes: &[u8]) -> Result<Allocation> {
        let size = u32::try_from(bytes.len()).map_err(|_| Error::AllocationFailed { size: u32::MAX })?;
        let allocation = self.allocate(size)?;
        self.write_bytes(allocation.ptr, bytes)?;
        Ok(allocation)
    }

    /// Allocates a NUL-terminated copy of `s`.
    pub fn allocate_c_str(&mut self, s: &str) -> Result<Allocation> {
        let size = u32::try_from(s.len() + 1).map_err(|_| Error::AllocationFailed { size: u32::MAX })?;
        let allocation = self.allocate(size)?;
        self.write_bytes(allocation.ptr, s.as_bytes())?;
        self.write_bytes(allocation.ptr + s.len() as u32, &[0])?;
        Ok(allocation)
    }

    /// Returns a block to the native allocator.
    pub fn free(&mut self, allocation: Allocation) -> Result<()> {
        self.check_poisoned()?;
        self.module.free(allocation.ptr)?;
        self.outstanding -= 1;
        log::trace!("free({:#x})", allocation.ptr);
        Ok(())
    }

    /// Copies `bytes` into the memory at `ptr`.
    pub fn write_bytes(&mut self, ptr: ptr_t, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| Error::OutOfBoundsAccess {
            offset: ptr,
            len: u32::MAX,
            size: self.size(),
        })?;
        let range = self.check_range(ptr, len)?;
        self.module.memory_mut()[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Returns a view of `len` bytes at `ptr`.
    ///
    /// The view borrows the bridge, so it cannot outlive the next call
    /// that may grow the memory.
    pub fn read_bytes(&self, ptr: ptr_t, len: u32) -> Result<&[u8]> {
        let range = self.check_range(ptr, len)?;
        Ok(&self.module.memory()[range])
    }

    /// Reads a little-endian `u32` at `ptr`.
    pub fn read_u32(&self, ptr: ptr_t) -> Result<u32> {
        let bytes = self.read_bytes(ptr, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a little-endian `i32` at `ptr`.
    pub fn read_i32(&self, ptr: ptr_t) -> Result<i32> {
        self.read_u32(ptr).map(|n| n as i32)
    }

    fn check_poisoned(&self) -> Result<()> {
        if self.poisoned.get() {
            return Err(Error::RegionPoisoned);
        }

        Ok(())
    }

    fn check_range(&self, ptr: ptr_t, len: u32) -> Result<Range<usize>> {
        self.check_poisoned()?;

        let size = self.size();
        let start = ptr as usize;
        let end = start + len as usize;
        if end > size {
            log::error!("out-of-bounds access of {} byte(s) at {:#x}, memory is {} byte(s)", len, ptr, size);
            self.poisoned.set(true);
            return Err(Error::OutOfBoundsAccess { offset: ptr, len, size });
        }

        Ok(start..end)
    }
}
