//! Device memory.
//!
//! Host-side devices back owned allocations with an 8-byte aligned buffer.
//! Wrapped allocations point at memory the caller owns and are never
//! released by the device.

use std::ptr::{self, NonNull};

use crate::error::DeviceError;
use crate::identity::DeviceId;

#[derive(Debug)]
enum Storage {
    Owned(Vec<u64>),
    Wrapped(NonNull<u8>),
}

/// A fixed-size allocation created by a device.
#[derive(Debug)]
pub struct Memory {
    device: DeviceId,
    size: usize,
    storage: Storage,
    mapped: bool,
}

impl Memory {
    pub(crate) fn owned(device: DeviceId, size: usize, mapped: bool) -> Result<Self, DeviceError> {
        let words = size.div_ceil(8);
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(words)
            .map_err(|_| DeviceError::Allocation { bytes: size })?;
        storage.resize(words, 0u64);
        Ok(Self {
            device,
            size,
            storage: Storage::Owned(storage),
            mapped,
        })
    }

    pub(crate) fn wrapped(device: DeviceId, handle: NonNull<u8>, size: usize) -> Self {
        Self {
            device,
            size,
            storage: Storage::Wrapped(handle),
            mapped: false,
        }
    }

    /// The device that created this allocation.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Size in bytes, fixed at allocation.
    pub fn size(&self) -> usize {
        self.size
    }

    /// `true` if the memory is owned by the caller and only borrowed by the device.
    pub fn is_wrapper(&self) -> bool {
        matches!(self.storage, Storage::Wrapped(_))
    }

    /// `true` if the allocation has a host-visible mapping.
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// The opaque device handle. For host devices this is the data address.
    pub fn handle(&self) -> *const u8 {
        self.as_ptr()
    }

    /// Read-only pointer to the first byte.
    pub fn as_ptr(&self) -> *const u8 {
        match &self.storage {
            Storage::Owned(words) => words.as_ptr().cast(),
            Storage::Wrapped(ptr) => ptr.as_ptr(),
        }
    }

    /// Mutable pointer to the first byte.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        match &mut self.storage {
            Storage::Owned(words) => words.as_mut_ptr().cast(),
            Storage::Wrapped(ptr) => ptr.as_ptr(),
        }
    }

    /// Host pointer of a mapped allocation.
    pub fn mapped_ptr(&mut self) -> Option<*mut u8> {
        if self.mapped {
            Some(self.as_mut_ptr())
        } else {
            None
        }
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), DeviceError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(DeviceError::OutOfBounds {
                offset,
                len,
                size: self.size,
            }),
        }
    }

    /// Copies `src` into the allocation starting at `offset`.
    pub fn copy_from(&mut self, src: &[u8], offset: usize) -> Result<(), DeviceError> {
        self.check_range(offset, src.len())?;
        // SAFETY: the range was checked against `size`, and both owned and
        // wrapped storage are valid for `size` bytes.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.as_mut_ptr().add(offset), src.len());
        }
        Ok(())
    }

    /// Copies bytes starting at `offset` into `dst`.
    pub fn copy_to(&self, dst: &mut [u8], offset: usize) -> Result<(), DeviceError> {
        self.check_range(offset, dst.len())?;
        // SAFETY: see `copy_from`.
        unsafe {
            ptr::copy_nonoverlapping(self.as_ptr().add(offset), dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    /// Reads the whole allocation.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.size];
        if self.size > 0 {
            // SAFETY: `out` and the storage are both `size` bytes long.
            unsafe {
                ptr::copy_nonoverlapping(self.as_ptr(), out.as_mut_ptr(), self.size);
            }
        }
        out
    }
}
