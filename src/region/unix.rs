use libc::{mmap, mprotect, munmap};
use libc::{MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_NONE, PROT_READ, PROT_WRITE};
use std::io::Error;
use std::ptr;

use super::page_size;

/// A private anonymous mapping of one guard page followed by `capacity`
/// usable bytes. The guard page stays `PROT_NONE` for the whole lifetime of
/// the mapping, everything above it is read/write. A stack pointer that
/// wanders below the usable range lands in the guard page and raises
/// SIGSEGV (SIGBUS on Darwin) on the first access.
pub struct Region {
    ptr: *mut u8,
    guard: usize,
    capacity: usize,
}

impl Region {
    pub fn reserve(capacity: usize) -> Result<Self, Error> {
        let guard = page_size();
        let total = guard + capacity;
        unsafe {
            let ptr = mmap(
                ptr::null_mut(),
                total,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANON,
                -1,
                0,
            );
            if ptr == MAP_FAILED {
                return Err(Error::last_os_error());
            }
            if mprotect(ptr, guard, PROT_NONE) != 0 {
                // Unwind the whole mapping before reporting, nothing may leak.
                let err = Error::last_os_error();
                munmap(ptr, total);
                return Err(err);
            }
            Ok(Self {
                ptr: ptr as *mut u8,
                guard,
                capacity,
            })
        }
    }

    /// One past the highest usable byte.
    pub fn base(&self) -> *mut u8 {
        unsafe { self.ptr.add(self.guard + self.capacity) }
    }

    /// First byte above the guard page, the lowest usable address.
    pub fn guard_boundary(&self) -> *mut u8 {
        unsafe { self.ptr.add(self.guard) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        let total = self.guard + self.capacity;
        let result = unsafe { munmap(self.ptr as *mut libc::c_void, total) };
        debug_assert_eq!(result, 0);
    }
}
