use std::io::Error;
use std::ptr;

use winapi::ctypes::c_void;
use winapi::um::memoryapi::{VirtualAlloc, VirtualFree, VirtualProtect};
use winapi::um::winnt::{MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_NOACCESS, PAGE_READWRITE};

use super::page_size;

/// A committed allocation of one guard page followed by `capacity` usable
/// bytes. The guard page is `PAGE_NOACCESS` for the whole lifetime of the
/// allocation, so a stack pointer that wanders below the usable range
/// raises an access violation on the first touch.
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
            let ptr = VirtualAlloc(
                ptr::null_mut(),
                total,
                MEM_RESERVE | MEM_COMMIT,
                PAGE_READWRITE,
            );
            if ptr.is_null() {
                return Err(Error::last_os_error());
            }
            let mut old_protect: u32 = 0;
            if VirtualProtect(ptr, guard, PAGE_NOACCESS, &mut old_protect) == 0 {
                // Unwind the whole allocation before reporting, nothing may leak.
                let err = Error::last_os_error();
                VirtualFree(ptr, 0, MEM_RELEASE);
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
        let result = unsafe { VirtualFree(self.ptr as *mut c_void, 0, MEM_RELEASE) };
        debug_assert_ne!(result, 0);
    }
}
