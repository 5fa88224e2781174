//! A guard-page protected scratch stack.
//!
//! [`ScratchStack`] hands out short-lived, LIFO-ordered allocations from a
//! fixed-capacity region by plain pointer arithmetic. There are no bounds
//! checks on the hot path; instead, the usable capacity sits directly above
//! an inaccessible guard page, so a sequence of pushes that overflows the
//! capacity faults on the very next write instead of silently corrupting
//! adjacent memory.
//!
//! Two allocation disciplines share the same stack pointer:
//! * `push`/`pop` — the caller tracks each allocation's size itself and
//!   hands it back on pop. Zero per-allocation overhead.
//! * `spush`/`spop` — a one-word header in front of each payload records
//!   its size, so pop needs no argument. Costs one header per allocation
//!   and one extra read per pop.
//!
//! The handle holds raw pointers and is neither `Send` nor `Sync`. Give
//! each thread its own stack, or wrap one in external synchronization.

mod region;

pub use region::page_size;
use region::Region;

use std::io::Error;
use std::mem::size_of;

/// Default usable capacity in bytes, not counting the guard page.
pub const STACK_SIZE: usize = 4096;

/// Size record written in front of every tracked allocation.
#[repr(C)]
struct AllocHeader {
    size: usize,
}

/// A downward-growing stack over one guard-page protected region.
///
/// `base` marks one past the highest usable byte and never moves. `top` is
/// the stack pointer: it moves down on every push and back up on every pop,
/// and between calls always satisfies `guard_boundary <= top <= base`.
/// Dropping the stack unmaps the whole region, outstanding allocations
/// included.
pub struct ScratchStack {
    base: *mut u8,
    top: *mut u8,
    region: Region,
}

impl ScratchStack {
    /// Returns a stack with the default capacity of [`STACK_SIZE`] bytes.
    pub fn new() -> Result<Self, Error> {
        Self::with_capacity(STACK_SIZE)
    }

    /// Returns a stack with `capacity` usable bytes above the guard page.
    ///
    /// Fails if the region can't be mapped or the guard page can't be
    /// protected; neither failure leaves a mapping behind.
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        let region = Region::reserve(capacity)?;
        let base = region.base();
        Ok(Self {
            base,
            top: base,
            region,
        })
    }

    /// Returns a pointer to `n` fresh bytes, moving the stack pointer down.
    ///
    /// No header is written and no bounds are checked; the caller must
    /// remember `n` and hand it back to [`pop`](Self::pop) unchanged.
    ///
    /// # Safety
    ///
    /// The sum of live allocation sizes plus `n` must not exceed
    /// [`capacity`](Self::capacity). Overflowing writes land in the guard
    /// page and abort the process.
    pub unsafe fn push(&mut self, n: usize) -> *mut u8 {
        self.top = self.top.sub(n);
        self.top
    }

    /// Releases the most recent raw allocation, moving the stack pointer
    /// back up by `n`.
    ///
    /// # Safety
    ///
    /// `n` must exactly match the most recent unpopped [`push`](Self::push),
    /// and pops must nest in strict LIFO order with it. A mismatched `n`
    /// that stays in bounds corrupts the stack pointer without any fault.
    pub unsafe fn pop(&mut self, n: usize) {
        self.top = self.top.add(n);
        debug_assert!(self.top <= self.base);
    }

    /// Returns a pointer to `n` fresh bytes, recording `n` in a header just
    /// below the returned pointer so [`spop`](Self::spop) needs no argument.
    ///
    /// # Safety
    ///
    /// Same capacity rule as [`push`](Self::push), counting
    /// `size_of::<usize>()` extra bytes per tracked allocation. On overflow
    /// the header write itself is the access that faults.
    pub unsafe fn spush(&mut self, n: usize) -> *mut u8 {
        let total = size_of::<AllocHeader>() + n;
        self.top = self.top.sub(total);
        let header = self.top as *mut AllocHeader;
        // An odd payload size below leaves `top` unaligned for the header,
        // so the store must not assume alignment.
        header.write_unaligned(AllocHeader { size: n });
        self.top.add(size_of::<AllocHeader>())
    }

    /// Releases the most recent tracked allocation and returns its recorded
    /// size.
    ///
    /// # Safety
    ///
    /// The most recent unpopped allocation must be a
    /// [`spush`](Self::spush). Called without one, this reads whatever
    /// bytes sit at the stack pointer as a header and moves the pointer by
    /// a bogus amount.
    pub unsafe fn spop(&mut self) -> usize {
        let header = self.top as *const AllocHeader;
        let n = header.read_unaligned().size;
        self.top = self.top.add(size_of::<AllocHeader>() + n);
        debug_assert!(self.top <= self.base);
        n
    }

    /// Returns a pointer one past the highest usable byte.
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// Returns the current stack pointer.
    pub fn top(&self) -> *mut u8 {
        self.top
    }

    /// Returns the first byte above the guard page, the lowest address a
    /// well-behaved allocation may touch.
    pub fn guard_boundary(&self) -> *mut u8 {
        self.region.guard_boundary()
    }

    /// Returns the usable capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }
}
