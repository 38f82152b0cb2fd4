//! Allocation layer: turns a byte size or type id into a freshly zeroed,
//! header-prefixed block, registers it in the allocation trie, and
//! escalates to a collection on system-allocator exhaustion before giving
//! up for good.

use std::alloc::Layout;

use crate::collector::Collector;
use crate::error::{fail, require, Fault};
use crate::object::{header_size, Header, HEADER_ALIGN, RAW_TYPE_ID};

/// Largest byte size or array element count accepted by the allocator,
/// matching the 24-bit range the header's `count`/`block_size` fields are
/// contractually restricted to even though the fields themselves are
/// wider.
pub(crate) const MAX_SIZE: usize = (1 << 24) - 1;

fn block_layout(total_size: usize) -> Layout {
    Layout::from_size_align(total_size, HEADER_ALIGN).unwrap_or_else(|_| {
        fail(Fault::ContractViolation(
            "requested allocation size overflows a valid layout",
        ))
    })
}

/// Allocates a zeroed block of `total_size` bytes, retrying once via
/// `on_oom` (expected to run a collection) before aborting.
fn allocate_block(total_size: usize, on_oom: impl FnOnce()) -> *mut u8 {
    let layout = block_layout(total_size);
    // SAFETY: layout has non-zero size (headers alone are never zero
    // bytes).
    let mut raw = unsafe { std::alloc::alloc_zeroed(layout) };
    if raw.is_null() {
        #[cfg(feature = "gc_logging")]
        tracing::warn!(target: "convgc", total_size, "allocation failed, retrying after a collection");
        on_oom();
        raw = unsafe { std::alloc::alloc_zeroed(layout) };
        if raw.is_null() {
            fail(Fault::AllocatorExhausted);
        }
    }
    raw
}

impl Collector {
    /// Allocates `size` untyped bytes, opaque to the mark engine.
    pub fn alloc(&self, size: usize) -> *mut u8 {
        require(
            size > 0 && size <= MAX_SIZE,
            "alloc: size must be within (0, 2^24)",
        );
        self.maybe_collect();
        let total = header_size() + size;
        let block = allocate_block(total, || self.collect());
        let header = block as *mut Header;
        // SAFETY: `block` is a fresh, uniquely-owned allocation of at
        // least `header_size()` bytes.
        unsafe {
            std::ptr::write(header, Header::new(RAW_TYPE_ID, size as u32, total as u32));
        }
        self.register(header, total);
        unsafe { (*header).object_ptr() }
    }

    /// Allocates a single instance of a registered type.
    pub fn alloc_object(&self, type_id: u8) -> *mut u8 {
        let size = self.type_size(type_id);
        self.maybe_collect();
        let total = header_size() + size;
        let block = allocate_block(total, || self.collect());
        let header = block as *mut Header;
        unsafe {
            std::ptr::write(header, Header::new(type_id, 1, total as u32));
        }
        self.register(header, total);
        unsafe { (*header).object_ptr() }
    }

    /// Allocates a contiguous array of `count` instances of a registered
    /// type.
    pub fn alloc_array(&self, type_id: u8, count: u32) -> *mut u8 {
        require(
            count > 0 && (count as usize) <= MAX_SIZE,
            "alloc_array: count must be within (0, 2^24)",
        );
        let elem_size = self.type_size(type_id);
        let size = elem_size
            .checked_mul(count as usize)
            .filter(|&s| s <= MAX_SIZE)
            .unwrap_or_else(|| fail(Fault::ContractViolation("alloc_array: size overflow")));
        self.maybe_collect();
        let total = header_size() + size;
        let block = allocate_block(total, || self.collect());
        let header = block as *mut Header;
        unsafe {
            std::ptr::write(header, Header::new(type_id, count, total as u32));
        }
        self.register(header, total);
        unsafe { (*header).object_ptr() }
    }
}
