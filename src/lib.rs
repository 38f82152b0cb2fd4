//! A conservative, non-moving, mark-and-sweep garbage collector for a
//! single-threaded mutator.
//!
//! Allocations are tracked in a bit-sliced integer trie rather than a
//! separate side table; marking is a non-recursive walk that threads its
//! return path through each header's own `parent` field for precise
//! traversal of typed objects, falling back to conservative scanning of
//! the stack and callee-saved registers to find roots the caller never
//! registered explicitly. See [`collect`] for the entry point, and
//! [`set_bottom_of_stack_here`] for the one call every program using this
//! crate must make before its first collection.

mod allocator;
mod collector;
mod error;
mod mark;
mod object;
mod platform;
mod roots;
mod sweep;
mod trie;
mod types;

pub use collector::{Collector, GcConfig, GcStats};

thread_local! {
    static DEFAULT: Collector = Collector::new();
}

/// Registers `addr` as the far end of the conservative stack scan. Prefer
/// [`set_bottom_of_stack_here`], which captures the address for you.
pub fn set_bottom_of_stack(addr: *const u8) {
    DEFAULT.with(|c| c.set_bottom_of_stack(addr as usize));
}

/// Captures the address of a stack-resident probe at the call site and
/// registers it as the bottom of stack for the default collector. Must be
/// invoked as early as possible -- at the top of `main`, or at the top of
/// each test function that allocates.
#[macro_export]
macro_rules! set_bottom_of_stack_here {
    () => {{
        let __convgc_stack_probe: u8 = 0;
        $crate::set_bottom_of_stack(&__convgc_stack_probe as *const u8);
    }};
}

/// Registers a new object type of `size` bytes containing `pointer_count`
/// managed pointers, returning its type id. Each pointer's offset must
/// then be supplied via [`set_offset`] before any allocation or collection
/// involving the type.
pub fn new_type(size: usize, pointer_count: u8) -> u8 {
    DEFAULT.with(|c| c.new_type(size, pointer_count))
}

/// Records the byte offset, within one element, of pointer slot `index` of
/// `type_id`.
pub fn set_offset(type_id: u8, index: u8, offset: usize) {
    DEFAULT.with(|c| c.set_offset(type_id, index, offset));
}

/// Allocates `size` untyped, opaque bytes.
pub fn alloc(size: usize) -> *mut u8 {
    DEFAULT.with(|c| c.alloc(size))
}

/// Allocates a single instance of a registered type.
pub fn alloc_object(type_id: u8) -> *mut u8 {
    DEFAULT.with(|c| c.alloc_object(type_id))
}

/// Allocates a contiguous array of `count` instances of a registered type.
pub fn alloc_array(type_id: u8, count: u32) -> *mut u8 {
    DEFAULT.with(|c| c.alloc_array(type_id, count))
}

/// Registers `object_ptr` as a root: it and everything reachable from it
/// survives collection regardless of whether anything else references it.
pub fn add_root(object_ptr: *mut u8) {
    DEFAULT.with(|c| c.add_root(object_ptr));
}

/// Removes a previously registered root. A no-op if `object_ptr` isn't
/// currently a root.
pub fn remove_root(object_ptr: *mut u8) {
    DEFAULT.with(|c| c.remove_root(object_ptr));
}

/// Reports whether `object_ptr` is currently registered as a root.
pub fn contains_root(object_ptr: *mut u8) -> bool {
    DEFAULT.with(|c| c.contains_root(object_ptr))
}

/// Runs a full mark-and-sweep collection immediately.
pub fn collect() {
    DEFAULT.with(|c| c.collect());
}

/// Reports whether the collector currently has no live allocations.
pub fn is_empty() -> bool {
    DEFAULT.with(|c| c.is_empty())
}

/// Returns a snapshot of the collector's bookkeeping.
pub fn stats() -> GcStats {
    DEFAULT.with(|c| c.stats())
}

/// Prints a human-readable summary of the collector's state to stdout.
pub fn print_stats() {
    DEFAULT.with(|c| c.print_stats());
}
