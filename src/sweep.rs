//! Sweep phase: reclaim every unmarked allocation, clear mark bits on
//! survivors, and fold the reclaimed set into per-type statistics.

use std::alloc::Layout;

use rustc_hash::FxHashMap;

use crate::object::{self, header_size, Header, HEADER_ALIGN};
use crate::trie::IntTrie;

pub(crate) struct SweepResult {
    pub(crate) reclaimed_count: usize,
    pub(crate) reclaimed_bytes: usize,
}

/// Visits every entry in the allocation trie: survivors are unmarked for
/// the next cycle and kept, the rest are freed and dropped from the trie.
pub(crate) fn sweep(
    allocations: &IntTrie,
    freed_by_type: &mut FxHashMap<u8, usize>,
) -> SweepResult {
    let mut reclaimed_count = 0usize;
    let mut reclaimed_bytes = 0usize;

    allocations.visit(&mut |key| {
        let header = object::addr_of_trie_key(key) as *mut Header;
        // SAFETY: every key in the allocation trie names a live header
        // produced by the allocator.
        unsafe {
            if (*header).marked() {
                (*header).set_marked(false);
                true
            } else {
                let block_size = (*header).block_size() as usize;
                let type_id = (*header).type_id();
                reclaimed_count += 1;
                reclaimed_bytes += block_size;
                *freed_by_type.entry(type_id).or_insert(0) += 1;

                let layout = Layout::from_size_align(block_size, HEADER_ALIGN)
                    .expect("block layout was valid at allocation time");
                std::ptr::drop_in_place(header);
                std::alloc::dealloc(header as *mut u8, layout);
                false
            }
        }
    });

    debug_assert!(reclaimed_bytes >= reclaimed_count * header_size());
    SweepResult {
        reclaimed_count,
        reclaimed_bytes,
    }
}
