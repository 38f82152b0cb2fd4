//! The mark engine: a non-recursive, cycle-tolerant graph walk that threads
//! its return path through each header's `parent` field, plus conservative
//! scanning of the mutator's stack and callee-saved registers to discover
//! roots the client never explicitly registered.
//!
//! Recursion is avoided the same way the originating C implementation
//! avoids it: instead of `mark(child)` calling back into `mark`, descending
//! into an unmarked child saves the current element/pointer cursor on the
//! parent header, links the child's `parent` back to it, and continues the
//! same `while current != null` loop on the child. Climbing back out when a
//! header is fully scanned is just following `parent` again.

use crate::error::{fail, Fault};
use crate::object::{self, header_size, Header, RAW_TYPE_ID};
use crate::platform;
use crate::roots::RootRegistry;
use crate::trie::IntTrie;
use crate::types::TypeRegistry;

/// Resolves a candidate word to a live header, or `None` if it isn't one.
/// This is the one place conservative scanning and precise tracing agree:
/// "plausibly a managed pointer" always means "16-byte aligned and present
/// in the allocation trie".
fn candidate_header(word: usize, allocations: &IntTrie) -> Option<*mut Header> {
    if word == 0 {
        return None;
    }
    let addr = word.wrapping_sub(header_size());
    if Header::is_aligned(addr) && allocations.contains(object::trie_key(addr)) {
        Some(addr as *mut Header)
    } else {
        None
    }
}

/// Marks the object graph reachable from `root`, iteratively.
///
/// # Safety
/// `root` must be a live header currently registered in `allocations`.
pub(crate) unsafe fn mark(root: *mut Header, allocations: &IntTrie, types: &TypeRegistry) {
    // SAFETY: caller guarantees `root` is live; every pointer this function
    // follows is validated against `allocations` before being dereferenced.
    unsafe {
        if (*root).marked() {
            return;
        }
        (*root).set_marked(true);
        if (*root).type_id() == RAW_TYPE_ID {
            return;
        }

        (*root).set_parent(std::ptr::null_mut());
        (*root).set_iter(0, 0);
        let mut current = root;

        while !current.is_null() {
            let type_id = (*current).type_id();
            let desc = types.get(type_id);
            let count = (*current).count() as usize;
            let element_size = desc.size();
            let pointer_count = desc.pointer_count() as usize;
            let (cursor_i, cursor_j) = (*current).iter();
            let (mut i, mut j) = (cursor_i as usize, cursor_j as usize);
            let mut descended = false;

            'scan: while i < count {
                while j < pointer_count {
                    let offset = desc.offset(j);
                    let slot_ptr =
                        (*current).object_ptr().add(i * element_size + offset) as *mut *mut u8;
                    let slot_value = *slot_ptr;
                    if !slot_value.is_null() {
                        match candidate_header(slot_value as usize, allocations) {
                            Some(target) => {
                                if !(*target).marked() {
                                    (*target).set_marked(true);
                                    if (*target).type_id() != RAW_TYPE_ID {
                                        (*current).set_iter(i as u32, (j + 1) as u32);
                                        (*target).set_parent(current);
                                        (*target).set_iter(0, 0);
                                        current = target;
                                        descended = true;
                                        break 'scan;
                                    }
                                }
                            }
                            None => fail(Fault::InvariantFailure(
                                "managed pointer slot does not reference a live allocation",
                            )),
                        }
                    }
                    j += 1;
                }
                j = 0;
                i += 1;
            }

            if descended {
                continue;
            }

            // `current` is fully scanned; climb back to its parent and
            // resume the cursor it saved before descending here.
            current = (*current).parent();
        }
    }
}

unsafe fn scan_words(words: &[usize], allocations: &IntTrie, types: &TypeRegistry) {
    for &w in words {
        if let Some(header) = candidate_header(w, allocations) {
            // SAFETY: candidate_header only returns headers present in the
            // allocation trie.
            unsafe { mark(header, allocations, types) };
        }
    }
}

/// Conservatively scans the mutator's callee-saved registers and its stack
/// between the collector's own frame and the registered bottom of stack.
pub(crate) fn mark_stack(bottom_of_stack: usize, allocations: &IntTrie, types: &TypeRegistry) {
    let (registers, top_of_stack) = platform::capture_registers();
    // SAFETY: `registers` is a local array, fully initialized.
    unsafe { scan_words(&registers, allocations, types) };

    if top_of_stack >= bottom_of_stack {
        fail(Fault::InvariantFailure(
            "top of stack is not below the registered bottom of stack",
        ));
    }

    let len = (bottom_of_stack - top_of_stack) / std::mem::size_of::<usize>();
    // SAFETY: [top_of_stack, bottom_of_stack) is this thread's own live
    // stack region, word-aligned since both ends are pointer-sized-aligned
    // stack addresses.
    let words = unsafe { std::slice::from_raw_parts(top_of_stack as *const usize, len) };
    unsafe { scan_words(words, allocations, types) };
}

/// Marks every object named in the explicit root registry.
pub(crate) fn mark_roots(roots: &RootRegistry, allocations: &IntTrie, types: &TypeRegistry) {
    roots.trie().visit(&mut |key| {
        let header = object::addr_of_trie_key(key) as *mut Header;
        // SAFETY: every key in the root trie was validated against
        // `allocations` at add_root time and only ever removed, never
        // corrupted, since.
        unsafe { mark(header, allocations, types) };
        true
    });
}
