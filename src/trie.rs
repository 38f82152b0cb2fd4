//! Bit-sliced integer trie: a 16-way radix tree over 64-bit keys, used both
//! as the live-allocation registry and as the explicit root registry.
//!
//! Keys are non-zero `u64`s with the low bit clear ("values"). Internal
//! slots hold either 0 (empty), a value, or a tagged pointer to a child
//! [`Node`] (low bit set). Four bits of the key are consumed per trie level,
//! giving 16-way fan-out and a maximum depth of 16 for a 64-bit key.

use std::alloc::Layout;
use std::cell::Cell;

use crate::error::{fail, Fault};

const BIT_COUNT: u32 = 4;
const SLOT_COUNT: usize = 1 << BIT_COUNT;
const BIT_MASK: u64 = (SLOT_COUNT as u64) - 1;

struct Node {
    slots: [u64; SLOT_COUNT],
}

#[inline]
fn is_value(w: u64) -> bool {
    w & 1 == 0
}

#[inline]
fn is_node(w: u64) -> bool {
    w & 1 == 1
}

#[inline]
fn untag(w: u64) -> *mut Node {
    (w & !1) as *mut Node
}

#[inline]
fn tag(node: *mut Node) -> u64 {
    node as u64 | 1
}

#[inline]
fn nibble(x: u64, level: u32) -> usize {
    ((x >> (BIT_COUNT * level)) & BIT_MASK) as usize
}

/// Allocates a zeroed node, escalating to the caller-supplied `on_oom`
/// callback and retrying once before aborting. Mirrors the allocation
/// escalation every GC-managed structure uses: a failed allocation asks the
/// collector to reclaim space and is attempted exactly once more.
fn alloc_node(on_oom: &mut dyn FnMut()) -> *mut Node {
    let layout = Layout::new::<Node>();
    // SAFETY: layout has non-zero size.
    let mut raw = unsafe { std::alloc::alloc_zeroed(layout) };
    if raw.is_null() {
        #[cfg(feature = "gc_logging")]
        tracing::warn!(target: "convgc", "trie node allocation failed, retrying after a collection");
        on_oom();
        raw = unsafe { std::alloc::alloc_zeroed(layout) };
        if raw.is_null() {
            fail(Fault::AllocatorExhausted);
        }
    }
    raw as *mut Node
}

unsafe fn free_node(node: *mut Node) {
    // SAFETY: `node` was produced by `alloc_node` and is being retired for
    // good; caller guarantees nothing else still references it.
    unsafe {
        std::alloc::dealloc(node as *mut u8, Layout::new::<Node>());
    }
}

/// A single bit-sliced integer trie. Interior mutability throughout: the
/// trie is manipulated through `&self` because it is always reached via a
/// thread-local collector singleton, never `&mut`.
pub(crate) struct IntTrie {
    root: Cell<u64>,
}

impl IntTrie {
    pub(crate) const fn new() -> Self {
        Self { root: Cell::new(0) }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.root.get() == 0
    }

    pub(crate) fn contains(&self, x: u64) -> bool {
        if x == 0 {
            return false;
        }
        let mut t = self.root.get();
        let mut level = 0u32;
        loop {
            if t == 0 {
                return false;
            }
            if t == x {
                return true;
            }
            if is_node(t) {
                let node = untag(t);
                let i = nibble(x, level);
                // SAFETY: node was allocated by alloc_node and is still live.
                t = unsafe { (*node).slots[i] };
                level += 1;
                continue;
            }
            return false;
        }
    }

    pub(crate) fn insert(&self, x: u64, on_oom: &mut dyn FnMut()) {
        debug_assert!(x != 0 && is_value(x));
        let mut t = self.root.as_ptr();
        let mut level = 0u32;
        loop {
            // SAFETY: t always points at a live slot (root cell, or a slot
            // inside a live node reached below).
            let y = unsafe { *t };
            if y == 0 {
                unsafe { *t = x };
                return;
            }
            if y == x {
                return;
            }
            if is_node(y) {
                let node = untag(y);
                let i = nibble(x, level);
                t = unsafe { (*node).slots.as_mut_ptr().add(i) };
                level += 1;
                continue;
            }
            // y is a different value colliding with x; split until they
            // land in distinct slots.
            loop {
                let node = alloc_node(on_oom);
                #[cfg(feature = "gc_logging")]
                tracing::trace!(target: "convgc", level, node = ?node, "trie node allocated");
                unsafe { *t = tag(node) };
                let i = nibble(x, level);
                let j = nibble(y, level);
                if i != j {
                    unsafe {
                        (*node).slots[i] = x;
                        (*node).slots[j] = y;
                    }
                    return;
                }
                t = unsafe { (*node).slots.as_mut_ptr().add(i) };
                level += 1;
            }
        }
    }

    pub(crate) fn remove(&self, x: u64) {
        if x == 0 {
            return;
        }
        unsafe { Self::remove_at(self.root.as_ptr(), x, 0) };
    }

    unsafe fn remove_at(t: *mut u64, x: u64, level: u32) {
        // SAFETY: t points at a live slot; node pointers reached through it
        // were allocated by alloc_node and are live for the duration of
        // this call.
        let y = unsafe { *t };
        if y == 0 || y == x {
            if y == x {
                unsafe { *t = 0 };
            }
            return;
        }
        if !is_node(y) {
            return;
        }
        let node = untag(y);
        let i = nibble(x, level);
        let slots = unsafe { (*node).slots.as_mut_ptr() };
        unsafe { Self::remove_at(slots.add(i), x, level + 1) };

        let mut single = 0usize;
        let mut count = 0usize;
        for idx in 0..SLOT_COUNT {
            if unsafe { *slots.add(idx) } != 0 {
                single = idx;
                count += 1;
                if count > 1 {
                    return;
                }
            }
        }
        if count == 0 {
            #[cfg(feature = "gc_logging")]
            tracing::trace!(target: "convgc", node = ?node, "trie node emptied, collapsing");
            unsafe {
                *t = 0;
                free_node(node);
            }
        } else {
            let remaining = unsafe { *slots.add(single) };
            if is_value(remaining) {
                #[cfg(feature = "gc_logging")]
                tracing::trace!(target: "convgc", node = ?node, "trie node down to one value, collapsing");
                unsafe {
                    *t = remaining;
                    free_node(node);
                }
            }
        }
    }

    /// Visits every value currently in the trie. `f` returns whether to
    /// keep the value; a `false` removes it in place. Nodes left with zero
    /// or one remaining slot are collapsed, exactly as `remove` does.
    pub(crate) fn visit(&self, f: &mut dyn FnMut(u64) -> bool) {
        if self.root.get() == 0 {
            return;
        }
        unsafe { Self::visit_at(self.root.as_ptr(), f) };
    }

    unsafe fn visit_at(t: *mut u64, f: &mut dyn FnMut(u64) -> bool) {
        // SAFETY: see remove_at.
        let x = unsafe { *t };
        if x == 0 {
            return;
        }
        if is_value(x) {
            if !f(x) {
                unsafe { *t = 0 };
            }
            return;
        }
        let node = untag(x);
        let slots = unsafe { (*node).slots.as_mut_ptr() };
        let mut single = 0usize;
        let mut count = 0usize;
        for idx in 0..SLOT_COUNT {
            if unsafe { *slots.add(idx) } != 0 {
                unsafe { Self::visit_at(slots.add(idx), f) };
                if unsafe { *slots.add(idx) } != 0 {
                    single = idx;
                    count += 1;
                }
            }
        }
        if count == 0 {
            #[cfg(feature = "gc_logging")]
            tracing::trace!(target: "convgc", node = ?node, "trie node emptied during visit, collapsing");
            unsafe {
                *t = 0;
                free_node(node);
            }
        } else if count == 1 {
            let remaining = unsafe { *slots.add(single) };
            if is_value(remaining) {
                #[cfg(feature = "gc_logging")]
                tracing::trace!(target: "convgc", node = ?node, "trie node down to one value during visit, collapsing");
                unsafe {
                    *t = remaining;
                    free_node(node);
                }
            }
        }
    }
}

impl Drop for IntTrie {
    fn drop(&mut self) {
        unsafe { drop_subtrie(self.root.get()) };
    }
}

unsafe fn drop_subtrie(t: u64) {
    if t == 0 || is_value(t) {
        return;
    }
    let node = untag(t);
    for idx in 0..SLOT_COUNT {
        // SAFETY: node is live; recursion bottoms out at leaf values.
        unsafe { drop_subtrie((*node).slots[idx]) };
    }
    unsafe { free_node(node) };
}
