//! Explicit root registry: a second trie, keyed the same way as the
//! allocation registry, naming objects the mutator holds outside the
//! managed heap (globals, long-lived handles) that must survive collection
//! regardless of whether anything else still points to them.

use crate::error::{fail, Fault};
use crate::object::{self, Header};
use crate::trie::IntTrie;

pub(crate) struct RootRegistry {
    trie: IntTrie,
}

impl RootRegistry {
    pub(crate) const fn new() -> Self {
        Self { trie: IntTrie::new() }
    }

    /// Registers `object_ptr` as a root. `object_ptr` must currently be a
    /// live allocation; `allocations` is consulted to enforce that.
    pub(crate) fn add(
        &self,
        object_ptr: *mut u8,
        allocations: &IntTrie,
        on_oom: &mut dyn FnMut(),
    ) {
        let addr = Header::header_of(object_ptr);
        if !(Header::is_aligned(addr) && allocations.contains(object::trie_key(addr))) {
            fail(Fault::ContractViolation(
                "add_root: pointer does not reference a live allocation",
            ));
        }
        self.trie.insert(object::trie_key(addr), on_oom);
    }

    pub(crate) fn remove(&self, object_ptr: *mut u8) {
        if object_ptr.is_null() {
            return;
        }
        let addr = Header::header_of(object_ptr);
        if Header::is_aligned(addr) {
            self.trie.remove(object::trie_key(addr));
        }
    }

    pub(crate) fn contains(&self, object_ptr: *mut u8) -> bool {
        if object_ptr.is_null() {
            return false;
        }
        let addr = Header::header_of(object_ptr);
        Header::is_aligned(addr) && self.trie.contains(object::trie_key(addr))
    }

    pub(crate) fn trie(&self) -> &IntTrie {
        &self.trie
    }
}
