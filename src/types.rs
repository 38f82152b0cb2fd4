//! Type registry: descriptors telling the mark engine where the managed
//! pointers live inside an otherwise opaque object layout.

use crate::error::{fail, require, Fault};
use crate::object::POINTER_WIDTH;

/// Maximum number of distinct types a program may register.
pub(crate) const MAX_TYPES: usize = 127;

/// Describes one registered object layout: its byte size and the offsets,
/// within one element, of every managed pointer slot.
pub(crate) struct TypeDescriptor {
    size: usize,
    pointer_count: u8,
    offsets: Vec<usize>,
    offsets_set: u8,
}

impl TypeDescriptor {
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn pointer_count(&self) -> u8 {
        self.pointer_count
    }

    /// Returns the byte offset of pointer slot `index` within one element.
    ///
    /// Reading a descriptor before every offset has been set is a contract
    /// violation: the mark engine would otherwise walk a slot at offset 0
    /// that the caller never meant to describe.
    pub(crate) fn offset(&self, index: usize) -> usize {
        if self.offsets_set != self.pointer_count {
            fail(Fault::ContractViolation(
                "type descriptor read before all pointer offsets were set",
            ));
        }
        self.offsets[index]
    }
}

/// Process-wide table of registered [`TypeDescriptor`]s, indexed by
/// 1-based `type_id` (0 is reserved for untyped/raw allocations).
pub(crate) struct TypeRegistry {
    descriptors: Vec<TypeDescriptor>,
}

impl TypeRegistry {
    pub(crate) fn new() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    pub(crate) fn new_type(&mut self, size: usize, pointer_count: u8) -> u8 {
        // size == 0 is a legal zero-sized managed type (no `> 0` check here);
        // `usize` already rules out negative sizes.
        require(
            pointer_count as usize * POINTER_WIDTH <= size,
            "new_type: pointer_count does not fit within size",
        );
        if self.descriptors.len() >= MAX_TYPES {
            fail(Fault::ContractViolation(
                "type registry is full (maximum 127 registered types)",
            ));
        }
        self.descriptors.push(TypeDescriptor {
            size,
            pointer_count,
            offsets: vec![0; pointer_count as usize],
            offsets_set: 0,
        });
        self.descriptors.len() as u8
    }

    pub(crate) fn set_offset(&mut self, type_id: u8, index: u8, offset: usize) {
        let size = self.get(type_id).size;
        let pointer_count = self.get(type_id).pointer_count;
        require(index < pointer_count, "set_offset: index out of range");
        require(
            offset + POINTER_WIDTH <= size,
            "set_offset: offset does not fit within the type's size",
        );
        let desc = self.descriptor_mut(type_id);
        desc.offsets[index as usize] = offset;
        desc.offsets_set += 1;
    }

    pub(crate) fn get(&self, type_id: u8) -> &TypeDescriptor {
        if type_id == 0 || type_id as usize > self.descriptors.len() {
            fail(Fault::ContractViolation("invalid type id"));
        }
        &self.descriptors[type_id as usize - 1]
    }

    fn descriptor_mut(&mut self, type_id: u8) -> &mut TypeDescriptor {
        if type_id == 0 || type_id as usize > self.descriptors.len() {
            fail(Fault::ContractViolation("invalid type id"));
        }
        &mut self.descriptors[type_id as usize - 1]
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
