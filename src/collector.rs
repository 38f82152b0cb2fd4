//! The collector itself: owns the allocation trie, the root registry, the
//! type registry, and the adaptive thresholds that decide when a
//! collection runs. Exposed both as a directly-constructible type (for
//! embedders who want an isolated instance, or tests that want more than
//! one within a single thread) and, from `lib.rs`, as a thread-local
//! singleton behind free functions.

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::error::{fail, require, Fault};
use crate::mark;
use crate::roots::RootRegistry;
use crate::sweep;
use crate::trie::IntTrie;
use crate::types::TypeRegistry;

/// Lower bound on the allocation-count trigger threshold, keeping small
/// heaps from collecting on nearly every allocation.
const COUNT_THRESHOLD_MIN: u32 = 1024;

/// Lower bound on the byte-size trigger threshold.
const SIZE_THRESHOLD_MIN: usize = 1 << 20;

/// Tuning knobs for a [`Collector`]. There is no file- or environment-based
/// configuration surface -- a program that wants non-default thresholds
/// constructs a `Collector` directly with [`Collector::with_config`].
#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    pub count_threshold_min: u32,
    pub size_threshold_min: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            count_threshold_min: COUNT_THRESHOLD_MIN,
            size_threshold_min: SIZE_THRESHOLD_MIN,
        }
    }
}

/// A snapshot of the collector's bookkeeping, returned by [`Collector::stats`].
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    pub collections: u64,
    pub live_count: usize,
    pub live_bytes: usize,
    pub last_reclaimed_count: usize,
    pub last_reclaimed_bytes: usize,
    pub last_pause: Duration,
    pub total_pause: Duration,
}

pub struct Collector {
    allocations: IntTrie,
    roots: RootRegistry,
    types: RefCell<TypeRegistry>,
    bottom_of_stack: Cell<usize>,
    live_count: Cell<usize>,
    live_bytes: Cell<usize>,
    count_threshold: Cell<u32>,
    size_threshold: Cell<usize>,
    config: GcConfig,
    collections: Cell<u64>,
    last_reclaimed_count: Cell<usize>,
    last_reclaimed_bytes: Cell<usize>,
    last_pause: Cell<Duration>,
    total_pause: Cell<Duration>,
    freed_by_type: RefCell<FxHashMap<u8, usize>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    pub fn with_config(config: GcConfig) -> Self {
        Self {
            allocations: IntTrie::new(),
            roots: RootRegistry::new(),
            types: RefCell::new(TypeRegistry::new()),
            bottom_of_stack: Cell::new(0),
            live_count: Cell::new(0),
            live_bytes: Cell::new(0),
            count_threshold: Cell::new(config.count_threshold_min),
            size_threshold: Cell::new(config.size_threshold_min),
            config,
            collections: Cell::new(0),
            last_reclaimed_count: Cell::new(0),
            last_reclaimed_bytes: Cell::new(0),
            last_pause: Cell::new(Duration::ZERO),
            total_pause: Cell::new(Duration::ZERO),
            freed_by_type: RefCell::new(FxHashMap::default()),
        }
    }

    /// Registers the address of a stack-resident value as the far end of
    /// the conservative stack scan. Must be called once, early, before any
    /// allocation or collection; in practice, via [`crate::set_bottom_of_stack_here`].
    pub fn set_bottom_of_stack(&self, addr: usize) {
        require(
            addr != 0 && addr % std::mem::align_of::<usize>() == 0,
            "set_bottom_of_stack: address must be non-null and pointer-aligned",
        );
        if self.bottom_of_stack.get() != 0 {
            #[cfg(feature = "gc_logging")]
            tracing::warn!(target: "convgc", "set_bottom_of_stack called more than once");
        }
        self.bottom_of_stack.set(addr);
    }

    pub fn new_type(&self, size: usize, pointer_count: u8) -> u8 {
        self.types.borrow_mut().new_type(size, pointer_count)
    }

    pub fn set_offset(&self, type_id: u8, index: u8, offset: usize) {
        self.types.borrow_mut().set_offset(type_id, index, offset);
    }

    pub(crate) fn type_size(&self, type_id: u8) -> usize {
        self.types.borrow().get(type_id).size()
    }

    pub(crate) fn maybe_collect(&self) {
        if self.live_count.get() >= self.count_threshold.get() as usize
            || self.live_bytes.get() >= self.size_threshold.get()
        {
            self.collect();
        }
    }

    pub(crate) fn register(&self, header: *mut crate::object::Header, total_size: usize) {
        let addr = header as usize;
        debug_assert!(crate::object::Header::is_aligned(addr));
        let mut on_oom = || self.collect();
        self.allocations
            .insert(crate::object::trie_key(addr), &mut on_oom);
        self.live_count.set(self.live_count.get() + 1);
        self.live_bytes.set(self.live_bytes.get() + total_size);
    }

    pub fn add_root(&self, object_ptr: *mut u8) {
        require(!object_ptr.is_null(), "add_root: pointer must not be null");
        let mut on_oom = || self.collect();
        self.roots.add(object_ptr, &self.allocations, &mut on_oom);
    }

    pub fn remove_root(&self, object_ptr: *mut u8) {
        self.roots.remove(object_ptr);
    }

    pub fn contains_root(&self, object_ptr: *mut u8) -> bool {
        self.roots.contains(object_ptr)
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    pub fn collect(&self) {
        let bottom_of_stack = self.bottom_of_stack.get();
        if bottom_of_stack == 0 {
            fail(Fault::ContractViolation(
                "collect: bottom of stack was never registered",
            ));
        }

        let start = Instant::now();
        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "convgc",
            live_count = self.live_count.get(),
            live_bytes = self.live_bytes.get(),
            "GC cycle starting",
        );

        {
            let types = self.types.borrow();
            mark::mark_stack(bottom_of_stack, &self.allocations, &types);
            mark::mark_roots(&self.roots, &self.allocations, &types);
        }

        let result = sweep::sweep(&self.allocations, &mut self.freed_by_type.borrow_mut());

        self.live_count
            .set(self.live_count.get() - result.reclaimed_count);
        self.live_bytes
            .set(self.live_bytes.get() - result.reclaimed_bytes);

        let live_count = self.live_count.get();
        let live_bytes = self.live_bytes.get();
        self.count_threshold.set(
            (2 * live_count as u64)
                .max(self.config.count_threshold_min as u64)
                .min(u32::MAX as u64) as u32,
        );
        self.size_threshold
            .set((2 * live_bytes).max(self.config.size_threshold_min));

        self.collections.set(self.collections.get() + 1);
        self.last_reclaimed_count.set(result.reclaimed_count);
        self.last_reclaimed_bytes.set(result.reclaimed_bytes);
        let elapsed = start.elapsed();
        self.last_pause.set(elapsed);
        self.total_pause.set(self.total_pause.get() + elapsed);

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "convgc",
            collection = self.collections.get(),
            reclaimed_count = result.reclaimed_count,
            reclaimed_bytes = result.reclaimed_bytes,
            pause_us = elapsed.as_micros() as u64,
            live_count,
            live_bytes,
            "GC cycle complete",
        );
    }

    pub fn stats(&self) -> GcStats {
        GcStats {
            collections: self.collections.get(),
            live_count: self.live_count.get(),
            live_bytes: self.live_bytes.get(),
            last_reclaimed_count: self.last_reclaimed_count.get(),
            last_reclaimed_bytes: self.last_reclaimed_bytes.get(),
            last_pause: self.last_pause.get(),
            total_pause: self.total_pause.get(),
        }
    }

    /// Prints a human-readable summary of the collector's state, always to
    /// stdout regardless of whether the `gc_logging` feature is compiled
    /// in -- this is a deliberate diagnostic escape hatch, not part of the
    /// structured logging path.
    pub fn print_stats(&self) {
        let stats = self.stats();
        println!(
            "convgc: {} collections, {} live objects ({} bytes), last reclaimed {} objects ({} bytes), last pause {:?}",
            stats.collections,
            stats.live_count,
            stats.live_bytes,
            stats.last_reclaimed_count,
            stats.last_reclaimed_bytes,
            stats.last_pause,
        );
        for (type_id, freed) in self.freed_by_type.borrow().iter() {
            println!("  type {type_id}: {freed} freed total");
        }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}
