//! Integration tests exercising the public API end to end: typed object
//! graphs, cycles, shared sub-objects, root bookkeeping, and adaptive
//! collection thresholds.
//!
//! Each test builds its own [`convgc::Collector`] instance rather than
//! going through the crate's thread-local default, so tests stay
//! independent of each other even if the test harness reuses OS threads
//! across test functions.

use std::mem::offset_of;

fn init_tracing() {
    #[cfg(feature = "gc_logging")]
    {
        let _ = tracing_subscriber::fmt::try_init();
    }
}

#[repr(C)]
struct Node {
    value: i64,
    left: *mut u8,
    right: *mut u8,
}

fn register_node_type(collector: &convgc::Collector) -> u8 {
    let ty = collector.new_type(std::mem::size_of::<Node>(), 2);
    collector.set_offset(ty, 0, offset_of!(Node, left));
    collector.set_offset(ty, 1, offset_of!(Node, right));
    ty
}

fn leaf(collector: &convgc::Collector, ty: u8, value: i64) -> *mut Node {
    let p = collector.alloc_object(ty) as *mut Node;
    unsafe {
        (*p).value = value;
    }
    p
}

fn node(collector: &convgc::Collector, ty: u8, value: i64, left: *mut Node, right: *mut Node) -> *mut Node {
    let p = collector.alloc_object(ty) as *mut Node;
    unsafe {
        (*p).value = value;
        (*p).left = left as *mut u8;
        (*p).right = right as *mut u8;
    }
    p
}

fn tree_count(p: *mut Node) -> usize {
    if p.is_null() {
        return 0;
    }
    unsafe { 1 + tree_count((*p).left as *mut Node) + tree_count((*p).right as *mut Node) }
}

fn tree_sum(p: *mut Node) -> i64 {
    if p.is_null() {
        return 0;
    }
    unsafe { (*p).value + tree_sum((*p).left as *mut Node) + tree_sum((*p).right as *mut Node) }
}

/// Registers the bottom of stack for `$collector`. Must expand inline at the
/// call site, mirroring `convgc::set_bottom_of_stack_here!` -- a helper
/// *function* would plant the probe one frame lower than the caller, which
/// would wrongly exclude the caller's own stack locals from the scan range.
macro_rules! set_bottom_of_stack_here {
    ($collector:expr) => {{
        let __stack_probe: u8 = 0;
        $collector.set_bottom_of_stack(&__stack_probe as *const u8 as usize);
    }};
}

#[test]
fn binary_tree_survives_while_rooted_and_shrinks_when_pruned() {
    init_tracing();
    let collector = convgc::Collector::new();
    set_bottom_of_stack_here!(collector);
    let ty = register_node_type(&collector);

    // The tree pointer itself must not be a live stack local by the time
    // the final collection runs below, or conservative scanning would keep
    // it reachable even after its root is removed. Building, pruning, and
    // un-rooting the tree inside a nested call that returns before that
    // collection keeps the pointer out of the test function's own frame.
    fn build_prune_and_unroot(collector: &convgc::Collector, ty: u8) {
        let t = node(
            collector,
            ty,
            1,
            node(collector, ty, 2, leaf(collector, ty, 3), leaf(collector, ty, 4)),
            node(collector, ty, 5, leaf(collector, ty, 6), leaf(collector, ty, 7)),
        );
        collector.add_root(t as *mut u8);

        assert_eq!(tree_count(t), 7);
        assert_eq!(tree_sum(t), 1 + 2 + 3 + 4 + 5 + 6 + 7);

        collector.collect();
        assert_eq!(tree_count(t), 7, "rooted tree must survive a collection intact");

        unsafe {
            let right = (*t).right as *mut Node;
            (*right).left = std::ptr::null_mut();
        }
        collector.collect();
        assert_eq!(tree_count(t), 6, "pruned subtree must be reclaimed");

        collector.remove_root(t as *mut u8);
    }
    build_prune_and_unroot(&collector, ty);

    collector.collect();
    assert!(collector.is_empty());
}

#[test]
fn cyclic_reference_without_a_root_is_fully_reclaimed() {
    init_tracing();
    let collector = convgc::Collector::new();
    set_bottom_of_stack_here!(collector);
    let ty = register_node_type(&collector);

    // The cycle's pointers must not be live stack locals once `collect()`
    // runs below, so they're built and immediately dropped inside a nested
    // call (see `build_prune_and_unroot` above for why).
    fn make_cycle(collector: &convgc::Collector, ty: u8) {
        let a = collector.alloc_object(ty) as *mut Node;
        let b = collector.alloc_object(ty) as *mut Node;
        unsafe {
            (*a).value = 1;
            (*a).right = b as *mut u8;
            (*b).value = 2;
            (*b).right = a as *mut u8;
        }
    }
    make_cycle(&collector, ty);

    assert_eq!(collector.stats().live_count, 2);
    collector.collect();
    assert!(collector.is_empty(), "an unrooted cycle must not keep itself alive");
    assert_eq!(collector.stats().last_reclaimed_count, 2);
}

#[test]
fn stack_resident_cycle_survives_without_an_explicit_root() {
    init_tracing();
    let collector = convgc::Collector::new();
    set_bottom_of_stack_here!(collector);
    let ty = register_node_type(&collector);

    // `a` and `b` form a cycle and are never passed to add_root; only this
    // function's own stack slot for `a` references the graph at all.
    let a = collector.alloc_object(ty) as *mut Node;
    let b = collector.alloc_object(ty) as *mut Node;
    unsafe {
        (*a).value = 1;
        (*a).right = b as *mut u8;
        (*b).value = 2;
        (*b).right = a as *mut u8;
    }

    assert_eq!(collector.stats().live_count, 2);
    collector.collect();
    assert_eq!(
        collector.stats().live_count,
        2,
        "a stack-resident pointer must keep its whole reachable graph alive without an explicit root"
    );
    unsafe {
        assert_eq!((*a).value, 1);
        assert_eq!((*(*a).right.cast::<Node>()).value, 2);
    }
}

#[repr(C)]
struct Holder {
    tag: i32,
    note: *const u8,
    payload: *mut u8,
}

fn register_holder_type(collector: &convgc::Collector) -> u8 {
    let ty = collector.new_type(std::mem::size_of::<Holder>(), 1);
    collector.set_offset(ty, 0, offset_of!(Holder, payload));
    ty
}

#[test]
fn shared_target_survives_exactly_once_while_any_holder_is_rooted() {
    init_tracing();
    let collector = convgc::Collector::new();
    set_bottom_of_stack_here!(collector);
    let node_ty = register_node_type(&collector);
    let holder_ty = register_holder_type(&collector);

    // As above: `target`/`holders` must not remain live stack locals by the
    // time the un-rooted, final collection runs.
    fn build_root_and_unroot(collector: &convgc::Collector, node_ty: u8, holder_ty: u8) {
        let target = collector.alloc_object(node_ty) as *mut Node;
        unsafe {
            (*target).value = 99;
        }

        let holders = collector.alloc_array(holder_ty, 3) as *mut Holder;
        for i in 0..3 {
            unsafe {
                let h = holders.add(i);
                (*h).tag = i as i32;
                (*h).note = std::ptr::null();
                (*h).payload = target as *mut u8;
            }
        }
        collector.add_root(holders as *mut u8);

        // One allocation for the 3-element array block, one for the shared
        // target: the target is referenced three times but allocated once.
        assert_eq!(collector.stats().live_count, 2);
        collector.collect();
        assert_eq!(collector.stats().live_count, 2, "shared target must survive via any holder");

        collector.remove_root(holders as *mut u8);
    }
    build_root_and_unroot(&collector, node_ty, holder_ty);

    collector.collect();
    assert!(collector.is_empty());
}

#[test]
fn bulk_allocation_churn_stays_bounded_with_periodic_collection() {
    init_tracing();
    let collector = convgc::Collector::new();
    set_bottom_of_stack_here!(collector);
    let ty = register_node_type(&collector);

    let mut head: *mut Node = std::ptr::null_mut();
    let mut peak_live = 0usize;
    for i in 0..2000u32 {
        let n = collector.alloc_object(ty) as *mut Node;
        unsafe {
            (*n).value = i as i64;
            (*n).right = head as *mut u8;
        }
        head = n;
        if i % 123 == 0 {
            // Drop the chain built so far; only the stack-resident `head`
            // (reset below) is ever a root, so everything built before
            // this point becomes collectible.
            head = std::ptr::null_mut();
            collector.collect();
            peak_live = peak_live.max(collector.stats().live_count);
        }
    }
    collector.collect();

    assert!(
        peak_live < 123,
        "periodic collection should keep the live set far below the full run of 2000 allocations, got {peak_live}"
    );
    assert!(collector.stats().live_count <= 123);
}

#[test]
fn root_registry_add_remove_contains() {
    init_tracing();
    let collector = convgc::Collector::new();
    set_bottom_of_stack_here!(collector);

    let p = collector.alloc(64);
    assert!(!collector.contains_root(p));
    collector.add_root(p);
    assert!(collector.contains_root(p));
    collector.remove_root(p);
    assert!(!collector.contains_root(p));
}

#[test]
fn unrooted_allocation_is_collected_once_out_of_scope() {
    init_tracing();
    let collector = convgc::Collector::new();
    set_bottom_of_stack_here!(collector);

    fn make_garbage(collector: &convgc::Collector) {
        let _ = collector.alloc(128);
    }
    make_garbage(&collector);

    assert_eq!(collector.stats().live_count, 1);
    collector.collect();
    assert!(collector.is_empty());
}

#[test]
fn allocation_threshold_triggers_automatic_collection() {
    init_tracing();
    let collector = convgc::Collector::with_config(convgc::GcConfig {
        count_threshold_min: 4,
        size_threshold_min: 1 << 20,
    });
    set_bottom_of_stack_here!(collector);

    for _ in 0..20 {
        let _ = collector.alloc(32);
    }

    let stats = collector.stats();
    assert!(stats.collections >= 1, "small threshold should have triggered at least one automatic collection");
    assert!(stats.live_count < 20);
}

#[test]
fn stats_report_collection_history() {
    init_tracing();
    let collector = convgc::Collector::new();
    set_bottom_of_stack_here!(collector);

    let stats = collector.stats();
    assert_eq!(stats.collections, 0);
    assert_eq!(stats.live_count, 0);

    let ty = register_node_type(&collector);
    let _ = leaf(&collector, ty, 1);

    let stats = collector.stats();
    assert_eq!(stats.live_count, 1);

    collector.collect();
    let stats = collector.stats();
    assert_eq!(stats.collections, 1);
    assert_eq!(stats.live_count, 0);
    assert_eq!(stats.last_reclaimed_count, 1);

    collector.print_stats();
}
