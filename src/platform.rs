//! Architecture-specific capture of the collector's own callee-saved
//! registers, so conservative root scanning can see candidate pointers a
//! compiler has parked in a register rather than spilled to the stack.
//!
//! The base/frame-pointer register needs separate treatment from the rest:
//! Rust's stable `asm!` refuses to name `rbp` (x86_64) or `x29`/`x30`
//! (aarch64) as a declared operand, since the compiler may be using them
//! for frame-pointer bookkeeping -- the same reason the originating
//! implementation had to capture its base pointer by hand rather than rely
//! on `setjmp`, which mangles it. We work around the restriction by never
//! declaring those registers as asm operands at all: the only declared
//! operand is the destination pointer, and the registers are named
//! directly in the instruction text, which `asm!` does not restrict.

#[cfg(target_arch = "x86_64")]
mod arch {
    /// rbx, rbp, r12, r13, r14, r15.
    pub(crate) const CALLEE_SAVED_WORDS: usize = 6;

    #[inline(never)]
    pub(crate) fn save_callee_saved(buf: &mut [usize; CALLEE_SAVED_WORDS]) {
        // SAFETY: `dst` is a valid pointer to six in-bounds, correctly
        // aligned `usize` slots owned by the caller for the duration of
        // this call.
        unsafe {
            core::arch::asm!(
                "mov [{dst}], rbx",
                "mov [{dst} + 8], rbp",
                "mov [{dst} + 16], r12",
                "mov [{dst} + 24], r13",
                "mov [{dst} + 32], r14",
                "mov [{dst} + 40], r15",
                dst = in(reg) buf.as_mut_ptr(),
                options(nostack, preserves_flags),
            );
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod arch {
    /// x19-x28, and the frame pointer x29.
    pub(crate) const CALLEE_SAVED_WORDS: usize = 11;

    #[inline(never)]
    pub(crate) fn save_callee_saved(buf: &mut [usize; CALLEE_SAVED_WORDS]) {
        // SAFETY: see the x86_64 impl above.
        unsafe {
            core::arch::asm!(
                "stp x19, x20, [{dst}]",
                "stp x21, x22, [{dst}, 16]",
                "stp x23, x24, [{dst}, 32]",
                "stp x25, x26, [{dst}, 48]",
                "stp x27, x28, [{dst}, 64]",
                "str x29, [{dst}, 80]",
                dst = in(reg) buf.as_mut_ptr(),
                options(nostack, preserves_flags),
            );
        }
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!(
    "convgc's conservative register scanner has no capture routine for this target architecture"
);

pub(crate) use arch::{save_callee_saved, CALLEE_SAVED_WORDS};

/// Captures callee-saved registers into a stack-resident buffer and
/// returns it alongside the buffer's own address, which doubles as the
/// scan's "top of stack" -- this function's frame sits strictly below its
/// caller's, so everything the caller has on its stack is still in range
/// when the caller later scans `[top_of_stack, bottom_of_stack)`.
#[inline(never)]
pub(crate) fn capture_registers() -> ([usize; CALLEE_SAVED_WORDS], usize) {
    let mut buf = [0usize; CALLEE_SAVED_WORDS];
    save_callee_saved(&mut buf);
    let top_of_stack = buf.as_ptr() as usize;
    (buf, top_of_stack)
}
