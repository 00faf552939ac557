//! Stack safety for synchronous re-entrancy.
//!
//! Native code can call back into the interpreter (closure invocation,
//! iterator steps), which recurses on the Rust stack. `recall` recursion
//! never needs this — it is O(1) in activation depth by construction.

/// Ensure sufficient stack space is available before executing `f`.
///
/// On native targets, grows the stack if the red zone is hit. On WASM the
/// closure runs directly (WASM has its own stack management).
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    /// Minimum stack space to keep available (100KB red zone).
    const RED_ZONE: usize = 100 * 1024;

    /// Stack space to allocate when growing (1MB).
    const STACK_PER_RECURSION: usize = 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM version - just call directly.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
