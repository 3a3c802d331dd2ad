//! Stack growth for deep recursion.
//!
//! Nested forms are handled by plain recursion in the parser, the checker
//! and the IR builder. Each recursive entry point wraps its body in
//! [`ensure_sufficient_stack`] so that pathological nesting grows the stack
//! instead of overflowing it.

/// Remaining stack below which a new segment is allocated.
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated stack segment.
const SEGMENT_SIZE: usize = 2 * 1024 * 1024;

/// Run `f`, first growing the stack if less than the red zone remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT_SIZE, f)
}

/// WASM manages its own stack; call through.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nest(depth: u32) -> u32 {
        ensure_sufficient_stack(|| if depth == 0 { 0 } else { nest(depth - 1) + 1 })
    }

    #[test]
    fn deep_recursion_does_not_overflow() {
        assert_eq!(nest(200_000), 200_000);
    }

    #[test]
    fn passes_results_through() {
        let r: Result<u8, &str> = ensure_sufficient_stack(|| Err("bad"));
        assert_eq!(r, Err("bad"));
    }
}
