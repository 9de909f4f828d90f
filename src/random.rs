//! Injectable source of randomness.
//!
//! Upstream may advertise multiple equivalent URLs; picking one at random
//! spreads load across mirrors. The source is injected so that tests can
//! substitute a deterministic implementation and assert "any member of the
//! candidate set" instead of a specific pick.

use rand::Rng;

pub trait RandomSource: Send + Sync {
    /// Returns an index in `0..len`. `len` must be greater than zero.
    fn pick_index(&self, len: usize) -> usize;
}

/// Default source backed by the thread-local RNG.
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn pick_index(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Picks one item of `items` at random, `None` when empty.
pub fn pick_random<'a, T>(source: &dyn RandomSource, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    items.get(source.pick_index(items.len()))
}
