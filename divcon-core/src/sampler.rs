//! Bounded-size sampling for oracle calls with a context ceiling.

use rand::seq::SliceRandom;
use rand::Rng;

/// Return `items` unchanged when it holds at most `k` elements, otherwise a
/// uniform sample of exactly `k` distinct elements (no replacement, order
/// unspecified).
///
/// The random source is injected so callers can seed it.
pub fn sample<T: Clone, R: Rng + ?Sized>(items: &[T], k: usize, rng: &mut R) -> Vec<T> {
    if items.len() <= k {
        return items.to_vec();
    }
    items.choose_multiple(rng, k).cloned().collect()
}
