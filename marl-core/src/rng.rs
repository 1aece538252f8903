use rand::{SeedableRng, rngs::StdRng};
use std::cell::RefCell;

thread_local! {
    pub static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
}

/// Reseeds the thread local generator. Env pools draw their reset seeds from
/// it, so calling this before building an algorithm makes runs reproducible.
pub fn reseed(seed: u64) {
    RNG.with_borrow_mut(|rng| *rng = StdRng::seed_from_u64(seed));
}

pub fn next_seed() -> u64 {
    use rand::Rng;
    RNG.with_borrow_mut(|rng| rng.random::<u64>())
}
