//! Seeded pseudo-random stream used by every generator and simulator.
//!
//! The core is Mulberry32 exposed through `rand_core::RngCore`, so callers draw
//! with the usual `rand::Rng` / `SliceRandom` helpers. One step, all arithmetic
//! wrapping on u32:
//! - `state = state + 0x6D2B79F5`
//! - `t = (state ^ (state >> 15)) * (state | 1)`
//! - `t ^= t + (t ^ (t >> 7)) * (t | 61)`
//! - `out = t ^ (t >> 14)`
//!
//! `Prng::next_f64` returns `out / 2^32`, the same value the browser rendition
//! (`Math.imul`, `>>> 0`) produces. Nothing in this crate may read randomness
//! from anywhere else.

use rand::Rng;
use rand_core::{impls, Error, RngCore, SeedableRng};

const INCREMENT: u32 = 0x6D2B_79F5;
const TWO_POW_32: f64 = 4_294_967_296.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prng {
    seed: u32,
    state: u32,
}

impl Prng {
    pub fn new(seed: u32) -> Self {
        Self { seed, state: seed }
    }

    // `(seed, salt)` goes through `seed_from_u64`; a new salt never shifts another stream.
    pub fn for_stream(seed: u32, salt: u32) -> Self {
        Self::seed_from_u64((u64::from(salt) << 32) | u64::from(seed))
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn reseed(&mut self, seed: u32) {
        self.seed = seed;
        self.state = seed;
    }

    pub fn reseed_stream(&mut self, seed: u32, salt: u32) {
        *self = Self::for_stream(seed, salt);
    }

    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / TWO_POW_32
    }
}

impl RngCore for Prng {
    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(INCREMENT);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_u32(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Prng {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u32::from_le_bytes(seed))
    }
}

pub fn log_uniform<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if min >= max {
        return min;
    }
    rng.gen_range(min.ln()..max.ln()).exp()
}

pub fn signed<R: Rng + ?Sized>(rng: &mut R, amplitude: f64) -> f64 {
    if amplitude > 0.0 {
        rng.gen_range(-amplitude..amplitude)
    } else {
        0.0
    }
}

pub fn hex_token<R: RngCore + ?Sized>(rng: &mut R, byte_len: usize) -> String {
    let mut bytes = vec![0_u8; byte_len];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    #[test]
    fn matches_reference_mulberry32_stream() {
        let mut rng = Prng::new(1337);
        assert_eq!(rng.next_u32(), 792_042_790);
        assert_eq!(rng.next_u32(), 815_997_621);
        assert_eq!(rng.next_u32(), 3_480_950_701);

        let mut rng = Prng::new(42);
        assert_eq!(rng.next_f64(), 0.6011037519201636);
        assert_eq!(rng.next_f64(), 0.44829055899754167);
    }

    #[test]
    fn from_seed_reads_little_endian_u32() {
        let mut a = Prng::from_seed(1337_u32.to_le_bytes());
        let mut b = Prng::new(1337);
        assert_eq!(a.next_u64(), b.next_u64());
        assert_eq!(a.seed(), 1337);
    }

    #[test]
    fn reseed_discards_prior_state() {
        let mut rng = Prng::new(99);
        let first: Vec<u32> = (0..5).map(|_| rng.next_u32()).collect();
        rng.next_u32();
        rng.reseed(99);
        let again: Vec<u32> = (0..5).map(|_| rng.next_u32()).collect();
        assert_eq!(first, again);
        assert_eq!(rng.seed(), 99);
    }

    #[test]
    fn rand_helpers_respect_bounds() {
        let mut rng = Prng::new(2024);
        let mut seen_min = false;
        let mut seen_max = false;
        for _ in 0..10_000 {
            let n: i64 = rng.gen_range(3..=6);
            seen_min |= n == 3;
            seen_max |= n == 6;

            let u = signed(&mut rng, 2.5);
            assert!((-2.5..2.5).contains(&u));

            let l = log_uniform(&mut rng, 1e-3, 1e3);
            assert!((1e-3..1e3).contains(&l));
        }
        assert!(seen_min && seen_max);
        assert_eq!(signed(&mut rng, 0.0), 0.0);

        let items = ["a", "b", "c"];
        assert!(items.contains(items.choose(&mut rng).unwrap()));
        let empty: [u8; 0] = [];
        assert!(empty.choose(&mut rng).is_none());
    }

    #[test]
    fn hex_token_has_expected_length() {
        let mut rng = Prng::new(11);
        let nonce = hex_token(&mut rng, 16);
        assert_eq!(nonce.len(), 32);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn streams_differ_by_salt_and_replay_by_pair() {
        let mut a = Prng::for_stream(1337, 1);
        let mut b = Prng::for_stream(1337, 2);
        let mut c = Prng::for_stream(1337, 1);
        let xs: Vec<u32> = (0..8).map(|_| a.next_u32()).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.next_u32()).collect();
        let zs: Vec<u32> = (0..8).map(|_| c.next_u32()).collect();
        assert_ne!(xs, ys);
        assert_eq!(xs, zs);
    }
}
