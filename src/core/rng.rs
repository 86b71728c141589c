//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ for fast, reproducible randomness.
//! Every random decision in the match (team draws, spawn points,
//! flag drop offsets, pickup relocation) flows through one instance
//! so a seed plus a command stream replays exactly.

use std::f32::consts::TAU;
use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

use super::vec2::Vec2;

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use flag_arena::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(12345);
/// let mut b = DeterministicRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as u32
    }

    /// Generate a random f32 in [0, 1).
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        // 24 high bits fill the f32 mantissa exactly
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Generate a random f32 in [min, max).
    #[inline]
    pub fn next_f32_range(&mut self, min: f32, max: f32) -> f32 {
        if min >= max {
            return min;
        }
        min + self.next_f32() * (max - min)
    }

    /// Random angle in [0, 2π).
    #[inline]
    pub fn next_angle(&mut self) -> f32 {
        self.next_f32() * TAU
    }

    /// Random point inside the axis-aligned box `[min, max)`.
    pub fn random_point(&mut self, min: Vec2, max: Vec2) -> Vec2 {
        let x = self.next_f32_range(min.x, max.x);
        let y = self.next_f32_range(min.y, max.y);
        Vec2::new(x, y)
    }

    /// Random offset of length `[min_len, max_len)` at a random angle.
    pub fn random_offset(&mut self, min_len: f32, max_len: f32) -> Vec2 {
        let angle = self.next_angle();
        let len = self.next_f32_range(min_len, max_len);
        Vec2::from_angle(angle).scale(len)
    }

    /// Select a random element from a slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let idx = self.next_int(slice.len() as u32) as usize;
            slice.get(idx)
        }
    }

    /// Get current state (for checkpointing/debugging).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore from saved state.
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a match seed from the match id and an optional operator seed.
///
/// With an operator seed the whole match is reproducible; without one the
/// match id alone (random per process) decides.
pub fn derive_match_seed(match_id: &[u8; 16], operator_seed: Option<u64>) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"FLAG_ARENA_SEED_V1");
    hasher.update(match_id);
    if let Some(seed) = operator_seed {
        hasher.update(seed.to_le_bytes());
    }

    let hash = hasher.finalize();

    // Take first 8 bytes as seed
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(bytes)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = DeterministicRng::new(12345);
        let mut b = DeterministicRng::new(12345);
        let mut other = DeterministicRng::new(54321);

        let stream_a: Vec<u64> = (0..256).map(|_| a.next_u64()).collect();
        let stream_b: Vec<u64> = (0..256).map(|_| b.next_u64()).collect();
        let stream_other: Vec<u64> = (0..256).map(|_| other.next_u64()).collect();

        assert_eq!(stream_a, stream_b);
        assert_ne!(stream_a, stream_other);
    }

    #[test]
    fn test_zero_seed_is_usable() {
        let mut rng = DeterministicRng::new(0);
        assert_ne!(rng.state(), [0, 0]);
        assert_ne!(rng.next_u64(), rng.next_u64());
    }

    #[test]
    fn test_next_int() {
        let mut rng = DeterministicRng::new(1234);

        for _ in 0..1000 {
            assert!(rng.next_int(100) < 100);
        }

        // Edge cases
        assert_eq!(rng.next_int(0), 0);
        assert_eq!(rng.next_int(1), 0);
    }

    #[test]
    fn test_next_f32_range() {
        let mut rng = DeterministicRng::new(9999);

        for _ in 0..1000 {
            let v = rng.next_f32();
            assert!((0.0..1.0).contains(&v));

            let r = rng.next_f32_range(40.0, 60.0);
            assert!((40.0..60.0).contains(&r));
        }

        assert_eq!(rng.next_f32_range(5.0, 5.0), 5.0);
    }

    #[test]
    fn test_random_offset_length() {
        let mut rng = DeterministicRng::new(31337);

        for _ in 0..500 {
            let len = rng.random_offset(40.0, 60.0).length();
            assert!(len >= 40.0 - 1e-3 && len <= 60.0 + 1e-3, "offset length {}", len);
        }
    }

    #[test]
    fn test_random_point_in_box() {
        let mut rng = DeterministicRng::new(7777);
        let min = Vec2::new(10.0, 20.0);
        let max = Vec2::new(110.0, 220.0);

        for _ in 0..100 {
            let p = rng.random_point(min, max);
            assert!(p.x >= min.x && p.x < max.x);
            assert!(p.y >= min.y && p.y < max.y);
        }
    }

    #[test]
    fn test_choose() {
        let mut rng = DeterministicRng::new(2);
        let empty: [u8; 0] = [];
        assert!(rng.choose(&empty).is_none());
        assert_eq!(rng.choose(&[7]), Some(&7));
    }

    #[test]
    fn test_derive_match_seed() {
        let match_id = [1u8; 16];

        let seed1 = derive_match_seed(&match_id, Some(42));
        let seed2 = derive_match_seed(&match_id, Some(42));
        assert_eq!(seed1, seed2);

        assert_ne!(seed1, derive_match_seed(&match_id, Some(43)));
        assert_ne!(seed1, derive_match_seed(&match_id, None));
        assert_ne!(seed1, derive_match_seed(&[2u8; 16], Some(42)));
    }

    #[test]
    fn test_state_checkpoint() {
        let mut rng = DeterministicRng::new(5555);

        for _ in 0..50 {
            rng.next_u64();
        }

        let saved_state = rng.state();
        let next_values: Vec<u64> = (0..10).map(|_| rng.next_u64()).collect();

        rng.set_state(saved_state);
        for expected in next_values {
            assert_eq!(rng.next_u64(), expected);
        }
    }
}
