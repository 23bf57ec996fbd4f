//! Bounded random integers.
//!
//! [`random_between`] is a mask-and-reject sampler, so every value in the
//! range is equally likely. [`bias_random_between`] is the digit-based
//! sampler that skews toward numbers with fewer digits.

use rand::RngCore;

/// Attempts before the biased sampler gives up and samples uniformly.
const BIAS_MAX_ATTEMPTS: usize = 64;

/// Smallest all-ones bit mask covering `range`.
fn mask_for(range: u64) -> u64 {
    let mut mask = range | (range >> 1);
    mask |= mask >> 2;
    mask |= mask >> 4;
    mask |= mask >> 8;
    mask |= mask >> 16;
    mask |= mask >> 32;
    mask
}

/// Uniform integer in `[min, max]` (both inclusive).
///
/// Returns `min` when `max <= min`.
pub fn random_between<R: RngCore + ?Sized>(rng: &mut R, min: i64, max: i64) -> i64 {
    if max <= min {
        return min;
    }
    let range = max.wrapping_sub(min) as u64;
    let mask = mask_for(range);

    loop {
        let value = rng.next_u64() & mask;
        if value <= range {
            return min.wrapping_add(value as i64);
        }
    }
}

/// Uniform index in `[0, max]`.
pub fn random_index<R: RngCore + ?Sized>(rng: &mut R, max: usize) -> usize {
    random_between(rng, 0, max as i64) as usize
}

fn digit_count(value: i64) -> u32 {
    value.unsigned_abs().checked_ilog10().unwrap_or(0) + 1
}

/// Digit-based random integer in `[min, max]`.
///
/// Picks a digit count between those of `min` and `max`, then builds a number
/// with a non-zero units digit and free higher digits. Values outside the
/// range are redrawn. Ranges the construction cannot reach (for example
/// `[10, 10]`) fall back to [`random_between`].
pub fn bias_random_between<R: RngCore + ?Sized>(rng: &mut R, min: i64, max: i64) -> i64 {
    if max <= min {
        return min;
    }

    let min_digits = digit_count(min.max(0)) as i64;
    let max_digits = digit_count(max.max(0)) as i64;

    for _ in 0..BIAS_MAX_ATTEMPTS {
        let size = random_between(rng, min_digits, max_digits);

        let mut result: i128 = 0;
        let mut place: i128 = 1;
        for _ in 0..size {
            let lowest = if place == 1 { 1 } else { 0 };
            result += place * random_between(rng, lowest, 9) as i128;
            place *= 10;
        }

        if result >= min as i128 && result <= max as i128 {
            return result as i64;
        }
    }

    random_between(rng, min, max)
}
