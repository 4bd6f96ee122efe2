// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Modular arithmetic helpers and the Park-Miller Lehmer generator.
//!
//! Everything the core does with addresses and field values reduces to
//! arithmetic modulo the core size, so the wrap rules live here in one
//! place. The generator must stay bit-identical to the minimal-standard
//! formula: warrior positioning depends on it for reproducible rounds.

/// Lehmer modulus, `2^31 - 1`.
pub const RNG_MODULUS: i64 = 2_147_483_647;

/// `(a + b) mod m` for `a, b` already in `[0, m)`.
pub fn add_mod(a: i32, b: i32, m: i32) -> i32 {
    let sum = a as i64 + b as i64;
    let m = m as i64;
    if sum >= m {
        (sum - m) as i32
    } else {
        sum as i32
    }
}

/// `(a - b) mod m` for `a, b` already in `[0, m)`.
pub fn sub_mod(a: i32, b: i32, m: i32) -> i32 {
    let diff = a - b;
    if diff < 0 {
        diff + m
    } else {
        diff
    }
}

/// `(a * b) mod m` without intermediate overflow for any `m` that fits
/// an `i32`; the multiply widens through `i64`.
pub fn mul_mod(a: i32, b: i32, m: i32) -> i32 {
    ((a as i64 * b as i64) % m as i64) as i32
}

/// Map any integer into `[0, m)`, collapsing `-0` to `+0`.
pub fn normalize(v: i64, m: i32) -> i32 {
    let m = m as i64;
    let r = ((v % m) + m) % m;
    r as i32
}

/// One step of the minimal-standard Lehmer generator. Given a seed in
/// `[1, 2^31 - 2]` the result stays in that range; the cycle length is
/// `2^31 - 2`.
pub fn rng_next(seed: i32) -> i32 {
    let s = seed as i64;
    let mut next = 16807 * (s % 127_773) - 2836 * (s / 127_773);
    if next < 0 {
        next += RNG_MODULUS;
    }
    next as i32
}

/// Fold an arbitrary integer (for instance a warrior checksum) into the
/// generator's valid seed range `[1, 2^31 - 2]`.
pub fn sanitize_seed(v: i32) -> i32 {
    let mut s = v as i64 % (RNG_MODULUS - 1);
    if s <= 0 {
        s += RNG_MODULUS - 2;
    }
    s as i32
}
