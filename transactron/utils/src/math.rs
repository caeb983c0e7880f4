//! Bit arithmetic used when sizing signals.

/// Number of bits needed to represent `n`. Zero still needs one bit.
pub fn bits_for(n: u64) -> u32 {
    std::cmp::max(64 - n.leading_zeros(), 1)
}

/// Smallest `k` with `2^k >= n`.
pub fn ceil_log2(n: u64) -> u32 {
    if n <= 1 { 0 } else { 64 - (n - 1).leading_zeros() }
}

/// Mask selecting the low `width` bits of a value.
pub fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}
