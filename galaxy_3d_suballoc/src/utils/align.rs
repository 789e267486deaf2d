/// Integer alignment helpers

/// Whether `value` is a non-zero power of two
pub fn is_power_of_two(value: u64) -> bool {
    value != 0 && (value & (value - 1)) == 0
}

/// Round `value` up to a multiple of `alignment` (power of two)
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(is_power_of_two(alignment), "alignment {} is not a power of two", alignment);
    (value + alignment - 1) & !(alignment - 1)
}

/// 32-bit version of [`align_up`]
pub fn align_up_u32(value: u32, alignment: u32) -> u32 {
    align_up(value as u64, alignment as u64) as u32
}

/// Round `value` up to a multiple of `granularity` (any non-zero value)
///
/// A granularity of 0 leaves the value unchanged.
pub fn round_up_to_multiple(value: u64, granularity: u64) -> u64 {
    if granularity == 0 {
        return value;
    }
    value.div_ceil(granularity) * granularity
}

#[cfg(test)]
#[path = "align_tests.rs"]
mod tests;
