//! Unit tests for align.rs

use crate::utils::{align_up, align_up_u32, is_power_of_two, round_up_to_multiple};

#[test]
fn test_is_power_of_two() {
    assert!(!is_power_of_two(0));
    assert!(is_power_of_two(1));
    assert!(is_power_of_two(2));
    assert!(!is_power_of_two(3));
    assert!(is_power_of_two(1 << 40));
    assert!(!is_power_of_two((1 << 40) + 1));
}

#[test]
fn test_align_up() {
    assert_eq!(align_up(0, 16), 0);
    assert_eq!(align_up(1, 16), 16);
    assert_eq!(align_up(16, 16), 16);
    assert_eq!(align_up(17, 16), 32);
    assert_eq!(align_up(5, 1), 5);
    assert_eq!(align_up_u32(129, 128), 256);
}

#[test]
fn test_round_up_to_multiple() {
    assert_eq!(round_up_to_multiple(0, 3), 0);
    assert_eq!(round_up_to_multiple(1, 3), 3);
    assert_eq!(round_up_to_multiple(7, 3), 9);
    assert_eq!(round_up_to_multiple(9, 3), 9);
    assert_eq!(round_up_to_multiple(42, 0), 42);
}
