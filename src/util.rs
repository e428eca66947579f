/// Round `value` up to the next multiple of `alignment`, or `None` if that doesn't fit in a
/// `u64`. An alignment of zero or one leaves the value unchanged.
pub fn align_up(value: u64, alignment: u64) -> Option<u64> {
    if alignment <= 1 {
        return Some(value);
    }

    match value % alignment {
        0 => Some(value),
        rem => value.checked_add(alignment - rem),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns() {
        assert_eq!(align_up(0, 256), Some(0));
        assert_eq!(align_up(1, 256), Some(256));
        assert_eq!(align_up(256, 256), Some(256));
        assert_eq!(align_up(257, 256), Some(512));
        assert_eq!(align_up(100, 12), Some(108));
    }

    #[test]
    fn trivial_alignments() {
        assert_eq!(align_up(13, 0), Some(13));
        assert_eq!(align_up(13, 1), Some(13));
        assert_eq!(align_up(u64::MAX, 1), Some(u64::MAX));
    }

    #[test]
    fn overflow() {
        assert_eq!(align_up(u64::MAX - 10, 4 * 1024 * 1024), None);
        assert_eq!(align_up(u64::MAX - 255, 256), Some(u64::MAX - 255));
    }
}
