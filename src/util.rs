//! Small numeric helpers shared by the generators.

pub fn unsigned_rounded_up_div<T>(a: T, b: T) -> T
where
    T: num_traits::Unsigned,
{
    a.sub(T::one()).div(b).add(T::one())
}

pub fn unsigned_align_to<T>(a: T, b: T) -> T
where
    T: num_traits::Unsigned + Copy,
{
    unsigned_rounded_up_div(a, b).mul(b)
}

/// The rotate-right-by-one-then-add fold shared by the volume boot checksum,
/// the up-case table checksum, and the directory set checksum / name hash.
/// All of these are the same recurrence at different bit widths, so it is
/// written once per width here instead of four times inline.
pub fn ror32_add(sum: u32, byte: u8) -> u32 {
    (if sum & 1 != 0 { 0x8000_0000 } else { 0 })
        .wrapping_add(sum >> 1)
        .wrapping_add(u32::from(byte))
}

pub fn ror16_add(sum: u16, byte: u8) -> u16 {
    (if sum & 1 != 0 { 0x8000 } else { 0 })
        .wrapping_add(sum >> 1)
        .wrapping_add(u16::from(byte))
}

/// Copies `buf.len()` bytes out of a freshly synthesized sector, the common
/// tail of every region generator's read path.
pub fn copy_sector_slice(sector: &[u8], offset: usize, buf: &mut [u8]) {
    buf.copy_from_slice(&sector[offset..offset + buf.len()]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_up() {
        assert_eq!(unsigned_rounded_up_div(5u32, 1), 5);
        assert_eq!(unsigned_rounded_up_div(5u32, 2), 3);
        assert_eq!(unsigned_rounded_up_div(5u32, 3), 2);
        assert_eq!(unsigned_rounded_up_div(5u32, 4), 2);
        assert_eq!(unsigned_rounded_up_div(5u32, 5), 1);
    }

    #[test]
    fn alignment() {
        assert_eq!(unsigned_align_to(5u32, 8), 8);
        assert_eq!(unsigned_align_to(15u32, 8), 16);
    }

    #[test]
    fn ror32_matches_ror16_shape() {
        // odd accumulator rotates a 1 bit into the top
        assert_eq!(ror32_add(1, 0), 0x8000_0000);
        assert_eq!(ror16_add(1, 0), 0x8000);
    }
}
