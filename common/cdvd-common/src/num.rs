use std::ops::RangeInclusive;

pub trait GetBit {
    #[must_use]
    fn bit(self, i: u8) -> bool;

    #[must_use]
    fn bits(self, range: RangeInclusive<u8>) -> Self;
}

macro_rules! impl_get_bit {
    ($t:ty) => {
        impl GetBit for $t {
            #[inline]
            fn bit(self, i: u8) -> bool {
                debug_assert!(i < (<$t>::BITS as u8));
                self & (1 << i) != 0
            }

            #[inline]
            fn bits(self, range: RangeInclusive<u8>) -> Self {
                let start = *range.start();
                let end = *range.end();
                debug_assert!(end < (<$t>::BITS as u8));

                (self >> start) & (((1_u64 << (end - start + 1)) - 1) as $t)
            }
        }
    };
}

impl_get_bit!(u8);
impl_get_bit!(u16);
impl_get_bit!(u32);

pub trait U16Ext {
    fn lsb(self) -> u8;

    fn msb(self) -> u8;
}

impl U16Ext for u16 {
    #[inline(always)]
    fn lsb(self) -> u8 {
        self as u8
    }

    #[inline(always)]
    fn msb(self) -> u8 {
        (self >> 8) as u8
    }
}

/// Byte access for 24-bit values stored in a `u32`, e.g. sector addresses in raw DVD headers.
pub trait U24Ext {
    fn low_byte(self) -> u8;

    fn mid_byte(self) -> u8;

    fn high_byte(self) -> u8;

    fn from_be_bytes_24(bytes: [u8; 3]) -> Self;
}

impl U24Ext for u32 {
    #[inline(always)]
    fn low_byte(self) -> u8 {
        self as u8
    }

    #[inline(always)]
    fn mid_byte(self) -> u8 {
        (self >> 8) as u8
    }

    #[inline(always)]
    fn high_byte(self) -> u8 {
        (self >> 16) as u8
    }

    #[inline(always)]
    fn from_be_bytes_24(bytes: [u8; 3]) -> Self {
        (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
    }
}

/// Convert a binary value in the range 0-99 to binary-coded decimal.
#[inline]
#[must_use]
pub fn binary_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Convert a binary-coded decimal byte to binary. Nibbles above 9 are not rejected.
#[inline]
#[must_use]
pub fn bcd_to_binary(value: u8) -> u8 {
    10 * (value >> 4) + (value & 0x0F)
}
