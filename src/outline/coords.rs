//! Coordinate delta encodings
//!
//! - the legacy TrueType encoding (0, 1 or 2 bytes per axis, selected by
//!   flag bits)
//! - the WOFF2 "triplet" encoding, where a 7-bit flag selects one of 128
//!   bucketed layouts of 1 to 4 data bytes for a (dx, dy) pair
//!
//! <https://www.w3.org/TR/WOFF2/#triplet_decoding>

use bytes::BufMut;

use crate::buffer::Reader;
use crate::error::FontError;
use crate::outline::{GLYF_THIS_X_IS_SAME, GLYF_X_SHORT};

/// Append the TrueType encoding of one coordinate delta to `dst` and return
/// the flag bits selecting it, aligned for the x axis (shift left by one for
/// the y axis).
pub fn encode_delta(value: i32, dst: &mut impl BufMut) -> u8 {
    if value == 0 {
        GLYF_THIS_X_IS_SAME
    } else if value > -256 && value < 256 {
        dst.put_u8(value.unsigned_abs() as u8);
        if value > 0 {
            GLYF_X_SHORT | GLYF_THIS_X_IS_SAME
        } else {
            GLYF_X_SHORT
        }
    } else {
        // will always fit for valid input, but overflow is harmless
        dst.put_i16(value as i16);
        0
    }
}

/// Decode one TrueType coordinate delta. `flag` must be aligned for the x
/// axis (shift right by one for the y axis).
pub fn decode_ttf_coord(flag: u8, input: &mut Reader<'_>) -> Result<i32, FontError> {
    if flag & GLYF_X_SHORT != 0 {
        let magnitude = input.read_u8()? as i32;
        Ok(if flag & GLYF_THIS_X_IS_SAME != 0 {
            magnitude
        } else {
            -magnitude
        })
    } else if flag & GLYF_THIS_X_IS_SAME != 0 {
        Ok(0)
    } else {
        Ok(input.read_i16()? as i32)
    }
}

/// Number of glyph stream bytes used by a triplet flag
pub fn triplet_data_size(flag: u8) -> usize {
    match flag & 0x7f {
        0..84 => 1,
        84..120 => 2,
        120..124 => 3,
        _ => 4,
    }
}

/// Decode the (dx, dy) delta selected by the low 7 bits of `flag`, reading
/// its data bytes from `input`.
pub fn decode_triplet(flag: u8, input: &mut Reader<'_>) -> Result<(i32, i32), FontError> {
    #[inline(always)]
    fn with_sign(flag: i32, baseval: i32) -> i32 {
        // Precondition: 0 <= baseval < 65536 (to avoid integer overflow)
        if (flag & 1) != 0 { baseval } else { -baseval }
    }

    let flag = (flag & 0x7f) as i32;
    let data = input.read_bytes(triplet_data_size(flag as u8))?;
    let b = |i: usize| data[i] as i32;

    let delta = if flag < 10 {
        (0, with_sign(flag, ((flag & 14) << 7) + b(0)))
    } else if flag < 20 {
        (with_sign(flag, (((flag - 10) & 14) << 7) + b(0)), 0)
    } else if flag < 84 {
        let b0: i32 = flag - 20;
        let b1: i32 = b(0);
        (
            with_sign(flag, 1 + (b0 & 0x30) + (b1 >> 4)),
            with_sign(flag >> 1, 1 + ((b0 & 0x0c) << 2) + (b1 & 0x0f)),
        )
    } else if flag < 120 {
        let b0: i32 = flag - 84;
        (
            with_sign(flag, 1 + ((b0 / 12) << 8) + b(0)),
            with_sign(flag >> 1, 1 + (((b0 % 12) >> 2) << 8) + b(1)),
        )
    } else if flag < 124 {
        (
            with_sign(flag, (b(0) << 4) + (b(1) >> 4)),
            with_sign(flag >> 1, ((b(1) & 0x0f) << 8) + b(2)),
        )
    } else {
        (
            with_sign(flag, (b(0) << 8) + b(1)),
            with_sign(flag >> 1, (b(2) << 8) + b(3)),
        )
    };
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triplet(flag: u8, data: &[u8]) -> Result<(i32, i32), FontError> {
        let mut reader = Reader::new(data);
        let delta = decode_triplet(flag, &mut reader)?;
        assert!(reader.remaining_as_slice().is_empty());
        Ok(delta)
    }

    fn encode(value: i32) -> (u8, Vec<u8>) {
        let mut out: Vec<u8> = Vec::new();
        let flag = encode_delta(value, &mut out);
        (flag, out)
    }

    #[test]
    fn encode_zero_short_and_word() {
        assert_eq!(encode(0), (GLYF_THIS_X_IS_SAME, vec![]));
        assert_eq!(encode(5), (GLYF_X_SHORT | GLYF_THIS_X_IS_SAME, vec![5]));
        assert_eq!(encode(-255), (GLYF_X_SHORT, vec![255]));
        assert_eq!(encode(256), (0, vec![0x01, 0x00]));
        assert_eq!(encode(300), (0, vec![0x01, 0x2c]));
        assert_eq!(encode(-300), (0, vec![0xfe, 0xd4]));
    }

    #[test]
    fn ttf_coord_round_trip() {
        for value in [-32768, -1000, -256, -255, -1, 0, 1, 255, 256, 32767] {
            let (flag, bytes) = encode(value);
            let mut reader = Reader::new(&bytes);
            assert_eq!(decode_ttf_coord(flag, &mut reader), Ok(value));
            assert!(reader.remaining_as_slice().is_empty());
        }
    }

    #[test]
    fn ttf_coord_truncated() {
        let mut reader = Reader::new(&[]);
        assert_eq!(decode_ttf_coord(GLYF_X_SHORT, &mut reader), Err(FontError::Truncated));
        let mut reader = Reader::new(&[1]);
        assert_eq!(decode_ttf_coord(0, &mut reader), Err(FontError::Truncated));
    }

    #[test]
    fn triplet_single_axis() {
        // y only, negative
        assert_eq!(triplet(0, &[7]), Ok((0, -7)));
        // y only, positive, high bits from flag
        assert_eq!(triplet(3, &[7]), Ok((0, 256 + 7)));
        assert_eq!(triplet(9, &[255]), Ok((0, 1024 + 255)));
        // x only
        assert_eq!(triplet(10, &[7]), Ok((-7, 0)));
        assert_eq!(triplet(13, &[7]), Ok((256 + 7, 0)));
        assert_eq!(triplet(19, &[0]), Ok((1024, 0)));
    }

    #[test]
    fn triplet_small_pairs() {
        // both negative, nibbles of the data byte
        assert_eq!(triplet(20, &[0x00]), Ok((-1, -1)));
        assert_eq!(triplet(23, &[0x12]), Ok((2, 3)));
        assert_eq!(triplet(83, &[0xff]), Ok((64, 64)));
    }

    #[test]
    fn triplet_medium_pairs() {
        assert_eq!(triplet(84, &[0, 0]), Ok((-1, -1)));
        assert_eq!(triplet(87, &[1, 2]), Ok((2, 3)));
        // (119 - 84) = 35: dx bucket 2, dy bucket 2
        assert_eq!(triplet(119, &[255, 255]), Ok((768, 768)));
    }

    #[test]
    fn triplet_wide_pairs() {
        assert_eq!(triplet(123, &[0x12, 0x34, 0x56]), Ok((0x123, 0x456)));
        assert_eq!(triplet(120, &[0xff, 0xff, 0xff]), Ok((-0xfff, -0xfff)));
        assert_eq!(triplet(127, &[0x01, 0x00, 0x80, 0x00]), Ok((256, 32768)));
        assert_eq!(triplet(125, &[0x01, 0x00, 0x00, 0x02]), Ok((256, -2)));
    }

    #[test]
    fn triplet_ignores_on_curve_bit() {
        assert_eq!(triplet(0x80 | 23, &[0x12]), Ok((2, 3)));
    }

    #[test]
    fn triplet_truncated() {
        let mut reader = Reader::new(&[1, 2, 3]);
        assert_eq!(decode_triplet(124, &mut reader), Err(FontError::Truncated));
        let mut reader = Reader::new(&[]);
        assert_eq!(decode_triplet(0, &mut reader), Err(FontError::Truncated));
    }
}
