//! Pure Rust TTF/WOFF/WOFF2 conversion with lossless table optimization
//!
//! Fonts are read into a [`Font`] (a set of tagged tables) from any of the
//! supported containers, optionally shrunk with [`optimize`], and written
//! back out as an sfnt ([`write_ttf`]) or WOFF 1.0 ([`write_woff`]) file.

pub mod buffer;
pub mod error;
pub mod font;
pub mod optimize;
pub mod outline;
pub mod table_tags;
pub mod variable_length;
pub mod woff;

mod compress_woff1;
mod decompress;
mod decompress_woff1;
mod sfnt;

pub use compress_woff1::*;
pub use decompress::*;
pub use decompress_woff1::*;
pub use error::FontError;
pub use font::{Font, LocaFormat, Table};
pub use optimize::{OptimizationReport, OptimizeOptions, TableReport, optimize};
pub use sfnt::*;

use bytes::Bytes;
use font_types::Tag;

/// Which container a byte stream holds
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FontFormat {
    Ttf,
    Ttc,
    Woff,
    Woff2,
}

impl FontFormat {
    /// Determine the container format from the leading signature
    pub fn sniff(data: &[u8]) -> Option<Self> {
        let signature = Tag::from_be_bytes(data.get(0..4)?.try_into().ok()?);
        Some(match signature.as_ref() {
            b"wOFF" => Self::Woff,
            b"wOF2" => Self::Woff2,
            b"ttcf" => Self::Ttc,
            b"\x00\x01\x00\x00" | b"OTTO" | b"true" | b"typ1" => Self::Ttf,
            _ => return None,
        })
    }
}

/// Read a font from any supported container.
///
/// `font_index` selects a font within a TrueType collection and is ignored
/// for other formats.
#[cfg(all(feature = "brotli", feature = "z"))]
pub fn read_font(data: impl Into<Bytes>, font_index: u32) -> Result<Font, FontError> {
    let data: Bytes = data.into();
    match FontFormat::sniff(&data) {
        Some(FontFormat::Ttf) => read_ttf(&data, 0),
        Some(FontFormat::Ttc) => read_ttc(&data, font_index),
        Some(FontFormat::Woff) => read_woff(&data),
        Some(FontFormat::Woff2) => read_woff2(&data),
        None => Err(FontError::Unsupported("unknown font format")),
    }
}

/// Compute the OpenType checksum of `buf`
///
/// <https://learn.microsoft.com/en-us/typography/opentype/spec/otff#calculating-checksums>
pub fn compute_checksum(buf: &[u8]) -> u32 {
    let mut checksum: u32 = 0;
    let mut iter = buf.chunks_exact(4);
    for chunk in &mut iter {
        checksum = checksum.wrapping_add(u32::from_be_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3],
        ]));
    }

    // Treat size not aligned on 4 as if it were padded to 4 with 0's.
    let remainder = iter.remainder();
    let mut last = [0u8; 4];
    last[..remainder.len()].copy_from_slice(remainder);
    checksum.wrapping_add(u32::from_be_bytes(last))
}

// Round a value up to the nearest multiple of 4. Don't round the value in the
// case that rounding up overflows.
//
// Implemented as a macro to make it generic over the type without horrible type bounds
macro_rules! Round4 {
    ($value:expr) => {
        match $value.checked_add(3) {
            Some(value_plus_3) => value_plus_3 & !3,
            None => $value,
        }
    };
}
pub(crate) use Round4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_pads_trailing_bytes() {
        assert_eq!(compute_checksum(&[]), 0);
        assert_eq!(compute_checksum(&[0, 0, 0, 1, 0, 0, 0, 2]), 3);
        assert_eq!(compute_checksum(&[0, 0, 0, 1, 0xff]), 0xff00_0001);
        assert_eq!(compute_checksum(&[0xff, 0xff, 0xff, 0xff, 0, 0, 0, 2]), 1);
    }

    #[test]
    fn sniff_signatures() {
        assert_eq!(FontFormat::sniff(b"wOF2...."), Some(FontFormat::Woff2));
        assert_eq!(FontFormat::sniff(b"wOFF"), Some(FontFormat::Woff));
        assert_eq!(FontFormat::sniff(b"ttcf"), Some(FontFormat::Ttc));
        assert_eq!(FontFormat::sniff(&[0, 1, 0, 0, 0]), Some(FontFormat::Ttf));
        assert_eq!(FontFormat::sniff(b"OTTO"), Some(FontFormat::Ttf));
        assert_eq!(FontFormat::sniff(b"PK\x03\x04"), None);
        assert_eq!(FontFormat::sniff(b"wO"), None);
    }
}
