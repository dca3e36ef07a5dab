//! Building blocks for TrueType glyph outlines shared by the WOFF2
//! reconstructor and the glyf optimizer.
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/glyf>

pub mod coords;
pub mod flags;

use bytes::BufMut;

use crate::buffer::Reader;
use crate::error::FontError;

// simple glyph flags
pub const GLYF_ON_CURVE: u8 = 1 << 0;
pub const GLYF_X_SHORT: u8 = 1 << 1;
pub const GLYF_Y_SHORT: u8 = 1 << 2;
pub const GLYF_REPEAT: u8 = 1 << 3;
pub const GLYF_THIS_X_IS_SAME: u8 = 1 << 4;
pub const GLYF_THIS_Y_IS_SAME: u8 = 1 << 5;
pub const OVERLAP_SIMPLE: u8 = 1 << 6;
pub const GLYF_RESERVED: u8 = 1 << 7;

/// Size of the glyph header: numberOfContours and the bounding box
pub const GLYPH_HEADER_SIZE: usize = 10;

/// numberOfContours value marking a composite glyph
pub const COMPOSITE_CONTOURS: u16 = 0xffff;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub on_curve: bool,
}

/// Flags of one component of a composite glyph
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ComponentFlags {
    pub args_are_words: bool,
    pub scale: bool,
    pub more_components: bool,
    pub x_and_y_scale: bool,
    pub two_by_two: bool,
    pub instructions: bool,
}

impl ComponentFlags {
    const ARG_1_AND_2_ARE_WORDS: u16 = 1 << 0;
    const WE_HAVE_A_SCALE: u16 = 1 << 3;
    const MORE_COMPONENTS: u16 = 1 << 5;
    const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 1 << 6;
    const WE_HAVE_A_TWO_BY_TWO: u16 = 1 << 7;
    const WE_HAVE_INSTRUCTIONS: u16 = 1 << 8;

    pub fn from_bits(flags: u16) -> Self {
        Self {
            args_are_words: flags & Self::ARG_1_AND_2_ARE_WORDS != 0,
            scale: flags & Self::WE_HAVE_A_SCALE != 0,
            more_components: flags & Self::MORE_COMPONENTS != 0,
            x_and_y_scale: flags & Self::WE_HAVE_AN_X_AND_Y_SCALE != 0,
            two_by_two: flags & Self::WE_HAVE_A_TWO_BY_TWO != 0,
            instructions: flags & Self::WE_HAVE_INSTRUCTIONS != 0,
        }
    }

    /// Size of the glyph index, arguments and transform following the flags
    pub fn record_size(&self) -> usize {
        let mut size: usize = 2; // glyph index
        size += if self.args_are_words { 4 } else { 2 };
        if self.scale {
            size += 2;
        } else if self.x_and_y_scale {
            size += 4;
        } else if self.two_by_two {
            size += 8;
        }
        size
    }
}

/// Walk the component records of a composite glyph starting at the reader's
/// position, up to and including the one without MORE_COMPONENTS.
///
/// Returns the walked bytes and whether any component has instructions.
pub fn walk_components<'a>(input: &mut Reader<'a>) -> Result<(&'a [u8], bool), FontError> {
    let start = input.offset();
    let mut have_instructions = false;
    loop {
        let flags = ComponentFlags::from_bits(input.read_u16()?);
        have_instructions |= flags.instructions;
        input.skip(flags.record_size())?;
        if !flags.more_components {
            break;
        }
    }
    Ok((input.consumed_since(start), have_instructions))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    pub fn of_points(points: &[Point]) -> Self {
        let Some(first) = points.first() else {
            return Self {
                x_min: 0,
                y_min: 0,
                x_max: 0,
                y_max: 0,
            };
        };
        let mut bbox = Self {
            x_min: first.x,
            y_min: first.y,
            x_max: first.x,
            y_max: first.y,
        };
        for &Point { x, y, .. } in points.iter().skip(1) {
            bbox.x_min = x.min(bbox.x_min);
            bbox.x_max = x.max(bbox.x_max);
            bbox.y_min = y.min(bbox.y_min);
            bbox.y_max = y.max(bbox.y_max);
        }
        bbox
    }

    pub fn write(&self, dst: &mut impl BufMut) {
        dst.put_i16(self.x_min as i16);
        dst.put_i16(self.y_min as i16);
        dst.put_i16(self.x_max as i16);
        dst.put_i16(self.y_max as i16);
    }
}
