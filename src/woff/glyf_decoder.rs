use arrayvec::ArrayVec;
use bytes::{Buf, BufMut};

use crate::{
    buffer::Reader,
    error::{FontError, bail, bail_if, bail_with_msg_if},
    font::LocaFormat,
    outline::{
        BoundingBox, COMPOSITE_CONTOURS, GLYF_ON_CURVE, OVERLAP_SIMPLE, Point,
        coords::{decode_triplet, encode_delta},
        flags::FlagRunEncoder,
        walk_components,
    },
    variable_length::BufVariableExt as _,
};

const NUM_SUB_STREAMS: usize = 7;
const HEADER_SIZE: usize = (2 + NUM_SUB_STREAMS) * 4;
const FLAG_OVERLAP_SIMPLE_BITMAP: u16 = 1 << 0;
// 98% of Google Fonts have no glyph above 5k bytes. Largest glyph ever observed was 72k bytes
const DEFAULT_GLYPH_BUF_SIZE: usize = 5120;

/// Offsets in a short loca table are stored halved in a u16
const SHORT_LOCA_LIMIT: usize = 1 << 17;

pub struct ReconstructedGlyf {
    /// The number of glyphs in the glyf table
    pub num_glyphs: u16,
    pub loca_format: LocaFormat,
    /// The x_min of the bounding box of each glyph (0 for empty glyphs). Used to reconstruct hmtx table
    pub x_mins: Vec<i16>,
    /// Encoded Open Type "glyf" table
    pub glyf: Vec<u8>,
    /// Encoded Open Type "loca" table
    pub loca: Vec<u8>,
}

/// Decode a WOFF2 transformed glyf table, producing the standard glyf and loca tables
///
/// <https://www.w3.org/TR/WOFF2/#glyf_table_format>
pub fn reconstruct_glyf(data: &[u8]) -> Result<ReconstructedGlyf, FontError> {
    GlyfDecoder::new(data)?.reconstruct()
}

pub struct GlyfDecoder<'a> {
    // State
    n_contour_stream: Reader<'a>,
    n_points_stream: Reader<'a>,
    flag_stream: Reader<'a>,
    glyph_stream: Reader<'a>,
    composite_stream: Reader<'a>,
    bbox_bitmap: &'a [u8],
    bbox_stream: Reader<'a>,
    instruction_stream: Reader<'a>,
    overlap_bitmap: Option<&'a [u8]>,
    glyph_buf: Vec<u8>,
    // Coordinate bytes are buffered separately because they follow the flags in the output
    x_buf: Vec<u8>,
    y_buf: Vec<u8>,

    // Output data
    num_glyphs: u16,
    loca_format: LocaFormat,
}

impl<'a> GlyfDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Result<GlyfDecoder<'a>, FontError> {
        let mut input = data;
        let _: u16 = input.try_get_u16()?; // first 2 bytes are reserved
        let flags: u16 = input.try_get_u16()?;
        let has_overlap_bitmap: bool = (flags & FLAG_OVERLAP_SIMPLE_BITMAP) != 0;
        let num_glyphs = input.try_get_u16()?;
        let index_format = input.try_get_u16()?;
        let loca_format = LocaFormat::from_index_format(index_format)?;

        let mut offset: usize = HEADER_SIZE;
        if offset > data.len() {
            bail!(FontError::Truncated);
        }

        // Invariant from here on: data.len() >= offset
        let mut substreams: ArrayVec<&[u8], NUM_SUB_STREAMS> = ArrayVec::new();
        for _ in 0..NUM_SUB_STREAMS {
            let substream_size: usize = input.try_get_u32()? as usize;
            bail_if!(substream_size > data.len() - offset);
            substreams.push(&data[offset..(offset + substream_size)]);
            offset += substream_size;
        }

        // Safe because num_glyphs is bounded
        let bitmap_length: usize = ((num_glyphs as usize + 31) >> 5) << 2;
        bail_if!(bitmap_length > substreams[5].len());
        let (bbox_bitmap, bbox_stream) = substreams[5].split_at(bitmap_length);

        let mut overlap_bitmap: Option<&[u8]> = None;
        if has_overlap_bitmap {
            let overlap_bitmap_length = (num_glyphs as usize + 7) >> 3;
            bail_if!(overlap_bitmap_length > data.len() - offset);
            overlap_bitmap = Some(&data[offset..(offset + overlap_bitmap_length)]);
        }

        Ok(GlyfDecoder {
            n_contour_stream: Reader::new(substreams[0]),
            n_points_stream: Reader::new(substreams[1]),
            flag_stream: Reader::new(substreams[2]),
            glyph_stream: Reader::new(substreams[3]),
            composite_stream: Reader::new(substreams[4]),
            bbox_bitmap,
            bbox_stream: Reader::new(bbox_stream),
            instruction_stream: Reader::new(substreams[6]),
            overlap_bitmap,
            glyph_buf: Vec::with_capacity(DEFAULT_GLYPH_BUF_SIZE),
            x_buf: Vec::new(),
            y_buf: Vec::new(),
            num_glyphs,
            loca_format,
        })
    }

    pub fn reconstruct(mut self) -> Result<ReconstructedGlyf, FontError> {
        let num_glyphs = self.num_glyphs as usize;
        let mut glyf: Vec<u8> = Vec::with_capacity(num_glyphs * 12);
        let mut loca_values: Vec<u32> = Vec::with_capacity(num_glyphs + 1);
        let mut x_mins: Vec<i16> = Vec::with_capacity(num_glyphs);

        // Iterate over each glyph
        for i in 0..num_glyphs {
            loca_values.push(self.loca_value(glyf.len())?);

            let n_contours: u16 = self.n_contour_stream.read_u16()?;
            let glyph_has_bbox = bit_is_set(self.bbox_bitmap, i);

            self.glyph_buf.clear();
            if n_contours == COMPOSITE_CONTOURS {
                bail_with_msg_if!(!glyph_has_bbox, "Composite glyph {} has no bbox", i);
                self.parse_composite_glyph()?;
            } else if n_contours > 0 {
                let has_overlap_bit = self
                    .overlap_bitmap
                    .is_some_and(|bitmap| bit_is_set(bitmap, i));
                self.parse_simple_glyph(n_contours, glyph_has_bbox, has_overlap_bit)?;
            } else {
                // n_contours == 0; empty glyph. Must NOT have a bbox.
                bail_with_msg_if!(glyph_has_bbox, "Empty glyph {} has a bbox", i);
            }

            // The x_min is an i16 stored as bytes 2-4 in the glyph header
            x_mins.push(match self.glyph_buf.get(2..4) {
                Some(&[hi, lo]) => i16::from_be_bytes([hi, lo]),
                _ => 0,
            });

            glyf.extend_from_slice(&self.glyph_buf);
            if self.loca_format == LocaFormat::Short && glyf.len() % 2 != 0 {
                glyf.push(0);
            }
        }

        // loca[n] will be equal the length of the glyph data ('glyf') table
        loca_values.push(self.loca_value(glyf.len())?);

        let loca = generate_loca_table(&loca_values, self.loca_format);

        Ok(ReconstructedGlyf {
            num_glyphs: self.num_glyphs,
            loca_format: self.loca_format,
            x_mins,
            glyf,
            loca,
        })
    }

    fn loca_value(&self, offset: usize) -> Result<u32, FontError> {
        match self.loca_format {
            LocaFormat::Short => {
                bail_with_msg_if!(
                    offset >= SHORT_LOCA_LIMIT,
                    "glyf offset {} too large for short loca",
                    offset
                );
            }
            LocaFormat::Long => bail_if!(offset > u32::MAX as usize),
        }
        Ok(offset as u32)
    }

    /// Parse glyph data into `self.glyph_buf`
    fn parse_composite_glyph(&mut self) -> Result<(), FontError> {
        let (components, have_instructions) = walk_components(&mut self.composite_stream)?;

        let instruction_size: u16 = if have_instructions {
            self.glyph_stream.try_get_variable_255_u16()?
        } else {
            0
        };

        self.glyph_buf.put_u16(COMPOSITE_CONTOURS);
        self.glyph_buf.put_slice(self.bbox_stream.read_bytes(8)?);
        self.glyph_buf.put_slice(components);

        if have_instructions {
            let instructions = self.instruction_stream.read_bytes(instruction_size as usize)?;
            self.glyph_buf.put_u16(instruction_size);
            self.glyph_buf.put_slice(instructions);
        }

        Ok(())
    }

    fn parse_simple_glyph(
        &mut self,
        n_contours: u16,
        glyph_has_bbox: bool,
        has_overlap_bit: bool,
    ) -> Result<(), FontError> {
        let n_contours = n_contours as usize;

        let mut end_points: Vec<u16> = Vec::with_capacity(n_contours);
        let mut total_n_points: usize = 0;
        for _ in 0..n_contours {
            let n_points_contour = self.n_points_stream.try_get_variable_255_u16()? as usize;
            total_n_points += n_points_contour;
            bail_with_msg_if!(
                total_n_points > 65536,
                "Simple glyph has more than 65536 points"
            );
            // Leading contours without points end at 0xffff
            end_points.push((total_n_points as u16).wrapping_sub(1));
        }
        bail_with_msg_if!(total_n_points == 0, "Simple glyph has no points");

        let flags = self.flag_stream.read_bytes(total_n_points)?;
        let points = decode_points(flags, &mut self.glyph_stream)?;

        let instruction_size: u16 = self.glyph_stream.try_get_variable_255_u16()?;

        // Reserve needed size to reduce allocations
        let size_needed: usize =
            12 + 2 * n_contours + 5 * total_n_points + (instruction_size as usize);
        self.glyph_buf.reserve(size_needed);

        self.glyph_buf.put_u16(n_contours as u16);
        if glyph_has_bbox {
            self.glyph_buf.put_slice(self.bbox_stream.read_bytes(8)?);
        } else {
            BoundingBox::of_points(&points).write(&mut self.glyph_buf);
        }

        for end_point in end_points {
            self.glyph_buf.put_u16(end_point);
        }

        let instructions = self.instruction_stream.read_bytes(instruction_size as usize)?;
        self.glyph_buf.put_u16(instruction_size);
        self.glyph_buf.put_slice(instructions);

        self.x_buf.clear();
        self.y_buf.clear();
        let mut encoder = FlagRunEncoder::new(&mut self.glyph_buf);
        let mut last = Point {
            x: 0,
            y: 0,
            on_curve: true,
        };
        for (i, point) in points.iter().enumerate() {
            let mut flag = encode_delta(point.x - last.x, &mut self.x_buf);
            flag |= encode_delta(point.y - last.y, &mut self.y_buf) << 1;
            if point.on_curve {
                flag |= GLYF_ON_CURVE;
            }
            if has_overlap_bit && i == 0 {
                flag |= OVERLAP_SIMPLE;
            }
            encoder.push(flag);
            last = *point;
        }
        encoder.finish();

        self.glyph_buf.put_slice(&self.x_buf);
        self.glyph_buf.put_slice(&self.y_buf);

        Ok(())
    }
}

/// Whether bit `index` of a big-endian bitmap is set
fn bit_is_set(bitmap: &[u8], index: usize) -> bool {
    bitmap
        .get(index >> 3)
        .is_some_and(|byte| byte & (0x80 >> (index & 7)) != 0)
}

/// Decode one point per triplet flag, accumulating absolute positions from (0, 0)
fn decode_points(flags: &[u8], glyph_stream: &mut Reader<'_>) -> Result<Vec<Point>, FontError> {
    let mut points = Vec::with_capacity(flags.len());
    let mut x: i32 = 0;
    let mut y: i32 = 0;
    for &flag in flags {
        let (dx, dy) = decode_triplet(flag, glyph_stream)?;
        x = x.checked_add(dx).ok_or(FontError::MalformedFont)?;
        y = y.checked_add(dy).ok_or(FontError::MalformedFont)?;
        points.push(Point {
            x,
            y,
            on_curve: (flag >> 7) == 0,
        });
    }
    Ok(points)
}

/// Generate a loca table given a slice of loca offsets and an index format
///
/// See <https://developer.apple.com/fonts/TrueType-Reference-Manual/RM06/Chap6loca.html>
pub(crate) fn generate_loca_table(loca_values: &[u32], loca_format: LocaFormat) -> Vec<u8> {
    let mut loca_content: Vec<u8> =
        Vec::with_capacity(loca_values.len() * loca_format.entry_size());
    match loca_format {
        LocaFormat::Long => {
            for &value in loca_values {
                // loca long version. The actual local offset is stored.
                loca_content.put_u32(value);
            }
        }
        LocaFormat::Short => {
            for &value in loca_values {
                // loca short version. The actual local offset divided by 2 is stored.
                loca_content.put_u16((value >> 1) as u16);
            }
        }
    }
    loca_content
}

/// Check the loca length declared in the WOFF2 table directory against the reconstructed table
///
/// <https://www.w3.org/TR/WOFF2/#conform-mustRejectLoca>
pub(crate) fn check_declared_loca_length(
    declared: u32,
    glyf: &ReconstructedGlyf,
) -> Result<(), FontError> {
    let num_glyphs = glyf.num_glyphs;
    let expected = (num_glyphs as usize + 1) * glyf.loca_format.entry_size();
    bail_with_msg_if!(
        declared as usize != expected,
        "loca length {} does not match {} glyphs",
        declared,
        num_glyphs
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable_length::BufMutVariableExt as _;

    #[derive(Default)]
    struct Streams {
        n_contour: Vec<u8>,
        n_points: Vec<u8>,
        flag: Vec<u8>,
        glyph: Vec<u8>,
        composite: Vec<u8>,
        bbox: Vec<u8>,
        instruction: Vec<u8>,
        overlap: Option<Vec<u8>>,
    }

    impl Streams {
        /// `bbox` must start with the bbox bitmap
        fn build(&self, num_glyphs: u16, index_format: u16) -> Vec<u8> {
            let mut out: Vec<u8> = Vec::new();
            out.put_u16(0);
            out.put_u16(if self.overlap.is_some() { 1 } else { 0 });
            out.put_u16(num_glyphs);
            out.put_u16(index_format);
            let streams = [
                &self.n_contour,
                &self.n_points,
                &self.flag,
                &self.glyph,
                &self.composite,
                &self.bbox,
                &self.instruction,
            ];
            for stream in streams {
                out.put_u32(stream.len() as u32);
            }
            for stream in streams {
                out.put_slice(stream);
            }
            if let Some(overlap) = &self.overlap {
                out.put_slice(overlap);
            }
            out
        }
    }

    /// One contour: on (10, 20), on (40, 0), off (30, -10)
    fn triangle() -> Streams {
        Streams {
            n_contour: vec![0, 1],
            n_points: vec![3],
            flag: vec![87, 85, 0x80 | 84],
            glyph: vec![9, 19, 29, 19, 9, 9, 2],
            bbox: vec![0; 4],
            instruction: vec![0xaa, 0xbb],
            ..Default::default()
        }
    }

    const TRIANGLE_GLYPH: [u8; 25] = [
        0x00, 0x01, // contours
        0x00, 0x0a, 0xff, 0xf6, 0x00, 0x28, 0x00, 0x14, // bbox
        0x00, 0x02, // end point
        0x00, 0x02, 0xaa, 0xbb, // instructions
        0x37, 0x17, 0x06, // flags
        0x0a, 0x1e, 0x0a, // x
        0x14, 0x14, 0x0a, // y
    ];

    #[test]
    fn empty_glyph() {
        let streams = Streams {
            n_contour: vec![0, 0],
            bbox: vec![0; 4],
            ..Default::default()
        };
        let out = reconstruct_glyf(&streams.build(1, 0)).unwrap();
        assert_eq!(out.num_glyphs, 1);
        assert!(out.glyf.is_empty());
        assert_eq!(out.loca, [0, 0, 0, 0]);
        assert_eq!(out.x_mins, [0]);
    }

    #[test]
    fn simple_glyph_short_loca() {
        let out = reconstruct_glyf(&triangle().build(1, 0)).unwrap();
        let mut expected = TRIANGLE_GLYPH.to_vec();
        expected.push(0);
        assert_eq!(out.glyf, expected);
        assert_eq!(out.loca, [0, 0, 0, 13]);
        assert_eq!(out.loca_format, LocaFormat::Short);
        assert_eq!(out.x_mins, [10]);
    }

    #[test]
    fn simple_glyph_long_loca_is_unpadded() {
        let out = reconstruct_glyf(&triangle().build(1, 1)).unwrap();
        assert_eq!(out.glyf, TRIANGLE_GLYPH);
        assert_eq!(out.loca, [0, 0, 0, 0, 0, 0, 0, 25]);
    }

    #[test]
    fn explicit_bbox_is_copied() {
        let mut streams = triangle();
        streams.bbox = vec![0x80, 0, 0, 0, 0xff, 0xf0, 0, 1, 0, 2, 0, 3];
        let out = reconstruct_glyf(&streams.build(1, 1)).unwrap();
        assert_eq!(&out.glyf[2..10], &[0xff, 0xf0, 0, 1, 0, 2, 0, 3]);
        assert_eq!(out.x_mins, [-16]);
    }

    #[test]
    fn overlap_bit_marks_first_point() {
        let mut streams = triangle();
        streams.overlap = Some(vec![0x80]);
        let out = reconstruct_glyf(&streams.build(1, 1)).unwrap();
        assert_eq!(&out.glyf[16..19], &[0x77, 0x17, 0x06]);
    }

    #[test]
    fn positions_carry_across_contours() {
        // two contours of one point each, both moving by (+1, +1)
        let streams = Streams {
            n_contour: vec![0, 2],
            n_points: vec![1, 1],
            flag: vec![23, 23],
            glyph: vec![0x00, 0x00, 0],
            bbox: vec![0; 4],
            ..Default::default()
        };
        let out = reconstruct_glyf(&streams.build(1, 1)).unwrap();
        assert_eq!(
            out.glyf,
            [
                0, 2, 0, 1, 0, 1, 0, 2, 0, 2, // header, bbox (1,1)-(2,2)
                0, 0, 0, 1, // end points
                0, 0, // no instructions
                0x37, 0x37, 1, 1, 1, 1,
            ]
        );
    }

    #[test]
    fn composite_glyph() {
        let mut bbox = vec![0x80, 0, 0, 0];
        bbox.extend_from_slice(&[0, 1, 0, 2, 0, 3, 0, 4]);
        let streams = Streams {
            n_contour: vec![0xff, 0xff],
            composite: vec![0x01, 0x00, 0x00, 0x01, 5, 6],
            glyph: vec![1],
            bbox,
            instruction: vec![0x42],
            ..Default::default()
        };
        let out = reconstruct_glyf(&streams.build(1, 1)).unwrap();
        assert_eq!(
            out.glyf,
            [
                0xff, 0xff, 0, 1, 0, 2, 0, 3, 0, 4, // header
                0x01, 0x00, 0x00, 0x01, 5, 6, // component
                0, 1, 0x42, // instructions
            ]
        );
        assert_eq!(out.loca, [0, 0, 0, 0, 0, 0, 0, 19]);
        assert_eq!(out.x_mins, [1]);
    }

    #[test]
    fn composite_requires_bbox() {
        let streams = Streams {
            n_contour: vec![0xff, 0xff],
            composite: vec![0x00, 0x00, 0x00, 0x01, 5, 6],
            bbox: vec![0; 12],
            ..Default::default()
        };
        assert_eq!(
            reconstruct_glyf(&streams.build(1, 0)).err(),
            Some(FontError::MalformedFont)
        );
    }

    #[test]
    fn empty_glyph_with_bbox_is_rejected() {
        let streams = Streams {
            n_contour: vec![0, 0],
            bbox: vec![0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            ..Default::default()
        };
        assert_eq!(
            reconstruct_glyf(&streams.build(1, 0)).err(),
            Some(FontError::MalformedFont)
        );
    }

    #[test]
    fn leading_contour_without_points() {
        let mut streams = triangle();
        streams.n_contour = vec![0, 2];
        streams.n_points = vec![0, 3];
        let out = reconstruct_glyf(&streams.build(1, 1)).unwrap();
        assert_eq!(out.glyf[..2], [0, 2]);
        assert_eq!(out.glyf[10..14], [0xff, 0xff, 0, 2]);
        assert_eq!(out.glyf[14..], TRIANGLE_GLYPH[12..]);
    }

    #[test]
    fn contour_counts_above_i16_max_are_simple() {
        // 0x8000 single point contours, each point moving by (0, 0)
        let n_contours = 0x8000;
        let streams = Streams {
            n_contour: vec![0x80, 0x00],
            n_points: vec![1; n_contours],
            flag: vec![0; n_contours],
            glyph: vec![0; n_contours + 1],
            bbox: vec![0; 4],
            ..Default::default()
        };
        let out = reconstruct_glyf(&streams.build(1, 1)).unwrap();
        assert_eq!(out.glyf[..2], [0x80, 0x00]);
        let last_end_point = 10 + 2 * (n_contours - 1);
        assert_eq!(out.glyf[last_end_point..last_end_point + 2], [0x7f, 0xff]);
    }

    #[test]
    fn contours_without_points_are_rejected() {
        let mut streams = triangle();
        streams.n_points = vec![0];
        assert_eq!(
            reconstruct_glyf(&streams.build(1, 0)).err(),
            Some(FontError::MalformedFont)
        );
    }

    #[test]
    fn bad_header() {
        assert_eq!(
            reconstruct_glyf(&triangle().build(1, 2)).err(),
            Some(FontError::MalformedFont)
        );
        let mut data = triangle().build(1, 0);
        // grow the instruction stream past the end of the table
        data[35] += 1;
        assert_eq!(reconstruct_glyf(&data).err(), Some(FontError::MalformedFont));
        assert_eq!(reconstruct_glyf(&data[..20]).err(), Some(FontError::Truncated));
    }

    #[test]
    fn stream_underrun_is_truncated() {
        let mut streams = triangle();
        streams.glyph.truncate(5);
        assert_eq!(
            reconstruct_glyf(&streams.build(1, 0)).err(),
            Some(FontError::Truncated)
        );
    }

    #[test]
    fn short_loca_offset_limit() {
        // Two one-point glyphs carrying 65535 bytes of instructions each
        let mut glyph: Vec<u8> = Vec::new();
        for _ in 0..2 {
            glyph.push(0);
            glyph.put_variable_255_u16(65535);
        }
        let streams = Streams {
            n_contour: vec![0, 1, 0, 1],
            n_points: vec![1, 1],
            flag: vec![1, 1],
            glyph,
            bbox: vec![0; 4],
            instruction: vec![0; 2 * 65535],
            ..Default::default()
        };
        assert_eq!(
            reconstruct_glyf(&streams.build(2, 0)).err(),
            Some(FontError::MalformedFont)
        );
        let long = reconstruct_glyf(&streams.build(2, 1)).unwrap();
        assert_eq!(long.glyf.len(), 2 * 65550);
    }

    #[test]
    fn declared_loca_length() {
        let out = reconstruct_glyf(&triangle().build(1, 0)).unwrap();
        assert!(check_declared_loca_length(4, &out).is_ok());
        assert!(check_declared_loca_length(8, &out).is_err());
    }
}
