//! Re-encode simple glyph outlines in their most compact TrueType form and
//! repack `glyf`/`loca`, choosing the narrowest loca format that fits.

use std::borrow::Cow;

use bytes::BufMut;

use crate::{
    buffer::Reader,
    error::{FontError, bail_if, bail_with_msg_if},
    font::LocaFormat,
    outline::{
        COMPOSITE_CONTOURS, GLYF_ON_CURVE, GLYF_RESERVED, GLYF_THIS_X_IS_SAME,
        GLYF_THIS_Y_IS_SAME, GLYF_X_SHORT, GLYF_Y_SHORT, GLYPH_HEADER_SIZE, OVERLAP_SIMPLE,
        coords::{decode_ttf_coord, encode_delta},
        flags::{FlagRunEncoder, decode_flags},
        walk_components,
    },
    woff::glyf_decoder::generate_loca_table,
};

const HEAD_MIN_SIZE: usize = 54;
const INDEX_TO_LOC_FORMAT_OFFSET: usize = 50;
/// Smallest non-empty glyph: header plus one u16
const MIN_GLYPH_SIZE: usize = 12;
const SHORT_LOCA_LIMIT: usize = 1 << 17;

// Flag bits carried through re-encoding of one axis
const KEEP_FOR_X: u8 =
    GLYF_ON_CURVE | GLYF_Y_SHORT | GLYF_THIS_Y_IS_SAME | OVERLAP_SIMPLE | GLYF_RESERVED;
const KEEP_FOR_Y: u8 =
    GLYF_ON_CURVE | GLYF_X_SHORT | GLYF_THIS_X_IS_SAME | OVERLAP_SIMPLE | GLYF_RESERVED;

/// Rebuilt `glyf` and `loca`, plus `head` when the loca format changed
pub struct GlyfRewrite {
    pub glyf: Vec<u8>,
    pub loca: Vec<u8>,
    pub loca_format: LocaFormat,
    pub head: Option<Vec<u8>>,
}

/// Shrink the glyph data of a TrueType font.
///
/// Returns `None` when neither the glyph data nor the loca format can be improved.
pub fn optimize_glyf(
    head: &[u8],
    glyf: &[u8],
    loca: &[u8],
) -> Result<Option<GlyfRewrite>, FontError> {
    bail_with_msg_if!(head.len() < HEAD_MIN_SIZE, "head table too short");
    let mut header = Reader::new(head);
    bail_with_msg_if!(header.read_u32()? != 0x0001_0000, "Unknown head version");
    header.skip(INDEX_TO_LOC_FORMAT_OFFSET - 4)?;
    let loca_format = LocaFormat::from_index_format(header.read_u16()?)?;
    bail_with_msg_if!(header.read_u16()? != 0, "Unknown glyphDataFormat");

    let entry_size = loca_format.entry_size();
    bail_with_msg_if!(loca.len() < 2 * entry_size, "loca table holds no glyphs");
    let num_glyphs = loca.len() / entry_size - 1;
    let loca_value = |i: usize| -> usize {
        let entry = &loca[i * entry_size..];
        match loca_format {
            LocaFormat::Short => (u16::from_be_bytes([entry[0], entry[1]]) as usize) << 1,
            LocaFormat::Long => u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]) as usize,
        }
    };

    let mut glyphs: Vec<Cow<'_, [u8]>> = Vec::with_capacity(num_glyphs);
    let mut short_total: usize = 0;
    let mut long_total: usize = 0;
    for i in 0..num_glyphs {
        let (start, end) = (loca_value(i), loca_value(i + 1));
        bail_with_msg_if!(end < start || end > glyf.len(), "Bad loca entry for glyph {}", i);
        let glyph = compact_glyph(&glyf[start..end])?;
        long_total += glyph.len();
        short_total += (glyph.len() + 1) & !1;
        glyphs.push(glyph);
    }

    let new_format = if short_total >= SHORT_LOCA_LIMIT {
        LocaFormat::Long
    } else {
        LocaFormat::Short
    };
    let new_size = match new_format {
        LocaFormat::Short => short_total,
        LocaFormat::Long => long_total,
    };
    if new_size >= glyf.len() && new_format >= loca_format {
        return Ok(None);
    }

    let mut new_glyf: Vec<u8> = Vec::with_capacity(new_size);
    let mut loca_values: Vec<u32> = Vec::with_capacity(num_glyphs + 1);
    for glyph in &glyphs {
        loca_values.push(new_glyf.len() as u32);
        new_glyf.put_slice(glyph);
        if new_format == LocaFormat::Short && glyph.len() % 2 != 0 {
            new_glyf.put_u8(0);
        }
    }
    loca_values.push(new_glyf.len() as u32);
    bail_if!(new_glyf.len() != new_size);

    let new_head = (new_format != loca_format).then(|| {
        let mut head = head.to_vec();
        (&mut head[INDEX_TO_LOC_FORMAT_OFFSET..INDEX_TO_LOC_FORMAT_OFFSET + 2])
            .put_u16(new_format.index_format());
        head
    });

    Ok(Some(GlyfRewrite {
        loca: generate_loca_table(&loca_values, new_format),
        glyf: new_glyf,
        loca_format: new_format,
        head: new_head,
    }))
}

/// The shortest encoding of one glyph: trailing padding is dropped and simple
/// glyph outlines are re-encoded when that is smaller.
fn compact_glyph(glyph: &[u8]) -> Result<Cow<'_, [u8]>, FontError> {
    if glyph.is_empty() {
        return Ok(Cow::Borrowed(glyph));
    }
    bail_with_msg_if!(glyph.len() < MIN_GLYPH_SIZE, "Glyph too short");

    let mut input = Reader::new(glyph);
    let n_contours = input.read_u16()?;
    input.skip(GLYPH_HEADER_SIZE - 2)?;
    match n_contours {
        // A glyph without contours carries no data
        0 => Ok(Cow::Borrowed(&glyph[..0])),
        COMPOSITE_CONTOURS => {
            let (_, have_instructions) = walk_components(&mut input)?;
            if have_instructions {
                let n_instructions = input.read_u16()? as usize;
                input.skip(n_instructions)?;
            }
            Ok(Cow::Borrowed(input.consumed_since(0)))
        }
        _ => reencode_simple_glyph(glyph, input, n_contours as usize),
    }
}

/// `input` is positioned after the glyph header
fn reencode_simple_glyph<'a>(
    glyph: &'a [u8],
    mut input: Reader<'a>,
    n_contours: usize,
) -> Result<Cow<'a, [u8]>, FontError> {
    let end_points = input.read_bytes(2 * n_contours)?;
    let last_end_point = &end_points[end_points.len() - 2..];
    let n_points = u16::from_be_bytes([last_end_point[0], last_end_point[1]]) as usize + 1;
    let n_instructions = input.read_u16()? as usize;
    input.skip(n_instructions)?;
    let header = input.consumed_since(0);

    let mut flags = decode_flags(&mut input, n_points)?;
    let mut coords: Vec<u8> = Vec::with_capacity(2 * n_points);
    for flag in flags.iter_mut() {
        let dx = decode_ttf_coord(*flag, &mut input)?;
        *flag = (*flag & KEEP_FOR_X) | encode_delta(dx, &mut coords);
    }
    for flag in flags.iter_mut() {
        let dy = decode_ttf_coord(*flag >> 1, &mut input)?;
        *flag = (*flag & KEEP_FOR_Y) | (encode_delta(dy, &mut coords) << 1);
    }
    let used = input.consumed_since(0);

    let mut out: Vec<u8> = Vec::with_capacity(header.len() + n_points + coords.len());
    out.put_slice(header);
    let mut encoder = FlagRunEncoder::new(&mut out);
    for &flag in &flags {
        encoder.push(flag);
    }
    encoder.finish();
    out.put_slice(&coords);

    if out.len() < used.len() {
        Ok(Cow::Owned(out))
    } else {
        Ok(Cow::Borrowed(&glyph[..used.len()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(index_format: u16) -> Vec<u8> {
        let mut head = vec![0u8; 54];
        head[..4].copy_from_slice(&[0, 1, 0, 0]);
        head[50..52].copy_from_slice(&index_format.to_be_bytes());
        head
    }

    /// A one-contour simple glyph with every flag and coordinate stored
    /// literally, x deltas as words and y deltas as given
    fn wasteful_glyph(deltas: &[(i16, i16)]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        out.put_u16(1);
        out.put_slice(&[0; 8]);
        out.put_u16(deltas.len() as u16 - 1);
        out.put_u16(0);
        for _ in deltas {
            // on curve, x and y words
            out.put_u8(GLYF_ON_CURVE);
        }
        for &(dx, _) in deltas {
            out.put_i16(dx);
        }
        for &(_, dy) in deltas {
            out.put_i16(dy);
        }
        out
    }

    fn loca_short(offsets: &[u32]) -> Vec<u8> {
        generate_loca_table(offsets, LocaFormat::Short)
    }

    #[test]
    fn reencodes_wasteful_glyph() {
        let glyph = wasteful_glyph(&[(10, 10), (10, 10), (10, 10), (-20, 0)]);
        assert_eq!(glyph.len(), 14 + 4 + 16);
        let loca = loca_short(&[0, glyph.len() as u32]);
        let rewrite = optimize_glyf(&head(0), &glyph, &loca).unwrap().unwrap();
        assert_eq!(
            rewrite.glyf,
            [
                0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3, 0, 0, // header
                0x3f, 2, 0x23, // flags
                10, 10, 10, 20, // x
                10, 10, 10, // y
            ]
        );
        assert_eq!(rewrite.loca, [0, 0, 0, 12]);
        assert!(rewrite.head.is_none());

        // already as small as it gets
        assert!(optimize_glyf(&head(0), &rewrite.glyf, &rewrite.loca)
            .unwrap()
            .is_none());
    }

    #[test]
    fn delta_of_300_stays_a_word() {
        let mut glyph = wasteful_glyph(&[(300, 0)]);
        glyph.push(0);
        let loca = loca_short(&[0, glyph.len() as u32]);
        let rewrite = optimize_glyf(&head(0), &glyph, &loca).unwrap().unwrap();
        // flag: on curve, y same; x as a word
        assert_eq!(&rewrite.glyf[14..], &[0x21, 0x01, 0x2c, 0]);

        let mut expected: Vec<u8> = Vec::new();
        assert_eq!(encode_delta(300, &mut expected), 0);
        assert_eq!(expected, [0x01, 0x2c]);
    }

    #[test]
    fn keeps_overlap_bit() {
        let mut glyph = wasteful_glyph(&[(1, 1), (1, 1)]);
        glyph[14] |= OVERLAP_SIMPLE;
        let loca = loca_short(&[0, glyph.len() as u32]);
        let rewrite = optimize_glyf(&head(0), &glyph, &loca).unwrap().unwrap();
        assert_eq!(&rewrite.glyf[14..16], &[0x77, 0x37]);
    }

    #[test]
    fn trims_padding_and_empties() {
        // a composite glyph followed by junk, and a zero-contour glyph with a body
        let mut glyf: Vec<u8> = Vec::new();
        glyf.put_u16(COMPOSITE_CONTOURS);
        glyf.put_slice(&[0; 8]);
        glyf.put_slice(&[0x00, 0x00, 0x00, 0x01, 5, 6]);
        glyf.put_slice(&[0xaa; 6]);
        glyf.put_slice(&[0; 12]);
        let loca = loca_short(&[0, 22, 34]);
        let rewrite = optimize_glyf(&head(0), &glyf, &loca).unwrap().unwrap();
        assert_eq!(rewrite.glyf, &glyf[..16]);
        assert_eq!(rewrite.loca, [0, 0, 0, 8, 0, 8]);
    }

    #[test]
    fn narrows_loca_format() {
        let glyph = wasteful_glyph(&[(1, 1)]);
        let glyph = compact_glyph(&glyph).unwrap().into_owned();
        let mut glyf = glyph.clone();
        glyf.push(0);
        let loca = generate_loca_table(&[0, glyf.len() as u32], LocaFormat::Long);
        let rewrite = optimize_glyf(&head(1), &glyf, &loca).unwrap().unwrap();
        assert_eq!(rewrite.loca_format, LocaFormat::Short);
        assert_eq!(rewrite.loca, [0, 0, 0, 9]);
        let new_head = rewrite.head.unwrap();
        assert_eq!(&new_head[50..52], &[0, 0]);
    }

    #[test]
    fn rejects_bad_input() {
        let mut glyph = wasteful_glyph(&[(1, 1)]);
        glyph.push(0);
        let loca = loca_short(&[0, glyph.len() as u32]);
        assert!(optimize_glyf(&head(2), &glyph, &loca).is_err());
        assert!(optimize_glyf(&head(0)[..50], &glyph, &loca).is_err());
        // offsets past the end of glyf
        assert!(optimize_glyf(&head(0), &glyph[..10], &loca).is_err());
        // decreasing offsets
        let loca = loca_short(&[4, 0]);
        assert!(optimize_glyf(&head(0), &glyph, &loca).is_err());
        // glyph body shorter than its flags claim
        let loca = loca_short(&[0, 16]);
        assert!(optimize_glyf(&head(0), &glyph, &loca).is_err());
        // no glyphs at all
        assert!(optimize_glyf(&head(0), &glyph, &[0, 0]).is_err());
    }
}
