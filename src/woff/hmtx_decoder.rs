use bytes::{Buf, BufMut};

use crate::error::{FontError, bail_if, bail_with_msg_if};

pub struct HmtxData {
    num_hmetrics: u16,
    advance_widths: Vec<u16>,
    lsbs: Vec<i16>,
}

/// Rebuild a standard hmtx table from its WOFF2 transformed form
///
/// `x_mins` holds the bounding box x_min of every glyph, as produced by the glyf reconstruction.
pub fn reconstruct_hmtx(
    data: &[u8],
    num_hmetrics: u16,
    x_mins: &[i16],
) -> Result<Vec<u8>, FontError> {
    let mut input = data;
    let hmtx_data = decode_hmtx_table(&mut input, num_hmetrics, x_mins)?;
    Ok(generate_hmtx_table(&hmtx_data))
}

/// Decode a WOFF2 transformed hmtx table
///
/// <https://www.w3.org/TR/WOFF2/#hmtx_table_format>
pub(crate) fn decode_hmtx_table(
    input: &mut impl Buf,
    num_hmetrics: u16,
    x_mins: &[i16],
) -> Result<HmtxData, FontError> {
    // Decode flags
    let hmtx_flags: u8 = input.try_get_u8()?;
    let has_proportional_lsbs: bool = (hmtx_flags & 1) == 0;
    let has_monospace_lsbs: bool = (hmtx_flags & 2) == 0;

    // Bits 2-7 are reserved and MUST be zero.
    bail_with_msg_if!(
        (hmtx_flags & 0xFC) != 0,
        "Illegal hmtx flags; bits 2-7 must be 0"
    );

    // you say you transformed but there is little evidence of it
    bail_if!(has_proportional_lsbs && has_monospace_lsbs);

    let num_glyphs = x_mins.len();

    // num_glyphs 0 is OK if there is no 'glyf' but cannot then xform 'hmtx'.
    bail_if!(num_hmetrics as usize > num_glyphs);

    // "...only one entry need be in the array, but that entry is required."
    // <https://www.microsoft.com/typography/otspec/hmtx.htm>
    bail_if!(num_hmetrics < 1);

    // Read advance widths
    let mut advance_widths: Vec<u16> = Vec::with_capacity(num_hmetrics as usize);
    for _ in 0..num_hmetrics {
        advance_widths.push(input.try_get_u16()?);
    }

    // Read lsb (proportional) and leftSideBearing (monospace) values into the same Vec
    let mut lsbs: Vec<i16> = Vec::with_capacity(num_glyphs);
    for (i, &x_min) in x_mins.iter().enumerate() {
        let present = if i < num_hmetrics as usize {
            has_proportional_lsbs
        } else {
            has_monospace_lsbs
        };
        lsbs.push(if present { input.try_get_i16()? } else { x_min });
    }

    Ok(HmtxData {
        num_hmetrics,
        advance_widths,
        lsbs,
    })
}

/// bake me a shiny new hmtx table
pub(crate) fn generate_hmtx_table(hmtx_data: &HmtxData) -> Vec<u8> {
    let num_glyphs = hmtx_data.lsbs.len();
    let num_hmetrics = hmtx_data.num_hmetrics as usize;

    let mut hmtx_table: Vec<u8> = Vec::with_capacity(2 * num_glyphs + 2 * num_hmetrics);
    for (i, &lsb) in hmtx_data.lsbs.iter().enumerate() {
        if let Some(&advance) = hmtx_data.advance_widths.get(i) {
            hmtx_table.put_u16(advance);
        }
        hmtx_table.put_i16(lsb);
    }
    hmtx_table
}
