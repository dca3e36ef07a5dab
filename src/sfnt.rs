//! Plain sfnt (TrueType / OpenType) files and TrueType collections

use bytes::{Buf as _, BufMut, Bytes};
use font_types::Tag;

use crate::{
    Font, Round4, Table, compute_checksum,
    error::{FontError, bail, bail_if, u32_will_overflow},
    table_tags::HEAD,
};

const SFNT_HEADER_SIZE: usize = 12;
const TABLE_RECORD_SIZE: usize = 16;
const TTC_HEADER_SIZE: usize = 16;
const MAX_COLLECTION_FONTS: u32 = 1 << 26;

/// Offset of `checkSumAdjustment` within `head`
const CHECKSUM_ADJUSTMENT_OFFSET: usize = 8;
const CHECKSUM_MAGIC: u32 = 0xB1B0AFBA;

/// Read the font whose table directory starts at `start`. Table offsets are relative to the
/// start of `data`, as they are in a collection.
pub fn read_ttf(data: &Bytes, start: usize) -> Result<Font, FontError> {
    let Some(available) = data.len().checked_sub(start) else {
        bail!(FontError::Truncated);
    };
    if available < SFNT_HEADER_SIZE + TABLE_RECORD_SIZE {
        bail!(FontError::Truncated);
    }

    let mut input = &data[start..];
    let flavor = Tag::from_u32(input.try_get_u32()?);
    let num_tables = input.try_get_u16()? as usize;
    bail_if!(num_tables == 0);
    if available <= SFNT_HEADER_SIZE + TABLE_RECORD_SIZE * num_tables {
        bail!(FontError::Truncated);
    }
    input.advance(6); // searchRange, entrySelector, rangeShift

    let mut tables = Vec::with_capacity(num_tables);
    for _ in 0..num_tables {
        let tag = Tag::from_u32(input.try_get_u32()?);
        let checksum = input.try_get_u32()?;
        let offset = input.try_get_u32()?;
        let length = input.try_get_u32()?;
        bail_if!(u32_will_overflow(offset, length) || (offset + length) as usize > data.len());

        let mut table = Table::new(tag, data.slice(offset as usize..(offset + length) as usize));
        table.checksum = Some(checksum);
        tables.push(table);
    }
    log::debug!("sfnt: {} tables, flavor {}", tables.len(), flavor);

    Font::new(flavor, tables)
}

/// Read font number `font_index` from a TrueType collection
pub fn read_ttc(data: &Bytes, font_index: u32) -> Result<Font, FontError> {
    if data.len() < TTC_HEADER_SIZE + SFNT_HEADER_SIZE + TABLE_RECORD_SIZE {
        bail!(FontError::Truncated);
    }
    let mut input = &data[8..];
    let num_fonts = input.try_get_u32()?;
    if num_fonts > MAX_COLLECTION_FONTS
        || data.len()
            < TTC_HEADER_SIZE
                + (4 + SFNT_HEADER_SIZE + TABLE_RECORD_SIZE) * num_fonts as usize
    {
        bail!(FontError::Truncated);
    }
    if font_index >= num_fonts {
        bail!(FontError::FontIndexOutOfRange {
            index: font_index,
            count: num_fonts,
        });
    }

    input.advance(4 * font_index as usize);
    let offset = input.try_get_u32()? as usize;
    if offset >= data.len() {
        bail!(FontError::Truncated);
    }
    read_ttf(data, offset)
}

/// Serialize a font as an sfnt file.
///
/// Tables are written in tag order, each padded to a multiple of 4 bytes. Checksums are
/// recomputed for tables that changed and `head.checkSumAdjustment` is recalculated.
pub fn write_ttf(font: &Font) -> Result<Vec<u8>, FontError> {
    let tables = font.tables();
    bail_if!(tables.is_empty() || tables.len() > u16::MAX as usize);

    let header_size = SFNT_HEADER_SIZE + TABLE_RECORD_SIZE * tables.len();
    let data_size: usize = tables.iter().map(|table| Round4!(table.len())).sum();
    bail_if!(header_size + data_size > u32::MAX as usize);

    let mut out: Vec<u8> = Vec::with_capacity(header_size + data_size);
    write_table_directory_header(&mut out, font.flavor, tables.len() as u16);

    let mut offset = header_size;
    for table in tables {
        out.put_u32(u32::from_be_bytes(table.tag.to_be_bytes()));
        out.put_u32(table_checksum(table));
        out.put_u32(offset as u32);
        out.put_u32(table.len() as u32);
        offset += Round4!(table.len());
    }

    let mut head_offset = None;
    for table in tables {
        if table.tag == HEAD && table.len() >= CHECKSUM_ADJUSTMENT_OFFSET + 4 {
            head_offset = Some(out.len());
        }
        out.extend_from_slice(&table.data);
        out.resize(Round4!(out.len()), 0);
    }

    // The adjustment is computed over the file with the field itself zeroed
    if let Some(head_offset) = head_offset {
        let field = head_offset + CHECKSUM_ADJUSTMENT_OFFSET;
        out[field..field + 4].fill(0);
        let adjustment = CHECKSUM_MAGIC.wrapping_sub(compute_checksum(&out));
        (&mut out[field..field + 4]).put_u32(adjustment);
    }

    Ok(out)
}

/// Checksum of a table as recorded in a table directory. The `head` checksum is taken with
/// `checkSumAdjustment` zeroed.
pub(crate) fn table_checksum(table: &Table) -> u32 {
    if let Some(checksum) = table.checksum {
        return checksum;
    }
    let checksum = compute_checksum(&table.data);
    if table.tag == HEAD {
        if let Some(adjustment) = table
            .data
            .get(CHECKSUM_ADJUSTMENT_OFFSET..CHECKSUM_ADJUSTMENT_OFFSET + 4)
        {
            return checksum.wrapping_sub(compute_checksum(adjustment));
        }
    }
    checksum
}

/// Writes an OpenType table directory header
///
/// <https://learn.microsoft.com/en-us/typography/opentype/spec/otff#table-directory>
pub(crate) fn write_table_directory_header(output: &mut impl BufMut, flavor: Tag, num_tables: u16) {
    let mut max_pow2: u16 = 0;
    while 1u32 << (max_pow2 + 1) <= (num_tables as u32) {
        max_pow2 += 1;
    }
    let entry_selector = max_pow2;
    let search_range: u16 = (1u16 << max_pow2) << 4;
    let range_shift = (((num_tables as u32) << 4) - search_range as u32) as u16;

    output.put_u32(u32::from_be_bytes(flavor.to_be_bytes())); // sfnt version
    output.put_u16(num_tables); // num_tables
    output.put_u16(search_range); // searchRange
    output.put_u16(entry_selector); // entrySelector
    output.put_u16(range_shift); // rangeShift
}
