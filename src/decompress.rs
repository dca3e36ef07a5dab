use std::error::Error;

use bytes::{Buf as _, BufMut as _, Bytes};
use font_types::Tag;

use crate::{
    Font, LocaFormat, Table,
    error::{FontError, bail, bail_if, bail_with_msg_if},
    table_tags::{GLYF, HEAD, HHEA, HMTX, LOCA},
    woff::{
        glyf_decoder::{check_declared_loca_length, reconstruct_glyf},
        headers::{Woff2TableDirectory, Woff2TableDirectoryEntry, WoffHeader, WoffVersion},
        hmtx_decoder::reconstruct_hmtx,
    },
};

// Over 14k test fonts the max compression ratio seen to date was ~20.
// >100 suggests you wrote a bad uncompressed size.
const K_MAX_PLAUSIBLE_COMPRESSION_RATIO: f32 = 100.0;

#[cfg(feature = "brotli")]
fn decompress_brotli(compressed_data: &[u8], size_hint: usize) -> Result<Vec<u8>, Box<dyn Error>> {
    use brotli_decompressor::DecompressorWriter;
    use std::io::Write;

    let mut output: Vec<u8> = Vec::with_capacity(size_hint);
    let mut decompressor = DecompressorWriter::new(&mut output, 4096);
    decompressor.write_all(compressed_data)?;
    decompressor.close()?;
    drop(decompressor);
    Ok(output)
}

/// Read a WOFF2 file using the built-in brotli decompressor
#[cfg(feature = "brotli")]
pub fn read_woff2(raw_woff_data: &[u8]) -> Result<Font, FontError> {
    read_woff2_with_brotli(raw_woff_data, &mut decompress_brotli)
}

/// Read a WOFF2 file using a custom brotli decompressor passed as a closure
///
/// Transformed glyf, loca and hmtx tables are reconstructed. Every other table is a view into
/// the single decompressed block.
#[allow(clippy::type_complexity)]
pub fn read_woff2_with_brotli(
    raw_woff_data: &[u8],
    decompress_brotli: &mut dyn FnMut(&[u8], usize) -> Result<Vec<u8>, Box<dyn Error>>,
) -> Result<Font, FontError> {
    // Here we create a new view over the `raw_woff_data`. Because we pass `&mut input` to parsing functons,
    // they will actually mutate the slice (not the data it points to) such that it only includes unparsed data.
    //
    // However `raw_woff_data` will still contain the full data for the WOFF.
    let mut input = raw_woff_data;

    // Parse header and table directory
    let header = WoffHeader::parse(&mut input)?;
    bail_if!(header.woff_version != WoffVersion::Woff2);
    if header.is_collection() {
        bail!(FontError::Unsupported("WOFF2 font collections"));
    }
    let table_directory = Woff2TableDirectory::parse(&mut input, header.num_tables as usize)?;

    // Validate header (and compression ratio)
    bail_if!(header.total_sfnt_size < 1);
    let compression_ratio: f32 = (header.total_sfnt_size as f32) / (raw_woff_data.len() as f32);
    bail_with_msg_if!(
        compression_ratio > K_MAX_PLAUSIBLE_COMPRESSION_RATIO,
        "Implausible compression ratio {:.1}",
        compression_ratio
    );

    // The compressed block follows the table directory
    let compressed_size = header.total_compressed_size as usize;
    if compressed_size > input.remaining() {
        bail!(FontError::Truncated);
    }
    let uncompressed_size = table_directory.uncompressed_size();
    let decompressed = decompress_brotli(&input[..compressed_size], uncompressed_size)
        .map_err(|err| FontError::Decompress(err.to_string()))?;
    if decompressed.len() != uncompressed_size {
        bail!(FontError::Decompress(format!(
            "expected {} bytes, got {}",
            uncompressed_size,
            decompressed.len()
        )));
    }
    let arena = Bytes::from(decompressed);
    log::debug!(
        "WOFF2: {} tables, {} bytes decompressed",
        table_directory.len(),
        arena.len()
    );

    let glyf_entry = find_table(&table_directory, GLYF);
    let loca_entry = find_table(&table_directory, LOCA);

    // Check the glyf and loca tables are compatible with each other
    // 'glyf' without 'loca' doesn't make sense
    match (glyf_entry, loca_entry) {
        (Some(glyf), Some(loca)) => {
            bail_with_msg_if!(
                glyf.is_transformed() != loca.is_transformed(),
                "Cannot transform just one of glyf/loca"
            );
        }
        (Some(_), None) | (None, Some(_)) => {
            log::debug!("Cannot have just one of glyf/loca");
            bail!();
        }
        (None, None) => {}
    }

    let mut tables: Vec<Table> = Vec::with_capacity(table_directory.len());

    // These are read from "glyf" and then used to reconstruct "hmtx"
    let mut x_mins: Option<Vec<i16>> = None;
    // The reconstructed loca decides head.indexToLocFormat
    let mut loca_format: Option<LocaFormat> = None;

    if let (Some(glyf), Some(loca)) = (glyf_entry, loca_entry) {
        if glyf.is_transformed() {
            let reconstructed = reconstruct_glyf(glyf.data_as_slice(&arena)?)?;
            check_declared_loca_length(loca.orig_length, &reconstructed)?;
            log::debug!(
                "WOFF2: reconstructed {} glyphs, glyf {} bytes, {:?} loca",
                reconstructed.num_glyphs,
                reconstructed.glyf.len(),
                reconstructed.loca_format
            );
            tables.push(Table::new(GLYF, reconstructed.glyf));
            tables.push(Table::new(LOCA, reconstructed.loca));
            x_mins = Some(reconstructed.x_mins);
            loca_format = Some(reconstructed.loca_format);
        }
    }

    for table in table_directory.iter() {
        if !table.is_transformed() {
            let mut view = view_table(&arena, table)?;
            if view.tag == HEAD {
                if let Some(format) = loca_format {
                    set_index_to_loc_format(&mut view, format)?;
                }
            }
            tables.push(view);
        } else if table.tag == HMTX {
            let Some(x_mins) = x_mins.as_deref() else {
                log::debug!("Transformed hmtx requires a transformed glyf");
                bail!();
            };
            let num_hmetrics = match find_table(&table_directory, HHEA) {
                Some(hhea) => read_num_hmetrics(hhea.data_as_slice(&arena)?)?,
                None => bail!(),
            };
            let hmtx = reconstruct_hmtx(table.data_as_slice(&arena)?, num_hmetrics, x_mins)?;
            tables.push(Table::new(HMTX, hmtx));
        }
        // transformed glyf and loca were handled above
    }

    let mut font = Font::new(header.flavor, tables)?;

    if let Some(metadata) = header.metadata(raw_woff_data) {
        let expanded = decompress_brotli(metadata, header.meta_orig_length as usize)
            .map_err(|err| FontError::Decompress(err.to_string()))?;
        if expanded.len() != header.meta_orig_length as usize {
            bail!(FontError::Decompress("bad metadata length".to_string()));
        }
        font.woff_metadata = Some(Bytes::from(expanded));
    }
    font.woff_private = header
        .private_data(raw_woff_data)
        .map(Bytes::copy_from_slice);

    Ok(font)
}

fn find_table(directory: &Woff2TableDirectory, tag: Tag) -> Option<&Woff2TableDirectoryEntry> {
    directory.iter().find(|table| table.tag == tag)
}

fn view_table(arena: &Bytes, table: &Woff2TableDirectoryEntry) -> Result<Table, FontError> {
    let start = table.woff_offset as usize;
    let end = start + table.woff_length as usize;
    bail_if!(end > arena.len());
    Ok(Table::new(table.tag, arena.slice(start..end)))
}

/// Make `head` agree with the format of a reconstructed `loca`
fn set_index_to_loc_format(head: &mut Table, format: LocaFormat) -> Result<(), FontError> {
    bail_if!(head.len() < 54);
    let index_format = format.index_format();
    if head.data[50..52] == index_format.to_be_bytes() {
        return Ok(());
    }
    log::debug!("WOFF2: head.indexToLocFormat rewritten to {}", index_format);
    let mut data = head.data.to_vec();
    (&mut data[50..52]).put_u16(index_format);
    head.replace(data);
    Ok(())
}

// Get numberOfHMetrics, https://www.microsoft.com/typography/otspec/hhea.htm
pub(crate) fn read_num_hmetrics(hhea_data: &[u8]) -> Result<u16, FontError> {
    let mut input = hhea_data.get(34..).ok_or(FontError::Truncated)?;
    Ok(input.try_get_u16()?)
}
