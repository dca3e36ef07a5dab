use std::error::Error;

use bytes::{BufMut as _, Bytes};

use crate::{
    Font, Round4,
    error::{FontError, bail_if},
    read_ttf,
    table_tags::HEAD,
    woff::headers::{WOFF1_HEADER_SIZE, WOFF1_SIG, WOFF1_TABLE_ENTRY_SIZE},
    write_ttf,
};

#[cfg(feature = "z")]
fn compress_z(data: &[u8]) -> Result<Vec<u8>, Box<dyn Error>> {
    use flate2::{Compression, write::ZlibEncoder};
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len()), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(feature = "z")]
/// Write a font as WOFF 1.0 using the built-in zlib compressor
pub fn write_woff(font: &Font) -> Result<Vec<u8>, FontError> {
    write_woff_with_custom_z(font, &mut compress_z)
}

/// Compressed data is only worth storing if it saves at least one 4-byte word after padding
fn really_smaller(compressed: usize, original: usize) -> bool {
    Round4!(compressed) < Round4!(original)
}

#[allow(clippy::type_complexity)]
/// Write a font as WOFF 1.0 using a custom zlib compressor passed as a closure
///
/// Table checksums and `head.checkSumAdjustment` are those of the equivalent sfnt file.
pub fn write_woff_with_custom_z(
    font: &Font,
    compress_z: &mut dyn FnMut(&[u8]) -> Result<Vec<u8>, Box<dyn Error>>,
) -> Result<Vec<u8>, FontError> {
    // Round trip through the sfnt writer to settle checksums
    let sfnt = Bytes::from(write_ttf(font)?);
    let total_sfnt_size = sfnt.len();
    let sfnt_font = read_ttf(&sfnt, 0)?;
    let tables = sfnt_font.tables();

    let mut compress = |data: &[u8]| -> Result<Vec<u8>, FontError> {
        compress_z(data).map_err(|err| FontError::Decompress(err.to_string()))
    };

    // fontRevision
    let (major_version, minor_version) = match sfnt_font.table_data(HEAD) {
        Some(head) if head.len() >= 8 => (
            u16::from_be_bytes([head[4], head[5]]),
            u16::from_be_bytes([head[6], head[7]]),
        ),
        _ => (0, 0),
    };

    let directory_size = WOFF1_TABLE_ENTRY_SIZE * tables.len();
    let mut directory: Vec<u8> = Vec::with_capacity(directory_size);
    let mut table_data: Vec<u8> = Vec::with_capacity(total_sfnt_size);
    let data_start = WOFF1_HEADER_SIZE + directory_size;

    for table in tables {
        let offset = data_start + table_data.len();
        let compressed = compress(&table.data)?;
        let stored_length = if really_smaller(compressed.len(), table.len()) {
            table_data.extend_from_slice(&compressed);
            compressed.len()
        } else {
            table_data.extend_from_slice(&table.data);
            table.len()
        };
        table_data.resize(Round4!(table_data.len()), 0);

        directory.put_u32(u32::from_be_bytes(table.tag.to_be_bytes()));
        directory.put_u32(offset as u32);
        directory.put_u32(stored_length as u32);
        directory.put_u32(table.len() as u32);
        directory.put_u32(table.checksum.unwrap_or_default());
    }

    let mut out: Vec<u8> = Vec::with_capacity(data_start + table_data.len());
    // Header is filled in once the block offsets are known
    out.resize(WOFF1_HEADER_SIZE, 0);
    out.extend_from_slice(&directory);
    out.extend_from_slice(&table_data);

    let (mut meta_offset, mut meta_length, mut meta_orig_length) = (0, 0, 0);
    if let Some(metadata) = &font.woff_metadata {
        // Metadata is always stored compressed
        let compressed = compress(metadata)?;
        meta_offset = out.len();
        meta_length = compressed.len();
        meta_orig_length = metadata.len();
        out.extend_from_slice(&compressed);
    }

    let (mut priv_offset, mut priv_length) = (0, 0);
    if let Some(private) = &font.woff_private {
        // The private block starts on a 4-byte boundary
        out.resize(Round4!(out.len()), 0);
        priv_offset = out.len();
        priv_length = private.len();
        out.extend_from_slice(private);
    }

    bail_if!(out.len() > u32::MAX as usize);
    let length = out.len() as u32;

    let mut header = &mut out[..WOFF1_HEADER_SIZE];
    header.put_u32(u32::from_be_bytes(WOFF1_SIG.to_be_bytes()));
    header.put_u32(u32::from_be_bytes(font.flavor.to_be_bytes()));
    header.put_u32(length);
    header.put_u16(tables.len() as u16);
    header.put_u16(0); // reserved
    header.put_u32(total_sfnt_size as u32);
    header.put_u16(major_version);
    header.put_u16(minor_version);
    header.put_u32(meta_offset as u32);
    header.put_u32(meta_length as u32);
    header.put_u32(meta_orig_length as u32);
    header.put_u32(priv_offset as u32);
    header.put_u32(priv_length as u32);

    log::debug!(
        "WOFF: {} tables, {} bytes (sfnt {} bytes)",
        tables.len(),
        out.len(),
        total_sfnt_size
    );

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incompressible_data_is_stored() {
        assert!(really_smaller(4, 8));
        assert!(!really_smaller(5, 8));
        assert!(!really_smaller(7, 5));
    }
}
