use std::error::Error;

use bytes::Bytes;

use crate::{
    Font, Table,
    error::{FontError, bail, bail_if},
    woff::headers::{
        WOFF1_HEADER_SIZE, WOFF1_TABLE_ENTRY_SIZE, Woff1TableDirectory, WoffHeader, WoffVersion,
    },
};

#[cfg(feature = "z")]
fn decompress_z(compressed_data: &[u8], size_hint: usize) -> Result<Vec<u8>, Box<dyn Error>> {
    use flate2::{Decompress, FlushDecompress};
    let mut output: Vec<u8> = Vec::with_capacity(size_hint);
    let mut decompressor = Decompress::new(true);
    decompressor.decompress_vec(compressed_data, &mut output, FlushDecompress::Finish)?;
    Ok(output)
}

#[cfg(feature = "z")]
/// Read a WOFF1 file using the built-in zlib decompressor
pub fn read_woff(raw_woff_data: &Bytes) -> Result<Font, FontError> {
    read_woff_with_custom_z(raw_woff_data, &mut decompress_z)
}

#[allow(clippy::type_complexity)]
/// Read a WOFF1 file using a custom zlib decompressor passed as a closure
///
/// Tables stored uncompressed are views into `raw_woff_data`.
pub fn read_woff_with_custom_z(
    raw_woff_data: &Bytes,
    decompress_z: &mut dyn FnMut(&[u8], usize) -> Result<Vec<u8>, Box<dyn Error>>,
) -> Result<Font, FontError> {
    // Here we create a new view over the `raw_woff_data`. Because we pass `&mut input` to parsing functons,
    // they will actually mutate the slice (not the data it points to) such that it only includes unparsed data.
    //
    // However `raw_woff_data` will still contain the full data for the WOFF.
    let mut input: &[u8] = raw_woff_data;

    // A WOFF without a single table directory entry can't hold a font
    if raw_woff_data.len() <= WOFF1_HEADER_SIZE + WOFF1_TABLE_ENTRY_SIZE {
        bail!(FontError::Truncated);
    }

    // Parse header and table directory
    let header = WoffHeader::parse(&mut input)?;
    bail_if!(header.woff_version != WoffVersion::Woff1);
    if header.is_collection() {
        bail!(FontError::Unsupported("WOFF font collections"));
    }
    let table_directory =
        Woff1TableDirectory::parse_woff1(&mut input, header.num_tables as usize, header.length)?;

    let mut inflate = |data: &[u8], orig_length: u32| -> Result<Vec<u8>, FontError> {
        let decompressed = decompress_z(data, orig_length as usize)
            .map_err(|err| FontError::Decompress(err.to_string()))?;
        if decompressed.len() != orig_length as usize {
            bail!(FontError::Decompress(format!(
                "expected {} bytes, got {}",
                orig_length,
                decompressed.len()
            )));
        }
        Ok(decompressed)
    };

    let mut tables: Vec<Table> = Vec::with_capacity(table_directory.len());
    for entry in table_directory.iter() {
        let data = if entry.is_compressed() {
            Bytes::from(inflate(entry.data_as_slice(raw_woff_data)?, entry.orig_length)?)
        } else {
            let start = entry.woff_offset as usize;
            raw_woff_data.slice(start..(start + entry.woff_length as usize))
        };
        let mut table = Table::new(entry.tag, data);
        table.checksum = Some(entry.orig_checksum);
        tables.push(table);
    }
    log::debug!("WOFF: {} tables", tables.len());

    let mut font = Font::new(header.flavor, tables)?;

    if let Some(metadata) = header.metadata(raw_woff_data) {
        font.woff_metadata = Some(if header.meta_length == header.meta_orig_length {
            Bytes::copy_from_slice(metadata)
        } else {
            Bytes::from(inflate(metadata, header.meta_orig_length)?)
        });
    }
    if header.priv_length != 0 {
        let start = header.priv_offset as usize;
        font.woff_private = Some(raw_woff_data.slice(start..(start + header.priv_length as usize)));
    }

    Ok(font)
}
