use std::ops::Deref;

use bytes::Buf;
use font_types::Tag;

use crate::error::{FontError, bail, bail_if, bail_with_msg_if, usize_will_overflow};
use crate::table_tags::{GLYF, HMTX, KNOWN_TABLE_TAGS, LOCA};
use crate::variable_length::BufVariableExt;

pub const WOFF1_SIG: Tag = Tag::new(b"wOFF");
pub const WOFF2_SIG: Tag = Tag::new(b"wOF2");
pub const TTC_COLLECTION_FLAVOR: Tag = Tag::new(b"ttcf");

pub const WOFF1_HEADER_SIZE: usize = 44;
pub const WOFF2_HEADER_SIZE: usize = 48;
pub const WOFF1_TABLE_ENTRY_SIZE: usize = 20;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WoffVersion {
    Woff1 = 1,
    Woff2 = 2,
}

/// WOFF header that can represent either a WOFF1 or WOFF2 header
///
/// <https://www.w3.org/TR/WOFF/#WOFFHeader>
/// <https://www.w3.org/TR/WOFF2/#woff20Header>
#[derive(Clone, Debug)]
pub struct WoffHeader {
    // This isn't in the header, but we compute it from the "tag" and store it for convenience.
    pub woff_version: WoffVersion,
    /// The "sfnt version" of the input font.
    pub flavor: Tag,
    /// Total size of the WOFF file.
    pub length: u32,
    /// Number of entries in directory of font tables.
    pub num_tables: u16,
    /// Total size needed for the uncompressed font data, including the sfnt header, directory, and font tables (including padding).
    pub total_sfnt_size: u32,
    /// (WOFF2 only) Total length of the compressed data block.
    pub total_compressed_size: u32,
    pub major_version: u16,
    pub minor_version: u16,
    /// Offset to metadata block, from beginning of WOFF file.
    pub meta_offset: u32,
    /// Length of compressed metadata block.
    pub meta_length: u32,
    /// Uncompressed size of metadata block.
    pub meta_orig_length: u32,
    /// Offset to private data block, from beginning of WOFF file.
    pub priv_offset: u32,
    /// Length of private data block.
    pub priv_length: u32,
}

impl WoffHeader {
    pub fn parse(input: &mut impl Buf) -> Result<Self, FontError> {
        let input_len = input.remaining();

        // Read signature, validate it, and determine WOFF version
        let signature = Tag::from_u32(input.try_get_u32()?);
        let woff_version = match signature.as_ref() {
            b"wOFF" => WoffVersion::Woff1,
            b"wOF2" => WoffVersion::Woff2,
            _ => return Err(FontError::Unsupported("not a WOFF file")),
        };
        let header_size = match woff_version {
            WoffVersion::Woff1 => WOFF1_HEADER_SIZE,
            WoffVersion::Woff2 => WOFF2_HEADER_SIZE,
        };
        if input_len < header_size {
            bail!(FontError::Truncated);
        }

        let flavor = Tag::from_u32(input.try_get_u32()?);
        let length = input.try_get_u32()?;
        let num_tables = input.try_get_u16()?;
        let reserved = input.try_get_u16()?;
        let header = Self {
            woff_version,
            flavor,
            length,
            num_tables,
            total_sfnt_size: input.try_get_u32()?,
            // totalCompressedSize field only exists in WOFF2 headers. We simply set it to zero for WOFF1.
            total_compressed_size: match woff_version {
                WoffVersion::Woff1 => 0,
                WoffVersion::Woff2 => input.try_get_u32()?,
            },
            major_version: input.try_get_u16()?,
            minor_version: input.try_get_u16()?,
            meta_offset: input.try_get_u32()?,
            meta_length: input.try_get_u32()?,
            meta_orig_length: input.try_get_u32()?,
            priv_offset: input.try_get_u32()?,
            priv_length: input.try_get_u32()?,
        };

        // Validate
        if header.length as usize > input_len {
            bail!(FontError::Truncated);
        }
        bail_if!(header.num_tables == 0);
        bail_if!(reserved != 0);
        if header.meta_length != 0 {
            bail_if!(block_out_of_range(header.meta_offset, header.meta_length, header.length));
        }
        if header.priv_length != 0 {
            bail_if!(block_out_of_range(header.priv_offset, header.priv_length, header.length));
        }

        Ok(header)
    }

    pub fn is_collection(&self) -> bool {
        self.flavor == TTC_COLLECTION_FLAVOR
    }

    /// The extended metadata block, still compressed
    pub fn metadata<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        block(data, self.meta_offset, self.meta_length)
    }

    /// The private data block
    pub fn private_data<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        block(data, self.priv_offset, self.priv_length)
    }
}

fn block_out_of_range(offset: u32, length: u32, file_length: u32) -> bool {
    offset >= file_length || file_length - offset < length
}

fn block(data: &[u8], offset: u32, length: u32) -> Option<&[u8]> {
    if length == 0 {
        return None;
    }
    data.get(offset as usize..(offset as usize + length as usize))
}

pub struct TableDirectory<T> {
    pub tables: Vec<T>,
}

impl<T> Deref for TableDirectory<T> {
    type Target = Vec<T>;
    fn deref(&self) -> &Self::Target {
        &self.tables
    }
}

pub type Woff1TableDirectory = TableDirectory<Woff1TableDirectoryEntry>;
pub type Woff2TableDirectory = TableDirectory<Woff2TableDirectoryEntry>;

/// <https://www.w3.org/TR/WOFF/#TableDirectory>
#[derive(Clone, Debug)]
pub struct Woff1TableDirectoryEntry {
    pub tag: Tag,
    /// Offset to the data, from beginning of WOFF file
    pub woff_offset: u32,
    /// Length of the compressed data, excluding padding
    pub woff_length: u32,
    /// Length of the uncompressed table, excluding padding
    pub orig_length: u32,
    /// Checksum of the uncompressed table
    pub orig_checksum: u32,
}

impl Woff1TableDirectoryEntry {
    pub fn is_compressed(&self) -> bool {
        self.woff_length != self.orig_length
    }

    pub fn data_as_slice<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], FontError> {
        let end = self.woff_offset as usize + self.woff_length as usize;
        data.get((self.woff_offset as usize)..end)
            .ok_or(FontError::MalformedFont)
    }
}

impl Woff1TableDirectory {
    pub fn parse_woff1(
        input: &mut impl Buf,
        num_tables: usize,
        woff_length: u32,
    ) -> Result<Self, FontError> {
        let mut tables = Vec::with_capacity(num_tables);
        for _ in 0..num_tables {
            let entry = Woff1TableDirectoryEntry {
                tag: Tag::from_u32(input.try_get_u32()?),
                woff_offset: input.try_get_u32()?,
                woff_length: input.try_get_u32()?,
                orig_length: input.try_get_u32()?,
                orig_checksum: input.try_get_u32()?,
            };
            bail_if!(
                entry
                    .woff_offset
                    .checked_add(entry.woff_length)
                    .is_none_or(|end| end > woff_length)
            );
            // Compressed data that is not smaller than the original is not allowed
            bail_if!(entry.woff_length > entry.orig_length);
            tables.push(entry);
        }
        Ok(Self { tables })
    }
}

/// <https://www.w3.org/TR/WOFF2/#table_dir_format>
#[derive(Clone, Debug)]
pub struct Woff2TableDirectoryEntry {
    pub tag: Tag,
    /// 2 bits representing the preprocessing transformation version
    pub format: u8,
    /// Length of original table. This may be innacurate in the case of transformed tables.
    pub orig_length: u32, // uBase128,
    /// Offset of the table within the (decompressed) CompressedFontData field of the WOFF
    pub woff_offset: u32, // Computed
    /// Length of the table within the (decompressed) CompressedFontData field of the WOFF
    pub woff_length: u32, // uBase128,
}

impl Woff2TableDirectory {
    pub fn parse(input: &mut impl Buf, num_tables: usize) -> Result<Self, FontError> {
        // Tables in the CompressedFontData field of the WOFF are stored directly after each other
        // in the order they specified in the header. So we can determine the offset for each table
        // by adding up the lengths of each table (which are stored in the directory entries).
        //
        // <https://www.w3.org/TR/WOFF2/#table_format>
        let mut offset_in_woff: usize = 0;

        let mut tables = Vec::with_capacity(num_tables);
        for _ in 0..num_tables {
            let mut table = Woff2TableDirectoryEntry::parse(input)?;
            table.woff_offset = offset_in_woff as u32;

            // Check for for overflow
            bail_if!(usize_will_overflow(
                offset_in_woff,
                table.woff_length as usize
            ));
            offset_in_woff += table.woff_length as usize;
            bail_if!(offset_in_woff > u32::MAX as usize);

            tables.push(table);
        }

        Ok(Self { tables })
    }

    /// Total size of the decompressed CompressedFontData block
    pub fn uncompressed_size(&self) -> usize {
        self.tables
            .last()
            .map(|table| table.woff_offset as usize + table.woff_length as usize)
            .unwrap_or(0)
    }
}

impl Woff2TableDirectoryEntry {
    pub fn parse(input: &mut impl Buf) -> Result<Self, FontError> {
        let flags = input.try_get_u8()?;
        let (tag, format) = Self::parse_flags(flags);
        // Note: we only parse the tag field from the input if it is not contained within the flags
        let tag = match tag {
            Some(tag) => tag,
            None => Tag::from_u32(input.try_get_u32()?),
        };

        let allowed_formats: u8 = match tag.as_ref() {
            b"glyf" | b"loca" => 0b1001,
            b"hmtx" => 0b0011,
            _ => 0b0001,
        };
        bail_with_msg_if!(
            allowed_formats & (1 << format) == 0,
            "Transform version {} not allowed for table {}",
            format,
            tag
        );

        let orig_length = input.try_get_variable_128_u32()?;
        let mut entry = Self {
            tag,
            format,
            orig_length,
            woff_offset: 0, // Set in TableDirectory parse function
            woff_length: orig_length,
        };
        if entry.is_transformed() {
            entry.woff_length = input.try_get_variable_128_u32()?;
        }

        // https://www.w3.org/TR/WOFF2/#conform-mustRejectLoca
        bail_with_msg_if!(
            entry.tag == LOCA && entry.is_transformed() && entry.woff_length != 0,
            "Transformed loca table must be empty"
        );

        Ok(entry)
    }

    /// Whether the table has been transformed
    ///
    /// For the 'glyf' and 'loca' tables transformation version 3 is the null transform; for
    /// all other tables it is version 0.
    pub fn is_transformed(&self) -> bool {
        if self.tag == GLYF || self.tag == LOCA {
            self.format != 3
        } else if self.tag == HMTX {
            self.format == 1
        } else {
            false
        }
    }

    pub fn data_as_slice<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], FontError> {
        let end = self.woff_offset as usize + self.woff_length as usize;
        data.get((self.woff_offset as usize)..end)
            .ok_or(FontError::MalformedFont)
    }

    /// Parse flags field into "known tag" and "format"
    ///
    /// The interpretation of the flags field is as follows. Bits [0..5] contain an index to the "known tag" table,
    /// which represents tags likely to appear in fonts. If the tag is not present in this table, then the value of
    /// this bit field is 63. Bits 6 and 7 indicate the preprocessing transformation version number (0-3) that was
    /// applied to each table.
    pub fn parse_flags(flags: u8) -> (Option<Tag>, u8) {
        const TAG_MASK: u8 = 0b00111111;
        const FORMAT_MASK: u8 = 0b11000000;
        let tag_bits = flags & TAG_MASK;
        let format = (flags & FORMAT_MASK) >> 6;
        let tag = KNOWN_TABLE_TAGS.get(tag_bits as usize).copied();
        (tag, format)
    }
}
