//! In-memory font: a flavor tag plus a set of tables keyed by tag

use bytes::Bytes;
use font_types::Tag;

use crate::compute_checksum;
use crate::error::{FontError, bail_with_msg_if};

/// A single font table.
///
/// `data` is either a zero-copy view into the input (or into the WOFF2
/// decompression arena) or a buffer produced by reconstruction/optimization.
#[derive(Clone, Debug)]
pub struct Table {
    pub tag: Tag,
    pub data: Bytes,
    /// Set when the table's bytes differ from those in the source file
    pub modified: bool,
    /// Checksum from the source table directory. `None` when the source
    /// carried no checksum (WOFF2) or the data has changed since.
    pub checksum: Option<u32>,
}

impl Table {
    pub fn new(tag: Tag, data: impl Into<Bytes>) -> Self {
        Self {
            tag,
            data: data.into(),
            modified: false,
            checksum: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Swap in new contents. The previous buffer is released as soon as no
    /// other table or view holds it.
    pub fn replace(&mut self, data: Vec<u8>) {
        self.data = Bytes::from(data);
        self.modified = true;
        self.checksum = None;
    }

    pub fn needs_checksum(&self) -> bool {
        self.checksum.is_none()
    }

    /// The checksum from the source directory, or a freshly computed one.
    pub fn checksum(&self) -> u32 {
        self.checksum
            .unwrap_or_else(|| compute_checksum(&self.data))
    }
}

/// Format of the `loca` table, as recorded in `head.indexToLocFormat`
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LocaFormat {
    /// u16 entries holding `offset / 2`
    Short,
    /// u32 entries holding the byte offset
    Long,
}

impl LocaFormat {
    pub fn from_index_format(index_format: u16) -> Result<Self, FontError> {
        match index_format {
            0 => Ok(Self::Short),
            1 => Ok(Self::Long),
            _ => Err(FontError::MalformedFont),
        }
    }

    pub fn index_format(self) -> u16 {
        match self {
            Self::Short => 0,
            Self::Long => 1,
        }
    }

    /// Size of one `loca` entry in bytes
    pub fn entry_size(self) -> usize {
        match self {
            Self::Short => 2,
            Self::Long => 4,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Font {
    /// The "sfnt version"
    pub flavor: Tag,
    /// Sorted by tag, at most one table per tag
    tables: Vec<Table>,
    /// Set when any table has been modified since reading
    pub modified: bool,
    /// Uncompressed WOFF extended metadata
    pub woff_metadata: Option<Bytes>,
    /// WOFF private data block
    pub woff_private: Option<Bytes>,
}

impl Font {
    /// Build a font from a list of tables. Duplicate tags are rejected.
    pub fn new(flavor: Tag, mut tables: Vec<Table>) -> Result<Self, FontError> {
        tables.sort_by_key(|table| table.tag);
        bail_with_msg_if!(
            tables.windows(2).any(|pair| pair[0].tag == pair[1].tag),
            "Duplicate table tag"
        );
        Ok(Self {
            flavor,
            tables,
            modified: false,
            woff_metadata: None,
            woff_private: None,
        })
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    pub fn table(&self, tag: Tag) -> Option<&Table> {
        self.tables
            .binary_search_by_key(&tag, |table| table.tag)
            .ok()
            .map(|idx| &self.tables[idx])
    }

    pub fn table_mut(&mut self, tag: Tag) -> Option<&mut Table> {
        self.tables
            .binary_search_by_key(&tag, |table| table.tag)
            .ok()
            .map(|idx| &mut self.tables[idx])
    }

    pub fn table_data(&self, tag: Tag) -> Option<&[u8]> {
        self.table(tag).map(|table| &table.data[..])
    }

    /// Replace the contents of an existing table and mark the font modified.
    /// Returns false if there is no table with this tag.
    pub fn replace_table(&mut self, tag: Tag, data: Vec<u8>) -> bool {
        match self.table_mut(tag) {
            Some(table) => {
                table.replace(data);
                self.modified = true;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_tag() {
        let font = Font::new(
            Tag::new(b"true"),
            vec![
                Table::new(Tag::new(b"name"), vec![1u8]),
                Table::new(Tag::new(b"glyf"), vec![2u8, 3]),
            ],
        )
        .unwrap();
        assert_eq!(font.tables()[0].tag, Tag::new(b"glyf"));
        assert_eq!(font.table_data(Tag::new(b"name")), Some(&[1u8][..]));
        assert!(font.table(Tag::new(b"loca")).is_none());
    }

    #[test]
    fn duplicate_tags_are_rejected() {
        let result = Font::new(
            Tag::new(b"true"),
            vec![
                Table::new(Tag::new(b"name"), vec![1u8]),
                Table::new(Tag::new(b"name"), vec![2u8]),
            ],
        );
        assert_eq!(result.err(), Some(FontError::MalformedFont));
    }

    #[test]
    fn replace_marks_modified() {
        let mut table = Table::new(Tag::new(b"hmtx"), vec![0u8; 4]);
        table.checksum = Some(7);
        assert!(!table.needs_checksum());

        let mut font = Font::new(Tag::new(b"true"), vec![table]).unwrap();
        assert!(font.replace_table(Tag::new(b"hmtx"), vec![0, 1]));
        assert!(font.modified);
        let table = font.table(Tag::new(b"hmtx")).unwrap();
        assert!(table.modified);
        assert!(table.needs_checksum());
        assert_eq!(table.checksum(), 1 << 16);
        assert!(!font.replace_table(Tag::new(b"hhea"), vec![]));
    }
}
