//! Lossless size optimizations applied to a decoded [`Font`]
//!
//! Passes run in a fixed order: `name`, then `hmtx`, then `glyf`. A pass that
//! fails leaves its tables untouched and does not stop the passes after it.

pub mod glyf;
pub mod hmtx;
pub mod name;

use font_types::Tag;

use crate::error::FontError;
use crate::font::{Font, Table};
use crate::table_tags::{GLYF, HEAD, HHEA, HMTX, LOCA, NAME};

#[derive(Clone, Debug, Default)]
pub struct OptimizeOptions {
    /// Report outcomes at `info` rather than `debug` level
    pub verbose: bool,
}

/// Outcome of one optimization pass for one table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableReport {
    pub tag: Tag,
    pub old_size: usize,
    pub new_size: usize,
    pub replaced: bool,
    /// Set when the pass failed for this table
    pub error: Option<String>,
}

impl TableReport {
    fn unchanged(tag: Tag, size: usize) -> Self {
        Self {
            tag,
            old_size: size,
            new_size: size,
            replaced: false,
            error: None,
        }
    }

    fn failed(tag: Tag, size: usize, err: FontError) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::unchanged(tag, size)
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct OptimizationReport {
    pub tables: Vec<TableReport>,
}

impl OptimizationReport {
    pub fn table(&self, tag: Tag) -> Option<&TableReport> {
        self.tables.iter().find(|table| table.tag == tag)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|table| table.error.is_some())
    }

    /// Bytes saved over all replaced tables, before padding
    pub fn bytes_saved(&self) -> i64 {
        self.tables
            .iter()
            .filter(|table| table.replaced)
            .map(|table| table.old_size as i64 - table.new_size as i64)
            .sum()
    }
}

/// Run every optimization pass over `font`, replacing tables in place.
pub fn optimize(font: &mut Font, options: &OptimizeOptions) -> OptimizationReport {
    let mut report = OptimizationReport::default();
    optimize_name(font, &mut report.tables);
    optimize_hmtx(font, &mut report.tables);
    optimize_glyf(font, &mut report.tables);

    let level = if options.verbose {
        log::Level::Info
    } else {
        log::Level::Debug
    };
    for table in &report.tables {
        match &table.error {
            Some(err) => log::warn!("{}: optimization failed: {}", table.tag, err),
            None if table.replaced => log::log!(
                level,
                "{}: {} -> {} bytes",
                table.tag,
                table.old_size,
                table.new_size
            ),
            None => log::log!(level, "{}: left as is ({} bytes)", table.tag, table.old_size),
        }
    }
    report
}

fn replace(font: &mut Font, tag: Tag, data: Vec<u8>) -> TableReport {
    let old_size = font.table(tag).map_or(0, Table::len);
    let new_size = data.len();
    let replaced = font.replace_table(tag, data);
    TableReport {
        tag,
        old_size,
        new_size,
        replaced,
        error: None,
    }
}

fn optimize_name(font: &mut Font, reports: &mut Vec<TableReport>) {
    let Some(table) = font.table_data(NAME) else {
        return;
    };
    let old_size = table.len();
    match name::compact_name_table(table) {
        Ok(Some(compact)) => reports.push(replace(font, NAME, compact)),
        Ok(None) => reports.push(TableReport::unchanged(NAME, old_size)),
        Err(err) => reports.push(TableReport::failed(NAME, old_size, err)),
    }
}

fn optimize_hmtx(font: &mut Font, reports: &mut Vec<TableReport>) {
    let (Some(hhea), Some(table)) = (font.table_data(HHEA), font.table_data(HMTX)) else {
        return;
    };
    let old_size = table.len();
    match hmtx::compact_hmtx(hhea, table) {
        Ok(Some(compact)) => {
            reports.push(replace(font, HMTX, compact.hmtx));
            reports.push(replace(font, HHEA, compact.hhea));
        }
        Ok(None) => reports.push(TableReport::unchanged(HMTX, old_size)),
        Err(err) => reports.push(TableReport::failed(HMTX, old_size, err)),
    }
}

fn optimize_glyf(font: &mut Font, reports: &mut Vec<TableReport>) {
    let (Some(head), Some(table), Some(loca)) = (
        font.table_data(HEAD),
        font.table_data(GLYF),
        font.table_data(LOCA),
    ) else {
        return;
    };
    let old_size = table.len();
    match glyf::optimize_glyf(head, table, loca) {
        Ok(Some(rewrite)) => {
            reports.push(replace(font, GLYF, rewrite.glyf));
            reports.push(replace(font, LOCA, rewrite.loca));
            if let Some(head) = rewrite.head {
                reports.push(replace(font, HEAD, head));
            }
        }
        Ok(None) => reports.push(TableReport::unchanged(GLYF, old_size)),
        Err(err) => reports.push(TableReport::failed(GLYF, old_size, err)),
    }
}
