//! Shrink the `name` table by sharing string storage between records
//!
//! Strings contained in other strings are dropped, and strings where one
//! ends with a prefix of another are merged, until no overlap remains.

use std::borrow::Cow;

use bytes::BufMut;

use crate::buffer::Reader;
use crate::error::{FontError, bail, bail_if, bail_with_msg_if};

const NAME_HEADER_SIZE: usize = 6;
const NAME_RECORD_SIZE: usize = 12;

/// Rewrite a format 0 `name` table with deduplicated string storage.
///
/// Returns `None` when the table is not format 0, is too small to be worth
/// looking at, or the rewritten table would not be smaller.
pub fn compact_name_table(name: &[u8]) -> Result<Option<Vec<u8>>, FontError> {
    if name.len() < NAME_HEADER_SIZE + 2 * NAME_RECORD_SIZE + 1 {
        return Ok(None);
    }
    let mut input = Reader::new(name);
    if input.read_u16()? != 0 {
        return Ok(None);
    }
    let count = input.read_u16()? as usize;
    let string_offset = input.read_u16()? as usize;
    let header_size = NAME_HEADER_SIZE + NAME_RECORD_SIZE * count;
    bail_with_msg_if!(
        name.len() < string_offset || name.len() < header_size,
        "Name table corrupted"
    );
    let storage = &name[string_offset..];

    let mut strings: Vec<&[u8]> = Vec::with_capacity(count);
    for _ in 0..count {
        let record = input.read_bytes(NAME_RECORD_SIZE)?;
        let length = u16::from_be_bytes([record[8], record[9]]) as usize;
        let offset = match length {
            0 => 0,
            _ => u16::from_be_bytes([record[10], record[11]]) as usize,
        };
        bail_with_msg_if!(
            offset + length > storage.len(),
            "Bad string location in name table"
        );
        strings.push(&storage[offset..offset + length]);
    }

    let merged = merge_strings(strings.iter().map(|&s| Cow::Borrowed(s)).collect());
    let new_size = header_size + merged.iter().map(|s| s.len()).sum::<usize>();
    if new_size >= name.len() {
        return Ok(None);
    }
    bail_if!(header_size > u16::MAX as usize);

    let mut out: Vec<u8> = Vec::with_capacity(new_size);
    out.put_slice(&name[..header_size]);
    for string in &merged {
        out.put_slice(string);
    }
    (&mut out[4..6]).put_u16(header_size as u16);

    for (i, string) in strings.iter().enumerate() {
        let Some(position) = find(&out[header_size..], string) else {
            // every string survives inside some merged string
            bail!();
        };
        bail_if!(position > u16::MAX as usize);
        let at = NAME_HEADER_SIZE + NAME_RECORD_SIZE * i + 10;
        (&mut out[at..at + 2]).put_u16(position as u16);
    }

    Ok(Some(out))
}

/// Repeatedly drop strings contained in others and merge the pair with the
/// longest suffix/prefix overlap, until neither applies.
fn merge_strings(mut strings: Vec<Cow<'_, [u8]>>) -> Vec<Cow<'_, [u8]>> {
    strings.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

    'rescan: loop {
        // (overlap, index of the string whose tail overlaps, index of the string whose head overlaps)
        let mut best: Option<(usize, usize, usize)> = None;
        for j in 0..strings.len() {
            for i in 0..strings.len() {
                if i == j {
                    continue;
                }
                let (a, b) = (&strings[i], &strings[j]);
                if find(a, b).is_some() {
                    strings.remove(j);
                    continue 'rescan;
                }
                let overlap = overlap(a, b);
                if overlap > best.map_or(0, |(best_overlap, _, _)| best_overlap) {
                    best = Some((overlap, i, j));
                }
            }
        }

        let Some((overlap, i, j)) = best else {
            break;
        };
        let mut joined = strings[i].to_vec();
        joined.extend_from_slice(&strings[j][overlap..]);
        strings[i.min(j)] = Cow::Owned(joined);
        strings.remove(i.max(j));
    }

    strings
}

/// Length of the longest suffix of `a` that is a prefix of `b`
fn overlap(a: &[u8], b: &[u8]) -> usize {
    (1..=a.len().min(b.len()))
        .rev()
        .find(|&len| a[a.len() - len..] == b[..len])
        .unwrap_or(0)
}

/// Position of the first occurrence of `needle` in `haystack`
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
