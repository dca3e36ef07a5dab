use bytes::BufMut;

use crate::buffer::Reader;
use crate::error::FontError;

const HHEA_MIN_SIZE: usize = 36;
const NUM_HMETRICS_OFFSET: usize = 34;
/// At least one explicit width before the shared trailing width is kept
const MIN_HMETRICS: usize = 2;

/// Rewritten `hhea` and `hmtx` tables
pub struct CompactHmtx {
    pub hhea: Vec<u8>,
    pub hmtx: Vec<u8>,
    pub num_hmetrics: u16,
}

/// Turn trailing long metrics that repeat the last advance width into bare
/// left side bearings.
///
/// Returns `None` when the tables don't qualify or nothing can be dropped.
pub fn compact_hmtx(hhea: &[u8], hmtx: &[u8]) -> Result<Option<CompactHmtx>, FontError> {
    if hhea.len() < HHEA_MIN_SIZE {
        return Ok(None);
    }
    let mut header = Reader::new(hhea);
    if header.read_u32()? != 0x0001_0000 {
        return Ok(None);
    }
    header.skip(NUM_HMETRICS_OFFSET - 4)?;
    let num_hmetrics = header.read_u16()? as usize;
    if num_hmetrics < MIN_HMETRICS || hmtx.len() % 2 != 0 || hmtx.len() < 4 * num_hmetrics {
        return Ok(None);
    }

    let advance = |i: usize| u16::from_be_bytes([hmtx[4 * i], hmtx[4 * i + 1]]);
    let last_advance = advance(num_hmetrics - 1);
    let mut kept = num_hmetrics;
    while kept > MIN_HMETRICS && advance(kept - 2) == last_advance {
        kept -= 1;
    }
    if kept == num_hmetrics {
        return Ok(None);
    }

    let mut new_hmtx: Vec<u8> = Vec::with_capacity(hmtx.len() - 2 * (num_hmetrics - kept));
    new_hmtx.put_slice(&hmtx[..4 * kept]);
    for metric in hmtx[4 * kept..4 * num_hmetrics].chunks_exact(4) {
        new_hmtx.put_slice(&metric[2..]);
    }
    new_hmtx.put_slice(&hmtx[4 * num_hmetrics..]);

    let mut new_hhea = hhea.to_vec();
    (&mut new_hhea[NUM_HMETRICS_OFFSET..NUM_HMETRICS_OFFSET + 2]).put_u16(kept as u16);

    Ok(Some(CompactHmtx {
        hhea: new_hhea,
        hmtx: new_hmtx,
        num_hmetrics: kept as u16,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hhea(num_hmetrics: u16) -> Vec<u8> {
        let mut hhea = vec![0u8; 36];
        hhea[..4].copy_from_slice(&[0, 1, 0, 0]);
        hhea[34..].copy_from_slice(&num_hmetrics.to_be_bytes());
        hhea
    }

    fn hmtx(metrics: &[(u16, i16)], lsbs: &[i16]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        for &(advance, lsb) in metrics {
            out.put_u16(advance);
            out.put_i16(lsb);
        }
        for &lsb in lsbs {
            out.put_i16(lsb);
        }
        out
    }

    /// Advance width of every glyph as a reader would recover it
    fn advances(hmtx: &[u8], num_hmetrics: usize, num_glyphs: usize) -> Vec<u16> {
        (0..num_glyphs)
            .map(|i| {
                let i = i.min(num_hmetrics - 1);
                u16::from_be_bytes([hmtx[4 * i], hmtx[4 * i + 1]])
            })
            .collect()
    }

    #[test]
    fn trailing_equal_advances_are_dropped() {
        let metrics: Vec<(u16, i16)> = [100, 200, 300, 400, 450, 500, 500, 500, 500, 500]
            .iter()
            .enumerate()
            .map(|(i, &advance)| (advance, i as i16 - 3))
            .collect();
        let original = hmtx(&metrics, &[7, 8]);
        let compact = compact_hmtx(&hhea(10), &original).unwrap().unwrap();

        assert_eq!(compact.num_hmetrics, 6);
        assert_eq!(&compact.hhea[34..], &[0, 6]);
        assert_eq!(compact.hmtx.len(), original.len() - 8);
        assert_eq!(advances(&compact.hmtx, 6, 12), advances(&original, 10, 12));
        // left side bearings are untouched
        let lsbs: Vec<i16> = compact.hmtx[24..]
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(lsbs, [3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn keeps_two_metrics() {
        let original = hmtx(&[(500, 1), (500, 2), (500, 3)], &[]);
        let compact = compact_hmtx(&hhea(3), &original).unwrap().unwrap();
        assert_eq!(compact.num_hmetrics, 2);
        assert_eq!(compact.hmtx, [1, 244, 0, 1, 1, 244, 0, 2, 0, 3]);
        assert!(compact_hmtx(&compact.hhea, &compact.hmtx).unwrap().is_none());
    }

    #[test]
    fn skips_unsuitable_tables() {
        let original = hmtx(&[(100, 0), (500, 0), (500, 0)], &[]);
        // numberOfHMetrics below 2
        assert!(compact_hmtx(&hhea(1), &original).unwrap().is_none());
        // bad version
        let mut bad = hhea(3);
        bad[1] = 2;
        assert!(compact_hmtx(&bad, &original).unwrap().is_none());
        // hmtx too short
        assert!(compact_hmtx(&hhea(4), &original).unwrap().is_none());
        // odd length
        let mut odd = original.clone();
        odd.push(0);
        assert!(compact_hmtx(&hhea(3), &odd).unwrap().is_none());
        // nothing to drop
        let distinct = hmtx(&[(100, 0), (200, 0)], &[]);
        assert!(compact_hmtx(&hhea(2), &distinct).unwrap().is_none());
    }
}
