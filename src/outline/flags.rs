//! Run-length encoding of simple glyph point flags

use bytes::BufMut;

use crate::buffer::Reader;
use crate::error::{FontError, bail_if};
use crate::outline::GLYF_REPEAT;

/// The longest run a single flag byte plus a repeat count can describe
const MAX_RUN: u16 = 256;

/// Collapses runs of identical flag bytes using the REPEAT bit.
///
/// To keep writes to the output strictly append-only, a flag is not written
/// until we know it will not be repeated.
pub struct FlagRunEncoder<'a, B: BufMut> {
    dst: &'a mut B,
    pending: Option<(u8, u16)>,
}

impl<'a, B: BufMut> FlagRunEncoder<'a, B> {
    pub fn new(dst: &'a mut B) -> Self {
        Self { dst, pending: None }
    }

    pub fn push(&mut self, flag: u8) {
        if let Some((last_flag, count)) = &mut self.pending {
            if *last_flag == flag && *count < MAX_RUN {
                *count += 1;
                return;
            }
        }
        self.flush();
        self.pending = Some((flag, 1));
    }

    pub fn finish(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        match self.pending.take() {
            None => {}
            Some((flag, 1)) => self.dst.put_u8(flag),
            // Two literal bytes are no longer than flag + count
            Some((flag, 2)) => {
                self.dst.put_u8(flag);
                self.dst.put_u8(flag);
            }
            Some((flag, count)) => {
                self.dst.put_u8(flag | GLYF_REPEAT);
                self.dst.put_u8((count - 1) as u8);
            }
        }
    }
}

/// Expand run-length encoded flags for `n_points` points. The REPEAT bit is
/// cleared in the returned flags.
pub fn decode_flags(input: &mut Reader<'_>, n_points: usize) -> Result<Vec<u8>, FontError> {
    let mut flags = Vec::with_capacity(n_points);
    while flags.len() < n_points {
        let flag = input.read_u8()?;
        let mut count = 1;
        if flag & GLYF_REPEAT != 0 {
            count += input.read_u8()? as usize;
        }
        bail_if!(flags.len() + count > n_points);
        flags.resize(flags.len() + count, flag & !GLYF_REPEAT);
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(flags: &[u8]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        let mut encoder = FlagRunEncoder::new(&mut out);
        for &flag in flags {
            encoder.push(flag);
        }
        encoder.finish();
        out
    }

    fn decode(bytes: &[u8], n_points: usize) -> Vec<u8> {
        let mut reader = Reader::new(bytes);
        let flags = decode_flags(&mut reader, n_points).unwrap();
        assert!(reader.remaining_as_slice().is_empty());
        flags
    }

    #[test]
    fn short_runs_stay_literal() {
        assert_eq!(encode(&[]), Vec::<u8>::new());
        assert_eq!(encode(&[1]), vec![1]);
        assert_eq!(encode(&[1, 1]), vec![1, 1]);
        assert_eq!(encode(&[1, 0x11, 0x11, 1]), vec![1, 0x11, 0x11, 1]);
    }

    #[test]
    fn long_runs_use_repeat_bit() {
        assert_eq!(encode(&[0x21, 0x21, 0x21]), vec![0x29, 2]);
        assert_eq!(encode(&[1, 0x21, 0x21, 0x21, 0x21, 1]), vec![1, 0x29, 3, 1]);
    }

    #[test]
    fn run_length_limit() {
        assert_eq!(encode(&[1; 256]), vec![0x09, 255]);
        assert_eq!(encode(&[1; 257]), vec![0x09, 255, 1]);
        assert_eq!(encode(&[1; 259]), vec![0x09, 255, 0x09, 2]);
    }

    #[test]
    fn decode_reproduces_input() {
        let inputs: [&[u8]; 5] = [
            &[1],
            &[1, 1, 0x31, 0x31, 0x31, 0x31, 0, 0, 1],
            &[0x37; 256],
            &[0x37; 600],
            &[0x40, 1, 1, 1, 2, 2, 3, 3, 3, 3],
        ];
        for flags in inputs {
            assert_eq!(decode(&encode(flags), flags.len()), flags);
        }
    }

    #[test]
    fn decode_rejects_overlong_run() {
        let mut reader = Reader::new(&[0x09, 5]);
        assert_eq!(decode_flags(&mut reader, 3), Err(FontError::MalformedFont));
        let mut reader = Reader::new(&[0x01, 0x09]);
        assert_eq!(decode_flags(&mut reader, 3), Err(FontError::Truncated));
    }
}
