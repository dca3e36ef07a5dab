//! Bounds checked cursor over a byte slice

use crate::error::FontError;

/// A cursor over a byte slice.
///
/// Every read checks that enough bytes remain and returns
/// [`FontError::Truncated`] otherwise. The offset is only advanced by
/// reads that succeed, so it never passes the end of the buffer.
#[derive(Clone, Copy)]
pub struct Reader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl bytes::Buf for Reader<'_> {
    fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    fn chunk(&self) -> &[u8] {
        self.remaining_as_slice()
    }

    fn advance(&mut self, cnt: usize) {
        if self.skip(cnt).is_err() {
            panic!("Tried to advance past the end of the buffer");
        }
    }
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Reader<'a> {
        Reader {
            buffer: data,
            offset: 0,
        }
    }

    /// Returns the next `n_bytes` bytes and moves past them.
    pub fn read_bytes(&mut self, n_bytes: usize) -> Result<&'a [u8], FontError> {
        if n_bytes > self.buffer.len() - self.offset {
            return Err(FontError::Truncated);
        }
        let bytes = &self.buffer[self.offset..self.offset + n_bytes];
        self.offset += n_bytes;
        Ok(bytes)
    }

    pub fn skip(&mut self, n_bytes: usize) -> Result<(), FontError> {
        self.read_bytes(n_bytes).map(|_| ())
    }

    #[inline(always)]
    fn read_n_bytes<const N: usize>(&mut self) -> Result<[u8; N], FontError> {
        let mut bytes = [0; N];
        bytes.copy_from_slice(self.read_bytes(N)?);
        Ok(bytes)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, FontError> {
        Ok(self.read_n_bytes::<1>()?[0])
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, FontError> {
        Ok(u16::from_be_bytes(self.read_n_bytes()?))
    }

    #[inline]
    pub fn read_i16(&mut self) -> Result<i16, FontError> {
        Ok(i16::from_be_bytes(self.read_n_bytes()?))
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, FontError> {
        Ok(u32::from_be_bytes(self.read_n_bytes()?))
    }

    pub fn remaining_as_slice(&self) -> &'a [u8] {
        &self.buffer[self.offset..]
    }

    /// Bytes consumed since `start` (an earlier value of [`Reader::offset`])
    pub fn consumed_since(&self, start: usize) -> &'a [u8] {
        &self.buffer[start..self.offset]
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}
