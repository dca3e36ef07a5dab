//! Helper functions for woff2 variable length types: 255UInt16 and UIntBase128

use bytes::{Buf, BufMut};

use crate::error::{FontError, bail_if};

const WORD_CODE: u8 = 253;
const ONE_MORE_BYTE_CODE_2: u8 = 254;
const ONE_MORE_BYTE_CODE_1: u8 = 255;
const LOWEST_U_CODE: u16 = 253;

pub trait BufVariableExt: Buf {
    /// Read a 255UInt16
    ///
    /// Based on section 6.1.1 of MicroType Express draft spec
    fn try_get_variable_255_u16(&mut self) -> Result<u16, FontError> {
        let code = self.try_get_u8()?;
        Ok(match code {
            WORD_CODE => self.try_get_u16()?,
            ONE_MORE_BYTE_CODE_1 => self.try_get_u8()? as u16 + LOWEST_U_CODE,
            ONE_MORE_BYTE_CODE_2 => self.try_get_u8()? as u16 + LOWEST_U_CODE * 2,
            _ => code as u16,
        })
    }

    /// Read a UIntBase128
    ///
    /// At most 5 bytes, no leading zeros, and the value must fit in a u32.
    fn try_get_variable_128_u32(&mut self) -> Result<u32, FontError> {
        let mut result: u32 = 0;
        for i in 0..5 {
            let code = self.try_get_u8()?;
            // Leading zeros are invalid.
            bail_if!(i == 0 && code == 0x80);
            // If any of the top seven bits are set then we're about to overflow.
            bail_if!((result & 0xfe000000) != 0);
            result = (result << 7) | ((code & 0x7f) as u32);
            if (code & 0x80) == 0 {
                return Ok(result);
            }
        }
        // Make sure not to exceed the size bound
        Err(FontError::MalformedFont)
    }
}

impl<T: Buf + ?Sized> BufVariableExt for T {}

pub trait BufMutVariableExt: BufMut {
    fn put_variable_255_u16(&mut self, value: u16) {
        if value < 253 {
            self.put_u8(value as u8);
        } else if value < 506 {
            self.put_u8(ONE_MORE_BYTE_CODE_1);
            self.put_u8((value - 253) as u8);
        } else if value < 762 {
            self.put_u8(ONE_MORE_BYTE_CODE_2);
            self.put_u8((value - 506) as u8);
        } else {
            self.put_u8(WORD_CODE);
            self.put_u16(value);
        }
    }

    fn put_variable_128_u32(&mut self, value: u32) {
        let mut size: usize = 1;
        while size < 5 && (value >> (7 * size)) != 0 {
            size += 1;
        }
        for i in 0..size {
            let mut b: u8 = ((value >> (7 * (size - i - 1))) & 0x7f) as u8;
            if i < size - 1 {
                b |= 0x80;
            }
            self.put_u8(b);
        }
    }
}

impl<T: BufMut + ?Sized> BufMutVariableExt for T {}
