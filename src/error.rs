use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FontError {
    /// Fewer bytes were available than a field declares
    #[error("font data truncated")]
    Truncated,
    /// Internally inconsistent structure
    #[error("malformed font")]
    MalformedFont,
    /// A compressed block failed to expand to its declared length
    #[error("decompression failed: {0}")]
    Decompress(String),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("no font #{index} in collection of {count}")]
    FontIndexOutOfRange { index: u32, count: u32 },
}

impl From<bytes::TryGetError> for FontError {
    fn from(_value: bytes::TryGetError) -> Self {
        Self::Truncated
    }
}

pub(crate) fn usize_will_overflow(a: usize, b: usize) -> bool {
    a.checked_add(b).is_none()
}

pub(crate) fn u32_will_overflow(a: u32, b: u32) -> bool {
    a.checked_add(b).is_none()
}

#[cfg(not(feature = "debug"))]
mod regular {
    macro_rules! bail {
        () => {
            return Err($crate::error::FontError::MalformedFont)
        };
        ($err: expr) => {
            return Err($err)
        };
    }
    pub(crate) use bail;

    macro_rules! bail_if {
        ($cond: expr) => {
            if $cond {
                return Err($crate::error::FontError::MalformedFont);
            }
        };
    }
    pub(crate) use bail_if;

    macro_rules! bail_with_msg_if {
        ($cond: expr, $($msg:tt),*) => {
            if $cond {
                log::debug!($($msg),*);
                return Err($crate::error::FontError::MalformedFont);
            }
        };
    }
    pub(crate) use bail_with_msg_if;
}
#[cfg(not(feature = "debug"))]
pub(crate) use regular::*;

#[cfg(feature = "debug")]
mod debug {
    macro_rules! bail {
        () => {
            panic!()
        };
        ($err: expr) => {
            panic!("{}", $err)
        };
    }
    pub(crate) use bail;

    macro_rules! bail_if {
        ($cond: expr) => {
            if $cond {
                panic!("{}", stringify!($cond))
            }
        };
    }
    pub(crate) use bail_if;

    macro_rules! bail_with_msg_if {
        ($cond: expr, $($msg:tt),*) => {
            if $cond {
                panic!($($msg),*);
            }
        };
    }
    pub(crate) use bail_with_msg_if;
}
#[cfg(feature = "debug")]
pub(crate) use debug::*;
