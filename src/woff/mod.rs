//! WOFF 1.0 / WOFF 2.0 container structures and the WOFF2 table transforms

pub mod glyf_decoder;
pub mod headers;
pub mod hmtx_decoder;
