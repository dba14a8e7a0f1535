//! monochrome-core: PNG/JPEG grayscale conversion engine (sans-IO).
//!
//! Converts an encoded image to grayscale through:
//! base64 decode -> container decode -> luma transform ->
//! container encode -> data URL.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! strings and byte slices and keeps no state between calls. Browser
//! bindings live in `monochrome-wasm`.

pub mod codec;
pub mod convert;
pub mod grayscale;
pub mod types;

pub use convert::{convert, convert_bytes, convert_with, strip_data_url_prefix, to_data_url};
pub use grayscale::grayscale;
pub use types::{
    ChannelLayout, ConversionError, ConvertOptions, DecodeError, DecodeLimits, EncodeError,
    EncodedImage, ErrorKind, Format, PixelBuffer, TargetFormat,
};
