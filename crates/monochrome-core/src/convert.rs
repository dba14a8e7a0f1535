//! The conversion façade: base64 or data URL in, grayscale data URL out.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::codec;
use crate::grayscale::grayscale;
use crate::types::{
    ConversionError, ConvertOptions, EncodeError, EncodedImage, Format, PixelBuffer,
};

/// Data-URL prefixes stripped before base64 decoding.
///
/// Anything else is treated as bare base64.
const DATA_URL_PREFIXES: [&str; 3] = [
    "data:image/png;base64,",
    "data:image/jpeg;base64,",
    "data:image/jpg;base64,",
];

/// Remove a recognized `data:image/...;base64,` prefix, if present.
#[must_use]
pub fn strip_data_url_prefix(input: &str) -> &str {
    DATA_URL_PREFIXES
        .iter()
        .find_map(|prefix| input.strip_prefix(prefix))
        .unwrap_or(input)
}

/// Wrap encoded bytes as a `data:<mime>;base64,<payload>` URL.
#[must_use]
pub fn to_data_url(image: &EncodedImage) -> String {
    format!(
        "data:{};base64,{}",
        image.format().mime(),
        STANDARD.encode(image.bytes())
    )
}

/// Convert a base64 or data-URL encoded PNG/JPEG to a grayscale data URL
/// using [`ConvertOptions::default`].
///
/// # Errors
///
/// See [`convert_with`].
pub fn convert(input: &str) -> Result<String, ConversionError> {
    convert_with(input, &ConvertOptions::default())
}

/// Convert a base64 or data-URL encoded PNG/JPEG to a grayscale data URL.
///
/// # Steps
///
/// 1. Strip a `data:image/{png,jpeg,jpg};base64,` prefix
/// 2. Base64 decode
/// 3. Detect the container from its signature and decode
/// 4. Replace color with luma
/// 5. Encode (see [`convert_bytes`] for the output format policy)
/// 6. Base64 encode and wrap as a data URL
///
/// # Errors
///
/// Returns [`ConversionError::InvalidOptions`] if `options` is out of range.
/// Returns [`ConversionError::InvalidEncoding`] if the payload is not
/// valid base64.
/// Propagates every decode and encode failure from [`convert_bytes`].
pub fn convert_with(input: &str, options: &ConvertOptions) -> Result<String, ConversionError> {
    options.validate()?;
    let payload = strip_data_url_prefix(input.trim_ascii());
    let bytes = STANDARD.decode(payload)?;
    let output = convert_bytes(&bytes, options)?;
    Ok(to_data_url(&output))
}

/// Convert raw PNG/JPEG bytes to a grayscale image.
///
/// The output uses the format selected by `options.target`. If that
/// format cannot represent the converted pixels and
/// `options.png_fallback` is set, PNG is written instead; otherwise the
/// call fails with [`ConversionError::UnsupportedChannelLayout`].
///
/// # Errors
///
/// Returns [`ConversionError::InvalidOptions`] if `options` is out of range.
/// Returns [`ConversionError::UnsupportedFormat`],
/// [`ConversionError::CorruptData`] or [`ConversionError::LimitsExceeded`]
/// from decoding.
/// Returns [`ConversionError::UnsupportedChannelLayout`] or
/// [`ConversionError::EncodeFailure`] from encoding.
pub fn convert_bytes(
    bytes: &[u8],
    options: &ConvertOptions,
) -> Result<EncodedImage, ConversionError> {
    options.validate()?;
    let (input_format, buffer) = codec::decode_with_limits(bytes, &options.limits)?;
    let gray = grayscale(buffer);

    let requested = options.target.resolve(input_format);
    let target = choose_output(requested, &gray, options.png_fallback)?;
    let encoded = codec::encode(gray, target, options.jpeg_quality)?;
    Ok(EncodedImage::new(target, encoded))
}

/// Pick the output container, falling back to PNG when allowed.
fn choose_output(
    requested: Format,
    buffer: &PixelBuffer,
    png_fallback: bool,
) -> Result<Format, EncodeError> {
    let (layout, bytes_per_channel) = (buffer.layout(), buffer.bytes_per_channel());
    if requested.supports(layout, bytes_per_channel) {
        return Ok(requested);
    }
    if png_fallback {
        tracing::warn!(
            requested = %requested,
            %layout,
            bits = bytes_per_channel * 8,
            "target format cannot hold converted pixels, writing PNG instead"
        );
        return Ok(Format::Png);
    }
    Err(EncodeError::UnsupportedChannelLayout {
        format: requested,
        layout,
        bits: bytes_per_channel * 8,
    })
}
