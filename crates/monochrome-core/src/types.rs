//! Shared types for the monochrome conversion engine.

use serde::{Deserialize, Serialize};

/// Image container formats the engine can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    /// Portable Network Graphics (lossless, deflate-compressed).
    Png,
    /// JPEG/JFIF (lossy, DCT-based).
    Jpeg,
}

impl Format {
    /// PNG file signature.
    pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    /// JPEG start-of-image marker followed by the first marker prefix.
    pub const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];

    /// MIME type used in data URLs.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// Magic bytes identifying this container.
    #[must_use]
    pub const fn signature(self) -> &'static [u8] {
        match self {
            Self::Png => &Self::PNG_SIGNATURE,
            Self::Jpeg => &Self::JPEG_SIGNATURE,
        }
    }

    /// Whether this container can store pixels of the given layout and
    /// sample width without discarding anything.
    ///
    /// Baseline JPEG has no alpha channel and only 8-bit samples. PNG
    /// stores every layout at 8 or 16 bits.
    #[must_use]
    pub const fn supports(self, layout: ChannelLayout, bytes_per_channel: u8) -> bool {
        match self {
            Self::Png => matches!(bytes_per_channel, 1 | 2),
            Self::Jpeg => {
                bytes_per_channel == 1 && matches!(layout, ChannelLayout::Gray | ChannelLayout::Rgb)
            }
        }
    }

    /// Both supported formats, in detection order.
    pub const ALL: [Self; 2] = [Self::Png, Self::Jpeg];
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => f.write_str("PNG"),
            Self::Jpeg => f.write_str("JPEG"),
        }
    }
}

/// The set and order of samples making up one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// Single luma sample.
    Gray,
    /// Luma followed by alpha.
    GrayAlpha,
    /// Red, green, blue.
    Rgb,
    /// Red, green, blue, alpha.
    Rgba,
}

impl ChannelLayout {
    /// Number of samples per pixel.
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::GrayAlpha => 2,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    /// Whether the last sample of each pixel is alpha.
    #[must_use]
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::GrayAlpha | Self::Rgba)
    }

    /// Whether the pixel carries separate red, green and blue samples.
    #[must_use]
    pub const fn has_color(self) -> bool {
        matches!(self, Self::Rgb | Self::Rgba)
    }
}

impl std::fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Gray => "Gray",
            Self::GrayAlpha => "GrayAlpha",
            Self::Rgb => "RGB",
            Self::Rgba => "RGBA",
        };
        f.write_str(name)
    }
}

/// Decoded raster data.
///
/// Samples are stored row-major, pixel-interleaved. 16-bit samples are
/// stored in native byte order, which is what the `image` crate's
/// encoders expect.
///
/// The sample count always equals
/// `width * height * layout.channels() * bytes_per_channel`; the only
/// constructor enforces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    bytes_per_channel: u8,
    samples: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw samples, checking the length invariant.
    ///
    /// Returns `None` when `bytes_per_channel` is not 1 or 2, or when the
    /// sample length does not match the dimensions.
    #[must_use]
    pub fn new(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        bytes_per_channel: u8,
        samples: Vec<u8>,
    ) -> Option<Self> {
        if !matches!(bytes_per_channel, 1 | 2) {
            return None;
        }
        let expected = usize::try_from(width)
            .ok()?
            .checked_mul(usize::try_from(height).ok()?)?
            .checked_mul(layout.channels())?
            .checked_mul(usize::from(bytes_per_channel))?;
        (samples.len() == expected).then_some(Self {
            width,
            height,
            layout,
            bytes_per_channel,
            samples,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Channels stored per pixel.
    #[must_use]
    pub const fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// 1 for 8-bit samples, 2 for 16-bit samples.
    #[must_use]
    pub const fn bytes_per_channel(&self) -> u8 {
        self.bytes_per_channel
    }

    /// Raw sample bytes.
    #[must_use]
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Consume the buffer, returning the raw sample bytes.
    #[must_use]
    pub fn into_samples(self) -> Vec<u8> {
        self.samples
    }

    /// Rebuild a buffer with identical geometry around new samples.
    ///
    /// Callers must supply exactly as many bytes as `self` holds.
    pub(crate) fn with_samples(&self, samples: Vec<u8>) -> Self {
        debug_assert_eq!(samples.len(), self.samples.len());
        Self {
            width: self.width,
            height: self.height,
            layout: self.layout,
            bytes_per_channel: self.bytes_per_channel,
            samples,
        }
    }
}

/// Compressed image bytes with their detected container format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    format: Format,
    bytes: Vec<u8>,
}

impl EncodedImage {
    /// Pair bytes with a format already known to describe them.
    #[must_use]
    pub const fn new(format: Format, bytes: Vec<u8>) -> Self {
        Self { format, bytes }
    }

    /// Container format of the bytes.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// The compressed bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the image, returning the compressed bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Which container the converted image is written as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetFormat {
    /// Re-encode using the format of the input.
    #[default]
    SameAsInput,
    /// Always write PNG.
    Png,
    /// Always write JPEG.
    Jpeg,
}

impl TargetFormat {
    /// Resolve against the detected input format.
    #[must_use]
    pub const fn resolve(self, input: Format) -> Format {
        match self {
            Self::SameAsInput => input,
            Self::Png => Format::Png,
            Self::Jpeg => Format::Jpeg,
        }
    }
}

/// Upper bounds applied while decoding untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeLimits {
    /// Maximum image width in pixels. `None` disables the check.
    pub max_width: Option<u32>,
    /// Maximum image height in pixels. `None` disables the check.
    pub max_height: Option<u32>,
    /// Maximum bytes the decoder may allocate. `None` disables the check.
    pub max_alloc: Option<u64>,
}

impl DecodeLimits {
    pub const DEFAULT_MAX_DIMENSION: u32 = 16_384;
    pub const DEFAULT_MAX_ALLOC: u64 = 512 * 1024 * 1024;

    /// No limits at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_alloc: None,
        }
    }
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_width: Some(Self::DEFAULT_MAX_DIMENSION),
            max_height: Some(Self::DEFAULT_MAX_DIMENSION),
            max_alloc: Some(Self::DEFAULT_MAX_ALLOC),
        }
    }
}

/// Configuration for a conversion.
///
/// Deserializes from partial JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Output container selection.
    pub target: TargetFormat,

    /// Write PNG instead of failing when the target format cannot hold
    /// the converted pixels (e.g. alpha into JPEG).
    pub png_fallback: bool,

    /// JPEG quality, 1 to 100. Only used when writing JPEG.
    pub jpeg_quality: u8,

    /// Bounds applied while decoding.
    pub limits: DecodeLimits,
}

impl ConvertOptions {
    pub const DEFAULT_PNG_FALLBACK: bool = true;
    pub const DEFAULT_JPEG_QUALITY: u8 = 90;

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::InvalidOptions`] if `jpeg_quality` is
    /// outside `1..=100`.
    pub fn validate(&self) -> Result<(), ConversionError> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConversionError::InvalidOptions(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            target: TargetFormat::default(),
            png_fallback: Self::DEFAULT_PNG_FALLBACK,
            jpeg_quality: Self::DEFAULT_JPEG_QUALITY,
            limits: DecodeLimits::default(),
        }
    }
}

/// Errors from the decode stage.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The bytes match no known container signature.
    #[error("unrecognized image format")]
    UnsupportedFormat,

    /// The signature matched but the container could not be parsed.
    #[error("corrupt {format} data: {reason}")]
    CorruptData { format: Format, reason: String },

    /// Decoding would exceed the configured limits.
    #[error("{format} image exceeds decode limits: {reason}")]
    LimitsExceeded { format: Format, reason: String },
}

/// Errors from the encode stage.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The target container cannot represent the buffer's pixels.
    #[error("{format} cannot store {layout} pixels at {bits} bits per channel")]
    UnsupportedChannelLayout {
        format: Format,
        layout: ChannelLayout,
        bits: u8,
    },

    /// The encoder itself failed.
    #[error("failed to encode {format}: {reason}")]
    EncodeFailure { format: Format, reason: String },
}

/// Every way a conversion can fail.
///
/// Serializable so it can cross the JS boundary as JSON, the same way
/// the worker protocol ships errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ConversionError {
    /// The input is not valid base64.
    #[error("invalid base64 input: {0}")]
    InvalidEncoding(String),

    /// The decoded bytes are neither PNG nor JPEG.
    #[error("unrecognized image format")]
    UnsupportedFormat,

    /// The container is truncated or malformed.
    #[error("corrupt {format} data: {reason}")]
    CorruptData { format: Format, reason: String },

    /// The image is larger than the configured decode limits.
    #[error("{format} image exceeds decode limits: {reason}")]
    LimitsExceeded { format: Format, reason: String },

    /// The output format cannot represent the converted pixels.
    #[error("{format} cannot store {layout} pixels at {bits} bits per channel")]
    UnsupportedChannelLayout {
        format: Format,
        layout: ChannelLayout,
        bits: u8,
    },

    /// Encoding failed for a reason other than the channel layout.
    #[error("failed to encode {format}: {reason}")]
    EncodeFailure { format: Format, reason: String },

    /// Option values are out of range.
    #[error("invalid conversion options: {0}")]
    InvalidOptions(String),
}

impl ConversionError {
    /// The fieldless tag for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEncoding(_) => ErrorKind::InvalidEncoding,
            Self::UnsupportedFormat => ErrorKind::UnsupportedFormat,
            Self::CorruptData { .. } => ErrorKind::CorruptData,
            Self::LimitsExceeded { .. } => ErrorKind::LimitsExceeded,
            Self::UnsupportedChannelLayout { .. } => ErrorKind::UnsupportedChannelLayout,
            Self::EncodeFailure { .. } => ErrorKind::EncodeFailure,
            Self::InvalidOptions(_) => ErrorKind::InvalidOptions,
        }
    }
}

impl From<base64::DecodeError> for ConversionError {
    fn from(err: base64::DecodeError) -> Self {
        Self::InvalidEncoding(err.to_string())
    }
}

impl From<DecodeError> for ConversionError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnsupportedFormat => Self::UnsupportedFormat,
            DecodeError::CorruptData { format, reason } => Self::CorruptData { format, reason },
            DecodeError::LimitsExceeded { format, reason } => {
                Self::LimitsExceeded { format, reason }
            }
        }
    }
}

impl From<EncodeError> for ConversionError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::UnsupportedChannelLayout {
                format,
                layout,
                bits,
            } => Self::UnsupportedChannelLayout {
                format,
                layout,
                bits,
            },
            EncodeError::EncodeFailure { format, reason } => Self::EncodeFailure { format, reason },
        }
    }
}

/// Stable, fieldless error tags for callers that branch on the failure
/// class rather than the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidEncoding,
    UnsupportedFormat,
    CorruptData,
    LimitsExceeded,
    UnsupportedChannelLayout,
    EncodeFailure,
    InvalidOptions,
    /// The compiled engine could not be loaded by the host. Reported by
    /// host-side glue; conversion never returns it.
    EngineUnavailable,
}

impl ErrorKind {
    /// Name used as the JS `Error.name` across the WASM boundary.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidEncoding => "InvalidEncoding",
            Self::UnsupportedFormat => "UnsupportedFormat",
            Self::CorruptData => "CorruptData",
            Self::LimitsExceeded => "LimitsExceeded",
            Self::UnsupportedChannelLayout => "UnsupportedChannelLayout",
            Self::EncodeFailure => "EncodeFailure",
            Self::InvalidOptions => "InvalidOptions",
            Self::EngineUnavailable => "EngineUnavailable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Format tests ---

    #[test]
    fn format_mime_types() {
        assert_eq!(Format::Png.mime(), "image/png");
        assert_eq!(Format::Jpeg.mime(), "image/jpeg");
    }

    #[test]
    fn jpeg_rejects_alpha_and_sixteen_bit() {
        assert!(Format::Jpeg.supports(ChannelLayout::Gray, 1));
        assert!(Format::Jpeg.supports(ChannelLayout::Rgb, 1));
        assert!(!Format::Jpeg.supports(ChannelLayout::Rgba, 1));
        assert!(!Format::Jpeg.supports(ChannelLayout::GrayAlpha, 1));
        assert!(!Format::Jpeg.supports(ChannelLayout::Rgb, 2));
    }

    #[test]
    fn png_supports_every_layout() {
        for layout in [
            ChannelLayout::Gray,
            ChannelLayout::GrayAlpha,
            ChannelLayout::Rgb,
            ChannelLayout::Rgba,
        ] {
            assert!(Format::Png.supports(layout, 1));
            assert!(Format::Png.supports(layout, 2));
        }
    }

    // --- PixelBuffer tests ---

    #[test]
    fn pixel_buffer_accepts_matching_length() {
        let buf = PixelBuffer::new(3, 2, ChannelLayout::Rgba, 1, vec![0; 24]).unwrap();
        assert_eq!(buf.width(), 3);
        assert_eq!(buf.height(), 2);
        assert_eq!(buf.samples().len(), 24);
    }

    #[test]
    fn pixel_buffer_rejects_wrong_length() {
        assert!(PixelBuffer::new(3, 2, ChannelLayout::Rgba, 1, vec![0; 23]).is_none());
        assert!(PixelBuffer::new(3, 2, ChannelLayout::Rgb, 2, vec![0; 18]).is_none());
    }

    #[test]
    fn pixel_buffer_rejects_unsupported_depth() {
        assert!(PixelBuffer::new(1, 1, ChannelLayout::Gray, 4, vec![0; 4]).is_none());
        assert!(PixelBuffer::new(1, 1, ChannelLayout::Gray, 0, vec![]).is_none());
    }

    #[test]
    fn accessors_report_construction_values() {
        let buf = PixelBuffer::new(1, 1, ChannelLayout::GrayAlpha, 2, vec![0; 4]).unwrap();
        assert_eq!(buf.layout(), ChannelLayout::GrayAlpha);
        assert_eq!(buf.bytes_per_channel(), 2);

        let image = EncodedImage::new(Format::Jpeg, vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(image.format(), Format::Jpeg);
        assert_eq!(image.bytes(), &[0xFF, 0xD8, 0xFF]);
        assert_eq!(image.into_bytes(), vec![0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn zero_sized_buffer_is_valid() {
        let buf = PixelBuffer::new(0, 5, ChannelLayout::Rgb, 1, vec![]).unwrap();
        assert!(buf.samples().is_empty());
    }

    // --- Options tests ---

    #[test]
    fn target_format_resolution() {
        assert_eq!(TargetFormat::SameAsInput.resolve(Format::Jpeg), Format::Jpeg);
        assert_eq!(TargetFormat::Png.resolve(Format::Jpeg), Format::Png);
        assert_eq!(TargetFormat::Jpeg.resolve(Format::Png), Format::Jpeg);
    }

    #[test]
    fn default_options_validate() {
        assert!(ConvertOptions::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_quality_is_rejected() {
        for quality in [0, 101, 255] {
            let options = ConvertOptions {
                jpeg_quality: quality,
                ..ConvertOptions::default()
            };
            let err = options.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidOptions);
        }
    }

    #[test]
    fn options_deserialize_from_partial_json() {
        let options: ConvertOptions =
            serde_json::from_str(r#"{"target":"Jpeg","png_fallback":false}"#).unwrap();
        assert_eq!(options.target, TargetFormat::Jpeg);
        assert!(!options.png_fallback);
        assert_eq!(options.jpeg_quality, ConvertOptions::DEFAULT_JPEG_QUALITY);
        assert_eq!(options.limits, DecodeLimits::default());
    }

    #[test]
    fn options_serde_roundtrip() {
        let options = ConvertOptions {
            target: TargetFormat::Png,
            png_fallback: false,
            jpeg_quality: 42,
            limits: DecodeLimits::none(),
        };
        let json = serde_json::to_string(&options).unwrap();
        let back: ConvertOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(options, back);
    }

    // --- Error tests ---

    #[test]
    fn decode_error_maps_to_conversion_error() {
        let err = ConversionError::from(DecodeError::CorruptData {
            format: Format::Png,
            reason: "truncated".into(),
        });
        assert_eq!(err.kind(), ErrorKind::CorruptData);
        assert_eq!(err.to_string(), "corrupt PNG data: truncated");
    }

    #[test]
    fn encode_error_maps_to_conversion_error() {
        let err = ConversionError::from(EncodeError::UnsupportedChannelLayout {
            format: Format::Jpeg,
            layout: ChannelLayout::Rgba,
            bits: 8,
        });
        assert_eq!(err.kind(), ErrorKind::UnsupportedChannelLayout);
        assert_eq!(
            err.to_string(),
            "JPEG cannot store RGBA pixels at 8 bits per channel"
        );
    }

    #[test]
    fn conversion_error_serde_roundtrip() {
        let err = ConversionError::EncodeFailure {
            format: Format::Png,
            reason: "out of memory".into(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: ConversionError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }

    #[test]
    fn error_kind_names_are_stable() {
        assert_eq!(ErrorKind::InvalidEncoding.as_str(), "InvalidEncoding");
        assert_eq!(ErrorKind::EngineUnavailable.as_str(), "EngineUnavailable");
        assert_eq!(
            ErrorKind::UnsupportedChannelLayout.to_string(),
            "UnsupportedChannelLayout"
        );
    }
}
