//! Container decoding and encoding.
//!
//! Maps PNG and JPEG byte streams to and from [`PixelBuffer`] so the
//! transform never sees format-specific data. The container is always
//! identified by its magic bytes and its framing is checked before any
//! pixels are decoded: a PNG must reach its `IEND` chunk and a JPEG its
//! EOI marker, so a cut-off upload fails instead of decoding to a
//! partly blank image.
//!
//! PNG is read with the `png` crate directly so zlib checksums are
//! verified; JPEG goes through the `image` crate.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageError, ImageFormat, ImageReader};

use crate::types::{ChannelLayout, DecodeError, DecodeLimits, EncodeError, Format, PixelBuffer};

/// JPEG end-of-image marker.
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Identify the container from its leading bytes.
#[must_use]
pub fn sniff(bytes: &[u8]) -> Option<Format> {
    Format::ALL
        .into_iter()
        .find(|format| bytes.starts_with(format.signature()))
}

/// Whether `bytes` is a non-empty, strict prefix of a known signature,
/// i.e. a container cut off before its signature completes.
fn truncated_signature(bytes: &[u8]) -> Option<Format> {
    if bytes.is_empty() {
        return None;
    }
    Format::ALL.into_iter().find(|format| {
        let signature = format.signature();
        bytes.len() < signature.len() && signature.starts_with(bytes)
    })
}

/// Decode PNG or JPEG bytes with the default [`DecodeLimits`].
///
/// # Errors
///
/// Returns [`DecodeError::UnsupportedFormat`] if no signature matches.
/// Returns [`DecodeError::CorruptData`] if the container is malformed,
/// truncated or fails a checksum.
/// Returns [`DecodeError::LimitsExceeded`] if the image is too large.
pub fn decode(bytes: &[u8]) -> Result<(Format, PixelBuffer), DecodeError> {
    decode_with_limits(bytes, &DecodeLimits::default())
}

/// Decode PNG or JPEG bytes, bounding dimensions and allocation.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_with_limits(
    bytes: &[u8],
    limits: &DecodeLimits,
) -> Result<(Format, PixelBuffer), DecodeError> {
    let Some(format) = sniff(bytes) else {
        return Err(match truncated_signature(bytes) {
            Some(format) => corrupt(format, "stream ends inside the file signature"),
            None => DecodeError::UnsupportedFormat,
        });
    };
    tracing::debug!(%format, len = bytes.len(), "decoding image");

    let buffer = match format {
        Format::Png => {
            check_png_chunks(bytes)?;
            decode_png(bytes, limits)?
        }
        Format::Jpeg => {
            check_jpeg_end(bytes)?;
            decode_jpeg(bytes, limits)?
        }
    };
    tracing::debug!(
        width = buffer.width(),
        height = buffer.height(),
        layout = %buffer.layout(),
        bits = buffer.bytes_per_channel() * 8,
        "decoded image"
    );
    Ok((format, buffer))
}

fn corrupt(format: Format, reason: impl Into<String>) -> DecodeError {
    DecodeError::CorruptData {
        format,
        reason: reason.into(),
    }
}

/// Walk the chunk list up to `IEND`.
///
/// Every chunk (length, type, data, CRC) must fit inside the stream.
/// Bytes after `IEND` are ignored.
fn check_png_chunks(bytes: &[u8]) -> Result<(), DecodeError> {
    let mut rest = &bytes[Format::PNG_SIGNATURE.len()..];
    loop {
        let Some((header, body)) = rest.split_first_chunk::<8>() else {
            return Err(corrupt(Format::Png, "stream ends before the IEND chunk"));
        };
        let [l0, l1, l2, l3, t0, t1, t2, t3] = *header;
        let len = usize::try_from(u32::from_be_bytes([l0, l1, l2, l3]))
            .map_err(|_| corrupt(Format::Png, "chunk length overflows"))?;
        let kind = [t0, t1, t2, t3];
        let Some(total) = len.checked_add(4).filter(|&n| n <= body.len()) else {
            return Err(corrupt(
                Format::Png,
                format!(
                    "{} chunk runs past the end of the stream",
                    String::from_utf8_lossy(&kind)
                ),
            ));
        };
        if kind == *b"IEND" {
            return Ok(());
        }
        rest = &body[total..];
    }
}

/// Require the EOI marker at the end of the stream, allowing trailing
/// zero padding after it.
fn check_jpeg_end(bytes: &[u8]) -> Result<(), DecodeError> {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    if bytes[..end].ends_with(&JPEG_EOI) {
        Ok(())
    } else {
        Err(corrupt(Format::Jpeg, "stream ends before the EOI marker"))
    }
}

/// Decode PNG with zlib checksums enforced and palette, low bit depth
/// and `tRNS` expanded to plain gray/RGB samples.
fn decode_png(bytes: &[u8], limits: &DecodeLimits) -> Result<PixelBuffer, DecodeError> {
    let mut options = png::DecodeOptions::default();
    options.set_ignore_adler32(false);
    options.set_ignore_crc(false);

    let mut decoder = png::Decoder::new_with_options(Cursor::new(bytes), options);
    decoder.set_transformations(png::Transformations::EXPAND);
    decoder.set_limits(png::Limits {
        bytes: limits
            .max_alloc
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX)),
    });

    let mut reader = decoder.read_info().map_err(png_error)?;
    let (width, height) = (reader.info().width, reader.info().height);
    check_dimensions(Format::Png, width, height, limits)?;

    let mut samples = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut samples).map_err(png_error)?;
    samples.truncate(frame.buffer_size());
    reader.finish().map_err(png_error)?;

    let layout = match frame.color_type {
        png::ColorType::Grayscale => ChannelLayout::Gray,
        png::ColorType::GrayscaleAlpha => ChannelLayout::GrayAlpha,
        png::ColorType::Rgb => ChannelLayout::Rgb,
        png::ColorType::Rgba => ChannelLayout::Rgba,
        png::ColorType::Indexed => {
            return Err(corrupt(Format::Png, "palette was not expanded"));
        }
    };
    let bytes_per_channel = match frame.bit_depth {
        png::BitDepth::Sixteen => {
            // PNG stores 16-bit samples big-endian.
            for pair in samples.chunks_exact_mut(2) {
                let value = u16::from_be_bytes([pair[0], pair[1]]);
                pair.copy_from_slice(&value.to_ne_bytes());
            }
            2
        }
        _ => 1,
    };

    PixelBuffer::new(frame.width, frame.height, layout, bytes_per_channel, samples)
        .ok_or_else(|| corrupt(Format::Png, "decoded sample count does not match dimensions"))
}

fn png_error(err: png::DecodingError) -> DecodeError {
    match err {
        png::DecodingError::LimitsExceeded => DecodeError::LimitsExceeded {
            format: Format::Png,
            reason: err.to_string(),
        },
        other => corrupt(Format::Png, other.to_string()),
    }
}

fn check_dimensions(
    format: Format,
    width: u32,
    height: u32,
    limits: &DecodeLimits,
) -> Result<(), DecodeError> {
    let too_wide = limits.max_width.is_some_and(|max| width > max);
    let too_tall = limits.max_height.is_some_and(|max| height > max);
    if too_wide || too_tall {
        return Err(DecodeError::LimitsExceeded {
            format,
            reason: format!("{width}x{height} is larger than the allowed size"),
        });
    }
    Ok(())
}

fn decode_jpeg(bytes: &[u8], limits: &DecodeLimits) -> Result<PixelBuffer, DecodeError> {
    let mut reader = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Jpeg);
    reader.limits(to_image_limits(limits));
    let image = reader
        .decode()
        .map_err(|err| decode_error(Format::Jpeg, err))?;

    into_pixel_buffer(image)
        .ok_or_else(|| corrupt(Format::Jpeg, "decoded sample count does not match dimensions"))
}

/// Encode a buffer into the target container.
///
/// `jpeg_quality` (1 to 100) is only used for JPEG.
///
/// # Errors
///
/// Returns [`EncodeError::UnsupportedChannelLayout`] if the target cannot
/// store the buffer's layout or sample width; the caller must convert
/// the buffer first rather than have channels dropped.
/// Returns [`EncodeError::EncodeFailure`] if the encoder fails.
pub fn encode(
    buffer: PixelBuffer,
    target: Format,
    jpeg_quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    let layout = buffer.layout();
    let bytes_per_channel = buffer.bytes_per_channel();
    if !target.supports(layout, bytes_per_channel) {
        return Err(EncodeError::UnsupportedChannelLayout {
            format: target,
            layout,
            bits: bytes_per_channel * 8,
        });
    }

    let (width, height) = (buffer.width(), buffer.height());
    let color_type = extended_color_type(layout, bytes_per_channel);
    let samples = buffer.into_samples();

    let mut out = Vec::new();
    let result = match target {
        Format::Png => {
            PngEncoder::new(&mut out).write_image(&samples, width, height, color_type)
        }
        Format::Jpeg => JpegEncoder::new_with_quality(&mut out, jpeg_quality)
            .write_image(&samples, width, height, color_type),
    };
    // Layout support was checked above, so anything left is an encoder fault.
    result.map_err(|err| EncodeError::EncodeFailure {
        format: target,
        reason: err.to_string(),
    })?;

    tracing::debug!(format = %target, len = out.len(), "encoded image");
    Ok(out)
}

fn to_image_limits(limits: &DecodeLimits) -> image::Limits {
    let mut out = image::Limits::no_limits();
    out.max_image_width = limits.max_width;
    out.max_image_height = limits.max_height;
    out.max_alloc = limits.max_alloc;
    out
}

fn decode_error(format: Format, err: ImageError) -> DecodeError {
    match err {
        ImageError::Limits(e) => DecodeError::LimitsExceeded {
            format,
            reason: e.to_string(),
        },
        other => corrupt(format, other.to_string()),
    }
}

const fn extended_color_type(layout: ChannelLayout, bytes_per_channel: u8) -> ExtendedColorType {
    match (layout, bytes_per_channel) {
        (ChannelLayout::Gray, 1) => ExtendedColorType::L8,
        (ChannelLayout::GrayAlpha, 1) => ExtendedColorType::La8,
        (ChannelLayout::Rgb, 1) => ExtendedColorType::Rgb8,
        (ChannelLayout::Rgba, 1) => ExtendedColorType::Rgba8,
        (ChannelLayout::Gray, _) => ExtendedColorType::L16,
        (ChannelLayout::GrayAlpha, _) => ExtendedColorType::La16,
        (ChannelLayout::Rgb, _) => ExtendedColorType::Rgb16,
        (ChannelLayout::Rgba, _) => ExtendedColorType::Rgba16,
    }
}

/// Flatten 16-bit samples to native-endian bytes.
fn ne_bytes(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
}

/// Move a decoded image into a [`PixelBuffer`], keeping its layout and
/// sample width. Float images (never produced by the JPEG decoder) are
/// narrowed to 8-bit RGBA.
fn into_pixel_buffer(image: DynamicImage) -> Option<PixelBuffer> {
    let (width, height) = (image.width(), image.height());
    let (layout, bytes_per_channel, samples) = match image {
        DynamicImage::ImageLuma8(img) => (ChannelLayout::Gray, 1, img.into_raw()),
        DynamicImage::ImageLumaA8(img) => (ChannelLayout::GrayAlpha, 1, img.into_raw()),
        DynamicImage::ImageRgb8(img) => (ChannelLayout::Rgb, 1, img.into_raw()),
        DynamicImage::ImageRgba8(img) => (ChannelLayout::Rgba, 1, img.into_raw()),
        DynamicImage::ImageLuma16(img) => (ChannelLayout::Gray, 2, ne_bytes(img.as_raw())),
        DynamicImage::ImageLumaA16(img) => (ChannelLayout::GrayAlpha, 2, ne_bytes(img.as_raw())),
        DynamicImage::ImageRgb16(img) => (ChannelLayout::Rgb, 2, ne_bytes(img.as_raw())),
        DynamicImage::ImageRgba16(img) => (ChannelLayout::Rgba, 2, ne_bytes(img.as_raw())),
        other => (ChannelLayout::Rgba, 1, other.to_rgba8().into_raw()),
    };
    PixelBuffer::new(width, height, layout, bytes_per_channel, samples)
}
