//! WebAssembly entry points for monochrome.
//!
//! Compiles to a standalone WASM module exposing the conversion façade
//! to JavaScript. The page passes the base64 (or data-URL) string read
//! from an uploaded file and gets back a data URL it can assign to an
//! `<img src>`.
//!
//! Failures are thrown as a JS `Error` whose `name` is the
//! [`ErrorKind`] tag (e.g. `"CorruptData"`) and whose `message` is the
//! human-readable description, so callers can branch on the class of
//! failure without parsing text. A page that fails to load this module
//! at all should report `"EngineUnavailable"` in the same shape.
//!
//! Conversion is synchronous; pages that want to stay responsive on
//! large uploads should call it from a `Worker`.

use monochrome_core::{ConversionError, ConvertOptions, ErrorKind};
use wasm_bindgen::prelude::*;

/// Module initialization: route Rust panics to the browser console.
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

/// Convert a base64 or `data:image/...;base64,` PNG/JPEG to a grayscale
/// data URL using the default options.
///
/// # Errors
///
/// Throws a JS `Error` named after the [`ErrorKind`] of the failure.
#[wasm_bindgen]
pub fn grayscale(input: &str) -> Result<String, JsValue> {
    monochrome_core::convert(input).map_err(|e| to_js_error(&e))
}

/// Like [`grayscale`], with options given as a JSON-serialized
/// `ConvertOptions` object. Missing fields take their defaults, so
/// `'{"target":"Png"}'` is valid.
///
/// # Errors
///
/// Throws a JS `Error` named `InvalidOptions` if the JSON cannot be
/// parsed, or named after the [`ErrorKind`] of a conversion failure.
#[wasm_bindgen(js_name = grayscaleWithOptions)]
pub fn grayscale_with_options(input: &str, options_json: &str) -> Result<String, JsValue> {
    let options = parse_options(options_json).map_err(|e| to_js_error(&e))?;
    monochrome_core::convert_with(input, &options).map_err(|e| to_js_error(&e))
}

/// The `name` a page should give its own error when this module fails
/// to load.
#[wasm_bindgen(js_name = engineUnavailableKind)]
#[must_use]
pub fn engine_unavailable_kind() -> String {
    ErrorKind::EngineUnavailable.as_str().to_owned()
}

/// Parse JSON options, treating an empty string as the defaults.
fn parse_options(json: &str) -> Result<ConvertOptions, ConversionError> {
    if json.trim().is_empty() {
        return Ok(ConvertOptions::default());
    }
    serde_json::from_str(json)
        .map_err(|e| ConversionError::InvalidOptions(format!("failed to parse options: {e}")))
}

fn to_js_error(err: &ConversionError) -> JsValue {
    let js = js_sys::Error::new(&err.to_string());
    js.set_name(err.kind().as_str());
    js.into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use monochrome_core::TargetFormat;

    #[test]
    fn empty_options_are_defaults() {
        assert_eq!(parse_options("").unwrap(), ConvertOptions::default());
        assert_eq!(parse_options("  ").unwrap(), ConvertOptions::default());
    }

    #[test]
    fn partial_options_fill_defaults() {
        let options = parse_options(r#"{"target":"Png","jpeg_quality":70}"#).unwrap();
        assert_eq!(options.target, TargetFormat::Png);
        assert_eq!(options.jpeg_quality, 70);
        assert!(options.png_fallback);
    }

    #[test]
    fn malformed_options_are_invalid_options() {
        let err = parse_options("{target:").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOptions);
    }

    #[test]
    fn engine_unavailable_name() {
        assert_eq!(engine_unavailable_kind(), "EngineUnavailable");
    }
}
