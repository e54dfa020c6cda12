//! Result normalizer.
//!
//! Providers return the swapped image in one of several encodings:
//! raw bytes (Segmind with `base64: false`), or a JSON object whose
//! image field holds an absolute URL, a `data:` URL, or bare base64.
//! Everything is reduced to a single [`ImageRef`] plus whatever timing
//! and billing metadata the provider reported.

use crate::types::{ImageRef, ResponseShape};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use serde_json::Value;
use thiserror::Error;

/// JSON keys probed for the output image, in priority order.
const IMAGE_KEYS: [&str; 5] = ["image", "output", "result_url", "image_url", "url"];

/// Provider headers carrying per-request metrics.
pub const GENERATION_TIME_HEADER: &str = "x-generation-time";
pub const REMAINING_CREDITS_HEADER: &str = "x-remaining-credits";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("response body is empty")]
    EmptyBody,
    #[error("response is neither an image nor JSON (content-type {0})")]
    UnrecognizedBody(String),
    #[error("no image field in response (keys: {0})")]
    MissingImage(String),
    #[error("image field is not a string")]
    NotAString,
    #[error("image field is empty")]
    EmptyImage,
    #[error("invalid base64 image: {0}")]
    InvalidBase64(String),
    #[error("decoded image field is not a recognizable image ({0} bytes)")]
    NotAnImage(usize),
}

/// A 2xx response as received, before interpretation.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub generation_time: Option<String>,
    pub remaining_credits: Option<String>,
    pub request_id: Option<String>,
    pub body: Vec<u8>,
}

/// A successful response reduced to display-ready form.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    pub status: u16,
    pub image: ImageRef,
    pub inference_seconds: Option<f64>,
    pub cost_units: Option<f64>,
    pub remaining_credits: Option<f64>,
    pub request_id: Option<String>,
}

/// Interpret a 2xx response body for a provider with the given shape.
pub fn normalize(raw: &RawResponse, shape: ResponseShape) -> Result<NormalizedResponse, NormalizeError> {
    if raw.body.is_empty() {
        return Err(NormalizeError::EmptyBody);
    }

    let content_type = raw
        .content_type
        .as_deref()
        .unwrap_or("")
        .to_ascii_lowercase();
    let declared_json = content_type.contains("json");
    let is_image = content_type.starts_with("image/")
        || (shape == ResponseShape::Binary
            && !declared_json
            && image::guess_format(&raw.body).is_ok());

    let mut inference_seconds = raw.generation_time.as_deref().and_then(parse_number);
    let mut cost_units = None;

    let image = if is_image {
        ImageRef::Bytes(raw.body.clone())
    } else {
        let json: Value = serde_json::from_slice(&raw.body).map_err(|_| {
            NormalizeError::UnrecognizedBody(if content_type.is_empty() {
                "unset".to_string()
            } else {
                content_type.clone()
            })
        })?;

        inference_seconds = inference_seconds.or_else(|| json_number(&json, "generation_time"));
        cost_units = json_number(&json, "cost").or_else(|| json_number(&json, "credits_used"));

        let field = IMAGE_KEYS
            .iter()
            .find_map(|k| json.get(*k))
            .ok_or_else(|| NormalizeError::MissingImage(describe_keys(&json)))?;
        let value = field.as_str().ok_or(NormalizeError::NotAString)?;
        decode_image_value(value)?
    };

    Ok(NormalizedResponse {
        status: raw.status,
        image,
        inference_seconds,
        cost_units,
        remaining_credits: raw.remaining_credits.as_deref().and_then(parse_number),
        request_id: raw.request_id.clone().filter(|s| !s.is_empty()),
    })
}

/// Decode one image field value: absolute URL, data URL, or bare base64.
pub fn decode_image_value(value: &str) -> Result<ImageRef, NormalizeError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(NormalizeError::EmptyImage);
    }

    if value.starts_with("http://") || value.starts_with("https://") {
        return Ok(ImageRef::Url(value.to_string()));
    }

    let encoded = match value.strip_prefix("data:") {
        Some(rest) => match rest.find("base64,") {
            Some(pos) => &rest[pos + "base64,".len()..],
            None => {
                return Err(NormalizeError::InvalidBase64(
                    "data URL is not base64-encoded".to_string(),
                ))
            }
        },
        None => value,
    };

    let bytes = decode_base64(encoded)?;
    if bytes.is_empty() {
        return Err(NormalizeError::EmptyImage);
    }
    if image::guess_format(&bytes).is_err() {
        return Err(NormalizeError::NotAnImage(bytes.len()));
    }
    Ok(ImageRef::Bytes(bytes))
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, NormalizeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(&compact)
        .or_else(|_| STANDARD_NO_PAD.decode(&compact))
        .map_err(|e| NormalizeError::InvalidBase64(e.to_string()))
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().trim_end_matches('s').trim().parse().ok()
}

fn json_number(json: &Value, key: &str) -> Option<f64> {
    match json.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn describe_keys(json: &Value) -> String {
    match json.as_object() {
        Some(map) if !map.is_empty() => map.keys().cloned().collect::<Vec<_>>().join(", "),
        Some(_) => "none".to_string(),
        None => "not an object".to_string(),
    }
}
