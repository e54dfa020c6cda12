use crate::request::{BuildError, SwapOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A face-swap API version under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    /// Segmind `faceswap-v2`.
    #[serde(rename = "v2")]
    V2,
    /// Segmind `faceswap-v4`.
    #[serde(rename = "v4")]
    V4,
    /// Segmind `faceswap-v4.3`.
    #[serde(rename = "v4.3")]
    V43,
    /// Thortful's hosted wrapper, which swaps onto a card template.
    #[serde(rename = "thortful")]
    Thortful,
}

impl Provider {
    pub const ALL: [Provider; 4] = [Provider::V2, Provider::V4, Provider::V43, Provider::Thortful];

    /// Name used in logs and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::V2 => "v2",
            Provider::V4 => "v4",
            Provider::V43 => "v4.3",
            Provider::Thortful => "thortful",
        }
    }

    /// Filename-safe name for result artifacts.
    pub fn slug(&self) -> &'static str {
        match self {
            Provider::V2 => "v2",
            Provider::V4 => "v4",
            Provider::V43 => "v43",
            Provider::Thortful => "thortful",
        }
    }

    /// Segmind providers share one API key and one credit balance.
    pub fn is_segmind(&self) -> bool {
        !matches!(self, Provider::Thortful)
    }

    /// How the provider encodes the swapped image in a 2xx response.
    pub fn response_shape(&self) -> ResponseShape {
        if self.is_segmind() {
            ResponseShape::Binary
        } else {
            ResponseShape::Json
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v2" => Ok(Provider::V2),
            "v4" => Ok(Provider::V4),
            "v4.3" | "v43" | "v4_3" => Ok(Provider::V43),
            "thortful" => Ok(Provider::Thortful),
            other => Err(BuildError::UnknownProvider(other.to_string())),
        }
    }
}

/// Expected encoding of a successful provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Raw image bytes in the body (Segmind with `base64: false`).
    Binary,
    /// JSON object carrying a base64 image, data URL or result URL.
    Json,
}

/// Order in which a provider numbers the faces it detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionOrder {
    LeftToRight,
    TopToBottom,
    BigToSmall,
}

impl DetectionOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionOrder::LeftToRight => "left_to_right",
            DetectionOrder::TopToBottom => "top_to_bottom",
            DetectionOrder::BigToSmall => "big_to_small",
        }
    }
}

impl FromStr for DetectionOrder {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "left_to_right" => Ok(DetectionOrder::LeftToRight),
            "top_to_bottom" => Ok(DetectionOrder::TopToBottom),
            "big_to_small" => Ok(DetectionOrder::BigToSmall),
            other => Err(BuildError::InvalidOption {
                field: "detection_order",
                value: other.to_string(),
            }),
        }
    }
}

/// Segmind v4 speed/quality trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    #[default]
    Speed,
    Quality,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Speed => "speed",
            ModelType::Quality => "quality",
        }
    }
}

impl FromStr for ModelType {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speed" => Ok(ModelType::Speed),
            "quality" => Ok(ModelType::Quality),
            other => Err(BuildError::InvalidOption {
                field: "model_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Display-ready reference to a swapped image.
#[derive(Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Decoded image bytes.
    Bytes(Vec<u8>),
    /// Absolute URL the provider hosts the result at.
    Url(String),
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ImageRef::Url(u) => f.debug_tuple("Url").field(u).finish(),
        }
    }
}

/// Coarse failure class, logged alongside the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials rejected or missing; refresh out of band.
    Auth,
    /// Client-side timeout or HTTP 408.
    Timeout,
    /// 5xx, 429 or connection failure.
    Transient,
    /// 2xx response whose image could not be extracted.
    Normalization,
    /// Request could not be built or the client could not be set up.
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transient => "transient",
            ErrorKind::Normalization => "normalization",
            ErrorKind::Config => "config",
        }
    }
}

/// Outcome of one swap attempt. Produced exactly once per attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapResult {
    pub success: bool,
    pub image: Option<ImageRef>,
    pub cost_units: Option<f64>,
    /// Provider-reported processing time.
    pub inference_seconds: Option<f64>,
    /// Time from request start to response (or failure) on our side.
    pub wall_clock_millis: u64,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub http_status: Option<u16>,
    pub remaining_credits: Option<f64>,
    pub request_id: Option<String>,
}

/// One logged attempt at a face swap, successful or not. Never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRecord {
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    pub target_id: String,
    pub provider: Provider,
    /// 1-based attempt number within this combination.
    pub attempt: u32,
    pub options: SwapOptions,
    pub result: SwapResult,
}
