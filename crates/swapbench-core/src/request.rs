//! Provider request builder.
//!
//! Maps one canonical set of swap options onto the wire shape each
//! provider expects. Segmind v2 and v4/v4.3 disagree on field names
//! (`source_img` vs `source_image`, `input_faces_index` vs
//! `target_face_index`); Thortful swaps onto a stored card template
//! instead of a target upload.

use crate::types::{DetectionOrder, ModelType, Provider};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("unknown provider: {0:?} (expected v2, v4, v4.3 or thortful)")]
    UnknownProvider(String),
    #[error("provider {0} needs a card template id")]
    MissingTemplate(Provider),
    #[error("invalid {field}: {value:?}")]
    InvalidOption { field: &'static str, value: String },
}

/// Provider-independent swap options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOptions {
    /// Which detected face in the source image to read.
    pub source_face_index: u32,
    /// Which detected face in the target image to replace.
    pub target_face_index: u32,
    /// Face restoration model (v2 only, e.g. `codeformer-v0.1.0.pth`).
    pub restoration_model: Option<String>,
    pub detection_order: Option<DetectionOrder>,
    pub model_type: Option<ModelType>,
    /// Thortful card template to swap onto.
    pub template_id: Option<String>,
}

impl SwapOptions {
    /// Check that these options can be sent to `provider`.
    pub fn check(&self, provider: Provider) -> Result<(), BuildError> {
        if provider == Provider::Thortful
            && self.template_id.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            return Err(BuildError::MissingTemplate(provider));
        }
        Ok(())
    }
}

/// A fully specified swap for one provider. Immutable once built.
#[derive(Clone)]
pub struct SwapRequest {
    provider: Provider,
    source: Arc<[u8]>,
    target: Arc<[u8]>,
    options: SwapOptions,
}

impl fmt::Debug for SwapRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapRequest")
            .field("provider", &self.provider)
            .field("source_len", &self.source.len())
            .field("target_len", &self.target.len())
            .field("options", &self.options)
            .finish()
    }
}

impl SwapRequest {
    pub fn build(
        provider: Provider,
        source: Arc<[u8]>,
        target: Arc<[u8]>,
        options: &SwapOptions,
    ) -> Result<Self, BuildError> {
        options.check(provider)?;
        Ok(Self {
            provider,
            source,
            target,
            options: options.clone(),
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn options(&self) -> &SwapOptions {
        &self.options
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn target(&self) -> &[u8] {
        &self.target
    }

    /// Render the provider-specific JSON body. Pure: the same request
    /// always yields the same payload.
    pub fn payload(&self) -> WirePayload {
        let o = &self.options;
        match self.provider {
            Provider::V2 => WirePayload::V2(V2Payload {
                source_img: STANDARD.encode(&self.source),
                target_img: STANDARD.encode(&self.target),
                source_faces_index: o.source_face_index,
                input_faces_index: o.target_face_index,
                face_restore: o.restoration_model.clone(),
                base64: false,
            }),
            Provider::V4 | Provider::V43 => {
                let v43 = self.provider == Provider::V43;
                WirePayload::V4(V4Payload {
                    source_image: STANDARD.encode(&self.source),
                    target_image: STANDARD.encode(&self.target),
                    source_face_index: o.source_face_index,
                    target_face_index: o.target_face_index,
                    detection_face_order: o.detection_order.map(|d| d.as_str()),
                    model_type: o.model_type.unwrap_or_default().as_str(),
                    swap_type: "face",
                    hardware_type: (!v43).then_some("cost"),
                    style_type: v43.then_some("normal"),
                    base64: false,
                })
            }
            Provider::Thortful => {
                // check() guarantees a template id
                let card = o.template_id.clone().unwrap_or_default();
                WirePayload::Thortful(ThortfulPayload {
                    source_image: STANDARD.encode(&self.source),
                    target_card_id_camel: card.clone(),
                    target_card_id: card,
                })
            }
        }
    }
}

/// JSON body for one provider call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WirePayload {
    V2(V2Payload),
    V4(V4Payload),
    Thortful(ThortfulPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct V2Payload {
    pub source_img: String,
    pub target_img: String,
    pub source_faces_index: u32,
    pub input_faces_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_restore: Option<String>,
    pub base64: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct V4Payload {
    pub source_image: String,
    pub target_image: String,
    pub source_face_index: u32,
    pub target_face_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_face_order: Option<&'static str>,
    pub model_type: &'static str,
    pub swap_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_type: Option<&'static str>,
    pub base64: bool,
}

/// Thortful accepts the card id under either casing; send both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThortfulPayload {
    pub source_image: String,
    #[serde(rename = "targetCardId")]
    pub target_card_id_camel: String,
    pub target_card_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn images() -> (Arc<[u8]>, Arc<[u8]>) {
        (Arc::from(&b"source"[..]), Arc::from(&b"target"[..]))
    }

    fn to_json(req: &SwapRequest) -> Value {
        serde_json::to_value(req.payload()).unwrap()
    }

    #[test]
    fn test_v2_field_names() {
        let (s, t) = images();
        let opts = SwapOptions {
            source_face_index: 1,
            target_face_index: 2,
            restoration_model: Some("codeformer-v0.1.0.pth".into()),
            ..Default::default()
        };
        let json = to_json(&SwapRequest::build(Provider::V2, s, t, &opts).unwrap());
        assert_eq!(json["source_img"], STANDARD.encode(b"source"));
        assert_eq!(json["target_img"], STANDARD.encode(b"target"));
        assert_eq!(json["source_faces_index"], 1);
        assert_eq!(json["input_faces_index"], 2);
        assert_eq!(json["face_restore"], "codeformer-v0.1.0.pth");
        assert_eq!(json["base64"], false);
        assert!(json.get("source_image").is_none());
    }

    #[test]
    fn test_v2_omits_missing_restoration() {
        let (s, t) = images();
        let json = to_json(&SwapRequest::build(Provider::V2, s, t, &SwapOptions::default()).unwrap());
        assert!(json.get("face_restore").is_none());
    }

    #[test]
    fn test_v4_and_v43_differ_only_in_extras() {
        let (s, t) = images();
        let opts = SwapOptions {
            detection_order: Some(DetectionOrder::BigToSmall),
            ..Default::default()
        };
        let v4 = to_json(&SwapRequest::build(Provider::V4, s.clone(), t.clone(), &opts).unwrap());
        let v43 = to_json(&SwapRequest::build(Provider::V43, s, t, &opts).unwrap());

        assert_eq!(v4["source_image"], v43["source_image"]);
        assert_eq!(v4["detection_face_order"], "big_to_small");
        assert_eq!(v4["model_type"], "speed");
        assert_eq!(v4["swap_type"], "face");
        assert_eq!(v4["hardware_type"], "cost");
        assert!(v4.get("style_type").is_none());
        assert_eq!(v43["style_type"], "normal");
        assert!(v43.get("hardware_type").is_none());
    }

    #[test]
    fn test_thortful_requires_template() {
        let (s, t) = images();
        let err = SwapRequest::build(Provider::Thortful, s.clone(), t.clone(), &SwapOptions::default())
            .unwrap_err();
        assert_eq!(err, BuildError::MissingTemplate(Provider::Thortful));

        let blank = SwapOptions {
            template_id: Some("  ".into()),
            ..Default::default()
        };
        assert!(SwapRequest::build(Provider::Thortful, s, t, &blank).is_err());
    }

    #[test]
    fn test_thortful_sends_card_id_twice() {
        let (s, t) = images();
        let opts = SwapOptions {
            template_id: Some("67816ae75990fc276575cd07".into()),
            ..Default::default()
        };
        let json = to_json(&SwapRequest::build(Provider::Thortful, s, t, &opts).unwrap());
        assert_eq!(json["targetCardId"], "67816ae75990fc276575cd07");
        assert_eq!(json["target_card_id"], "67816ae75990fc276575cd07");
        assert!(json.get("target_image").is_none());
    }

    #[test]
    fn test_build_is_pure() {
        let (s, t) = images();
        let opts = SwapOptions {
            source_face_index: 3,
            model_type: Some(ModelType::Quality),
            ..Default::default()
        };
        for provider in [Provider::V2, Provider::V4, Provider::V43] {
            let a = SwapRequest::build(provider, s.clone(), t.clone(), &opts).unwrap();
            let b = SwapRequest::build(provider, s.clone(), t.clone(), &opts).unwrap();
            assert_eq!(a.payload(), b.payload());
        }
    }
}
