#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]
#![allow(clippy::module_name_repetitions)]

//! Weighted composite similarity over widget attributes.
//!
//! Two widgets are compared across four fields (displayed text,
//! activity name, resource id, and icon) with encoder-based cosine
//! scores where encoders are available and deterministic string
//! fallbacks where they are not.

use std::sync::Arc;

use embedding::{cosine_similarity, decode_icon, AttributeNormalizer, ImageEncoder, TextEncoder};
use serde::{Deserialize, Serialize};

/// Similarity at or above this value counts as a cross-platform match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

/// The four attributes a widget is matched on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetDescriptor {
    /// Displayed text.
    pub text: String,
    /// Fully qualified activity class name.
    pub activity: String,
    /// Android resource id.
    pub resource_id: String,
    /// Base64-encoded raster icon, empty when absent.
    pub icon_base64: String,
}

impl WidgetDescriptor {
    /// Creates a descriptor without an icon.
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        activity: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            activity: activity.into(),
            resource_id: resource_id.into(),
            icon_base64: String::new(),
        }
    }

    /// Attaches an icon payload.
    #[must_use]
    pub fn with_icon(mut self, icon_base64: impl Into<String>) -> Self {
        self.icon_base64 = icon_base64.into();
        self
    }

    /// True when the descriptor carries an icon payload.
    #[must_use]
    pub fn has_icon(&self) -> bool {
        !self.icon_base64.is_empty()
    }

    /// True when no identifying field is populated.
    ///
    /// Such descriptors cannot be matched and are skipped by callers.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.is_empty() && self.resource_id.is_empty() && self.activity.is_empty()
    }
}

/// Field weights applied to the component similarities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldWeights {
    /// Weight of the displayed-text component.
    pub text: f64,
    /// Weight of the resource-id component.
    pub resource_id: f64,
    /// Weight of the activity-name component.
    pub activity: f64,
    /// Weight of the icon component.
    pub icon: f64,
}

/// Weights used when both widgets carry a decodable icon.
pub const WEIGHTS_WITH_ICON: FieldWeights = FieldWeights {
    text: 0.35,
    resource_id: 0.20,
    activity: 0.10,
    icon: 0.35,
};

/// Weights used when at least one icon is missing or undecodable.
pub const WEIGHTS_WITHOUT_ICON: FieldWeights = FieldWeights {
    text: 0.40,
    resource_id: 0.20,
    activity: 0.40,
    icon: 0.0,
};

/// Composes per-field similarities into one score in `[0, 1]`.
///
/// Both encoders are optional; with neither installed the engine runs
/// entirely on the string fallbacks and stays fully deterministic.
#[derive(Clone, Default)]
pub struct SimilarityEngine {
    text_encoder: Option<Arc<dyn TextEncoder>>,
    image_encoder: Option<Arc<dyn ImageEncoder>>,
    normalizer: AttributeNormalizer,
}

impl std::fmt::Debug for SimilarityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityEngine")
            .field("text_encoder", &self.text_encoder.is_some())
            .field("image_encoder", &self.image_encoder.is_some())
            .finish()
    }
}

impl SimilarityEngine {
    /// Creates an engine with no encoders (fallback rules only).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the text encoder.
    #[must_use]
    pub fn with_text_encoder(mut self, encoder: Arc<dyn TextEncoder>) -> Self {
        self.text_encoder = Some(encoder);
        self
    }

    /// Installs the image encoder.
    #[must_use]
    pub fn with_image_encoder(mut self, encoder: Arc<dyn ImageEncoder>) -> Self {
        self.image_encoder = Some(encoder);
        self
    }

    /// Overrides the attribute normalizer.
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: AttributeNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Composite similarity of two widget descriptors.
    #[must_use]
    pub fn widget_similarity(&self, a: &WidgetDescriptor, b: &WidgetDescriptor) -> f64 {
        let icon = self.icon_component(a, b);
        let weights = if icon.is_some() {
            WEIGHTS_WITH_ICON
        } else {
            WEIGHTS_WITHOUT_ICON
        };

        let text = self.text_component(&a.text, &b.text);
        let resource = self.text_component(
            &self.normalizer.resource_id(&a.resource_id),
            &self.normalizer.resource_id(&b.resource_id),
        );
        let activity = self.text_component(
            &self.normalizer.activity(&a.activity),
            &self.normalizer.activity(&b.activity),
        );

        let score = weights.text * text
            + weights.resource_id * resource
            + weights.activity * activity
            + weights.icon * icon.unwrap_or(0.0);
        tracing::debug!(
            text,
            resource,
            activity,
            icon = icon.unwrap_or(0.0),
            score,
            "widget similarity"
        );
        score
    }

    /// Similarity of one text field, with empty-field short circuits.
    fn text_component(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if let Some(encoder) = &self.text_encoder {
            match (encoder.encode(a), encoder.encode(b)) {
                (Ok(left), Ok(right)) if !left.is_empty() && !right.is_empty() => {
                    return cosine_similarity(&left, &right).clamp(0.0, 1.0);
                }
                (left, right) => {
                    if let Err(err) = left.and(right) {
                        tracing::warn!(error = %err, "text encoder failed, using fallback");
                    }
                }
            }
        }
        lexical_fallback(a, b)
    }

    /// Icon similarity, `None` when the icon weight schedule must not apply.
    fn icon_component(&self, a: &WidgetDescriptor, b: &WidgetDescriptor) -> Option<f64> {
        if !a.has_icon() || !b.has_icon() {
            return None;
        }
        let encoder = self.image_encoder.as_ref()?;
        let left = match decode_icon(&a.icon_base64) {
            Ok(tensor) => tensor,
            Err(err) => {
                tracing::warn!(error = %err, "icon decode failed");
                return None;
            }
        };
        let right = match decode_icon(&b.icon_base64) {
            Ok(tensor) => tensor,
            Err(err) => {
                tracing::warn!(error = %err, "icon decode failed");
                return None;
            }
        };
        match (encoder.encode(&left), encoder.encode(&right)) {
            (Ok(lhs), Ok(rhs)) => Some(cosine_similarity(&lhs, &rhs).clamp(0.0, 1.0)),
            (left, right) => {
                if let Err(err) = left.and(right) {
                    tracing::warn!(error = %err, "image encoder failed");
                }
                None
            }
        }
    }
}

/// Deterministic string comparison used when no encoder is usable:
/// equality, containment either way, then character-positional overlap.
fn lexical_fallback(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.contains(b) || b.contains(a) {
        return 0.8;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());
    if max_len == 0 {
        return 1.0;
    }
    let same = a_chars
        .iter()
        .zip(b_chars.iter())
        .filter(|(x, y)| x == y)
        .count();
    same as f64 / max_len as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use embedding::IconTensor;

    /// Encoder mapping each string to a deterministic direction.
    struct HashedTextEncoder;

    impl TextEncoder for HashedTextEncoder {
        fn encode(&self, text: &str) -> Result<Vec<f32>> {
            let mut vector = vec![0.0_f32; 8];
            for (index, byte) in text.bytes().enumerate() {
                vector[index % 8] += f32::from(byte) / 255.0;
            }
            Ok(vector)
        }
    }

    struct FailingTextEncoder;

    impl TextEncoder for FailingTextEncoder {
        fn encode(&self, _text: &str) -> Result<Vec<f32>> {
            anyhow::bail!("session unavailable")
        }
    }

    struct ConstantImageEncoder;

    impl ImageEncoder for ConstantImageEncoder {
        fn encode(&self, _icon: &IconTensor) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.5])
        }
    }

    fn tiny_png() -> String {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        use std::io::Cursor;
        let img = image::ImageBuffer::from_pixel(2, 2, image::Rgb([10_u8, 20, 30]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        STANDARD.encode(bytes)
    }

    #[test]
    fn both_empty_fields_are_identical() {
        let engine = SimilarityEngine::new();
        let a = WidgetDescriptor::default();
        let b = WidgetDescriptor::default();
        // text 1.0, resource 1.0, activity 1.0 under no-icon weights.
        assert!((engine.widget_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn one_empty_field_scores_zero_for_that_field() {
        let engine = SimilarityEngine::new();
        let a = WidgetDescriptor::new("Play", "", "");
        let b = WidgetDescriptor::new("", "", "");
        // text 0.0, resource 1.0, activity 1.0 -> 0.2 + 0.4.
        assert!((engine.widget_similarity(&a, &b) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn identical_descriptors_score_one_without_encoders() {
        let engine = SimilarityEngine::new();
        let a = WidgetDescriptor::new("Play", "com.app.MainActivity", "com.app:id/play_btn");
        assert!((engine.widget_similarity(&a, &a.clone()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn normalized_resource_ids_match_across_toolkit_noise() {
        let engine = SimilarityEngine::new();
        let a = WidgetDescriptor::new("Play", "com.a.MainActivity", "com.a:id/play_button");
        let b = WidgetDescriptor::new("Play", "com.b.MainActivity", "com.b:id/play_btn");
        // All three text components normalize to equality.
        assert!((engine.widget_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_icon_caps_the_score() {
        let engine = SimilarityEngine::new()
            .with_image_encoder(Arc::new(ConstantImageEncoder));
        let a = WidgetDescriptor::new("Play", "x.A", "p").with_icon(tiny_png());
        let b = WidgetDescriptor::new("Play", "x.A", "p");
        let score = engine.widget_similarity(&a, &b);
        assert!(score <= 0.4 + 0.2 + 0.4 + 1e-9);
    }

    #[test]
    fn both_icons_shift_the_weight_schedule() {
        let engine = SimilarityEngine::new()
            .with_image_encoder(Arc::new(ConstantImageEncoder));
        let icon = tiny_png();
        let a = WidgetDescriptor::new("Play", "x.A", "p").with_icon(icon.clone());
        let b = WidgetDescriptor::new("Play", "x.A", "p").with_icon(icon);
        // Identical everywhere, icon cosine 1.0 -> full score 1.0.
        assert!((engine.widget_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn undecodable_icon_falls_back_to_no_icon_weights() {
        let engine = SimilarityEngine::new()
            .with_image_encoder(Arc::new(ConstantImageEncoder));
        let a = WidgetDescriptor::new("Play", "x.A", "p").with_icon("###");
        let b = WidgetDescriptor::new("Play", "x.A", "p").with_icon(tiny_png());
        assert!((engine.widget_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn encoder_failure_uses_lexical_fallback() {
        let engine = SimilarityEngine::new().with_text_encoder(Arc::new(FailingTextEncoder));
        let a = WidgetDescriptor::new("Play music", "", "");
        let b = WidgetDescriptor::new("Play", "", "");
        // Containment -> 0.8 on text; empties are 1.0.
        let expected = 0.4 * 0.8 + 0.2 + 0.4;
        assert!((engine.widget_similarity(&a, &b) - expected).abs() < 1e-9);
    }

    #[test]
    fn hashed_encoder_scores_identical_text_at_one() {
        let engine = SimilarityEngine::new().with_text_encoder(Arc::new(HashedTextEncoder));
        let a = WidgetDescriptor::new("Play", "", "");
        let b = WidgetDescriptor::new("Play", "", "");
        assert!((engine.widget_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn positional_overlap_lands_between_zero_and_one() {
        let score = lexical_fallback("play_btn", "play_button");
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn blank_descriptor_detection() {
        assert!(WidgetDescriptor::default().is_blank());
        assert!(!WidgetDescriptor::new("Play", "", "").is_blank());
    }
}
