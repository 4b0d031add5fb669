#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]
#![allow(clippy::module_name_repetitions)]

//! Text and image embedding pipelines backing widget similarity.
//!
//! The inference sessions themselves are pluggable: callers supply a
//! [`TextModel`] / [`ImageModel`] (typically an ONNX runtime session) and
//! this crate wraps them with the tokenizer, attribute normalization,
//! icon preprocessing, and pooling the similarity engine depends on.

/// Icon decoding and tensor preprocessing.
pub mod icon;
/// Attribute normalization for resource ids and activity names.
pub mod normalize;
/// Latin/CJK segmentation and WordPiece tokenization.
pub mod tokenizer;
/// Text encoder pipeline with masked mean pooling.
pub mod text;
/// Newline-separated vocabulary files.
pub mod vocab;

pub use icon::{decode_icon, IconError, IconTensor, ImageEncoder, ImageModel, ClipImageEncoder};
pub use normalize::AttributeNormalizer;
pub use text::{BertTextEncoder, EncodedText, TextEncoder, TextModel};
pub use tokenizer::{ChineseSegmenter, WordPieceTokenizer};
pub use vocab::Vocabulary;

/// Cosine similarity of two vectors.
///
/// Empty operands, mismatched lengths, and zero-norm vectors all yield
/// `0.0` so a degenerate embedding never poisons a composite score.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
