use std::sync::Arc;

use anyhow::{ensure, Result};

use crate::tokenizer::WordPieceTokenizer;

/// A tokenized input ready for a BERT-style model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedText {
    /// Token ids, `[CLS] … [SEP]` padded to the sequence length.
    pub input_ids: Vec<i64>,
    /// 1 for every non-padding position, 0 for padding.
    pub attention_mask: Vec<i64>,
    /// All zeros for single-segment inputs.
    pub token_type_ids: Vec<i64>,
}

impl EncodedText {
    /// Number of non-padding positions.
    #[must_use]
    pub fn active_positions(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }
}

/// A transformer session producing per-position hidden states.
///
/// Implementations wrap an inference runtime (ONNX) configured for
/// sequential, single-threaded execution. `run` returns the last hidden
/// state flattened row-major as `sequence_length × hidden_size`.
pub trait TextModel: Send + Sync {
    /// Runs the model over one encoded input.
    fn run(&self, input: &EncodedText) -> Result<Vec<f32>>;

    /// Width of one hidden-state row.
    fn hidden_size(&self) -> usize;
}

/// Maps text to a fixed-length embedding vector.
pub trait TextEncoder: Send + Sync {
    /// Encodes text into an embedding.
    fn encode(&self, text: &str) -> Result<Vec<f32>>;
}

/// BERT-style sentence encoder: tokenize, run the model, then pool the
/// last hidden state with a masked mean over non-padding positions.
///
/// The CLS vector alone and the unmasked all-positions mean both skew
/// similarity for short widget labels; only the masked mean is valid.
#[derive(Clone)]
pub struct BertTextEncoder {
    tokenizer: WordPieceTokenizer,
    model: Arc<dyn TextModel>,
}

impl std::fmt::Debug for BertTextEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BertTextEncoder")
            .field("tokenizer", &self.tokenizer)
            .field("hidden_size", &self.model.hidden_size())
            .finish()
    }
}

impl BertTextEncoder {
    /// Creates an encoder from a tokenizer and a model session.
    #[must_use]
    pub fn new(tokenizer: WordPieceTokenizer, model: Arc<dyn TextModel>) -> Self {
        Self { tokenizer, model }
    }

    /// Builds the padded id/mask/type-id triple for one input.
    #[must_use]
    pub fn prepare(&self, text: &str) -> EncodedText {
        let length = self.tokenizer.sequence_length();
        let vocab = self.tokenizer.vocab();
        let mut ids = Vec::with_capacity(length);
        ids.push(vocab.cls_id());
        ids.extend(self.tokenizer.token_ids(text));
        ids.push(vocab.sep_id());
        if ids.len() > length {
            ids.truncate(length);
            ids[length - 1] = vocab.sep_id();
        } else {
            ids.resize(length, vocab.pad_id());
        }
        let pad = vocab.pad_id();
        let attention_mask: Vec<i64> = ids.iter().map(|&id| i64::from(id != pad)).collect();
        let token_type_ids = vec![0; length];
        EncodedText {
            input_ids: ids,
            attention_mask,
            token_type_ids,
        }
    }
}

impl TextEncoder for BertTextEncoder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let input = self.prepare(text);
        let hidden = self.model.run(&input)?;
        masked_mean(
            &hidden,
            &input.attention_mask,
            self.model.hidden_size(),
        )
    }
}

/// Mean of the hidden-state rows whose mask bit is set.
fn masked_mean(hidden: &[f32], mask: &[i64], hidden_size: usize) -> Result<Vec<f32>> {
    ensure!(hidden_size > 0, "hidden size must be positive");
    ensure!(
        hidden.len() == mask.len() * hidden_size,
        "hidden state shape {} does not match {} positions x {}",
        hidden.len(),
        mask.len(),
        hidden_size
    );
    let mut pooled = vec![0.0_f32; hidden_size];
    let mut active = 0_usize;
    for (position, &bit) in mask.iter().enumerate() {
        if bit != 1 {
            continue;
        }
        active += 1;
        let row = &hidden[position * hidden_size..(position + 1) * hidden_size];
        for (sum, value) in pooled.iter_mut().zip(row) {
            *sum += value;
        }
    }
    ensure!(active > 0, "no active positions to pool");
    let denom = active as f32;
    for value in &mut pooled {
        *value /= denom;
    }
    Ok(pooled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::Vocabulary;

    struct RampModel {
        hidden_size: usize,
    }

    impl TextModel for RampModel {
        fn run(&self, input: &EncodedText) -> Result<Vec<f32>> {
            // Row i is filled with the value i so pooling is easy to predict.
            let mut out = Vec::with_capacity(input.input_ids.len() * self.hidden_size);
            for position in 0..input.input_ids.len() {
                out.extend(std::iter::repeat(position as f32).take(self.hidden_size));
            }
            Ok(out)
        }

        fn hidden_size(&self) -> usize {
            self.hidden_size
        }
    }

    fn encoder(tokens: &[&str], sequence_length: usize) -> BertTextEncoder {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        for token in tokens {
            writeln!(file, "{token}").unwrap();
        }
        let vocab = Arc::new(Vocabulary::load(&path).unwrap());
        let tokenizer = WordPieceTokenizer::new(vocab).with_sequence_length(sequence_length);
        BertTextEncoder::new(tokenizer, Arc::new(RampModel { hidden_size: 4 }))
    }

    #[test]
    fn prepare_pads_and_masks() {
        let encoder = encoder(&["[PAD]", "[UNK]", "[CLS]", "[SEP]", "play"], 8);
        let input = encoder.prepare("play");
        assert_eq!(input.input_ids.len(), 8);
        assert_eq!(input.input_ids[0], 2); // [CLS]
        assert_eq!(input.input_ids[1], 4); // play
        assert_eq!(input.input_ids[2], 3); // [SEP]
        assert_eq!(input.input_ids[3], 0); // [PAD]
        assert_eq!(input.attention_mask[..4], [1, 1, 1, 0]);
        assert_eq!(input.active_positions(), 3);
        assert!(input.token_type_ids.iter().all(|&t| t == 0));
    }

    #[test]
    fn prepare_truncates_and_forces_trailing_sep() {
        let encoder = encoder(&["[PAD]", "[UNK]", "[CLS]", "[SEP]", "a", "b", "c"], 4);
        let input = encoder.prepare("a b c");
        assert_eq!(input.input_ids.len(), 4);
        assert_eq!(input.input_ids[3], 3); // forced [SEP]
        assert_eq!(input.active_positions(), 4);
    }

    #[test]
    fn pooling_averages_only_active_rows() {
        let encoder = encoder(&["[PAD]", "[UNK]", "[CLS]", "[SEP]", "play"], 8);
        // Active rows are positions 0, 1, 2 -> mean 1.0 in every lane.
        let embedding = encoder.encode("play").unwrap();
        assert_eq!(embedding.len(), 4);
        for lane in embedding {
            assert!((lane - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn pooling_rejects_mismatched_shapes() {
        let mask = vec![1, 1];
        let err = masked_mean(&[0.0; 5], &mask, 4);
        assert!(err.is_err());
    }
}
