use std::sync::Arc;

use crate::vocab::Vocabulary;

/// Punctuation treated as a segment boundary on the Latin path.
const LATIN_BOUNDARIES: [char; 5] = ['.', '_', ':', '/', '\\'];

/// Pluggable segmenter for CJK text.
///
/// When none is installed the tokenizer falls back to one token per
/// UTF-8 codepoint, which is what the multilingual vocabulary expects.
pub trait ChineseSegmenter: Send + Sync {
    /// Splits a run of CJK text into segments.
    fn segment(&self, text: &str) -> Vec<String>;
}

/// WordPiece tokenizer with mixed Latin/CJK segmentation.
///
/// Inputs containing any non-ASCII byte take the CJK path; pure-ASCII
/// inputs are split on whitespace and a small punctuation set. Each
/// segment is then matched whole against the vocabulary or decomposed
/// with longest-subword WordPiece.
#[derive(Clone)]
pub struct WordPieceTokenizer {
    vocab: Arc<Vocabulary>,
    segmenter: Option<Arc<dyn ChineseSegmenter>>,
    sequence_length: usize,
}

impl std::fmt::Debug for WordPieceTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordPieceTokenizer")
            .field("vocab_len", &self.vocab.len())
            .field("sequence_length", &self.sequence_length)
            .field("segmenter", &self.segmenter.is_some())
            .finish()
    }
}

impl WordPieceTokenizer {
    /// Default model sequence length.
    pub const DEFAULT_SEQUENCE_LENGTH: usize = 512;

    /// Creates a tokenizer over the given vocabulary.
    #[must_use]
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self {
            vocab,
            segmenter: None,
            sequence_length: Self::DEFAULT_SEQUENCE_LENGTH,
        }
    }

    /// Installs a CJK segmenter.
    #[must_use]
    pub fn with_segmenter(mut self, segmenter: Arc<dyn ChineseSegmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    /// Overrides the padded sequence length.
    #[must_use]
    pub fn with_sequence_length(mut self, length: usize) -> Self {
        self.sequence_length = length.max(2);
        self
    }

    /// The padded sequence length fed to the model.
    #[must_use]
    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// The backing vocabulary.
    #[must_use]
    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Splits text into WordPiece tokens.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let segments = if text.bytes().any(|b| b & 0x80 != 0) {
            self.segment_cjk(text)
        } else {
            segment_latin(text)
        };
        let mut tokens = Vec::new();
        for segment in &segments {
            if self.vocab.contains(segment) {
                tokens.push(segment.clone());
            } else {
                self.word_piece(segment, &mut tokens);
            }
        }
        tokens
    }

    /// Tokenizes and maps to ids, UNK for anything unknown.
    #[must_use]
    pub fn token_ids(&self, text: &str) -> Vec<i64> {
        self.tokenize(text)
            .iter()
            .map(|token| self.vocab.id(token).unwrap_or_else(|| self.vocab.unk_id()))
            .collect()
    }

    fn segment_cjk(&self, text: &str) -> Vec<String> {
        if let Some(segmenter) = &self.segmenter {
            let segments = segmenter.segment(text);
            if !segments.is_empty() {
                return segments;
            }
        }
        text.chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect()
    }

    /// Longest-subword decomposition, recursing on both remainders.
    ///
    /// Segments of length ≤ 2 with no vocabulary entry are emitted as-is
    /// and resolve to UNK at id-mapping time.
    fn word_piece(&self, segment: &str, out: &mut Vec<String>) {
        if segment.is_empty() {
            return;
        }
        let chars: Vec<char> = segment.chars().collect();
        if chars.len() <= 2 {
            out.push(segment.to_owned());
            return;
        }
        for len in (1..=chars.len()).rev() {
            for start in 0..=(chars.len() - len) {
                let candidate: String = chars[start..start + len].iter().collect();
                if self.vocab.contains(&candidate) {
                    let left: String = chars[..start].iter().collect();
                    let right: String = chars[start + len..].iter().collect();
                    self.word_piece_or_whole(&left, out);
                    out.push(candidate);
                    self.word_piece_or_whole(&right, out);
                    return;
                }
            }
        }
        out.push(segment.to_owned());
    }

    fn word_piece_or_whole(&self, remainder: &str, out: &mut Vec<String>) {
        if remainder.is_empty() {
            return;
        }
        if self.vocab.contains(remainder) {
            out.push(remainder.to_owned());
        } else {
            self.word_piece(remainder, out);
        }
    }
}

fn segment_latin(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_whitespace() || LATIN_BOUNDARIES.contains(&c) {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab_of(tokens: &[&str]) -> Arc<Vocabulary> {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        for token in tokens {
            writeln!(file, "{token}").unwrap();
        }
        Arc::new(Vocabulary::load(&path).unwrap())
    }

    #[test]
    fn latin_segments_on_whitespace_and_punctuation() {
        let vocab = vocab_of(&["settings", "com", "app"]);
        let tokenizer = WordPieceTokenizer::new(vocab);
        let tokens = tokenizer.tokenize("com.app/settings");
        assert_eq!(tokens, vec!["com", "app", "settings"]);
    }

    #[test]
    fn whole_segment_beats_wordpiece() {
        let vocab = vocab_of(&["playback", "play", "back"]);
        let tokenizer = WordPieceTokenizer::new(vocab);
        assert_eq!(tokenizer.tokenize("playback"), vec!["playback"]);
    }

    #[test]
    fn wordpiece_splits_on_longest_known_subword() {
        let vocab = vocab_of(&["play", "er"]);
        let tokenizer = WordPieceTokenizer::new(vocab);
        assert_eq!(tokenizer.tokenize("player"), vec!["play", "er"]);
    }

    #[test]
    fn short_unknown_segment_maps_to_unk() {
        let vocab = vocab_of(&["[UNK]", "play"]);
        let tokenizer = WordPieceTokenizer::new(vocab);
        let unk = tokenizer.vocab().unk_id();
        assert_eq!(tokenizer.token_ids("qz"), vec![unk]);
    }

    #[test]
    fn cjk_falls_back_to_per_codepoint_tokens() {
        let vocab = vocab_of(&["设", "置"]);
        let tokenizer = WordPieceTokenizer::new(vocab);
        assert_eq!(tokenizer.tokenize("设置"), vec!["设", "置"]);
    }

    #[test]
    fn installed_segmenter_takes_precedence() {
        struct Fixed;
        impl ChineseSegmenter for Fixed {
            fn segment(&self, _text: &str) -> Vec<String> {
                vec!["设置".to_owned()]
            }
        }
        let vocab = vocab_of(&["设置"]);
        let tokenizer = WordPieceTokenizer::new(vocab).with_segmenter(Arc::new(Fixed));
        assert_eq!(tokenizer.tokenize("设置页面"), vec!["设置"]);
    }
}
