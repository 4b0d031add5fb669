use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// Canonical id of the `[UNK]` token when no vocabulary file is present.
pub const UNK_TOKEN_ID: i64 = 100;
/// Canonical id of the `[CLS]` token when no vocabulary file is present.
pub const CLS_TOKEN_ID: i64 = 101;
/// Canonical id of the `[SEP]` token when no vocabulary file is present.
pub const SEP_TOKEN_ID: i64 = 102;
/// Canonical id of the `[PAD]` token when no vocabulary file is present.
pub const PAD_TOKEN_ID: i64 = 0;

/// On-device locations probed by [`Vocabulary::load_default`].
pub const DEFAULT_VOCAB_PATHS: [&str; 2] = ["/data/local/tmp/vocab.txt", "/sdcard/vocab.txt"];

const UNK_TOKEN: &str = "[UNK]";
const CLS_TOKEN: &str = "[CLS]";
const SEP_TOKEN: &str = "[SEP]";
const PAD_TOKEN: &str = "[PAD]";

/// WordPiece vocabulary mapping tokens to their model ids.
///
/// The file format is one token per line; the token on line *n*
/// (1-based) has id *n − 1*. Blank lines keep their id slot so the
/// mapping stays aligned with the exported model.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: HashMap<String, i64>,
    source: Option<PathBuf>,
}

impl Vocabulary {
    /// Loads a vocabulary from a newline-separated file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading vocabulary {}", path.display()))?;
        let mut tokens = HashMap::new();
        for (index, line) in raw.lines().enumerate() {
            let token = line.trim_end_matches('\r');
            if token.is_empty() {
                continue;
            }
            tokens.insert(token.to_owned(), index as i64);
        }
        tracing::debug!(tokens = tokens.len(), path = %path.display(), "vocabulary loaded");
        Ok(Self {
            tokens,
            source: Some(path.to_path_buf()),
        })
    }

    /// Probes the on-device locations and falls back to the four special
    /// tokens with their canonical ids when no file is readable.
    #[must_use]
    pub fn load_default() -> Self {
        for candidate in DEFAULT_VOCAB_PATHS {
            if let Ok(vocab) = Self::load(candidate) {
                return vocab;
            }
        }
        tracing::warn!("no vocabulary file found, seeding special tokens only");
        Self::specials_only()
    }

    /// Vocabulary holding only `[UNK]`, `[CLS]`, `[SEP]`, `[PAD]`.
    #[must_use]
    pub fn specials_only() -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(UNK_TOKEN.to_owned(), UNK_TOKEN_ID);
        tokens.insert(CLS_TOKEN.to_owned(), CLS_TOKEN_ID);
        tokens.insert(SEP_TOKEN.to_owned(), SEP_TOKEN_ID);
        tokens.insert(PAD_TOKEN.to_owned(), PAD_TOKEN_ID);
        Self {
            tokens,
            source: None,
        }
    }

    /// Returns the id of a token, if present.
    #[must_use]
    pub fn id(&self, token: &str) -> Option<i64> {
        self.tokens.get(token).copied()
    }

    /// Returns true if the token is present.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains_key(token)
    }

    /// Id used for tokens missing from the vocabulary.
    #[must_use]
    pub fn unk_id(&self) -> i64 {
        self.id(UNK_TOKEN).unwrap_or(UNK_TOKEN_ID)
    }

    /// Id of the sequence-start marker.
    #[must_use]
    pub fn cls_id(&self) -> i64 {
        self.id(CLS_TOKEN).unwrap_or(CLS_TOKEN_ID)
    }

    /// Id of the sequence-end marker.
    #[must_use]
    pub fn sep_id(&self) -> i64 {
        self.id(SEP_TOKEN).unwrap_or(SEP_TOKEN_ID)
    }

    /// Id of the padding token.
    #[must_use]
    pub fn pad_id(&self) -> i64 {
        self.id(PAD_TOKEN).unwrap_or(PAD_TOKEN_ID)
    }

    /// Number of tokens known to this vocabulary.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True when no tokens are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Path the vocabulary was loaded from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::specials_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn line_number_determines_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[PAD]").unwrap();
        writeln!(file, "play").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "button").unwrap();
        let vocab = Vocabulary::load(&path).unwrap();
        assert_eq!(vocab.id("[PAD]"), Some(0));
        assert_eq!(vocab.id("play"), Some(1));
        // The blank line occupies id 2.
        assert_eq!(vocab.id("button"), Some(3));
        assert_eq!(vocab.id("missing"), None);
    }

    #[test]
    fn specials_fallback_uses_canonical_ids() {
        let vocab = Vocabulary::specials_only();
        assert_eq!(vocab.unk_id(), 100);
        assert_eq!(vocab.cls_id(), 101);
        assert_eq!(vocab.sep_id(), 102);
        assert_eq!(vocab.pad_id(), 0);
        assert_eq!(vocab.len(), 4);
    }
}
