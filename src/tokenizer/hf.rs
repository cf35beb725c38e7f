//! HuggingFace tokenizer integration via the `tokenizers` crate.

use std::fs;
use std::path::Path;

use super::error::{Result, TokenizerError};
use super::traits::{TokenId, Tokenizer};

/// Tokenizer file name inside a model directory
pub const HF_TOKENIZER_FILE: &str = "tokenizer.json";

/// HuggingFace-compatible tokenizer wrapper
///
/// Special tokens are detected from the vocabulary. When there is no
/// dedicated padding token the EOS token doubles as padding.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    pad_id: TokenId,
    eos_id: Option<TokenId>,
    bos_id: Option<TokenId>,
}

impl std::fmt::Debug for HfTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfTokenizer")
            .field("vocab_size", &self.vocab_size())
            .field("pad_id", &self.pad_id)
            .field("eos_id", &self.eos_id)
            .field("bos_id", &self.bos_id)
            .finish()
    }
}

impl HfTokenizer {
    /// Load tokenizer from HuggingFace tokenizer.json file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TokenizerError::NotFound(path.to_path_buf()));
        }
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| TokenizerError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self::from_inner(inner))
    }

    /// Wrap an already built tokenizer
    pub fn from_inner(inner: tokenizers::Tokenizer) -> Self {
        let eos_id = ["</s>", "<|im_end|>", "<|endoftext|>", "<eos>"]
            .iter()
            .find_map(|t| inner.token_to_id(t));
        let bos_id = ["<s>", "<|im_start|>", "<bos>", "<|begin_of_text|>"]
            .iter()
            .find_map(|t| inner.token_to_id(t));
        let pad_id = inner
            .token_to_id("<pad>")
            .or(eos_id)
            .unwrap_or(0);
        Self { inner, pad_id, eos_id, bos_id }
    }
}

impl Tokenizer for HfTokenizer {
    fn name(&self) -> &str {
        "hf"
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| TokenizerError::Encode(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[TokenId]) -> Result<String> {
        self.inner.decode(ids, true).map_err(|e| TokenizerError::Decode(e.to_string()))
    }

    fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    fn pad_id(&self) -> TokenId {
        self.pad_id
    }

    fn bos_id(&self) -> Option<TokenId> {
        self.bos_id
    }

    fn eos_id(&self) -> Option<TokenId> {
        self.eos_id
    }

    fn id_to_token(&self, id: TokenId) -> Option<String> {
        self.inner.id_to_token(id)
    }

    fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.inner.token_to_id(token)
    }

    fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .map_err(|source| TokenizerError::Io { path: dir.to_path_buf(), source })?;
        let path = dir.join(HF_TOKENIZER_FILE);
        self.inner
            .save(&path, true)
            .map_err(|e| TokenizerError::Serialization(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WORD_LEVEL: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": {"type": "Whitespace"},
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {"<unk>": 0, "<pad>": 1, "</s>": 2, "hello": 3, "world": 4},
    "unk_token": "<unk>"
  }
}"#;

    fn load() -> (TempDir, HfTokenizer) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(HF_TOKENIZER_FILE), WORD_LEVEL).unwrap();
        let tok = HfTokenizer::from_file(dir.path().join(HF_TOKENIZER_FILE)).unwrap();
        (dir, tok)
    }

    #[test]
    fn test_special_token_detection() {
        let (_dir, tok) = load();
        assert_eq!(tok.pad_id(), 1);
        assert_eq!(tok.eos_id(), Some(2));
        assert_eq!(tok.bos_id(), None);
        assert_eq!(tok.vocab_size(), 5);
    }

    #[test]
    fn test_encode_words() {
        let (_dir, tok) = load();
        assert_eq!(tok.encode("hello world").unwrap(), vec![3, 4]);
        assert_eq!(tok.encode_with_special("hello", true).unwrap(), vec![3, 2]);
        assert_eq!(tok.token_to_id("world"), Some(4));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = HfTokenizer::from_file(dir.path().join(HF_TOKENIZER_FILE)).unwrap_err();
        assert!(matches!(err, TokenizerError::NotFound(_)));
    }

    #[test]
    fn test_save_reloads() {
        let (_dir, tok) = load();
        let out = TempDir::new().unwrap();
        tok.save(out.path()).unwrap();
        let again = HfTokenizer::from_file(out.path().join(HF_TOKENIZER_FILE)).unwrap();
        assert_eq!(again.encode("world hello").unwrap(), vec![4, 3]);
    }
}
