//! Byte-level tokenizer.
//!
//! IDs 0..=255 are raw UTF-8 bytes; three special tokens follow. Needs no
//! vocabulary file, so any model directory without `tokenizer.json` can use it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::error::{Result, TokenizerError};
use super::traits::{TokenId, Tokenizer};

/// File describing a byte tokenizer inside a model directory
pub const BYTE_TOKENIZER_FILE: &str = "tokenizer_config.json";

const PAD: TokenId = 256;
const BOS: TokenId = 257;
const EOS: TokenId = 258;
const SPECIALS: [&str; 3] = ["<pad>", "<bos>", "<eos>"];

/// Byte-level tokenizer with `<pad>`, `<bos>` and `<eos>`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteTokenizer;

#[derive(Debug, Serialize, Deserialize)]
struct ByteTokenizerFile {
    tokenizer_class: String,
    vocab_size: usize,
    pad_token: String,
    bos_token: String,
    eos_token: String,
}

impl ByteTokenizer {
    /// Vocabulary size: 256 bytes and 3 specials
    pub const VOCAB_SIZE: usize = 259;
    pub const CLASS: &'static str = "ByteTokenizer";

    pub fn new() -> Self {
        Self
    }

    /// True when `dir` holds a byte tokenizer description
    pub fn is_saved_in(dir: &Path) -> bool {
        fs::read_to_string(dir.join(BYTE_TOKENIZER_FILE))
            .ok()
            .and_then(|text| serde_json::from_str::<ByteTokenizerFile>(&text).ok())
            .is_some_and(|f| f.tokenizer_class == Self::CLASS)
    }
}

impl Tokenizer for ByteTokenizer {
    fn name(&self) -> &str {
        "byte"
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        Ok(text.bytes().map(TokenId::from).collect())
    }

    fn decode(&self, ids: &[TokenId]) -> Result<String> {
        let mut bytes = Vec::with_capacity(ids.len());
        for &id in ids {
            match u8::try_from(id) {
                Ok(b) => bytes.push(b),
                Err(_) if (id as usize) < Self::VOCAB_SIZE => {}
                Err(_) => return Err(TokenizerError::InvalidTokenId(id)),
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn vocab_size(&self) -> usize {
        Self::VOCAB_SIZE
    }

    fn pad_id(&self) -> TokenId {
        PAD
    }

    fn bos_id(&self) -> Option<TokenId> {
        Some(BOS)
    }

    fn eos_id(&self) -> Option<TokenId> {
        Some(EOS)
    }

    fn id_to_token(&self, id: TokenId) -> Option<String> {
        match id {
            0..=255 => Some(format!("<0x{id:02X}>")),
            PAD..=EOS => Some(SPECIALS[(id - PAD) as usize].to_string()),
            _ => None,
        }
    }

    fn token_to_id(&self, token: &str) -> Option<TokenId> {
        if let Some(pos) = SPECIALS.iter().position(|s| *s == token) {
            return Some(PAD + pos as TokenId);
        }
        let hex = token.strip_prefix("<0x")?.strip_suffix('>')?;
        u8::from_str_radix(hex, 16).ok().map(TokenId::from)
    }

    fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .map_err(|source| TokenizerError::Io { path: dir.to_path_buf(), source })?;
        let file = ByteTokenizerFile {
            tokenizer_class: Self::CLASS.to_string(),
            vocab_size: Self::VOCAB_SIZE,
            pad_token: SPECIALS[0].to_string(),
            bos_token: SPECIALS[1].to_string(),
            eos_token: SPECIALS[2].to_string(),
        };
        let text = serde_json::to_string_pretty(&file)
            .map_err(|e| TokenizerError::Serialization(e.to_string()))?;
        let path = dir.join(BYTE_TOKENIZER_FILE);
        fs::write(&path, text).map_err(|source| TokenizerError::Io { path, source })
    }
}
