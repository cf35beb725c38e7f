//! Tokenizer trait definition.

use std::path::Path;

use super::error::Result;

/// Token ID type
pub type TokenId = u32;

/// Tokenizer trait
pub trait Tokenizer: Send + Sync {
    /// Short description of the implementation
    fn name(&self) -> &str;

    /// Encode text to token IDs without special tokens
    fn encode(&self, text: &str) -> Result<Vec<TokenId>>;

    /// Decode token IDs to text, dropping special tokens
    fn decode(&self, ids: &[TokenId]) -> Result<String>;

    /// Get vocabulary size
    fn vocab_size(&self) -> usize;

    /// Padding token
    fn pad_id(&self) -> TokenId;

    /// Beginning-of-sequence token, if the vocabulary has one
    fn bos_id(&self) -> Option<TokenId>;

    /// End-of-sequence token, if the vocabulary has one
    fn eos_id(&self) -> Option<TokenId>;

    /// Get token for ID
    fn id_to_token(&self, id: TokenId) -> Option<String>;

    /// Get ID for token
    fn token_to_id(&self, token: &str) -> Option<TokenId>;

    /// Write the tokenizer files into `dir`
    fn save(&self, dir: &Path) -> Result<()>;

    /// BOS, the text, and optionally EOS
    fn encode_with_special(&self, text: &str, add_eos: bool) -> Result<Vec<TokenId>> {
        let mut ids = Vec::new();
        if let Some(bos) = self.bos_id() {
            ids.push(bos);
        }
        ids.extend(self.encode(text)?);
        if add_eos {
            if let Some(eos) = self.eos_id() {
                ids.push(eos);
            }
        }
        Ok(ids)
    }
}
