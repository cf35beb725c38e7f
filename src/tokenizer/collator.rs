//! Batch collation for completion-only language modeling.
//!
//! Pads a batch to its longest sequence and builds labels. Padding is always
//! ignored by the loss; with a response template, every token up to and
//! including the template is ignored as well, so only completions train.

use super::error::Result;
use super::traits::{TokenId, Tokenizer};
use crate::config::PaddingSide;

/// Label value the loss skips
pub const IGNORE_INDEX: i64 = -100;

/// A padded batch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    pub input_ids: Vec<Vec<TokenId>>,
    pub attention_mask: Vec<Vec<u8>>,
    pub labels: Vec<Vec<i64>>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Padded sequence length
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.input_ids.first().map_or(0, Vec::len)
    }

    /// Number of positions that contribute to the loss
    #[must_use]
    pub fn num_label_tokens(&self) -> usize {
        self.labels.iter().flatten().filter(|&&l| l != IGNORE_INDEX).count()
    }
}

/// Pads and masks tokenized examples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCollator {
    pad_id: TokenId,
    padding_side: PaddingSide,
    response_ids: Option<Vec<TokenId>>,
}

impl CompletionCollator {
    /// Plain causal-LM collator: labels equal inputs except padding
    pub fn new(pad_id: TokenId, padding_side: PaddingSide) -> Self {
        Self { pad_id, padding_side, response_ids: None }
    }

    /// Mask everything up to and including `response_template`
    pub fn with_response_template(
        mut self,
        tokenizer: &dyn Tokenizer,
        response_template: &str,
    ) -> Result<Self> {
        let ids = tokenizer.encode(response_template)?;
        self.response_ids = if ids.is_empty() { None } else { Some(ids) };
        Ok(self)
    }

    #[must_use]
    pub fn response_ids(&self) -> Option<&[TokenId]> {
        self.response_ids.as_deref()
    }

    #[must_use]
    pub fn pad_id(&self) -> TokenId {
        self.pad_id
    }

    /// Labels for one unpadded example
    pub fn labels_for(&self, ids: &[TokenId]) -> Vec<i64> {
        let mut labels: Vec<i64> = ids.iter().map(|&t| i64::from(t)).collect();
        if let Some(template) = &self.response_ids {
            match find_subsequence(ids, template) {
                Some(start) => {
                    for label in labels.iter_mut().take(start + template.len()) {
                        *label = IGNORE_INDEX;
                    }
                }
                None => {
                    tracing::warn!(
                        len = ids.len(),
                        "response template not found in example, ignoring it in the loss"
                    );
                    labels.fill(IGNORE_INDEX);
                }
            }
        }
        labels
    }

    /// Pad to the longest example and build masks and labels
    pub fn collate(&self, examples: &[Vec<TokenId>]) -> Batch {
        let max_len = examples.iter().map(Vec::len).max().unwrap_or(0);
        let mut batch = Batch::default();

        for ids in examples {
            let pad = max_len - ids.len();
            let mut labels = self.labels_for(ids);
            let mut input = ids.clone();
            let mut mask = vec![1u8; ids.len()];

            match self.padding_side {
                PaddingSide::Right => {
                    input.extend(std::iter::repeat(self.pad_id).take(pad));
                    mask.extend(std::iter::repeat(0).take(pad));
                    labels.extend(std::iter::repeat(IGNORE_INDEX).take(pad));
                }
                PaddingSide::Left => {
                    input.splice(0..0, std::iter::repeat(self.pad_id).take(pad));
                    mask.splice(0..0, std::iter::repeat(0).take(pad));
                    labels.splice(0..0, std::iter::repeat(IGNORE_INDEX).take(pad));
                }
            }

            batch.input_ids.push(input);
            batch.attention_mask.push(mask);
            batch.labels.push(labels);
        }
        batch
    }
}

fn find_subsequence(haystack: &[TokenId], needle: &[TokenId]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
