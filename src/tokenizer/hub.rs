use anyhow::{anyhow, bail, Result};
use hf_hub::api::sync::Api;
use ndarray::Array2;
use serde_json::Value;
use tokenizers::{
    PaddingDirection, PaddingParams, PaddingStrategy, Tokenizer, TruncationDirection, TruncationParams,
    TruncationStrategy,
};

const FALLBACK_MAX_LEN: usize = 512;
// some configs carry a sentinel like 1e30 for "unbounded"
const MAX_SANE_LEN: u64 = 8192;

/// Padded `[batch, seq]` tensors ready for a BERT-style ONNX graph.
#[derive(Debug, Clone)]
pub struct TokenBatch {
    pub input_ids: Array2<i64>,
    pub attention_mask: Array2<i64>,
    pub token_type_ids: Array2<i64>,
}

impl TokenBatch {
    pub fn len(&self) -> usize {
        self.input_ids.nrows()
    }
}

/// Padding and truncation settings read from `tokenizer_config.json`.
#[derive(Debug, Clone, PartialEq)]
struct Defaults {
    max_len: usize,
    pad_right: bool,
    pad_token: String,
    pad_id: Option<u32>,
    pad_type_id: u32,
}

impl Defaults {
    fn from_config(cfg: &Value) -> Self {
        let max_len = cfg
            .get("model_max_length")
            .and_then(Value::as_u64)
            .filter(|n| *n <= MAX_SANE_LEN)
            .map(|n| n as usize)
            .unwrap_or(FALLBACK_MAX_LEN);
        let pad_right = cfg.get("padding_side").and_then(Value::as_str) != Some("left");
        let pad_token = cfg.get("pad_token").and_then(Value::as_str).unwrap_or("[PAD]").to_string();
        let pad_id = cfg.get("pad_token_id").and_then(Value::as_i64).and_then(|id| u32::try_from(id).ok());
        let pad_type_id = cfg
            .get("pad_token_type_id")
            .and_then(Value::as_i64)
            .and_then(|id| u32::try_from(id).ok())
            .unwrap_or(0);
        Self { max_len, pad_right, pad_token, pad_id, pad_type_id }
    }
}

/// Tokenizer for a sentence-embedding model on the HF Hub.
#[derive(Debug, Clone)]
pub struct HubTokenizer {
    inner: Tokenizer,
}

impl HubTokenizer {
    pub fn new(model_id: &str) -> Result<Self> {
        let tok = Tokenizer::from_pretrained(model_id, None).map_err(|e| anyhow!("{}", e))?;
        let cfg = Api::new()?
            .model(model_id.to_string())
            .get("tokenizer_config.json")
            .ok()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| serde_json::from_str::<Value>(&s).ok())
            .unwrap_or(Value::Null);
        Self::configured(tok, &Defaults::from_config(&cfg))
    }

    fn configured(mut tok: Tokenizer, d: &Defaults) -> Result<Self> {
        let pad_id = d.pad_id.or_else(|| tok.token_to_id(&d.pad_token)).unwrap_or(0);
        tok.with_truncation(Some(TruncationParams {
            max_length: d.max_len,
            stride: 0,
            strategy: TruncationStrategy::LongestFirst,
            direction: TruncationDirection::Right,
        }))
        .map_err(|e| anyhow!("{}", e))?;
        tok.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            direction: if d.pad_right { PaddingDirection::Right } else { PaddingDirection::Left },
            pad_to_multiple_of: None,
            pad_id,
            pad_type_id: d.pad_type_id,
            pad_token: d.pad_token.clone(),
        }));
        Ok(Self { inner: tok })
    }

    /// Encodes `texts` as given; callers add any model prefixes.
    pub fn encode_batch(&self, texts: &[String]) -> Result<TokenBatch> {
        let encodings = self.inner.encode_batch(texts.to_vec(), true).map_err(|e| anyhow!("{}", e))?;
        let rows = encodings.len();
        let cols = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        if rows == 0 || cols == 0 {
            bail!("tokenizer produced an empty batch");
        }

        let mut batch = TokenBatch {
            input_ids: Array2::zeros((rows, cols)),
            attention_mask: Array2::zeros((rows, cols)),
            token_type_ids: Array2::zeros((rows, cols)),
        };
        for (r, enc) in encodings.iter().enumerate() {
            for (c, &id) in enc.get_ids().iter().enumerate() {
                batch.input_ids[[r, c]] = id as i64;
            }
            for (c, &m) in enc.get_attention_mask().iter().enumerate() {
                batch.attention_mask[[r, c]] = m as i64;
            }
            // left as zeros when the tokenizer has no segment ids
            for (c, &t) in enc.get_type_ids().iter().enumerate() {
                batch.token_type_ids[[r, c]] = t as i64;
            }
        }
        Ok(batch)
    }
}
