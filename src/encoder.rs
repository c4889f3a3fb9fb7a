use anyhow::{anyhow, bail, Context, Result};
use hf_hub::api::sync::Api;
use ndarray::{Array2, Array3, ArrayD, Axis};

use crate::tokenizer::HubTokenizer;

pub mod traits;

pub use traits::Embedder;

// onnx runtime (ORT)
use ort::session::Session;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::inputs;
use ort::value::Value;

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
pub enum Device {
    #[value(name = "cpu")] Cpu,
    #[value(name = "cuda")] Cuda,
}

/// Sentence encoder backed by an ONNX export on the HF Hub.
pub struct OnnxEncoder {
    tok: HubTokenizer,
    session: Session,
    // E5-family models expect "query: " / "passage: " prefixes; others take raw text
    prefixed: bool,
}

impl OnnxEncoder {
    pub fn new(model_id: &str, onnx_filename: Option<&str>, device: Device) -> Result<Self> {
        let tok = HubTokenizer::new(model_id).with_context(|| format!("init tokenizer for {model_id}"))?;
        let onnx_path = resolve_onnx(model_id, onnx_filename).context("resolve ONNX model via HF Hub")?;
        let session = build_session(&onnx_path, device)?;
        Ok(Self { tok, session, prefixed: uses_e5_prefixes(model_id) })
    }

    fn embed_with_prefix(&mut self, texts: &[String], prefix: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(vec![]); }

        let prefix = if self.prefixed { prefix } else { "" };
        let prefixed: Vec<String> = texts.iter().map(|t| format!("{prefix}{t}")).collect();
        let batch = self.tok.encode_batch(&prefixed)?;

        let ids = Value::from_array(batch.input_ids.clone()).map_err(|e| anyhow!("{}", e))?;
        let mask = Value::from_array(batch.attention_mask.clone()).map_err(|e| anyhow!("{}", e))?;
        let types = Value::from_array(batch.token_type_ids.clone()).map_err(|e| anyhow!("{}", e))?;
        let outputs = self.session
            .run(inputs! {
                "input_ids" => &ids,
                "attention_mask" => &mask,
                "token_type_ids" => &types,
            })
            .map_err(|e| anyhow!("{}", e))?;

        let (_, first) = outputs.iter().next().ok_or_else(|| anyhow!("ONNX session returned no outputs"))?;
        let hidden: ArrayD<f32> = first.try_extract_array().map_err(|e| anyhow!("{}", e))?.to_owned();
        let vectors = sentence_vectors(hidden, &batch.attention_mask)?;
        if vectors.len() != batch.len() {
            bail!("encoder returned {} vectors for {} inputs", vectors.len(), batch.len());
        }
        Ok(vectors)
    }
}

/// Turns the first graph output into one unit vector per input row.
/// Rank 2 is already pooled; rank 3 (token states) is mean-pooled over the attention mask.
fn sentence_vectors(out: ArrayD<f32>, mask: &Array2<i64>) -> Result<Vec<Vec<f32>>> {
    match out.ndim() {
        2 => Ok(out.outer_iter().map(|row| l2_normalize(row.iter().copied().collect())).collect()),
        3 => {
            let states: Array3<f32> = out.into_dimensionality().map_err(|e| anyhow!("{}", e))?;
            Ok(mean_pool(&states, mask).into_iter().map(l2_normalize).collect())
        }
        n => bail!("unexpected output rank {n}; expected 2 or 3"),
    }
}

fn mean_pool(states: &Array3<f32>, mask: &Array2<i64>) -> Vec<Vec<f32>> {
    states
        .outer_iter()
        .zip(mask.outer_iter())
        .map(|(tokens, row_mask)| {
            let weights = row_mask.mapv(|m| m as f32);
            let total = weights.sum().max(1e-6);
            let summed = &weights.insert_axis(Axis(1)) * &tokens;
            (summed.sum_axis(Axis(0)) / total).to_vec()
        })
        .collect()
}

impl Embedder for OnnxEncoder {
    fn embed_queries(&mut self, queries: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_with_prefix(queries, "query: ")
    }

    fn embed_passages(&mut self, passages: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_with_prefix(passages, "passage: ")
    }
}

fn uses_e5_prefixes(model_id: &str) -> bool {
    model_id.to_ascii_lowercase().contains("e5-")
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt() as f32;
    if norm > 0.0 {
        for x in &mut v { *x /= norm; }
    }
    v
}

fn resolve_onnx(model_id: &str, onnx_filename: Option<&str>) -> Result<std::path::PathBuf> {
    let api = Api::new()?;
    let repo = api.model(model_id.to_string());

    if let Some(name) = onnx_filename {
        let p = repo.get(name)?;
        return Ok(p);
    }

    let candidates = [
        "onnx/model.onnx",
        "model.onnx",
    ];
    for name in candidates {
        if let Ok(p) = repo.get(name) { return Ok(p); }
    }

    bail!("Could not find an ONNX file in {model_id}. Pass --onnx-filename to override.")
}

fn build_session(onnx_path: &std::path::Path, device: Device) -> Result<Session> {
    let builder = SessionBuilder::new()
        .map_err(|e| anyhow!("{}", e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| anyhow!("{}", e))?;

    #[allow(unreachable_code)]
    let builder = match device {
        Device::Cpu => builder,
        Device::Cuda => {
            #[cfg(feature = "cuda")]
            {
                use ort::execution_providers::CUDAExecutionProvider;
                builder
                    .with_execution_providers([CUDAExecutionProvider::default().into()])
                    .map_err(|e| anyhow!("{}", e))?
            }
            #[cfg(not(feature = "cuda"))]
            {
                bail!("Binary built without CUDA support. Rebuild with `--features cuda` and ensure CUDA is available.")
            }
        }
    };

    let model_bytes = std::fs::read(onnx_path).map_err(|e| anyhow!("{}", e))?;
    let session = builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| anyhow!("{}", e))?;
    Ok(session)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_vectors() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn mean_pool_ignores_padding_tokens() {
        // one row, three tokens, the last one padding
        let states = Array3::from_shape_vec((1, 3, 2), vec![1.0, 2.0, 3.0, 4.0, 100.0, 100.0]).unwrap();
        let mask = Array2::from_shape_vec((1, 3), vec![1, 1, 0]).unwrap();
        assert_eq!(mean_pool(&states, &mask), vec![vec![2.0, 3.0]]);
    }

    #[test]
    fn pooled_output_is_normalized_per_row() {
        let out = ArrayD::from_shape_vec(vec![2, 2], vec![3.0, 4.0, 0.0, 2.0]).unwrap();
        let mask = Array2::ones((2, 1));
        let v = sentence_vectors(out, &mask).unwrap();
        assert!((v[0][0] - 0.6).abs() < 1e-6);
        assert_eq!(v[1], vec![0.0, 1.0]);
    }

    #[test]
    fn token_states_are_pooled_then_normalized() {
        let out = ArrayD::from_shape_vec(vec![1, 2, 2], vec![3.0, 0.0, 3.0, 8.0]).unwrap();
        let mask = Array2::ones((1, 2));
        let v = sentence_vectors(out, &mask).unwrap();
        assert!((v[0][0] - 0.6).abs() < 1e-6);
        assert!((v[0][1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn unexpected_rank_is_an_error() {
        let out = ArrayD::from_shape_vec(vec![4], vec![0.0; 4]).unwrap();
        assert!(sentence_vectors(out, &Array2::ones((1, 4))).is_err());
    }

    #[test]
    fn only_e5_models_get_prefixes() {
        assert!(uses_e5_prefixes("intfloat/e5-small-v2"));
        assert!(!uses_e5_prefixes("sentence-transformers/all-MiniLM-L6-v2"));
    }
}
