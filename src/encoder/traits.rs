use anyhow::Result;

/// Sentence encoder producing L2-normalized vectors.
pub trait Embedder: Send {
    fn embed_queries(&mut self, queries: &[String]) -> Result<Vec<Vec<f32>>>;
    fn embed_passages(&mut self, passages: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_query(&mut self, query: &str) -> Result<Vec<f32>> {
        let out = self.embed_queries(&[query.to_string()])?;
        out.into_iter().next().ok_or_else(|| anyhow::anyhow!("no vector produced"))
    }

    fn embed_passage(&mut self, passage: &str) -> Result<Vec<f32>> {
        let out = self.embed_passages(&[passage.to_string()])?;
        out.into_iter().next().ok_or_else(|| anyhow::anyhow!("no vector produced"))
    }
}
