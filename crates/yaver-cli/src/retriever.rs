//! A [`ContextRetriever`] with no backing index. A documented extension
//! point: wiring a real embedding/vector store is left to the caller,
//! mirroring how the teacher leaves the GitHub forge adapter undocumented
//! behind the same trait.

use async_trait::async_trait;

use yaver_core::interfaces::ContextRetriever;

pub struct NoopContextRetriever;

#[async_trait]
impl ContextRetriever for NoopContextRetriever {
    async fn retrieve(&self, _query: &str, _k: usize) -> anyhow::Result<String> {
        Ok(String::new())
    }
}
