//! Rendering is delegated to an external collaborator: a tool that turns an
//! uploaded capture archive into one or more playable `Record`s per the
//! tenant's `RecordProfile`s. This crate only describes the seam.

use b3lb_core::error::Result;
use b3lb_core::model::RecordProfile;

/// One rendered output, ready to be registered as a `Record` row.
#[derive(Debug, Clone)]
pub struct RenderedOutput {
    pub record_profile_uuid: uuid::Uuid,
    pub file_path: String,
    pub display_name: String,
}

#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        record_set_uuid: uuid::Uuid,
        raw_blob_key: &str,
        profiles: &[RecordProfile],
    ) -> Result<Vec<RenderedOutput>>;
}

/// Renderer that produces no output. Useful where recording is disabled for
/// every tenant a deployment serves, or in tests that never reach the
/// render step.
pub struct NullRenderer;

#[async_trait::async_trait]
impl Renderer for NullRenderer {
    async fn render(
        &self,
        _record_set_uuid: uuid::Uuid,
        _raw_blob_key: &str,
        _profiles: &[RecordProfile],
    ) -> Result<Vec<RenderedOutput>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_renderer_produces_nothing() {
        let renderer = NullRenderer;
        let out = renderer
            .render(uuid::Uuid::new_v4(), "some/key", &[])
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
