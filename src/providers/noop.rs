use async_trait::async_trait;

use crate::errors::BackendError;

use super::{BackendCapabilities, BackendOptions, TranslationBackend};

/// Backend that returns its input unchanged; useful to exercise layout only
#[derive(Debug, Clone)]
pub struct NoopBackend {
    capabilities: BackendCapabilities,
}

impl NoopBackend {
    pub fn new(capabilities: BackendCapabilities) -> Self {
        Self { capabilities }
    }
}

impl Default for NoopBackend {
    fn default() -> Self {
        Self::new(BackendCapabilities::new(64, 16))
    }
}

#[async_trait]
impl TranslationBackend for NoopBackend {
    fn name(&self) -> &str {
        "noop"
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    async fn translate(
        &self,
        texts: &[String],
        _source_language: &str,
        _target_language: &str,
        _options: &BackendOptions,
    ) -> Result<Vec<String>, BackendError> {
        Ok(texts.to_vec())
    }
}
