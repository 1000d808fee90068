/*!
 * Backend-specific concurrency tuning.
 *
 * Default batch and in-flight limits per backend, based on how each service
 * behaves: local servers take many parallel calls with small batches, hosted
 * LLM APIs rate limit early, DeepL batches natively.
 */

use crate::providers::BackendCapabilities;

/// Tuned defaults for one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendProfile {
    /// Maximum concurrent requests
    pub max_in_flight: usize,
    /// Segments per request
    pub max_batch_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl BackendProfile {
    /// Profile for a backend name; unknown names get conservative defaults
    pub fn for_backend(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            // Local, nothing to protect but the GPU
            "ollama" => Self {
                max_in_flight: 8,
                max_batch_size: 5,
                timeout_secs: 120,
            },
            "openai" => Self {
                max_in_flight: 10,
                max_batch_size: 5,
                timeout_secs: 60,
            },
            // Lower rate limits, larger context
            "anthropic" => Self {
                max_in_flight: 5,
                max_batch_size: 8,
                timeout_secs: 60,
            },
            "deepl" => Self {
                max_in_flight: 4,
                max_batch_size: 50,
                timeout_secs: 30,
            },
            "noop" => Self {
                max_in_flight: 16,
                max_batch_size: 64,
                timeout_secs: 1,
            },
            "mock" => Self {
                max_in_flight: 8,
                max_batch_size: 8,
                timeout_secs: 1,
            },
            _ => Self {
                max_in_flight: 4,
                max_batch_size: 4,
                timeout_secs: 60,
            },
        }
    }

    /// Capabilities for this profile
    pub fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::new(self.max_batch_size, self.max_in_flight)
    }
}

/// Worker pool size for a run: the configured thread count, never above what
/// the backend accepts in flight
pub fn effective_workers(thread_count: usize, capabilities: BackendCapabilities) -> usize {
    thread_count.max(1).min(capabilities.max_in_flight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_forOllama_shouldHaveHighConcurrency() {
        let profile = BackendProfile::for_backend("ollama");
        assert_eq!(profile.max_in_flight, 8);
        assert_eq!(profile.max_batch_size, 5);
    }

    #[test]
    fn test_profile_forDeepl_shouldBatchNatively() {
        let profile = BackendProfile::for_backend("DeepL");
        assert_eq!(profile.max_batch_size, 50);
    }

    #[test]
    fn test_profile_forUnknown_shouldBeConservative() {
        let profile = BackendProfile::for_backend("babelfish");
        assert_eq!(profile.capabilities(), BackendCapabilities::new(4, 4));
    }

    #[test]
    fn test_effectiveWorkers_shouldRespectBackendLimit() {
        let caps = BackendCapabilities::new(8, 3);
        assert_eq!(effective_workers(10, caps), 3);
        assert_eq!(effective_workers(2, caps), 2);
        assert_eq!(effective_workers(0, caps), 1);
    }
}
