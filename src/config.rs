//! Configuration for a prescription analysis run.
//!
//! All pipeline behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks and to diff two runs to understand
//! why their outcomes differ.
//!
//! # Design choice: builder over constructor
//! Callers set only what they care about and rely on documented defaults for
//! the rest; adding a field never breaks existing call sites.

use crate::error::MediScanError;
use crate::pipeline::provider::AnalysisProvider;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Default model requested from the analysis provider.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash-image-preview";

/// Configuration for the analysis pipeline.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use mediscan::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .analysis_timeout_secs(20)
///     .model("google/gemini-2.5-flash-image-preview")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Page-point scale factor for the first rasterisation attempt. Default: 4.0.
    ///
    /// Scale 4 of a US-Letter page yields roughly 2400 × 3100 px — sharp
    /// enough for a vision model to read handwriting and fine print. Very
    /// large source pages can exhaust rendering memory at this scale, which
    /// is what the fallback tier exists for.
    pub primary_scale: f32,

    /// Scale factor retried when the primary attempt fails. Default: 2.0.
    ///
    /// Half the pixel budget in each dimension, a quarter of the memory.
    /// Trades fidelity for reliability rather than failing outright.
    pub fallback_scale: f32,

    /// Budget for the provider call, in seconds. Default: 30.
    ///
    /// Whichever of the provider call and the timer settles first wins; on
    /// timeout the run degrades to default feedback instead of failing.
    pub analysis_timeout_secs: u64,

    /// Model identifier requested from the provider.
    /// If None, [`DEFAULT_MODEL`] is used.
    pub model: Option<String>,

    /// Pre-constructed analysis provider. When None, the orchestrator
    /// resolves one from the environment (`OPENROUTER_API_KEY`).
    pub provider: Option<Arc<dyn AnalysisProvider>>,

    /// Sampling temperature for the provider completion. Default: 0.2.
    ///
    /// Low temperature keeps the assessment faithful to what is on the page;
    /// creativity only hurts a transcription-and-scoring task.
    pub temperature: f32,

    /// Maximum tokens the provider may generate. Default: 2048.
    ///
    /// Six categories with a handful of tips each fit comfortably; too low a
    /// cap silently truncates the JSON mid-object and forces a degrade.
    pub max_tokens: usize,

    /// Progress callback fired on every pipeline stage transition.
    pub progress: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            primary_scale: 4.0,
            fallback_scale: 2.0,
            analysis_timeout_secs: 30,
            model: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 2048,
            progress: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("primary_scale", &self.primary_scale)
            .field("fallback_scale", &self.fallback_scale)
            .field("analysis_timeout_secs", &self.analysis_timeout_secs)
            .field("model", &self.model)
            .field(
                "provider",
                &self.provider.as_ref().map(|_| "<dyn AnalysisProvider>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn primary_scale(mut self, scale: f32) -> Self {
        self.config.primary_scale = scale.clamp(1.0, 8.0);
        self
    }

    pub fn fallback_scale(mut self, scale: f32) -> Self {
        self.config.fallback_scale = scale.clamp(0.5, 8.0);
        self
    }

    pub fn analysis_timeout_secs(mut self, secs: u64) -> Self {
        self.config.analysis_timeout_secs = secs.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn progress(mut self, callback: ProgressCallback) -> Self {
        self.config.progress = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, MediScanError> {
        let c = &self.config;
        if c.fallback_scale > c.primary_scale {
            return Err(MediScanError::InvalidConfig(format!(
                "Fallback scale {} exceeds primary scale {}",
                c.fallback_scale, c.primary_scale
            )));
        }
        if c.max_tokens == 0 {
            return Err(MediScanError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
