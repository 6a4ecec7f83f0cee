//! Decoder configuration and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation token, checked at span boundaries. On cancel the
/// decoder discards all partially built state and reports no derivation.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Options recognized by the chart parser.
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    /// Cube-pruning pop bound per span; 0 means unbounded (exhaustive).
    pub pop_limit: usize,
    /// Decode with the dot chart (`expand`) or without (`expand_sans_dot_chart`).
    pub use_dot_chart: bool,
    /// OOV-rule creation policy, consumed by the external OOV grammar loader.
    pub true_oovs_only: bool,
    /// Inside beam for cell insertion; `None` disables beam pruning.
    pub beam_width: Option<f64>,
    /// Optional cooperative cancellation token.
    pub cancel: Option<CancelToken>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            pop_limit: 100,
            use_dot_chart: true,
            true_oovs_only: false,
            beam_width: None,
            cancel: None,
        }
    }
}

impl DecoderConfig {
    /// Exhaustive configuration: no pop limit, no beam.
    pub fn exhaustive() -> Self {
        DecoderConfig {
            pop_limit: 0,
            beam_width: None,
            ..DecoderConfig::default()
        }
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancelToken::is_cancelled)
    }
}
