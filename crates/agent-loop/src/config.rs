//! Loop tunables.

use serde::{Deserialize, Serialize};

/// Limits and pacing knobs for one `start_loop` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Hard ceiling on PRAR cycles per run.
    pub max_cycles: u32,
    /// Consecutive cycle errors after which the loop gives up.
    pub error_threshold: u32,
    /// Wall-clock budget for the whole run.
    pub max_loop_time_ms: u64,
    /// Inter-cycle delay before the failure/slow-cycle multipliers.
    pub base_delay_ms: u64,
    /// Delays shorter than this are skipped entirely.
    pub min_delay_ms: u64,
    /// Cycles slower than this get extra pacing.
    pub slow_cycle_ms: u64,
    /// Budget for the pre-perception stability wait.
    pub stability_timeout_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_cycles: 50,
            error_threshold: 5,
            max_loop_time_ms: 120_000,
            base_delay_ms: 100,
            min_delay_ms: 50,
            slow_cycle_ms: 2_000,
            stability_timeout_ms: 2_000,
        }
    }
}

impl LoopConfig {
    /// Small limits for tests.
    pub fn minimal() -> Self {
        Self {
            max_cycles: 10,
            error_threshold: 3,
            max_loop_time_ms: 10_000,
            ..Self::default()
        }
    }

    /// Aggressive pacing for quick scans of simple pages.
    pub fn fast() -> Self {
        Self {
            base_delay_ms: 50,
            stability_timeout_ms: 500,
            ..Self::default()
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn with_error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = threshold;
        self
    }

    pub fn with_time_budget_ms(mut self, budget_ms: u64) -> Self {
        self.max_loop_time_ms = budget_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_keep_pacing_sane() {
        let minimal = LoopConfig::minimal();
        assert_eq!(minimal.error_threshold, 3);
        assert!(minimal.max_cycles <= LoopConfig::default().max_cycles);

        let fast = LoopConfig::fast();
        assert!(fast.base_delay_ms <= LoopConfig::default().base_delay_ms);
        assert!(fast.min_delay_ms > 0);
    }

    #[test]
    fn builders_override_fields() {
        let config = LoopConfig::default()
            .with_max_cycles(7)
            .with_error_threshold(2)
            .with_time_budget_ms(9_000);
        assert_eq!(config.max_cycles, 7);
        assert_eq!(config.error_threshold, 2);
        assert_eq!(config.max_loop_time_ms, 9_000);
    }
}
