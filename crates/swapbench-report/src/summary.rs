//! End-of-batch summary.

use std::fmt;
use swapbench_core::{Provider, TestRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSummary {
    pub provider: Provider,
    /// Distinct source/target combinations attempted.
    pub combinations: u32,
    pub successes: u32,
    /// Attempts beyond the first.
    pub retries: u32,
    success_wall_ms: u64,
}

impl ProviderSummary {
    fn new(provider: Provider) -> Self {
        Self {
            provider,
            combinations: 0,
            successes: 0,
            retries: 0,
            success_wall_ms: 0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.combinations == 0 {
            0.0
        } else {
            f64::from(self.successes) / f64::from(self.combinations)
        }
    }

    /// Mean wall-clock seconds of successful attempts.
    pub fn mean_wall_seconds(&self) -> Option<f64> {
        (self.successes > 0).then(|| self.success_wall_ms as f64 / 1000.0 / f64::from(self.successes))
    }
}

/// Running per-provider totals, in first-seen provider order.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    providers: Vec<ProviderSummary>,
}

impl BatchSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: &TestRecord) {
        let idx = match self.providers.iter().position(|p| p.provider == record.provider) {
            Some(idx) => idx,
            None => {
                self.providers.push(ProviderSummary::new(record.provider));
                self.providers.len() - 1
            }
        };
        let entry = &mut self.providers[idx];
        if record.attempt <= 1 {
            entry.combinations += 1;
        } else {
            entry.retries += 1;
        }
        if record.result.success {
            entry.successes += 1;
            entry.success_wall_ms += record.result.wall_clock_millis;
        }
    }

    pub fn providers(&self) -> &[ProviderSummary] {
        &self.providers
    }

    pub fn total_attempts(&self) -> u32 {
        self.providers.iter().map(|p| p.combinations + p.retries).sum()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<10} {:>6} {:>6} {:>8} {:>8} {:>10}",
            "provider", "tests", "ok", "retries", "rate", "mean (s)"
        )?;
        for p in &self.providers {
            let mean = p
                .mean_wall_seconds()
                .map(|s| format!("{s:.1}"))
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "{:<10} {:>6} {:>6} {:>8} {:>7.0}% {:>10}",
                p.provider.as_str(),
                p.combinations,
                p.successes,
                p.retries,
                p.success_rate() * 100.0,
                mean
            )?;
        }
        Ok(())
    }
}
