//! Per search mode message counts and hop statistics.

use std::fmt::{self, Display, Formatter};

use crate::common::SearchMode;

/// Statistics about the searches this node took part in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    flood: ModeStatistics,
    random_walk: ModeStatistics,
    depth_first: ModeStatistics,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ModeStatistics {
    /// Inbound SEARCH messages of this mode, duplicates included.
    seen: u64,
    /// Running aggregate of hop counts taken from VAL replies.
    samples: u64,
    hops_sum: f64,
    hops_squared_sum: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Mean and population standard deviation of hop counts.
pub struct HopSummary {
    pub samples: u64,
    pub mean: f64,
    pub std_dev: f64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one inbound SEARCH message, whatever happens to it.
    pub fn record_seen(&mut self, mode: SearchMode) {
        self.mode_mut(mode).seen += 1;
    }

    /// Record the hop count of a VAL reply received by this node.
    pub fn record_hops(&mut self, mode: SearchMode, hop_count: u32) {
        let stats = self.mode_mut(mode);
        let hops = hop_count as f64;

        stats.samples += 1;
        stats.hops_sum += hops;
        stats.hops_squared_sum += hops * hops;
    }

    pub fn seen(&self, mode: SearchMode) -> u64 {
        self.mode(mode).seen
    }

    /// Returns `None` before any VAL reply of this mode was received.
    pub fn hop_summary(&self, mode: SearchMode) -> Option<HopSummary> {
        let stats = self.mode(mode);
        if stats.samples == 0 {
            return None;
        }

        let n = stats.samples as f64;
        let mean = stats.hops_sum / n;
        // Rounding can push a zero variance slightly below zero.
        let variance = (stats.hops_squared_sum / n - mean * mean).max(0.0);

        Some(HopSummary {
            samples: stats.samples,
            mean,
            std_dev: variance.sqrt(),
        })
    }

    /// Formatted hop summary, or `N/A` without samples.
    pub fn summarize(&self, mode: SearchMode) -> String {
        match self.hop_summary(mode) {
            Some(summary) => summary.to_string(),
            None => "N/A".to_string(),
        }
    }

    fn mode(&self, mode: SearchMode) -> &ModeStatistics {
        match mode {
            SearchMode::Flood => &self.flood,
            SearchMode::RandomWalk => &self.random_walk,
            SearchMode::DepthFirst => &self.depth_first,
        }
    }

    fn mode_mut(&mut self, mode: SearchMode) -> &mut ModeStatistics {
        match mode {
            SearchMode::Flood => &mut self.flood,
            SearchMode::RandomWalk => &mut self.random_walk,
            SearchMode::DepthFirst => &mut self.depth_first,
        }
    }
}

impl Display for HopSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (std dev {})",
            significant_digits(self.mean, 3),
            significant_digits(self.std_dev, 3)
        )
    }
}

impl Display for Statistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Statistics:")?;
        for mode in SearchMode::ALL {
            writeln!(f, "\t{} messages seen: {}", label(mode), self.seen(mode))?;
        }
        for mode in SearchMode::ALL {
            writeln!(
                f,
                "\tMean hops to find a key by {}: {}",
                label(mode),
                self.summarize(mode)
            )?;
        }
        Ok(())
    }
}

fn label(mode: SearchMode) -> &'static str {
    match mode {
        SearchMode::Flood => "flooding",
        SearchMode::RandomWalk => "random walk",
        SearchMode::DepthFirst => "depth-first",
    }
}

/// Fixed point rendering of `value` rounded to `digits` significant digits.
fn significant_digits(value: f64, digits: i32) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{:.*}", (digits - 1).max(0) as usize, value);
    }

    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (digits - 1 - magnitude).max(0) as usize;

    format!("{value:.decimals$}")
}
