//! Post-hoc market statistics computed from archived rounds.

use std::fmt;

use serde::Serialize;

use crate::market::protocol::RoundRecord;

/// Aggregate indicators derived from a complete simulation run.
///
/// Computed post-hoc from the round archive so the report always agrees
/// with the per-round records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketReport {
    /// Rounds opened, including superseded ones.
    pub rounds: usize,
    /// Rounds that found a clearing price.
    pub cleared: usize,
    /// Rounds that cleared without an equilibrium.
    pub failed: usize,
    /// Rounds replaced by a newer round before finishing.
    pub superseded: usize,
    /// Mean clearing price over cleared rounds (0.0 if none).
    pub mean_price: f64,
    /// Lowest clearing price (0.0 if none).
    pub min_price: f64,
    /// Highest clearing price (0.0 if none).
    pub max_price: f64,
    /// Participant-rounds that missed the proposal deadline.
    pub timeouts: usize,
    /// Participant-rounds answered with a reject.
    pub rejections: usize,
    /// Participant-rounds whose proposal could not be decoded.
    pub malformed: usize,
    /// Participant-rounds whose acknowledgement never arrived.
    pub unacknowledged: usize,
}

impl MarketReport {
    /// Computes the report from the archived rounds.
    pub fn from_rounds(rounds: &[RoundRecord]) -> Self {
        let mut report = Self {
            rounds: rounds.len(),
            ..Self::default()
        };

        let mut price_sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for r in rounds {
            if r.superseded {
                report.superseded += 1;
            }
            report.timeouts += r.timed_out.len();
            report.malformed += r.malformed.len();
            report.unacknowledged += r.unacknowledged.len();

            let Some(result) = &r.result else {
                continue;
            };
            report.rejections += result.unmatched.len();
            match result.price {
                Some(p) => {
                    report.cleared += 1;
                    price_sum += p;
                    min = min.min(p);
                    max = max.max(p);
                }
                None => report.failed += 1,
            }
        }

        if report.cleared > 0 {
            report.mean_price = price_sum / report.cleared as f64;
            report.min_price = min;
            report.max_price = max;
        }
        report
    }
}

impl fmt::Display for MarketReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Market Report ---")?;
        writeln!(
            f,
            "Rounds:                {} ({} cleared, {} failed, {} superseded)",
            self.rounds, self.cleared, self.failed, self.superseded
        )?;
        writeln!(f, "Mean clearing price:   {:.3}", self.mean_price)?;
        writeln!(
            f,
            "Price range:           {:.3} .. {:.3}",
            self.min_price, self.max_price
        )?;
        writeln!(f, "Proposal timeouts:     {}", self.timeouts)?;
        writeln!(
            f,
            "Rejections:            {} ({} malformed)",
            self.rejections, self.malformed
        )?;
        write!(f, "Missing acks:          {}", self.unacknowledged)
    }
}
