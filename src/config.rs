use anyhow::bail;
use serde::Serialize;

/// Weights must sum to 1.0 within this tolerance for a config to be accepted.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Immutable scoring parameters for one evaluation pass. Resolved once
/// (stored row or defaults) before any evaluator runs, so the evaluators
/// never branch on whether a config was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringConfig {
    pub weight_deadline: f64,
    pub weight_importance: f64,
    pub weight_next_class: f64,
    pub weight_effort_fit: f64,
    pub deadline_window_days: i32,
    pub next_class_window_hours: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            weight_deadline: 0.4,
            weight_importance: 0.3,
            weight_next_class: 0.2,
            weight_effort_fit: 0.1,
            deadline_window_days: 14,
            next_class_window_hours: 6,
        }
    }
}

impl ScoringConfig {
    /// Resolve a possibly-missing stored config to a usable snapshot.
    pub fn resolve(stored: Option<ScoringConfig>) -> ScoringConfig {
        stored.unwrap_or_default()
    }

    /// Reject any config that breaks the scoring invariants. Called before a
    /// config write is persisted; an invalid config is never partially saved.
    pub fn validate(&self) -> anyhow::Result<()> {
        let weights = [
            ("weight-deadline", self.weight_deadline),
            ("weight-importance", self.weight_importance),
            ("weight-next-class", self.weight_next_class),
            ("weight-effort-fit", self.weight_effort_fit),
        ];
        for (name, value) in weights {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be between 0 and 1, got {value}");
            }
        }

        let sum = self.weight_deadline
            + self.weight_importance
            + self.weight_next_class
            + self.weight_effort_fit;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            bail!("weights must sum to 1.0 (+/- {WEIGHT_SUM_TOLERANCE}), got {sum}");
        }

        if self.deadline_window_days <= 0 {
            bail!(
                "deadline-window-days must be positive, got {}",
                self.deadline_window_days
            );
        }
        if self.next_class_window_hours <= 0 {
            bail!(
                "next-class-window-hours must be positive, got {}",
                self.next_class_window_hours
            );
        }

        Ok(())
    }
}
