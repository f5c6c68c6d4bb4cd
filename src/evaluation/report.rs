//! Plain-text reports printed by the evaluation tool.

use std::fmt;

use crate::training::registry::{self, FEATURE_GROUPS};

use super::domain::{Comparison, EvaluationResult};

const WIDTH: usize = 75;

fn mark(ok: bool) -> char {
    if ok {
        '✓'
    } else {
        '○'
    }
}

/// Report for one evaluated version.
pub struct EvaluationReport<'a>(pub &'a EvaluationResult);

impl fmt::Display for EvaluationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0;
        let rule = "=".repeat(WIDTH);
        writeln!(f, "{rule}\nMODEL EVALUATION: {}\n{rule}", r.version)?;
        writeln!(f, "\nCore Metrics:")?;
        writeln!(f, "  R² Score:        {:.4}", r.r2)?;
        writeln!(f, "  MAE:             ${:.2}", r.mae)?;
        writeln!(f, "  Median AE:       ${:.2}", r.median_ae)?;
        writeln!(f, "  RMSE:            ${:.2}", r.rmse)?;
        writeln!(f, "\nAccuracy Distribution:")?;
        writeln!(f, "  Within ±$10:     {:.1}% of predictions", r.accuracy_within_10)?;
        writeln!(f, "  Within ±$5:      {:.1}% of predictions", r.accuracy_within_5)?;
        writeln!(f, "  Within ±20%:     {:.1}% of predictions", r.accuracy_within_20pct)?;
        writeln!(f, "\nError Percentiles (% of actual price):")?;
        writeln!(f, "  Median:          {:.1}%", r.error_pct_p50)?;
        writeln!(f, "  90th percentile: {:.1}%", r.error_pct_p90)?;
        writeln!(f, "  95th percentile: {:.1}%", r.error_pct_p95)?;

        if let Some(target) = registry::target_for(&r.version) {
            writeln!(f, "\nTarget Comparison:")?;
            writeln!(f, "  {} R² ≥ {}: {:.4}", mark(target.r2_met(r.r2)), target.r2, r.r2)?;
            writeln!(
                f,
                "  {} MAE ≤ ${}: ${:.2}",
                mark(target.mae_met(r.mae)),
                target.mae,
                r.mae
            )?;
        }

        let band = r.interpretation();
        writeln!(f, "\nInterpretation:")?;
        writeln!(f, "  {} (R² = {:.4})", band.headline(), r.r2)?;
        writeln!(f, "  {}", band.advice())?;
        write!(f, "{rule}")
    }
}

/// Per-version reports followed by a summary table.
pub struct ComparisonReport<'a>(pub &'a Comparison);

impl fmt::Display for ComparisonReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cmp = self.0;
        let rule = "─".repeat(WIDTH);
        for r in &cmp.results {
            writeln!(f, "{}\n", EvaluationReport(r))?;
        }
        writeln!(f, "{rule}\nSUMMARY TABLE\n{rule}")?;
        writeln!(f, "{:<20} {:<10} {:<12} {:<18}", "Version", "R²", "MAE", "Accuracy(±$10)")?;
        writeln!(f, "{}", "-".repeat(60))?;
        for r in &cmp.results {
            writeln!(
                f,
                "{:<20} {:<10.4} ${:<11.2} {:.1}%",
                r.version, r.r2, r.mae, r.accuracy_within_10
            )?;
        }
        for (version, reason) in &cmp.skipped {
            writeln!(f, "{version:<20} skipped: {reason}")?;
        }
        match cmp.best() {
            Some(best) => writeln!(f, "\n✓ Best model: {} (R² = {:.4})", best.version, best.r2)?,
            None => writeln!(f, "\nNo trained models to compare.")?,
        }
        write!(f, "{rule}")
    }
}

/// Which feature groups exist today and which are planned.
pub struct FeatureRoadmap;

impl fmt::Display for FeatureRoadmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(WIDTH);
        writeln!(f, "{rule}\nFEATURE ENGINEERING ROADMAP\n{rule}")?;

        let mut available = 0;
        let mut potential = 0;
        for group in &FEATURE_GROUPS {
            available += group.features.len();
            potential += group.estimated_features.unwrap_or(0);
            writeln!(
                f,
                "\n{} {}: {}",
                mark(group.available),
                group.name.to_uppercase(),
                group.description
            )?;
            if group.available {
                let names: Vec<&str> = group.features.iter().take(3).map(|x| x.name()).collect();
                writeln!(f, "   Features: {}...", names.join(", "))?;
            } else {
                if let Some(placeholder) = group.placeholder {
                    writeln!(f, "   Placeholder: {placeholder}")?;
                }
                if let Some(n) = group.estimated_features {
                    writeln!(f, "   Estimated features: {n}")?;
                }
            }
        }
        writeln!(f, "\n{}", "─".repeat(WIDTH))?;
        writeln!(f, "Current features: {available}")?;
        writeln!(f, "Potential features: {}", available + potential)?;
        write!(f, "{}", "─".repeat(WIDTH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roadmap_counts_available_and_planned_features() {
        let text = FeatureRoadmap.to_string();
        // core 5 + temporal 4 + weather 2, planned 8+8+8+6+6+6.
        assert!(text.contains("Current features: 11"));
        assert!(text.contains("Potential features: 53"));
        assert!(text.contains("○ VEHICLE"));
        assert!(text.contains("✓ CORE"));
    }

    #[test]
    fn evaluation_report_shows_target_and_band() {
        let r = EvaluationResult::score("v2_current", vec![10.0, 20.0, 30.0], vec![10.0, 20.0, 30.0]);
        let text = EvaluationReport(&r).to_string();
        assert!(text.contains("MODEL EVALUATION: v2_current"));
        assert!(text.contains("✓ R² ≥ 0.35"));
        assert!(text.contains("Excellent accuracy"));
    }

    #[test]
    fn comparison_names_the_best_model() {
        let cmp = Comparison {
            results: vec![
                EvaluationResult::score("baseline", vec![10.0, 20.0, 30.0], vec![12.0, 18.0, 33.0]),
                EvaluationResult::score("v2_current", vec![10.0, 20.0, 30.0], vec![10.5, 19.5, 30.0]),
            ],
            skipped: vec![("v1_improved".into(), "no trained artifact".into())],
        };
        let text = ComparisonReport(&cmp).to_string();
        assert!(text.contains("Best model: v2_current"));
        assert!(text.contains("v1_improved          skipped: no trained artifact"));
    }

    #[test]
    fn comparison_embeds_each_evaluation_report() {
        let r = EvaluationResult::score("baseline", vec![10.0, 20.0, 30.0], vec![11.0, 19.0, 31.0]);
        let cmp = Comparison {
            results: vec![r.clone()],
            skipped: Vec::new(),
        };
        let text = ComparisonReport(&cmp).to_string();
        assert!(text.starts_with(&EvaluationReport(&r).to_string()));
        assert!(text.contains("✓ Best model: baseline"));
        assert!(text.ends_with(&"─".repeat(WIDTH)));

        let empty = ComparisonReport(&Comparison::default()).to_string();
        assert!(empty.contains("No trained models to compare."));
    }
}
