//! Log-normal score transform: raw duration → 0–100.
//!
//! A curve is fixed by two control points: the duration scoring exactly 50
//! (the distribution's median) and the duration past which improvements
//! stop paying off. The score is `100 × (1 − CDF(duration))` under the
//! log-normal distribution those points determine, clamped to [0, 100].

/// Control points, in the same unit as the durations being scored.
#[derive(Debug, Clone, Copy)]
pub struct ScoringCurve {
    /// Duration at which the score is exactly 50.
    pub median: f64,
    /// Duration of the point of diminishing returns.
    pub point_of_diminishing_returns: f64,
}

impl ScoringCurve {
    /// The log-normal distribution these control points determine.
    pub fn distribution(&self) -> LogNormal {
        let location = self.median.ln();
        // The point of diminishing returns sits at the smaller positive root
        // of the CDF's third derivative; solve the shape parameter from that
        // root and the median.
        let log_ratio = (self.point_of_diminishing_returns / self.median).ln();
        let shape =
            (1.0 - 3.0 * log_ratio - ((log_ratio - 3.0).powi(2) - 8.0).sqrt()).sqrt() / 2.0;
        LogNormal { location, shape }
    }
}

/// A log-normal distribution in (location, shape) form.
#[derive(Debug, Clone, Copy)]
pub struct LogNormal {
    location: f64,
    shape: f64,
}

impl LogNormal {
    /// `1 − CDF(x)`: the share of the distribution above `x`. Turns
    /// lower-is-better durations into higher-is-better scores.
    pub fn complementary_percentile(&self, x: f64) -> f64 {
        let standardized = (x.ln() - self.location) / (std::f64::consts::SQRT_2 * self.shape);
        (1.0 - erf(standardized)) / 2.0
    }
}

/// Score a duration against a curve. Monotone non-increasing in the
/// duration; always within [0, 100]. A zero duration scores 100.
pub fn score(duration: f64, curve: &ScoringCurve) -> f64 {
    if duration <= 0.0 {
        return 100.0;
    }
    let value = 100.0 * curve.distribution().complementary_percentile(duration);
    value.clamp(0.0, 100.0)
}

/// Integer score for final reporting. The unrounded duration stays
/// available to callers that carry it in their results.
pub fn score_rounded(duration: f64, curve: &ScoringCurve) -> u8 {
    score(duration, curve).round() as u8
}

/// Abramowitz–Stegun polynomial approximation of the error function.
/// Maximum absolute error ~1.5e-7, well under a rounded score unit.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let t = 1.0 / (1.0 + P * x);
    let y = t * (A1 + t * (A2 + t * (A3 + t * (A4 + t * A5)))) * (-x * x).exp();
    sign * (1.0 - y)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// First-meaningful-paint control points, in milliseconds.
    fn paint_curve() -> ScoringCurve {
        ScoringCurve {
            median: 4000.0,
            point_of_diminishing_returns: 1600.0,
        }
    }

    #[test]
    fn median_duration_scores_fifty() {
        assert_eq!(score_rounded(4000.0, &paint_curve()), 50);
    }

    #[test]
    fn fast_paint_scores_near_one_hundred() {
        assert!(score_rounded(1100.0, &paint_curve()) >= 99);
    }

    #[test]
    fn slow_paint_scores_near_zero() {
        assert!(score_rounded(14000.0, &paint_curve()) <= 1);
    }

    #[test]
    fn monotone_non_increasing_over_the_whole_range() {
        let curve = paint_curve();
        let mut previous = score(0.0, &curve);
        for duration in (0..200).map(|i| i as f64 * 150.0) {
            let current = score(duration, &curve);
            assert!(
                current <= previous + 1e-9,
                "score rose from {previous} to {current} at {duration}"
            );
            previous = current;
        }
    }

    #[test]
    fn bounded_for_extreme_durations() {
        let curve = paint_curve();
        for duration in [0.0, 0.001, 1.0, 1e6, 1e12, f64::MAX] {
            let value = score(duration, &curve);
            assert!((0.0..=100.0).contains(&value), "score {value} for {duration}");
        }
    }

    #[test]
    fn zero_duration_scores_one_hundred() {
        assert_eq!(score(0.0, &paint_curve()), 100.0);
    }

    #[test]
    fn erf_matches_known_values() {
        assert!(erf(0.0).abs() < 1e-6);
        assert!((erf(1.0) - 0.842_700_79).abs() < 1e-6);
        assert!((erf(-1.0) + 0.842_700_79).abs() < 1e-6);
        assert!((erf(3.0) - 0.999_977_91).abs() < 1e-5);
    }

    #[test]
    fn different_curves_shift_the_midpoint() {
        let tighter = ScoringCurve {
            median: 1000.0,
            point_of_diminishing_returns: 400.0,
        };
        assert_eq!(score_rounded(1000.0, &tighter), 50);
        assert!(score(2000.0, &tighter) < score(2000.0, &paint_curve()));
    }
}
