//! Small numeric helpers over optional values. Undefined inputs (null or
//! NaN) are skipped rather than treated as zero.

use serde::Serialize;

use crate::schema::tercile;

fn defined(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

/// Mean over the defined values; NaN when there are none.
pub fn mean_defined<I>(values: I) -> f64
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, n) = values
        .into_iter()
        .filter_map(defined)
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Pearson correlation over the pairs where both sides are defined.
///
/// NaN with fewer than two pairs or when either side has zero variance.
pub fn pearson<I>(pairs: I) -> f64
where
    I: IntoIterator<Item = (Option<f64>, Option<f64>)>,
{
    let pairs: Vec<(f64, f64)> = pairs
        .into_iter()
        .filter_map(|(x, y)| Some((defined(x)?, defined(y)?)))
        .collect();
    let n = pairs.len();
    if n < 2 {
        return f64::NAN;
    }

    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n as f64;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n as f64;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    (sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0)
}

/// Linear-interpolated quantile of sorted data, `q` in `[0, 1]`.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Equal-frequency bucket of an income distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tercile {
    Low,
    Medium,
    High,
}

impl Tercile {
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => tercile::LOW,
            Self::Medium => tercile::MEDIUM,
            Self::High => tercile::HIGH,
        }
    }
}

/// Bin edges of a three-way equal-frequency split.
///
/// Bins are right-closed; the lowest bin also includes the minimum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TercileEdges {
    pub min: f64,
    pub lower: f64,
    pub upper: f64,
    pub max: f64,
}

impl TercileEdges {
    /// Edges over the defined values, `None` when there are none.
    pub fn fit<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let mut sorted: Vec<f64> = values.into_iter().filter_map(defined).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            min: sorted[0],
            lower: quantile_sorted(&sorted, 1.0 / 3.0),
            upper: quantile_sorted(&sorted, 2.0 / 3.0),
            max: sorted[sorted.len() - 1],
        })
    }

    /// Bucket of a value. Values outside `[min, max]` and undefined values
    /// have no bucket. With tied edges the lowest matching bucket wins.
    pub fn classify(&self, value: Option<f64>) -> Option<Tercile> {
        let v = defined(value)?;
        if v < self.min || v > self.max {
            None
        } else if v <= self.lower {
            Some(Tercile::Low)
        } else if v <= self.upper {
            Some(Tercile::Medium)
        } else {
            Some(Tercile::High)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_skips_undefined() {
        let m = mean_defined([Some(1.0), None, Some(f64::NAN), Some(3.0)]);
        assert_eq!(m, 2.0);
        assert!(mean_defined([None, None]).is_nan());
    }

    #[test]
    fn pearson_perfect_and_inverse() {
        let up = pearson((1..=5).map(|i| (Some(i as f64), Some(2.0 * i as f64 + 1.0))));
        assert!((up - 1.0).abs() < 1e-12);
        let down = pearson((1..=5).map(|i| (Some(i as f64), Some(-(i as f64)))));
        assert!((down + 1.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_zero_variance_is_nan() {
        let r = pearson((1..=4).map(|i| (Some(i as f64), Some(7.0))));
        assert!(r.is_nan());
        assert!(pearson([(Some(1.0), Some(1.0))]).is_nan());
    }

    #[test]
    fn pearson_drops_incomplete_pairs() {
        let with_gaps = pearson([
            (Some(1.0), Some(2.0)),
            (Some(2.0), None),
            (Some(3.0), Some(6.0)),
            (None, Some(100.0)),
            (Some(5.0), Some(10.0)),
        ]);
        assert!((with_gaps - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tercile_edges_follow_linear_quantiles() {
        let edges = TercileEdges::fit((1..=9).map(|i| Some(i as f64))).unwrap();
        assert!((edges.lower - (1.0 + 8.0 / 3.0)).abs() < 1e-12);
        assert!((edges.upper - (1.0 + 16.0 / 3.0)).abs() < 1e-12);

        let buckets: Vec<Tercile> = (1..=9)
            .map(|i| edges.classify(Some(i as f64)).unwrap())
            .collect();
        assert_eq!(
            buckets,
            vec![
                Tercile::Low,
                Tercile::Low,
                Tercile::Low,
                Tercile::Medium,
                Tercile::Medium,
                Tercile::Medium,
                Tercile::High,
                Tercile::High,
                Tercile::High,
            ]
        );
    }

    #[test]
    fn tercile_ignores_undefined() {
        let edges = TercileEdges::fit([Some(1.0), None, Some(2.0), Some(3.0)]).unwrap();
        assert_eq!(edges.classify(None), None);
        assert_eq!(edges.classify(Some(1.0)), Some(Tercile::Low));
        assert_eq!(edges.classify(Some(3.0)), Some(Tercile::High));
        assert!(TercileEdges::fit([None]).is_none());
    }
}
