//! Base-100 rebasing against the first non-null price.

use super::SeriesTransform;

#[derive(Debug, Clone)]
pub struct Rebase {
    base: f64,
}

impl Rebase {
    pub fn new() -> Self {
        Self { base: 100.0 }
    }
}

impl Default for Rebase {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesTransform for Rebase {
    fn name(&self) -> &str {
        "rebased"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, prices: &[Option<f64>]) -> Vec<Option<f64>> {
        let Some(first) = prices.iter().flatten().copied().next() else {
            return vec![None; prices.len()];
        };
        prices
            .iter()
            .map(|p| {
                p.map(|p| p / first * self.base)
                    .filter(|v| v.is_finite())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::assert_close;

    #[test]
    fn first_observation_is_exactly_100() {
        let r = Rebase::new().compute(&[None, Some(37.3), Some(74.6)]);
        assert_eq!(r[0], None);
        assert_eq!(r[1], Some(100.0));
        assert_close(r[2], 200.0);
    }

    #[test]
    fn scale_invariant() {
        let a = Rebase::new().compute(&[Some(1.0), Some(1.5)]);
        let b = Rebase::new().compute(&[Some(1000.0), Some(1500.0)]);
        assert_close(a[1], b[1].unwrap());
    }

    #[test]
    fn all_null_stays_null() {
        assert_eq!(Rebase::new().compute(&[None, None]), vec![None, None]);
    }
}
