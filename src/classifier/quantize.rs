
/// Bin index used for missing values
pub const MISSING_BIN: u16 = u16::MAX;

/// Quantile cut points for every feature, learned from a training matrix.
/// Bin `b` of a feature holds values in `(upper_bounds[b-1], upper_bounds[b]]`, so a split on bins maps to a raw threshold.
#[derive(Clone, Debug)]
pub struct FeatureBins {
    upper_bounds: Vec<Vec<f64>>
}

impl FeatureBins {
    /// Learns cut points from row-major data
    /// # Arguments
    /// * `rows` - training rows, all the same width
    /// * `num_features` - row width
    /// * `max_bin` - maximum bins per feature, excluding the missing bin
    pub fn fit(rows: &[&[f64]], num_features: usize, max_bin: usize) -> Self {
        let max_bin = max_bin.clamp(2, (MISSING_BIN - 1) as usize);
        let upper_bounds = (0..num_features)
            .map(|f| {
                let mut values: Vec<f64> = rows.iter()
                    .map(|r| r[f])
                    .filter(|v| !v.is_nan())
                    .collect();
                values.sort_by(|a, b| a.total_cmp(b));
                quantile_bounds(&values, max_bin)
            })
            .collect();
        Self { upper_bounds }
    }

    /// Bin of a raw value; values above the last bound land in the last bin
    pub fn bin(&self, feature: usize, value: f64) -> u16 {
        if value.is_nan() {
            return MISSING_BIN;
        }
        let bounds = &self.upper_bounds[feature];
        if bounds.is_empty() {
            return MISSING_BIN;
        }
        let index = bounds.partition_point(|&u| u < value);
        index.min(bounds.len() - 1) as u16
    }

    /// Raw threshold equivalent to "bin <= b"
    pub fn threshold(&self, feature: usize, bin: u16) -> f64 {
        self.upper_bounds[feature][bin as usize]
    }

    /// Number of non-missing bins for a feature
    pub fn num_bins(&self, feature: usize) -> usize {
        self.upper_bounds[feature].len()
    }

    /// Quantizes row-major data into a column-major bin matrix
    pub fn transform(&self, rows: &[&[f64]]) -> Vec<Vec<u16>> {
        (0..self.upper_bounds.len())
            .map(|f| rows.iter().map(|r| self.bin(f, r[f])).collect())
            .collect()
    }
}

/// Distinct values when there are few of them, otherwise evenly spaced quantiles
fn quantile_bounds(sorted: &[f64], max_bin: usize) -> Vec<f64> {
    let mut distinct: Vec<f64> = sorted.to_vec();
    distinct.dedup();
    if distinct.len() <= max_bin {
        return distinct;
    }

    let n = sorted.len();
    let mut bounds: Vec<f64> = (1..=max_bin)
        .map(|k| {
            let index = (k * n).div_ceil(max_bin) - 1;
            sorted[index]
        })
        .collect();
    bounds.dedup();
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_values() {
        let data: Vec<Vec<f64>> = vec![vec![3.0], vec![1.0], vec![f64::NAN], vec![2.0], vec![1.0]];
        let rows: Vec<&[f64]> = data.iter().map(|r| r.as_slice()).collect();
        let bins = FeatureBins::fit(&rows, 1, 256);
        assert_eq!(bins.num_bins(0), 3);
        assert_eq!(bins.bin(0, 1.0), 0);
        assert_eq!(bins.bin(0, 1.5), 1);
        assert_eq!(bins.bin(0, 3.0), 2);
        assert_eq!(bins.bin(0, 10.0), 2);
        assert_eq!(bins.bin(0, -10.0), 0);
        assert_eq!(bins.bin(0, f64::NAN), MISSING_BIN);
        assert_eq!(bins.threshold(0, 1), 2.0);
        assert_eq!(bins.transform(&rows), vec![vec![2, 0, MISSING_BIN, 1, 0]]);
    }

    #[test]
    fn test_quantiles() {
        let data: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64]).collect();
        let rows: Vec<&[f64]> = data.iter().map(|r| r.as_slice()).collect();
        let bins = FeatureBins::fit(&rows, 1, 4);
        assert_eq!(bins.num_bins(0), 4);
        assert_eq!(bins.threshold(0, 0), 24.0);
        assert_eq!(bins.threshold(0, 3), 99.0);
        // a bin split is the same as comparing the raw value to the threshold
        for v in [0.0, 24.0, 24.5, 50.0, 99.0] {
            assert_eq!(bins.bin(0, v) == 0, v <= bins.threshold(0, 0));
        }
    }

    #[test]
    fn test_all_missing() {
        let data: Vec<Vec<f64>> = vec![vec![f64::NAN], vec![f64::NAN]];
        let rows: Vec<&[f64]> = data.iter().map(|r| r.as_slice()).collect();
        let bins = FeatureBins::fit(&rows, 1, 256);
        assert_eq!(bins.num_bins(0), 0);
        assert_eq!(bins.bin(0, 1.0), MISSING_BIN);
    }
}
