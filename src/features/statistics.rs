
use statrs::distribution::{Discrete, Hypergeometric};

/// Relative tolerance when comparing table probabilities, matching the usual Fisher implementations
const FISHER_RELATIVE_TOLERANCE: f64 = 1e-7;

/// Two-sided Fisher exact test p-value for the 2x2 table `[[a, b], [c, d]]`.
/// Sums the probability of every table with the same margins that is no more likely than the observed one.
/// Returns NaN for an empty table.
/// # Arguments
/// * `a`, `b` - first row, e.g. REF forward and REF reverse reads
/// * `c`, `d` - second row, e.g. ALT forward and ALT reverse reads
pub fn fisher_exact_two_sided(a: u64, b: u64, c: u64, d: u64) -> f64 {
    let population = a + b + c + d;
    if population == 0 {
        return f64::NAN;
    }
    let successes = a + c;
    let draws = a + b;

    let distribution = match Hypergeometric::new(population, successes, draws) {
        Ok(h) => h,
        Err(_) => return f64::NAN
    };
    let observed = distribution.pmf(a);
    let cutoff = observed * (1.0 + FISHER_RELATIVE_TOLERANCE);

    let min_x = (draws + successes).saturating_sub(population);
    let max_x = successes.min(draws);
    let p_value: f64 = (min_x..=max_x)
        .map(|x| distribution.pmf(x))
        .filter(|&p| p <= cutoff)
        .sum();
    p_value.min(1.0)
}

/// Wilcoxon rank-sum z statistic of `x` against `y`, using average ranks for ties and no tie correction.
/// Positive when `x` tends to be larger. NaN if either group is empty.
/// # Arguments
/// * `x` - first sample, e.g. ALT read mapping qualities
/// * `y` - second sample, e.g. REF read mapping qualities
pub fn mann_whitney_z(x: &[f64], y: &[f64]) -> f64 {
    let n1 = x.len();
    let n2 = y.len();
    if n1 == 0 || n2 == 0 {
        return f64::NAN;
    }

    // (value, from_x)
    let mut pooled: Vec<(f64, bool)> = x.iter().map(|&v| (v, true))
        .chain(y.iter().map(|&v| (v, false)))
        .collect();
    pooled.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rank_sum_x = 0.0;
    let mut i = 0;
    while i < pooled.len() {
        let mut j = i;
        while j + 1 < pooled.len() && pooled[j + 1].0 == pooled[i].0 {
            j += 1;
        }
        // ranks are 1-based, so the tied block i..=j shares the average of (i+1)..=(j+1)
        let average_rank = (i + j + 2) as f64 / 2.0;
        rank_sum_x += pooled[i..=j].iter().filter(|(_v, from_x)| *from_x).count() as f64 * average_rank;
        i = j + 1;
    }

    let n1 = n1 as f64;
    let n2 = n2 as f64;
    let expected = n1 * (n1 + n2 + 1.0) / 2.0;
    let deviation = (n1 * n2 * (n1 + n2 + 1.0) / 12.0).sqrt();
    (rank_sum_x - expected) / deviation
}

/// Arithmetic mean, NaN when empty
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Length of the single-base run containing `index`, case-insensitive; 0 if out of bounds
fn run_length_at(sequence: &[u8], index: usize) -> usize {
    if index >= sequence.len() {
        return 0;
    }
    let base = sequence[index].to_ascii_uppercase();
    let left = sequence[..index].iter()
        .rev()
        .take_while(|b| b.to_ascii_uppercase() == base)
        .count();
    let right = sequence[index + 1..].iter()
        .take_while(|b| b.to_ascii_uppercase() == base)
        .count();
    left + 1 + right
}

/// Longest single-base run fully counted inside a slice
fn longest_run(sequence: &[u8]) -> usize {
    let mut best = 0;
    let mut current = 0;
    let mut previous: Option<u8> = None;
    for b in sequence.iter().map(|b| b.to_ascii_uppercase()) {
        if previous == Some(b) {
            current += 1;
        } else {
            current = 1;
            previous = Some(b);
        }
        best = best.max(current);
    }
    best
}

/// Flank on each side of the REF span that is scanned for the longest run
pub const HOMOPOLYMER_FLANK: usize = 20;

/// Homopolymer context of a site as (site length, max length in the window).
/// The site length is the longer of the run holding the first REF base and the run right after the REF span.
/// # Arguments
/// * `contig` - full contig sequence
/// * `position` - 1-based site position
/// * `ref_length` - length of the normalized REF allele
pub fn homopolymer_lengths(contig: &[u8], position: u64, ref_length: usize) -> (usize, usize) {
    if position == 0 || contig.is_empty() {
        return (0, 0);
    }
    let first = position as usize - 1;
    let after = first + ref_length;
    let site_length = run_length_at(contig, first).max(run_length_at(contig, after));

    let window_start = first.saturating_sub(HOMOPOLYMER_FLANK).min(contig.len());
    let window_end = (after + HOMOPOLYMER_FLANK).min(contig.len());
    let max_length = longest_run(&contig[window_start..window_end]);
    (site_length, max_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    #[test]
    fn test_fisher_exact() {
        // reference values from R fisher.test
        assert_approx_eq!(fisher_exact_two_sided(3, 1, 1, 3), 0.4857142857142857);
        assert_approx_eq!(fisher_exact_two_sided(10, 0, 0, 10), 1.0825088224469026e-05);
        assert_approx_eq!(fisher_exact_two_sided(2, 2, 2, 2), 1.0);
        assert_approx_eq!(fisher_exact_two_sided(5, 0, 0, 0), 1.0);
        assert!(fisher_exact_two_sided(0, 0, 0, 0).is_nan());
    }

    #[test]
    fn test_mann_whitney_z() {
        // no overlap: all x ranks above y
        let z = mann_whitney_z(&[4.0, 5.0, 6.0], &[1.0, 2.0, 3.0]);
        assert_approx_eq!(z, 1.963961012123931);
        assert_approx_eq!(mann_whitney_z(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), -z);

        // all tied
        assert_approx_eq!(mann_whitney_z(&[60.0, 60.0], &[60.0, 60.0, 60.0]) + 1.0, 1.0);
        assert!(mann_whitney_z(&[], &[1.0]).is_nan());
        assert!(mann_whitney_z(&[1.0], &[]).is_nan());
    }

    #[test]
    fn test_mean() {
        assert_approx_eq!(mean(&[1.0, 2.0, 6.0]), 3.0);
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn test_homopolymer_lengths() {
        //             1234567890
        let contig = b"ACGTTTTTGCAAAAC";
        // T at position 4 is inside a run of 5
        assert_eq!(homopolymer_lengths(contig, 4, 1), (5, 5));
        // G at position 9 is a run of 1, followed by C of run 1
        assert_eq!(homopolymer_lengths(contig, 9, 1), (1, 5));
        // two base REF span at 10..11; the base after the span belongs to the AAAA run
        assert_eq!(homopolymer_lengths(contig, 10, 2), (4, 5));
        // lowercase bases compare equal
        assert_eq!(homopolymer_lengths(b"aaAAc", 1, 1), (4, 4));
        // past the end of the contig
        assert_eq!(homopolymer_lengths(contig, 15, 1), (1, 5));
    }
}
