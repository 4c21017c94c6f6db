use std::cmp::Ordering;
use std::collections::HashMap;

/// Percentage of `part` in `total`, 0 when `total` is 0.
pub fn rate(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(cmp_f64);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample standard deviation (n - 1). Fewer than two values give 0.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    var.sqrt()
}

pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().min_by(cmp_f64).unwrap_or(0.0)
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().max_by(cmp_f64).unwrap_or(0.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Most frequent value; ties go to the lexicographically smallest key so
/// the answer does not depend on input order.
pub fn mode<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(value, _)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_guards_zero_total() {
        assert_eq!(rate(3, 0), 0.0);
        assert_eq!(rate(6, 10), 60.0);
    }

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn std_dev_uses_sample_definition() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((sample_std_dev(&values) - 2.138).abs() < 0.001);
        assert_eq!(sample_std_dev(&[42.0]), 0.0);
    }

    #[test]
    fn min_max_of_empty_are_zero() {
        assert_eq!(min(&[]), 0.0);
        assert_eq!(max(&[]), 0.0);
        assert_eq!(max(&[1.0, 9.5, 3.0]), 9.5);
    }

    #[test]
    fn rounding_to_two_places() {
        assert_eq!(round2(66.499_999), 66.5);
        assert_eq!(round2(33.333_333), 33.33);
        assert_eq!(round1(12.25), 12.3);
    }

    #[test]
    fn mode_breaks_ties_alphabetically() {
        let tags = ["sql", "python", "sql", "python", "ml"];
        assert_eq!(mode(tags.iter().copied()), Some("python".to_string()));
        assert_eq!(mode(std::iter::empty()), None);
    }
}
