//! Trailing-window statistics over a row series.
//!
//! Every function returns one entry per input row. An entry is `None` while
//! fewer than `window` rows are available, or when the statistic has no
//! defined value (a zero standard deviation for z-scores, a missing input).

/// Simple moving average over the last `window` values.
#[must_use]
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    windows(values, window)
        .map(|slice| slice.map(mean))
        .collect()
}

/// Sample standard deviation (n - 1) over the last `window` values.
#[must_use]
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    windows(values, window)
        .map(|slice| slice.and_then(sample_std))
        .collect()
}

/// `(value - mean) / std` where mean and std cover the trailing window,
/// current value included.
#[must_use]
pub fn rolling_zscore(values: &[f64], window: usize) -> Vec<Option<f64>> {
    windows(values, window)
        .zip(values)
        .map(|(slice, &current)| {
            let slice = slice?;
            let std = sample_std(slice)?;
            if std > f64::EPSILON {
                Some((current - mean(slice)) / std)
            } else {
                None
            }
        })
        .collect()
}

/// Trailing `(min, max)` over the last `window` values.
#[must_use]
pub fn rolling_min_max(values: &[f64], window: usize) -> Vec<Option<(f64, f64)>> {
    windows(values, window)
        .map(|slice| {
            slice.map(|s| {
                s.iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                        (lo.min(v), hi.max(v))
                    })
            })
        })
        .collect()
}

/// First difference; the first entry and any entry touching a `None` are `None`.
#[must_use]
pub fn diff(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(None);
    out.extend(values.windows(2).map(|pair| match (pair[0], pair[1]) {
        (Some(prev), Some(curr)) => Some(curr - prev),
        _ => None,
    }));
    out
}

fn windows(values: &[f64], window: usize) -> impl Iterator<Item = Option<&[f64]>> {
    (0..values.len()).map(move |i| {
        if window == 0 || i + 1 < window {
            None
        } else {
            Some(&values[i + 1 - window..=i])
        }
    })
}

fn mean(slice: &[f64]) -> f64 {
    slice.iter().sum::<f64>() / slice.len() as f64
}

fn sample_std(slice: &[f64]) -> Option<f64> {
    if slice.len() < 2 {
        return None;
    }
    let m = mean(slice);
    let variance = slice.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (slice.len() - 1) as f64;
    Some(variance.sqrt())
}
