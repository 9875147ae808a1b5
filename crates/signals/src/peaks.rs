//! Local maxima with a minimum separation.
//!
//! A flat top registers once, at its last index. A candidate within
//! `min_distance` rows of an earlier candidate is dropped, so the earlier
//! index wins. With these rules `is_peak[i]` depends only on rows `..=i + 1`,
//! and a trailing window of the series sees the same peaks as the full one.

/// Flags the peaks of `values`. The first and last rows are never peaks.
#[must_use]
pub fn find_peaks(values: &[f64], min_distance: usize) -> Vec<bool> {
    let n = values.len();
    let mut flags = vec![false; n];
    let mut last_candidate: Option<usize> = None;

    let mut i = 1;
    while i + 1 < n {
        if values[i] > values[i - 1] {
            let mut end = i;
            while end + 1 < n && values[end + 1] == values[i] {
                end += 1;
            }
            if end + 1 < n && values[end + 1] < values[i] {
                let suppressed = last_candidate.is_some_and(|prev| end - prev < min_distance);
                if !suppressed {
                    flags[end] = true;
                }
                last_candidate = Some(end);
            }
            i = end + 1;
        } else {
            i += 1;
        }
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak_indices(values: &[f64], min_distance: usize) -> Vec<usize> {
        find_peaks(values, min_distance)
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| p.then_some(i))
            .collect()
    }

    #[test]
    fn single_clean_peak() {
        assert_eq!(peak_indices(&[1.0, 2.0, 3.0, 1.0, 0.5], 2), vec![2]);
    }

    #[test]
    fn endpoints_are_never_peaks() {
        assert!(peak_indices(&[5.0, 1.0, 2.0], 2).is_empty());
        assert!(peak_indices(&[1.0, 2.0, 3.0], 2).is_empty());
    }

    #[test]
    fn monotonic_and_flat_series_have_no_peaks() {
        assert!(peak_indices(&[0.2; 50], 2).is_empty());
        let falling: Vec<f64> = (0..20).map(|i| 1.0 - f64::from(i) * 0.01).collect();
        assert!(peak_indices(&falling, 2).is_empty());
    }

    #[test]
    fn plateau_registers_once_at_its_end() {
        assert_eq!(peak_indices(&[1.0, 3.0, 3.0, 3.0, 1.0], 2), vec![3]);
    }

    #[test]
    fn plateau_followed_by_rise_is_not_a_peak() {
        assert!(peak_indices(&[1.0, 3.0, 3.0, 5.0, 6.0], 2).is_empty());
    }

    #[test]
    fn earlier_candidate_wins_within_distance() {
        // Candidates at 1, 3 and 5, each two rows apart.
        let values = [0.0, 2.0, 1.0, 3.0, 1.0, 2.5, 0.0];
        assert_eq!(peak_indices(&values, 2), vec![1, 3, 5]);
        assert_eq!(peak_indices(&values, 3), vec![1]);
        assert_eq!(peak_indices(&values, 5), vec![1]);
    }

    #[test]
    fn trailing_window_sees_same_peaks() {
        let values: Vec<f64> = (0..40).map(|i| (f64::from(i) * 0.7).sin()).collect();
        let full = find_peaks(&values, 3);
        let offset = 15;
        let window = find_peaks(&values[offset..], 3);
        // Rows whose neighbourhood lies fully inside the window agree.
        for i in (offset + 4)..values.len() {
            assert_eq!(full[i], window[i - offset], "row {i}");
        }
    }
}
