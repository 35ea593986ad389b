use crate::encoding::{color_signal, encode};
use crate::frequency::FrequencyTable;

pub fn window_features(window: &[u8], freq: &FrequencyTable) -> Vec<f64> {
    let (even_fraction, odd_fraction) = parity_fractions(window);

    let mut out = Vec::with_capacity(super::vector_len(window.len()));
    for (i, &v) in window.iter().enumerate() {
        let e = encode(v);
        let diff = if i > 0 { v as f64 - window[i - 1] as f64 } else { 0.0 };
        out.extend_from_slice(&[
            e.parity as f64, // 0
            e.mod3 as f64, // 1
            if e.is_high { 1.0 } else { 0.0 }, // 2
            color_signal(e.color), // 3
            e.column as f64, // 4
            e.row as f64, // 5
            freq.weight(v), // 6
            diff, // 7
            even_fraction, // 8
            odd_fraction, // 9
        ]);
    }
    out
}

/// Proportions de valeurs non nulles paires et impaires dans la fenêtre.
fn parity_fractions(window: &[u8]) -> (f64, f64) {
    if window.is_empty() {
        return (0.0, 0.0);
    }
    let n = window.len() as f64;
    let even = window.iter().filter(|&&v| v != 0 && v % 2 == 0).count() as f64;
    let odd = window.iter().filter(|&&v| v % 2 == 1).count() as f64;
    (even / n, odd / n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_element() {
        let freq = FrequencyTable::count(&[7, 7, 1, 0]);
        let f = window_features(&[7], &freq);
        assert_eq!(f, vec![1.0, 1.0, 0.0, 1.0, 1.0, 3.0, 0.5, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_zero_encoding() {
        let freq = FrequencyTable::default();
        let f = window_features(&[0], &freq);
        assert_eq!(f, vec![0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_first_difference() {
        let freq = FrequencyTable::default();
        let f = window_features(&[10, 4, 30], &freq);
        assert_eq!(f[7], 0.0);
        assert_eq!(f[17], -6.0);
        assert_eq!(f[27], 26.0);
    }

    #[test]
    fn test_parity_fractions_ignore_zero() {
        let (even, odd) = parity_fractions(&[0, 2, 3, 4]);
        assert!((even - 0.5).abs() < 1e-12);
        assert!((odd - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_no_nan() {
        let freq = FrequencyTable::default();
        let window: Vec<u8> = (0..=36).collect();
        for &x in &window_features(&window, &freq) {
            assert!(x.is_finite());
        }
    }
}
