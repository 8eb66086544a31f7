//! Hann windows shared by the WSOLA kernel and the spectral analyses.

use std::f64::consts::PI;

/// Symmetric Hann window: zero at both ends, unity at the centre.
///
/// Sizes 0 and 1 return an empty window and `[1.0]` respectively.
pub fn hann_window(size: usize) -> Vec<f32> {
    match size {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let span = (size - 1) as f64;
            (0..size)
                .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / span).cos()) as f32)
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_with_zero_ends() {
        let w = hann_window(4096);
        assert_eq!(w.len(), 4096);
        assert!(w[0].abs() < 1e-6 && w[4095].abs() < 1e-6);
        assert!(w[2048] > 0.99);
        assert!(w.iter().zip(w.iter().rev()).all(|(a, b)| (a - b).abs() < 1e-6));
    }

    #[test]
    fn test_tiny_windows() {
        assert!(hann_window(0).is_empty());
        assert_eq!(hann_window(1), vec![1.0]);
        assert_eq!(hann_window(2), vec![0.0, 0.0]);
    }
}
