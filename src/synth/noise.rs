use log::warn;
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Add white Gaussian noise so that signal power / noise power = 10^(snr_db / 10).
///
/// Noise power is the mean squared signal value divided by the linear SNR.
pub fn add_white_noise<R: Rng + ?Sized>(signal: &mut Array2<f64>, snr_db: f64, rng: &mut R) {
    if signal.is_empty() {
        return;
    }
    let power = signal.iter().map(|v| v * v).sum::<f64>() / signal.len() as f64;
    let std_dev = (power / 10f64.powf(snr_db / 10.0)).sqrt();
    let normal = match Normal::new(0.0, std_dev) {
        Ok(n) if std_dev.is_finite() => n,
        _ => {
            warn!("cannot add noise at SNR {snr_db} dB (deviation {std_dev}); leaving signal clean");
            return;
        }
    };
    for v in signal.iter_mut() {
        *v += normal.sample(rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn realized_snr_is_close_to_target() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let clean = Array2::from_shape_fn((64, 200), |(e, t)| ((e + t) as f64 * 0.1).sin());
        let mut noisy = clean.clone();
        add_white_noise(&mut noisy, 10.0, &mut rng);

        let signal_power = clean.iter().map(|v| v * v).sum::<f64>();
        let noise_power = (&noisy - &clean).iter().map(|v| v * v).sum::<f64>();
        let snr = 10.0 * (signal_power / noise_power).log10();
        assert!((snr - 10.0).abs() < 0.3, "realized snr {snr}");
    }

    #[test]
    fn same_seed_same_noise() {
        let base = Array2::from_elem((3, 7), 1.0);
        let mut a = base.clone();
        let mut b = base.clone();
        add_white_noise(&mut a, 5.0, &mut ChaCha8Rng::seed_from_u64(11));
        add_white_noise(&mut b, 5.0, &mut ChaCha8Rng::seed_from_u64(11));
        assert_eq!(a, b);
        assert_ne!(a, base);
    }

    #[test]
    fn silent_signal_and_undefined_snr_stay_clean() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut zeros = Array2::<f64>::zeros((2, 3));
        add_white_noise(&mut zeros, 10.0, &mut rng);
        assert!(zeros.iter().all(|&v| v == 0.0));

        let mut ones = Array2::from_elem((2, 3), 1.0);
        add_white_noise(&mut ones, f64::NAN, &mut rng);
        assert!(ones.iter().all(|&v| v == 1.0));
    }
}
