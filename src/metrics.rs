#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionMetrics {
    pub samples: usize,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub r2: f64,
}

/// R² is `1 - SS_res / SS_tot`. When the actual values have no variance it is
/// 1.0 for an exact fit and 0.0 otherwise.
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Option<RegressionMetrics> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }

    let n = actual.len() as f64;
    let mut abs_sum = 0.0_f64;
    let mut sq_sum = 0.0_f64;
    for (y, p) in actual.iter().zip(predicted) {
        let err = y - p;
        abs_sum += err.abs();
        sq_sum += err * err;
    }

    let mean = actual.iter().sum::<f64>() / n;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let r2 = if ss_tot > 0.0 {
        1.0 - sq_sum / ss_tot
    } else if sq_sum == 0.0 {
        1.0
    } else {
        0.0
    };

    let mse = sq_sum / n;
    Some(RegressionMetrics {
        samples: actual.len(),
        mae: abs_sum / n,
        mse,
        rmse: mse.sqrt(),
        r2,
    })
}

#[cfg(test)]
mod tests {
    use super::evaluate;

    #[test]
    fn hand_computed_errors() {
        let m = evaluate(&[10.0, 20.0, 30.0], &[12.0, 18.0, 33.0]).unwrap();
        assert_eq!(m.samples, 3);
        assert!((m.mae - 7.0 / 3.0).abs() < 1e-12);
        assert!((m.mse - 17.0 / 3.0).abs() < 1e-12);
        assert!((m.rmse - (17.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        // SS_tot = 200, SS_res = 17
        assert!((m.r2 - (1.0 - 17.0 / 200.0)).abs() < 1e-12);
    }

    #[test]
    fn mean_prediction_scores_zero_r2() {
        let m = evaluate(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0]).unwrap();
        assert!(m.r2.abs() < 1e-12);
    }

    #[test]
    fn constant_actuals() {
        assert_eq!(evaluate(&[5.0, 5.0], &[5.0, 5.0]).unwrap().r2, 1.0);
        assert_eq!(evaluate(&[5.0, 5.0], &[4.0, 6.0]).unwrap().r2, 0.0);
    }

    #[test]
    fn empty_or_mismatched_inputs() {
        assert!(evaluate(&[], &[]).is_none());
        assert!(evaluate(&[1.0], &[1.0, 2.0]).is_none());
    }
}
