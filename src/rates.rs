use num_traits::ToPrimitive;


pub fn round2(v: f64) -> f64 {
	(v * 100.0).round() / 100.0
}

/// `numerator / denominator` as a percentage rounded to two decimals.
///
/// Unavailable when the numerator is missing or the denominator is missing,
/// zero or NaN.
pub fn ratio<N: ToPrimitive, D: ToPrimitive>(numerator: Option<N>, denominator: Option<D>) -> Option<f64> {
	let n = numerator?.to_f64()?;
	let d = denominator?.to_f64()?;
	if d == 0.0 || !d.is_finite() || !n.is_finite() {
		return None
	}
	Some(round2(n / d * 100.0))
}
