use super::weeks::{WeeklyAggregate, WeeklyMetric};


/// Percent change of `current` over `prior`.
///
/// Only defined for a positive prior; anything else is unavailable.
pub fn variation(current: Option<f64>, prior: Option<f64>) -> Option<f64> {
	let prior = prior?;
	if !(prior > 0.0) {
		return None
	}
	Some(((current? / prior) - 1.0) * 100.0)
}

/// Variation of `metric` between `series[index]` and the period before it.
pub fn variation_at(series: &[WeeklyAggregate], index: usize, metric: WeeklyMetric) -> Option<f64> {
	if index == 0 {
		return None
	}
	variation(series.get(index)?.get(metric), series[index - 1].get(metric))
}

/// Fill the variation of every metric of every week.
pub fn apply_variations(series: &mut [WeeklyAggregate]) {
	for i in 0..series.len() {
		for metric in WeeklyMetric::ALL.iter() {
			let v = variation_at(series, i, *metric);
			series[i].variation[*metric] = v;
		}
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	use enum_map::EnumMap;

	use crate::context::Locality;
	use crate::weeks::WeekKey;

	fn week(n: u32, cases: Option<f64>) -> WeeklyAggregate {
		let mut values = EnumMap::default();
		values[WeeklyMetric::NewCases] = cases;
		WeeklyAggregate{
			week: WeekKey{year: 2021, week: n},
			locality: Locality::State,
			values,
			variation: EnumMap::default(),
		}
	}

	#[test]
	fn plain_variation() {
		assert_eq!(variation(Some(250.0), Some(200.0)), Some(25.0));
		assert_eq!(variation(Some(150.0), Some(200.0)), Some(-25.0));
	}

	#[test]
	fn non_positive_or_missing_prior_is_unavailable() {
		assert_eq!(variation(Some(250.0), Some(0.0)), None);
		assert_eq!(variation(Some(250.0), Some(-3.0)), None);
		assert_eq!(variation(Some(250.0), None), None);
		assert_eq!(variation(None, Some(200.0)), None);
		assert_eq!(variation(Some(1.0), Some(f64::NAN)), None);
	}

	#[test]
	fn weekly_series() {
		let mut series = vec![week(1, Some(200.0)), week(2, Some(250.0)), week(3, None), week(4, Some(10.0))];
		apply_variations(&mut series);
		assert_eq!(series[0].variation[WeeklyMetric::NewCases], None);
		assert_eq!(series[1].variation[WeeklyMetric::NewCases], Some(25.0));
		assert_eq!(series[2].variation[WeeklyMetric::NewCases], None);
		assert_eq!(series[3].variation[WeeklyMetric::NewCases], None);
		assert_eq!(variation_at(&series, 1, WeeklyMetric::NewDeaths), None);
	}
}
