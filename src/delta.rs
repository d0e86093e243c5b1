/// What a cumulative counter is compared against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Baseline {
	/// No earlier row exists; the whole counter is new.
	First,
	/// The earlier row, whose counter may itself be unavailable.
	Prior(Option<i64>),
}

/// Increase of a cumulative counter over its baseline.
///
/// Decreases (upstream revisions) come out negative and are not clamped.
pub fn counter_delta(current: Option<i64>, baseline: Baseline) -> Option<i64> {
	let current = current?;
	match baseline {
		Baseline::First => Some(current),
		Baseline::Prior(prior) => Some(current - prior?),
	}
}


pub trait Cumulative {
	fn cumulative_cases(&self) -> Option<i64>;
	fn cumulative_deaths(&self) -> Option<i64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DailyDelta {
	pub new_cases: Option<i64>,
	pub new_deaths: Option<i64>,
}

/// New cases and deaths of `series[index]` against the row stored before
/// it. The predecessor is positional: the series must be in date order.
pub fn daily_delta<T: Cumulative>(series: &[T], index: usize) -> DailyDelta {
	let current = &series[index];
	let (cases, deaths) = if index > 0 {
		let prior = &series[index - 1];
		(Baseline::Prior(prior.cumulative_cases()), Baseline::Prior(prior.cumulative_deaths()))
	} else {
		(Baseline::First, Baseline::First)
	};
	DailyDelta{
		new_cases: counter_delta(current.cumulative_cases(), cases),
		new_deaths: counter_delta(current.cumulative_deaths(), deaths),
	}
}
