use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};

use enum_map::{Enum, EnumMap};

use super::context::Locality;


static MONTHS: [&'static str; 12] = [
	"jan", "fev", "mar", "abr", "mai", "jun", "jul", "ago", "set", "out", "nov", "dez",
];


/// Sunday-based week of the year, as `%U` numbers them.
fn sunday_week(date: NaiveDate) -> u32 {
	(date.ordinal0() + 7 - date.weekday().num_days_from_sunday()) / 7
}

fn first_sunday(year: i32) -> Option<NaiveDate> {
	let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
	let offset = (7 - jan1.weekday().num_days_from_sunday()) % 7;
	Some(jan1 + Duration::days(offset as i64))
}


/// Epidemiological week: Sunday to Saturday, numbered within the year.
///
/// Days before the first Sunday of a year belong to the last week of the
/// previous year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekKey {
	pub year: i32,
	pub week: u32,
}

impl WeekKey {
	pub fn of(date: NaiveDate) -> Self {
		let week = sunday_week(date);
		if week == 0 {
			if let Some(dec31) = NaiveDate::from_ymd_opt(date.year() - 1, 12, 31) {
				return Self{year: dec31.year(), week: sunday_week(dec31)}
			}
		}
		Self{year: date.year(), week}
	}

	/// The Sunday starting the week.
	pub fn first_day(&self) -> Option<NaiveDate> {
		let sunday = first_sunday(self.year)?;
		Some(sunday + Duration::weeks(self.week as i64 - 1))
	}

	/// The Saturday ending the week, possibly in the next year.
	pub fn last_day(&self) -> Option<NaiveDate> {
		Some(self.first_day()? + Duration::days(6))
	}

	/// `27/dez/20 a 02/jan/21`, or `27/dez a 02/jan` without the year.
	pub fn label(&self, include_year: bool) -> String {
		let (first, last) = match (self.first_day(), self.last_day()) {
			(Some(first), Some(last)) => (first, last),
			_ => return self.to_string(),
		};
		format!("{} a {}", format_day(first, include_year), format_day(last, include_year))
	}
}

fn format_day(date: NaiveDate, include_year: bool) -> String {
	let month = MONTHS[date.month0() as usize];
	if include_year {
		format!("{:02}/{}/{:02}", date.day(), month, date.year() % 100)
	} else {
		format!("{:02}/{}", date.day(), month)
	}
}

impl fmt::Display for WeekKey {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:04}-W{:02}", self.year, self.week)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWeekKeyError;

impl fmt::Display for ParseWeekKeyError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str("week keys look like 2021-W07")
	}
}

impl std::error::Error for ParseWeekKeyError {}

impl FromStr for WeekKey {
	type Err = ParseWeekKeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (year, week) = s.split_once("-W").ok_or(ParseWeekKeyError)?;
		let year = year.parse::<i32>().map_err(|_| ParseWeekKeyError)?;
		let week = week.parse::<u32>().map_err(|_| ParseWeekKeyError)?;
		if week > 53 {
			return Err(ParseWeekKeyError)
		}
		Ok(Self{year, week})
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
	Mean,
	/// A sum of zero means the metric was not tracked that week.
	Sum,
	Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum WeeklyMetric {
	/// Isolation of two weeks earlier, set against this week's outcomes.
	Isolation,
	CurrentIsolation,
	NewCases,
	NewDeaths,
	NewDoses,
	ImmunizedPct,
	Hospitalizations,
	Occupancy,
}

impl WeeklyMetric {
	pub const ALL: [WeeklyMetric; 8] = [
		Self::Isolation,
		Self::CurrentIsolation,
		Self::NewCases,
		Self::NewDeaths,
		Self::NewDoses,
		Self::ImmunizedPct,
		Self::Hospitalizations,
		Self::Occupancy,
	];

	pub fn reducer(&self) -> Reducer {
		match self {
			Self::Isolation | Self::CurrentIsolation | Self::Occupancy => Reducer::Mean,
			Self::NewCases | Self::NewDeaths | Self::NewDoses | Self::Hospitalizations => Reducer::Sum,
			Self::ImmunizedPct => Reducer::Max,
		}
	}

	pub fn column(&self) -> &'static str {
		match self {
			Self::Isolation => "isolamento",
			Self::CurrentIsolation => "isolamento_atual",
			Self::NewCases => "casos_semana",
			Self::NewDeaths => "obitos_semana",
			Self::NewDoses => "vacinadas_semana",
			Self::ImmunizedPct => "perc_imu_semana",
			Self::Hospitalizations => "internacoes_semana",
			Self::Occupancy => "uti",
		}
	}

	pub fn variation_column(&self) -> &'static str {
		match self {
			Self::Isolation => "variacao_isolamento_2sem",
			Self::CurrentIsolation => "variacao_isolamento",
			Self::NewCases => "variacao_casos",
			Self::NewDeaths => "variacao_obitos",
			Self::NewDoses => "variacao_vacinadas",
			Self::ImmunizedPct => "variacao_perc_imu",
			Self::Hospitalizations => "variacao_internacoes",
			Self::Occupancy => "variacao_uti",
		}
	}
}


/// A daily row that can be folded into weeks.
pub trait WeeklyInput {
	fn date(&self) -> NaiveDate;
	fn metric(&self, metric: WeeklyMetric) -> Option<f64>;
}


#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
	sum: f64,
	n: usize,
	max: Option<f64>,
}

impl Accumulator {
	fn push(&mut self, v: f64) {
		self.sum += v;
		self.n += 1;
		self.max = Some(match self.max {
			Some(max) if max >= v => max,
			_ => v,
		});
	}

	fn reduce(&self, reducer: Reducer) -> Option<f64> {
		if self.n == 0 {
			return None
		}
		match reducer {
			Reducer::Mean => Some(self.sum / self.n as f64),
			Reducer::Sum if self.sum == 0.0 => None,
			Reducer::Sum => Some(self.sum),
			Reducer::Max => self.max,
		}
	}
}


#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyAggregate {
	pub week: WeekKey,
	pub locality: Locality,
	pub values: EnumMap<WeeklyMetric, Option<f64>>,
	/// Percent change against the previous week, filled in by
	/// `apply_variations`.
	pub variation: EnumMap<WeeklyMetric, Option<f64>>,
}

impl WeeklyAggregate {
	pub fn get(&self, metric: WeeklyMetric) -> Option<f64> {
		self.values[metric]
	}

	pub fn mean_isolation(&self) -> Option<f64> {
		self.values[WeeklyMetric::Isolation]
	}

	pub fn mean_current_isolation(&self) -> Option<f64> {
		self.values[WeeklyMetric::CurrentIsolation]
	}

	pub fn sum_new_cases(&self) -> Option<f64> {
		self.values[WeeklyMetric::NewCases]
	}

	pub fn sum_new_deaths(&self) -> Option<f64> {
		self.values[WeeklyMetric::NewDeaths]
	}

	pub fn sum_new_doses(&self) -> Option<f64> {
		self.values[WeeklyMetric::NewDoses]
	}

	pub fn max_immunized_pct(&self) -> Option<f64> {
		self.values[WeeklyMetric::ImmunizedPct]
	}

	pub fn sum_hospitalizations(&self) -> Option<f64> {
		self.values[WeeklyMetric::Hospitalizations]
	}

	pub fn mean_occupancy(&self) -> Option<f64> {
		self.values[WeeklyMetric::Occupancy]
	}
}


/// Fold the daily rows of one locality into weeks, in week order.
pub fn aggregate<T: WeeklyInput>(rows: &[T], locality: &Locality) -> Vec<WeeklyAggregate> {
	let mut weeks: BTreeMap<WeekKey, EnumMap<WeeklyMetric, Accumulator>> = BTreeMap::new();
	for row in rows.iter() {
		let acc = weeks.entry(WeekKey::of(row.date())).or_insert_with(EnumMap::default);
		for metric in WeeklyMetric::ALL.iter() {
			if let Some(v) = row.metric(*metric) {
				if v.is_finite() {
					acc[*metric].push(v);
				}
			}
		}
	}
	weeks.into_iter().map(|(week, acc)| {
		WeeklyAggregate{
			week,
			locality: locality.clone(),
			values: EnumMap::from_fn(|metric: WeeklyMetric| acc[metric].reduce(metric.reducer())),
			variation: EnumMap::default(),
		}
	}).collect()
}
