use std::collections::HashMap;

use log::{debug, info};

use serde::{Deserialize, Serialize};

use chrono::NaiveDate;

use super::context::{flexible_date, Maybe};
use super::rates::ratio;
use super::seade::HospitalizationRecord;
use super::store::{Record, TimeSeriesStore};


/// Daily occupancy of the state and of greater São Paulo, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateBedsRecord {
	#[serde(deserialize_with = "flexible_date")]
	pub data: NaiveDate,
	pub sp_uti: Maybe<f64>,
	pub sp_enfermaria: Maybe<f64>,
	pub rmsp_uti: Maybe<f64>,
	pub rmsp_enfermaria: Maybe<f64>,
}

impl StateBedsRecord {
	pub fn empty(data: NaiveDate) -> Self {
		Self{
			data,
			sp_uti: Maybe(None),
			sp_enfermaria: Maybe(None),
			rmsp_uti: Maybe(None),
			rmsp_enfermaria: Maybe(None),
		}
	}
}

impl Record for StateBedsRecord {
	type Series = ();

	fn date(&self) -> NaiveDate {
		self.data
	}

	fn series(&self) -> () {
		()
	}
}


/// Hospitalization rows grouped by date.
pub struct HospitalizationIndex<'x> {
	by_date: HashMap<NaiveDate, Vec<&'x HospitalizationRecord>>,
}

impl<'x> HospitalizationIndex<'x> {
	pub fn new(store: &'x TimeSeriesStore<HospitalizationRecord>) -> Self {
		let mut by_date: HashMap<NaiveDate, Vec<&'x HospitalizationRecord>> = HashMap::new();
		for rec in store.rows() {
			by_date.entry(rec.data).or_insert_with(Vec::new).push(rec);
		}
		Self{by_date}
	}

	fn day(&self, date: NaiveDate) -> &[&'x HospitalizationRecord] {
		match self.by_date.get(&date) {
			Some(v) => &v[..],
			None => &[],
		}
	}

	pub fn state(&self, date: NaiveDate) -> Option<&'x HospitalizationRecord> {
		self.day(date).iter().find(|r| r.is_state()).copied()
	}

	pub fn capital(&self, date: NaiveDate) -> Option<&'x HospitalizationRecord> {
		self.day(date).iter().find(|r| r.is_capital()).copied()
	}

	/// Sum of a column over the capital and the greater São Paulo regions.
	/// Unavailable when no region reports the column.
	pub fn metropolitan_sum<F: Fn(&HospitalizationRecord) -> Option<f64>>(&self, date: NaiveDate, f: F) -> Option<f64> {
		let mut result = None;
		for rec in self.day(date).iter().filter(|r| r.is_metropolitan()) {
			if let Some(v) = f(rec) {
				result = Some(result.unwrap_or(0.0) + v);
			}
		}
		result
	}
}


/// 7-day-mean ICU occupancy of a region.
pub fn icu_occupancy_mm7d(rec: &HospitalizationRecord) -> Option<f64> {
	ratio(*rec.pacientes_uti_mm7d, *rec.total_covid_uti_mm7d)
}

fn positive(v: Option<f64>) -> Option<f64> {
	v.filter(|v| *v > 0.0)
}

fn recompute(row: &StateBedsRecord, hosp: &HospitalizationIndex) -> StateBedsRecord {
	let mut row = row.clone();
	if let Some(state) = hosp.state(row.data) {
		if let Some(v) = *state.ocupacao_leitos_ultimo_dia {
			row.sp_uti = Maybe(Some(v));
		}
		if let Some(v) = ratio(*state.pacientes_enf_ultimo_dia, positive(*state.total_covid_enf_ultimo_dia)) {
			row.sp_enfermaria = Maybe(Some(v));
		}
	}
	let icu_beds = positive(hosp.metropolitan_sum(row.data, |r| *r.total_covid_uti_ultimo_dia));
	if icu_beds.is_some() {
		let patients = hosp.metropolitan_sum(row.data, |r| *r.pacientes_uti_ultimo_dia);
		if let Some(v) = ratio(patients, icu_beds) {
			row.rmsp_uti = Maybe(Some(v));
		}
	}
	let ward_beds = positive(hosp.metropolitan_sum(row.data, |r| *r.total_covid_enf_ultimo_dia));
	if ward_beds.is_some() {
		let patients = hosp.metropolitan_sum(row.data, |r| *r.pacientes_enf_ultimo_dia);
		if let Some(v) = ratio(patients, ward_beds) {
			row.rmsp_enfermaria = Maybe(Some(v));
		}
	}
	row
}

/// Bring the state bed table up to date with the hospitalization table.
///
/// A row is appended when the hospitalization table has a newer day; then
/// every row is recomputed from the hospitalization rows of its day, keeping
/// the stored value wherever no new one can be computed.
pub fn update_state_beds(beds: &mut TimeSeriesStore<StateBedsRecord>, hosp: &TimeSeriesStore<HospitalizationRecord>) {
	if let Some(latest) = hosp.last_date() {
		let newer = match beds.last_date() {
			Some(last) => latest > last,
			None => true,
		};
		if newer {
			info!("appending state bed row for {}", latest);
			beds.upsert(StateBedsRecord::empty(latest));
		}
	}

	let index = HospitalizationIndex::new(hosp);
	let updated: Vec<StateBedsRecord> = beds.rows().iter().map(|row| recompute(row, &index)).collect();
	debug!("recomputed {} state bed rows", updated.len());
	for row in updated {
		beds.upsert(row);
	}
}
