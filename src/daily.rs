use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::path::Path;

use chrono::{Duration, NaiveDate};

use enum_map::EnumMap;

use super::beds::{icu_occupancy_mm7d, HospitalizationIndex, StateBedsRecord};
use super::context::{DoseTier, Locality};
use super::delta::{daily_delta, Cumulative};
use super::error::Error;
use super::ioutil::AtomicFile;
use super::rates::ratio;
use super::seade::{HospitalizationRecord, IsolationRecord, MunicipalRecord, StateTotalsRecord};
use super::store::TimeSeriesStore;
use super::vaccination::VaccinationRecord;
use super::weeks::{WeeklyInput, WeeklyMetric};


impl Cumulative for StateTotalsRecord {
	fn cumulative_cases(&self) -> Option<i64> {
		*self.total_casos
	}

	fn cumulative_deaths(&self) -> Option<i64> {
		*self.total_obitos
	}
}

impl Cumulative for MunicipalRecord {
	fn cumulative_cases(&self) -> Option<i64> {
		*self.casos
	}

	fn cumulative_deaths(&self) -> Option<i64> {
		*self.obitos
	}
}

impl<T: Cumulative> Cumulative for &T {
	fn cumulative_cases(&self) -> Option<i64> {
		(**self).cumulative_cases()
	}

	fn cumulative_deaths(&self) -> Option<i64> {
		(**self).cumulative_deaths()
	}
}


/// What the durable tables know about one locality on one day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
	pub date: NaiveDate,
	pub locality: Locality,
	pub cumulative_cases: Option<i64>,
	pub cumulative_deaths: Option<i64>,
	pub cumulative_doses: EnumMap<DoseTier, Option<i64>>,
	/// ICU beds reserved for COVID-19.
	pub beds_total: Option<f64>,
	pub beds_occupied: Option<f64>,
	pub isolation_index: Option<f64>,
}

impl DailyRecord {
	pub fn new(date: NaiveDate, locality: Locality) -> Self {
		Self{
			date,
			locality,
			cumulative_cases: None,
			cumulative_deaths: None,
			cumulative_doses: EnumMap::default(),
			beds_total: None,
			beds_occupied: None,
			isolation_index: None,
		}
	}
}


#[derive(Debug, Clone, PartialEq)]
pub struct DerivedDailyRecord {
	pub daily: DailyRecord,
	pub new_cases: Option<i64>,
	pub new_deaths: Option<i64>,
	pub new_doses: EnumMap<DoseTier, Option<i64>>,
	pub new_doses_total: Option<i64>,
	pub lethality_pct: Option<f64>,
	pub occupancy_pct: Option<f64>,
	/// Occupancy as published, which the weekly summary prefers.
	pub reported_occupancy_pct: Option<f64>,
	pub occupancy_mm7d_pct: Option<f64>,
	pub vaccinated_pct: EnumMap<DoseTier, Option<f64>>,
	pub immunized_pct: Option<f64>,
	pub applied_pct: Option<f64>,
	pub hospitalizations: Option<f64>,
	pub isolation_two_weeks_ago: Option<f64>,
}

impl DerivedDailyRecord {
	pub fn new(date: NaiveDate, locality: Locality) -> Self {
		Self{
			daily: DailyRecord::new(date, locality),
			new_cases: None,
			new_deaths: None,
			new_doses: EnumMap::default(),
			new_doses_total: None,
			lethality_pct: None,
			occupancy_pct: None,
			reported_occupancy_pct: None,
			occupancy_mm7d_pct: None,
			vaccinated_pct: EnumMap::default(),
			immunized_pct: None,
			applied_pct: None,
			hospitalizations: None,
			isolation_two_weeks_ago: None,
		}
	}

	pub fn date(&self) -> NaiveDate {
		self.daily.date
	}
}

impl WeeklyInput for DerivedDailyRecord {
	fn date(&self) -> NaiveDate {
		self.daily.date
	}

	fn metric(&self, metric: WeeklyMetric) -> Option<f64> {
		match metric {
			WeeklyMetric::Isolation => self.isolation_two_weeks_ago,
			WeeklyMetric::CurrentIsolation => self.daily.isolation_index,
			WeeklyMetric::NewCases => self.new_cases.map(|v| v as f64),
			WeeklyMetric::NewDeaths => self.new_deaths.map(|v| v as f64),
			WeeklyMetric::NewDoses => self.new_doses_total.map(|v| v as f64),
			WeeklyMetric::ImmunizedPct => self.immunized_pct,
			WeeklyMetric::Hospitalizations => self.hospitalizations,
			WeeklyMetric::Occupancy => self.reported_occupancy_pct.or(self.occupancy_pct),
		}
	}
}


/// The durable tables daily rows are derived from.
pub struct Tables<'x> {
	pub state_totals: &'x TimeSeriesStore<StateTotalsRecord>,
	pub municipal: &'x TimeSeriesStore<MunicipalRecord>,
	pub isolation: &'x TimeSeriesStore<IsolationRecord>,
	pub hospitalizations: &'x TimeSeriesStore<HospitalizationRecord>,
	pub state_beds: &'x TimeSeriesStore<StateBedsRecord>,
	pub vaccination: Option<&'x TimeSeriesStore<VaccinationRecord>>,
}

/// Only the capital has its own row in the hospitalization feed.
fn has_hospital_data(locality: &Locality) -> bool {
	match locality {
		Locality::State => true,
		Locality::Municipality(name) => name.as_str() == "SAO PAULO",
	}
}

fn apply_counters<T: Cumulative>(days: &mut BTreeMap<NaiveDate, DerivedDailyRecord>, locality: &Locality, rows: &[(NaiveDate, T)]) {
	let counters: Vec<&T> = rows.iter().map(|(_, r)| r).collect();
	for (i, (date, row)) in rows.iter().enumerate() {
		let delta = daily_delta(&counters, i);
		let rec = days.entry(*date).or_insert_with(|| DerivedDailyRecord::new(*date, locality.clone()));
		rec.daily.cumulative_cases = row.cumulative_cases();
		rec.daily.cumulative_deaths = row.cumulative_deaths();
		rec.new_cases = delta.new_cases;
		rec.new_deaths = delta.new_deaths;
		rec.lethality_pct = ratio(row.cumulative_deaths(), row.cumulative_cases());
	}
}

fn apply_hospitalizations(days: &mut BTreeMap<NaiveDate, DerivedDailyRecord>, locality: &Locality, tables: &Tables) {
	if !has_hospital_data(locality) {
		return
	}
	let index = HospitalizationIndex::new(tables.hospitalizations);
	let dates: BTreeSet<NaiveDate> = tables.hospitalizations.rows().iter().map(|r| r.data).collect();
	for date in dates {
		let (own, hospitalizations) = match locality {
			Locality::State => {
				let own = index.state(date);
				(own, own.and_then(|r| *r.internacoes_ultimo_dia))
			},
			Locality::Municipality(_) => (
				index.capital(date),
				index.metropolitan_sum(date, |r| *r.internacoes_ultimo_dia),
			),
		};
		let rec = days.entry(date).or_insert_with(|| DerivedDailyRecord::new(date, locality.clone()));
		rec.hospitalizations = hospitalizations;
		if let Some(own) = own {
			rec.daily.beds_total = *own.total_covid_uti_ultimo_dia;
			rec.daily.beds_occupied = *own.pacientes_uti_ultimo_dia;
			rec.occupancy_pct = ratio(rec.daily.beds_occupied, rec.daily.beds_total);
			rec.occupancy_mm7d_pct = icu_occupancy_mm7d(own);
			if let Locality::Municipality(_) = locality {
				rec.reported_occupancy_pct = *own.ocupacao_leitos_ultimo_dia;
			}
		}
	}
	if let Locality::State = locality {
		for row in tables.state_beds.rows() {
			let rec = days.entry(row.data).or_insert_with(|| DerivedDailyRecord::new(row.data, Locality::State));
			rec.reported_occupancy_pct = *row.sp_uti;
		}
	}
}

fn apply_vaccination(days: &mut BTreeMap<NaiveDate, DerivedDailyRecord>, locality: &Locality, store: &TimeSeriesStore<VaccinationRecord>) {
	for row in store.series_rows(locality) {
		let rec = days.entry(row.data).or_insert_with(|| DerivedDailyRecord::new(row.data, locality.clone()));
		for tier in DoseTier::ALL.iter() {
			rec.daily.cumulative_doses[*tier] = row.dose(*tier);
			rec.new_doses[*tier] = row.new_doses(*tier);
			rec.vaccinated_pct[*tier] = row.vaccinated_pct(*tier);
		}
		rec.new_doses_total = *row.aplicadas_dia;
		rec.immunized_pct = *row.perc_imunizadas;
		rec.applied_pct = *row.perc_aplicadas;
	}
}

/// Join every table into one row per day for `locality`, in date order.
pub fn derive_daily(tables: &Tables, locality: &Locality) -> Vec<DerivedDailyRecord> {
	let mut days: BTreeMap<NaiveDate, DerivedDailyRecord> = BTreeMap::new();

	match locality {
		Locality::State => {
			let rows: Vec<(NaiveDate, &StateTotalsRecord)> = tables.state_totals.rows().iter()
				.map(|r| (r.data, r))
				.collect();
			apply_counters(&mut days, locality, &rows);
		},
		Locality::Municipality(_) => {
			let rows: Vec<(NaiveDate, &MunicipalRecord)> = tables.municipal.series_rows(locality)
				.map(|r| (r.datahora, r))
				.collect();
			apply_counters(&mut days, locality, &rows);
		},
	}

	for row in tables.isolation.series_rows(locality) {
		let rec = days.entry(row.data).or_insert_with(|| DerivedDailyRecord::new(row.data, locality.clone()));
		rec.daily.isolation_index = *row.isolamento;
	}

	apply_hospitalizations(&mut days, locality, tables);

	if let Some(store) = tables.vaccination {
		apply_vaccination(&mut days, locality, store);
	}

	for (date, rec) in days.iter_mut() {
		rec.isolation_two_weeks_ago = tables.isolation
			.get(*date - Duration::days(14), locality)
			.and_then(|r| *r.isolamento);
	}

	days.into_iter().map(|(_, rec)| rec).collect()
}


fn cell<T: Display>(v: Option<T>) -> String {
	match v {
		Some(v) => v.to_string(),
		None => String::new(),
	}
}

pub fn daily_header() -> Vec<String> {
	let mut result: Vec<String> = vec![
		"data", "local", "casos", "casos_dia", "obitos", "obitos_dia", "letalidade",
		"isolamento", "isolamento_2sem", "leitos_uti", "pacientes_uti", "ocupacao_uti",
		"ocupacao_uti_publicada", "ocupacao_uti_mm7d", "internacoes",
	].into_iter().map(|s| s.to_string()).collect();
	for tier in DoseTier::ALL.iter() {
		result.push(tier.column().to_string());
	}
	for tier in DoseTier::ALL.iter() {
		result.push(format!("{}_dia", tier.column()));
	}
	for tier in DoseTier::ALL.iter() {
		result.push(format!("perc_{}", tier.column()));
	}
	result.extend(["aplicadas_dia", "perc_imunizadas", "perc_aplicadas"].iter().map(|s| s.to_string()));
	result
}

fn daily_row(rec: &DerivedDailyRecord) -> Vec<String> {
	let d = &rec.daily;
	let mut result = vec![
		d.date.format("%Y-%m-%d").to_string(),
		d.locality.to_string(),
		cell(d.cumulative_cases),
		cell(rec.new_cases),
		cell(d.cumulative_deaths),
		cell(rec.new_deaths),
		cell(rec.lethality_pct),
		cell(d.isolation_index),
		cell(rec.isolation_two_weeks_ago),
		cell(d.beds_total),
		cell(d.beds_occupied),
		cell(rec.occupancy_pct),
		cell(rec.reported_occupancy_pct),
		cell(rec.occupancy_mm7d_pct),
		cell(rec.hospitalizations),
	];
	for tier in DoseTier::ALL.iter() {
		result.push(cell(d.cumulative_doses[*tier]));
	}
	for tier in DoseTier::ALL.iter() {
		result.push(cell(rec.new_doses[*tier]));
	}
	for tier in DoseTier::ALL.iter() {
		result.push(cell(rec.vaccinated_pct[*tier]));
	}
	result.push(cell(rec.new_doses_total));
	result.push(cell(rec.immunized_pct));
	result.push(cell(rec.applied_pct));
	result
}

pub fn write_daily(path: &Path, rows: &[DerivedDailyRecord]) -> Result<(), Error> {
	let mut f = AtomicFile::create(path)?;
	{
		let mut w = csv::Writer::from_writer(&mut f);
		w.write_record(daily_header())?;
		for rec in rows.iter() {
			w.write_record(daily_row(rec))?;
		}
		w.flush()?;
	}
	f.commit()?;
	Ok(())
}


#[cfg(test)]
mod tests {
	use super::*;

	use crate::context::Maybe;

	fn day(d: u32) -> NaiveDate {
		NaiveDate::from_ymd_opt(2021, 3, d).unwrap()
	}

	fn totals(d: u32, cases: i64, deaths: i64) -> StateTotalsRecord {
		StateTotalsRecord{data: day(d), total_casos: Maybe(Some(cases)), total_obitos: Maybe(Some(deaths))}
	}

	fn isolation(d: u32, place: &str, v: f64) -> IsolationRecord {
		IsolationRecord{
			data: day(d),
			municipio: place.into(),
			populacao: Maybe(None),
			uf: "SP".into(),
			isolamento: Maybe(Some(v)),
		}
	}

	#[test]
	fn state_series_joins_tables() {
		let state_totals = TimeSeriesStore::from_rows(vec![
			totals(1, 1000, 50),
			totals(2, 1050, 52),
			totals(3, 1050, 52),
		]);
		let municipal = TimeSeriesStore::new();
		let isolation = TimeSeriesStore::from_rows(vec![
			isolation(1, "Estado de São Paulo", 40.0),
			isolation(15, "Estado de São Paulo", 45.0),
			isolation(1, "São Paulo", 38.0),
		]);
		let hospitalizations = TimeSeriesStore::from_rows(vec![
			HospitalizationRecord{
				data: day(2),
				drs: "Estado de São Paulo".into(),
				pacientes_uti_ultimo_dia: Maybe(Some(750.0)),
				total_covid_uti_ultimo_dia: Maybe(Some(1000.0)),
				internacoes_ultimo_dia: Maybe(Some(120.0)),
				..Default::default()
			},
		]);
		let mut beds_row = StateBedsRecord::empty(day(2));
		beds_row.sp_uti = Maybe(Some(75.1));
		let state_beds = TimeSeriesStore::from_rows(vec![beds_row]);
		let tables = Tables{
			state_totals: &state_totals,
			municipal: &municipal,
			isolation: &isolation,
			hospitalizations: &hospitalizations,
			state_beds: &state_beds,
			vaccination: None,
		};

		let rows = derive_daily(&tables, &Locality::State);
		let dates: Vec<NaiveDate> = rows.iter().map(|r| r.date()).collect();
		assert_eq!(dates, vec![day(1), day(2), day(3), day(15)]);

		let new_cases: Vec<Option<i64>> = rows[..3].iter().map(|r| r.new_cases).collect();
		assert_eq!(new_cases, vec![Some(1000), Some(50), Some(0)]);
		let lethality: Vec<Option<f64>> = rows[..3].iter().map(|r| r.lethality_pct).collect();
		assert_eq!(lethality, vec![Some(5.0), Some(4.95), Some(4.95)]);

		assert_eq!(rows[0].daily.isolation_index, Some(40.0));
		assert_eq!(rows[3].isolation_two_weeks_ago, Some(40.0));
		assert_eq!(rows[1].occupancy_pct, Some(75.0));
		assert_eq!(rows[1].metric(WeeklyMetric::Occupancy), Some(75.1));
		assert_eq!(rows[1].hospitalizations, Some(120.0));
		assert_eq!(rows[2].hospitalizations, None);
	}

	#[test]
	fn daily_rows_match_header() {
		let rec = DerivedDailyRecord::new(day(1), Locality::State);
		assert_eq!(daily_row(&rec).len(), daily_header().len());
		assert_eq!(daily_row(&rec)[2], "");
	}
}
