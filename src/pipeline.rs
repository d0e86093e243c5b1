use log::{debug, info, warn};

use bytes::Bytes;

use chrono::NaiveDate;

use super::beds::{update_state_beds, StateBedsRecord};
use super::config::{Config, Dataset, Feed};
use super::context::Locality;
use super::daily::{derive_daily, write_daily, DerivedDailyRecord, Tables};
use super::demographics::{count_race, tally_conditions, write_conditions, write_race};
use super::error::Error;
use super::gaps::{backfill_from, find_missing_days, parse_corrections};
use super::ioutil::unpack_archive;
use super::progress::ProgressSink;
use super::report::{write_summary, write_weekly};
use super::seade::{
	read_feed, Columns, HospitalizationRecord, IsolationRecord, MunicipalRecord, StateTotalsRecord,
	HOSPITALIZATION_COLUMNS, STATE_TOTALS_COLUMNS,
};
use super::source::Source;
use super::store::{Record, TimeSeriesStore, Upsert};
use super::vaccination::{
	parse_doses_applied, parse_doses_received, parse_immunizers, update_immunizers, update_vaccination,
	DoseFeeds, ImmunizerRecord, VaccinationRecord,
};
use super::variation::apply_variations;
use super::weeks::{aggregate, WeeklyAggregate};


/// Derived series of one locality after a run.
#[derive(Debug, Clone)]
pub struct LocalityReport {
	pub locality: Locality,
	pub daily: Vec<DerivedDailyRecord>,
	pub weekly: Vec<WeeklyAggregate>,
}


/// Feed-level failures make that feed unavailable for the run; anything else
/// is fatal.
fn feed_result<T>(feed: Feed, result: Result<T, Error>) -> Result<Option<T>, Error> {
	match result {
		Ok(v) => Ok(Some(v)),
		Err(e @ Error::Schema{..}) | Err(e @ Error::Csv(_)) => {
			warn!("{} feed unusable, keeping last snapshot: {}", feed, e);
			Ok(None)
		},
		Err(e) => Err(e),
	}
}

fn fetch_parsed<S, T, F>(source: &mut S, feed: Feed, date: NaiveDate, parse: F) -> Result<Option<T>, Error>
	where S: Source + ?Sized,
	      F: FnOnce(&[u8]) -> Result<T, Error>
{
	match source.fetch(feed, date) {
		Some(data) => {
			let data = match unpack_archive(&data[..]) {
				Ok(Some(inner)) => Bytes::from(inner),
				Ok(None) => data,
				Err(e) => return feed_result(feed, Err(Error::Schema{feed, reason: format!("bad archive: {}", e)})),
			};
			feed_result(feed, parse(&data[..]))
		},
		None => {
			info!("{} feed unavailable for {}, keeping last snapshot", feed, date);
			Ok(None)
		},
	}
}

fn merge<R: Record>(store: &mut TimeSeriesStore<R>, rows: Vec<R>) -> (usize, usize) {
	let mut ninserted = 0;
	let mut nreplaced = 0;
	for row in rows {
		match store.upsert(row) {
			Upsert::Inserted => ninserted += 1,
			Upsert::Replaced => nreplaced += 1,
		}
	}
	(ninserted, nreplaced)
}

/// Load a durable table, merge a feed into it and write it back.
fn refresh<R, S, P>(
	config: &Config,
	progress: &mut P,
	source: &mut S,
	dataset: Dataset,
	feed: Feed,
	date: NaiveDate,
	columns: Columns,
) -> Result<TimeSeriesStore<R>, Error>
	where R: Record,
	      S: Source + ?Sized,
	      P: ProgressSink + ?Sized
{
	let path = config.table_path(dataset);
	let mut store: TimeSeriesStore<R> = TimeSeriesStore::load(progress, &path)?;
	if let Some(rows) = fetch_parsed(source, feed, date, |data| read_feed(feed, data, columns))? {
		let (ninserted, nreplaced) = merge(&mut store, rows);
		info!("{}: {} new rows, {} replaced", feed, ninserted, nreplaced);
		if store.ensure_date_order() {
			warn!("{}: feed filled earlier days, rows re-sorted", feed);
		}
		store.persist(&path)?;
	}
	Ok(store)
}


/// Gaps are only searched up to the newest stored day. Correction labels
/// carry no year, so looking further risks matching another year's day.
fn gap_search_end(store: &TimeSeriesStore<IsolationRecord>, date: NaiveDate) -> NaiveDate {
	match store.last_date() {
		Some(last) => last.min(date),
		None => date,
	}
}

fn update_isolation<S: Source + ?Sized, P: ProgressSink + ?Sized>(
	config: &Config,
	progress: &mut P,
	source: &mut S,
	date: NaiveDate,
) -> Result<TimeSeriesStore<IsolationRecord>, Error> {
	let path = config.table_path(Dataset::Isolation);
	let mut store: TimeSeriesStore<IsolationRecord> = TimeSeriesStore::load(progress, &path)?;
	let missing = find_missing_days(&store, &Locality::State, config.isolation_start, gap_search_end(&store, date), date);
	debug!("isolation: {} days to check", missing.len());
	if missing.iter().all(|d| store.has_date(*d)) {
		return Ok(store)
	}
	if let Some(corrections) = fetch_parsed(source, Feed::IsolationCorrections, date, parse_corrections)? {
		let filled = backfill_from(&corrections, &missing, &mut store);
		if filled.len() > 0 {
			store.persist(&path)?;
		}
	}
	Ok(store)
}

fn update_beds<P: ProgressSink + ?Sized>(
	config: &Config,
	progress: &mut P,
	hosp: &TimeSeriesStore<HospitalizationRecord>,
) -> Result<TimeSeriesStore<StateBedsRecord>, Error> {
	let path = config.table_path(Dataset::StateBeds);
	let mut beds: TimeSeriesStore<StateBedsRecord> = TimeSeriesStore::load(progress, &path)?;
	if hosp.is_empty() {
		return Ok(beds)
	}
	update_state_beds(&mut beds, hosp);
	beds.persist(&path)?;
	Ok(beds)
}

fn update_doses<S: Source + ?Sized, P: ProgressSink + ?Sized>(
	config: &Config,
	progress: &mut P,
	source: &mut S,
	date: NaiveDate,
	hosp: &TimeSeriesStore<HospitalizationRecord>,
) -> Result<Option<TimeSeriesStore<VaccinationRecord>>, Error> {
	if !config.vaccination {
		return Ok(None)
	}
	let path = config.table_path(Dataset::Vaccination);
	let mut store: TimeSeriesStore<VaccinationRecord> = TimeSeriesStore::load(progress, &path)?;
	match fetch_parsed(source, Feed::DosesApplied, date, parse_doses_applied)? {
		Some(applied) => {
			let received = fetch_parsed(source, Feed::DosesReceived, date, parse_doses_received)?;
			let feeds = DoseFeeds{applied, received};
			update_vaccination(&mut store, date, &config.city, &feeds, hosp);
			store.persist(&path)?;
		},
		None => warn!("vaccination not updated for {}", date),
	}

	let path = config.table_path(Dataset::Immunizers);
	let mut immunizers: TimeSeriesStore<ImmunizerRecord> = TimeSeriesStore::load(progress, &path)?;
	if let Some(rows) = fetch_parsed(source, Feed::Immunizers, date, |data| parse_immunizers(data, date))? {
		if update_immunizers(&mut immunizers, date, rows) > 0 {
			immunizers.persist(&path)?;
		}
	}
	Ok(Some(store))
}

fn update_demographics<S: Source + ?Sized>(config: &Config, source: &mut S, date: NaiveDate) -> Result<(), Error> {
	if !config.preexisting_conditions {
		return Ok(())
	}
	if let Some(tally) = fetch_parsed(source, Feed::Conditions, date, tally_conditions)? {
		write_conditions(&config.output_path("doencas_preexistentes.csv"), &tally)?;
	}
	if let Some(counts) = fetch_parsed(source, Feed::Race, date, count_race)? {
		write_race(&config.output_path("raca_cor.csv"), &counts)?;
	}
	Ok(())
}

fn write_outputs(config: &Config, tables: &Tables) -> Result<Vec<LocalityReport>, Error> {
	let mut result = Vec::new();
	for locality in config.localities() {
		let daily = derive_daily(tables, &locality);
		let mut weekly = aggregate(&daily, &locality);
		apply_variations(&mut weekly);
		let slug = locality.slug();
		write_daily(&config.output_path(&format!("diario_{}.csv", slug)), &daily)?;
		write_weekly(&config.output_path(&format!("semanal_{}.csv", slug)), &weekly)?;
		write_summary(&config.output_path(&format!("resumo_semanal_{}.md", slug)), &weekly)?;
		info!("{}: {} days, {} weeks", locality, daily.len(), weekly.len());
		result.push(LocalityReport{locality, daily, weekly});
	}
	Ok(result)
}


/// Run every stage for one processing date.
///
/// Each table is persisted as soon as its stage is done, so a failure leaves
/// the earlier tables updated. Re-running the same date upserts the same
/// keys.
pub fn run_day<S: Source + ?Sized, P: ProgressSink + ?Sized>(
	config: &Config,
	date: NaiveDate,
	source: &mut S,
	progress: &mut P,
) -> Result<Vec<LocalityReport>, Error> {
	info!("processing {}", date);
	let state_totals: TimeSeriesStore<StateTotalsRecord> = refresh(
		config, progress, source,
		Dataset::StateTotals, Feed::StateTotals, date,
		Columns::Rename(STATE_TOTALS_COLUMNS),
	)?;
	let municipal: TimeSeriesStore<MunicipalRecord> = refresh(
		config, progress, source,
		Dataset::Municipal, Feed::Municipal, date,
		Columns::Header,
	)?;
	let isolation = update_isolation(config, progress, source, date)?;
	let hospitalizations: TimeSeriesStore<HospitalizationRecord> = refresh(
		config, progress, source,
		Dataset::Hospitalizations, Feed::Hospitalizations, date,
		Columns::Rename(HOSPITALIZATION_COLUMNS),
	)?;
	let state_beds = update_beds(config, progress, &hospitalizations)?;
	let vaccination = update_doses(config, progress, source, date, &hospitalizations)?;
	update_demographics(config, source, date)?;

	let tables = Tables{
		state_totals: &state_totals,
		municipal: &municipal,
		isolation: &isolation,
		hospitalizations: &hospitalizations,
		state_beds: &state_beds,
		vaccination: vaccination.as_ref(),
	};
	write_outputs(config, &tables)
}
