use log::{debug, info};

use chrono::{Duration, NaiveDate};

use super::config::Feed;
use super::context::format_municipality;
use super::error::Error;
use super::seade::{read_feed, Columns, IsolationCorrectionRow, IsolationRecord, ISOLATION_CORRECTION_COLUMNS};
use super::store::{Record, TimeSeriesStore};


/// Days in `[start, end)` without a row for `series`, followed by the day
/// before `processing_date`, which is always re-checked because same-day
/// figures are incomplete until the next bulletin.
pub fn find_missing_days<R: Record>(
	store: &TimeSeriesStore<R>,
	series: &R::Series,
	start: NaiveDate,
	end: NaiveDate,
	processing_date: NaiveDate,
) -> Vec<NaiveDate> {
	let mut result: Vec<NaiveDate> = start
		.iter_days()
		.take_while(|d| *d < end)
		.filter(|d| !store.contains(*d, series))
		.collect();
	let yesterday = processing_date - Duration::days(1);
	if !result.contains(&yesterday) {
		result.push(yesterday);
	}
	result
}

/// Label under which the weekly snapshot publishes a day.
pub fn correction_label(day: NaiveDate) -> String {
	day.format("%A, %d/%m").to_string()
}

pub fn parse_corrections(data: &[u8]) -> Result<Vec<IsolationCorrectionRow>, Error> {
	read_feed(Feed::IsolationCorrections, data, Columns::Rename(ISOLATION_CORRECTION_COLUMNS))
}

/// Fill missing isolation days from the weekly snapshot.
///
/// Days already present in the store are never touched. Backfilled rows are
/// upserted into `store`, which is then put back into date order, and
/// returned.
pub fn backfill_from(
	corrections: &[IsolationCorrectionRow],
	missing: &[NaiveDate],
	store: &mut TimeSeriesStore<IsolationRecord>,
) -> Vec<IsolationRecord> {
	let mut result = Vec::new();
	for day in missing.iter() {
		if store.has_date(*day) {
			continue
		}
		let label = correction_label(*day);
		let rows: Vec<IsolationRecord> = corrections.iter()
			.filter(|row| row.data.trim() == label)
			.map(|row| IsolationRecord{
				data: *day,
				municipio: format_municipality(&row.municipio),
				populacao: row.populacao,
				uf: row.uf.clone(),
				isolamento: row.isolamento,
			})
			.collect();
		if rows.is_empty() {
			debug!("no isolation correction for {} ({})", day, label);
			continue
		}
		info!("backfilled isolation for {} from {} rows", day, rows.len());
		for row in rows {
			store.upsert(row.clone());
			result.push(row);
		}
	}
	if result.len() > 0 {
		store.sort_by_key(|r| r.date());
	}
	result
}


#[cfg(test)]
mod tests {
	use super::*;

	use crate::context::{Locality, Maybe};

	fn day(m: u32, d: u32) -> NaiveDate {
		NaiveDate::from_ymd_opt(2021, m, d).unwrap()
	}

	fn iso(date: NaiveDate, place: &str, v: f64) -> IsolationRecord {
		IsolationRecord{
			data: date,
			municipio: place.into(),
			populacao: Maybe(Some(1000)),
			uf: "SP".into(),
			isolamento: Maybe(Some(v)),
		}
	}

	fn correction(label: &str, place: &str, v: &str) -> IsolationCorrectionRow {
		IsolationCorrectionRow{
			codigo_ibge: Maybe(None),
			data: label.into(),
			municipio: place.into(),
			populacao: Maybe(Some(1000)),
			uf: "SP".into(),
			isolamento: v.parse().unwrap(),
		}
	}

	#[test]
	fn missing_days_include_yesterday() {
		let store = TimeSeriesStore::from_rows(vec![
			iso(day(1, 1), "Estado de São Paulo", 40.0),
			iso(day(1, 3), "Estado de São Paulo", 41.0),
			iso(day(1, 4), "São Paulo", 41.0),
		]);
		let missing = find_missing_days(&store, &Locality::State, day(1, 1), day(1, 5), day(1, 10));
		assert_eq!(missing, vec![day(1, 2), day(1, 4), day(1, 9)]);
	}

	#[test]
	fn yesterday_is_not_listed_twice() {
		let store: TimeSeriesStore<IsolationRecord> = TimeSeriesStore::new();
		let missing = find_missing_days(&store, &Locality::State, day(1, 1), day(1, 3), day(1, 3));
		assert_eq!(missing, vec![day(1, 1), day(1, 2)]);
	}

	#[test]
	fn labels_use_english_weekday_names() {
		assert_eq!(correction_label(day(1, 4)), "Monday, 04/01");
	}

	#[test]
	fn backfill_matches_by_label_and_skips_known_days() {
		let mut store = TimeSeriesStore::from_rows(vec![
			iso(day(1, 5), "Estado de São Paulo", 42.0),
			iso(day(1, 4), "Estado de São Paulo", 41.0),
		]);
		let corrections = vec![
			correction("Sunday, 03/01", "ESTADO DE SÃO PAULO", "45%"),
			correction("Sunday, 03/01", "SÃO JOSÉ DOS CAMPOS", "39%"),
			correction("Monday, 04/01", "ESTADO DE SÃO PAULO", "10%"),
		];
		let filled = backfill_from(&corrections, &[day(1, 3), day(1, 4), day(1, 2)], &mut store);
		assert_eq!(filled.len(), 2);
		assert_eq!(filled[1].municipio, "São José dos Campos");
		assert_eq!(*filled[0].isolamento, Some(45.0));
		// the known day keeps its value
		assert_eq!(*store.get(day(1, 4), &Locality::State).unwrap().isolamento, Some(41.0));
		let dates: Vec<NaiveDate> = store.rows().iter().map(|r| r.data).collect();
		assert_eq!(dates, vec![day(1, 3), day(1, 3), day(1, 4), day(1, 5)]);
	}

	#[test]
	fn no_corrections_leaves_gaps() {
		let mut store: TimeSeriesStore<IsolationRecord> = TimeSeriesStore::new();
		assert!(backfill_from(&[], &[day(1, 3)], &mut store).is_empty());
		assert!(store.is_empty());
	}
}
