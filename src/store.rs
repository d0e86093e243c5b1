use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::io;
use std::path::Path;

use log::{debug, warn};

use serde::{de::DeserializeOwned, Serialize};

use chrono::{Duration, NaiveDate};

use super::error::Error;
use super::ioutil::{magic_open, AtomicFile};
use super::progress::{CountMeter, ProgressSink};


/// A row of a date-indexed table.
///
/// Rows are keyed by `(date, series)`; the series is usually a locality, but
/// e.g. the immunizer table is keyed by vaccine name.
pub trait Record: Clone + Serialize + DeserializeOwned {
	type Series: Hash + Eq + Clone + fmt::Debug;

	fn date(&self) -> NaiveDate;
	fn series(&self) -> Self::Series;
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
	Inserted,
	Replaced,
}


/// Append-only, date-ordered table with upsert-by-key.
///
/// Row order is significant: positional predecessors are used for deltas,
/// so replacing a row never moves it.
#[derive(Debug, Clone)]
pub struct TimeSeriesStore<R: Record> {
	rows: Vec<R>,
	index: HashMap<(NaiveDate, R::Series), usize>,
	dates: HashMap<NaiveDate, usize>,
	span: Option<(NaiveDate, NaiveDate)>,
}

impl<R: Record> TimeSeriesStore<R> {
	pub fn new() -> Self {
		Self{
			rows: Vec::new(),
			index: HashMap::new(),
			dates: HashMap::new(),
			span: None,
		}
	}

	pub fn from_rows<I: IntoIterator<Item = R>>(rows: I) -> Self {
		let mut result = Self::new();
		for row in rows {
			result.upsert(row);
		}
		result
	}

	/// Load a persisted table. A missing file is an empty table.
	pub fn load<P: AsRef<Path>, S: ProgressSink + ?Sized>(s: &mut S, path: P) -> Result<Self, Error> {
		let path = path.as_ref();
		let r = match magic_open(path) {
			Ok(r) => r,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				debug!("no snapshot at {}, starting empty", path.display());
				return Ok(Self::new())
			},
			Err(e) => return Err(e.into()),
		};
		let mut result = Self::read_from(s, r)?;
		if result.ensure_date_order() {
			warn!("{} was not in date order, rows re-sorted", path.display());
		}
		Ok(result)
	}

	pub fn read_from<Rd: io::Read, S: ProgressSink + ?Sized>(s: &mut S, r: Rd) -> Result<Self, Error> {
		let mut r = csv::Reader::from_reader(r);
		let mut result = Self::new();
		let mut pm = CountMeter::new(s);
		let mut n = 0;
		for (i, row) in r.deserialize().enumerate() {
			let rec: R = row?;
			result.upsert(rec);
			if i % 500000 == 499999 {
				pm.update(i+1);
			}
			n = i+1;
		}
		pm.finish(n);
		Ok(result)
	}

	pub fn rows(&self) -> &[R] {
		&self.rows[..]
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn position(&self, date: NaiveDate, series: &R::Series) -> Option<usize> {
		// the key tuple owns its series; cloning is cheap for the key types in use
		self.index.get(&(date, series.clone())).copied()
	}

	pub fn get(&self, date: NaiveDate, series: &R::Series) -> Option<&R> {
		Some(&self.rows[self.position(date, series)?])
	}

	pub fn contains(&self, date: NaiveDate, series: &R::Series) -> bool {
		self.position(date, series).is_some()
	}

	/// Whether any series has a row for `date`.
	pub fn has_date(&self, date: NaiveDate) -> bool {
		self.dates.contains_key(&date)
	}

	pub fn first_date(&self) -> Option<NaiveDate> {
		self.span.map(|(first, _)| first)
	}

	pub fn last_date(&self) -> Option<NaiveDate> {
		self.span.map(|(_, last)| last)
	}

	/// Replace the row with the same key in place, or append.
	pub fn upsert(&mut self, rec: R) -> Upsert {
		let key = (rec.date(), rec.series());
		match self.index.get(&key) {
			Some(i) => {
				self.rows[*i] = rec;
				Upsert::Replaced
			},
			None => {
				*self.dates.entry(key.0).or_insert(0) += 1;
				self.span = Some(match self.span {
					Some((first, last)) => (first.min(key.0), last.max(key.0)),
					None => (key.0, key.0),
				});
				self.index.insert(key, self.rows.len());
				self.rows.push(rec);
				Upsert::Inserted
			},
		}
	}

	/// Latest row of `series` strictly before `date`, not looking further
	/// back than `floor` (the first recorded date when `None`).
	pub fn most_recent_before(&self, series: &R::Series, date: NaiveDate, floor: Option<NaiveDate>) -> Option<&R> {
		let floor = match floor.or_else(|| self.first_date()) {
			Some(floor) => floor,
			None => return None,
		};
		let mut day = date - Duration::days(1);
		while day >= floor {
			if let Some(rec) = self.get(day, series) {
				return Some(rec)
			}
			day = day - Duration::days(1);
		}
		None
	}

	/// Rows of one series in stored order.
	pub fn series_rows<'a>(&'a self, series: &'a R::Series) -> impl Iterator<Item = &'a R> + 'a {
		self.rows.iter().filter(move |r| r.series() == *series)
	}

	/// Stable sort of the rows; the key index is rebuilt.
	pub fn sort_by_key<K: Ord, F: FnMut(&R) -> K>(&mut self, f: F) {
		self.rows.sort_by_key(f);
		self.reindex();
	}

	/// Restore ascending date order if it was violated. Returns whether the
	/// table had to be re-sorted.
	pub fn ensure_date_order(&mut self) -> bool {
		let ordered = self.rows.windows(2).all(|w| w[0].date() <= w[1].date());
		if ordered {
			return false
		}
		self.sort_by_key(|r| r.date());
		true
	}

	fn reindex(&mut self) {
		self.index.clear();
		for (i, row) in self.rows.iter().enumerate() {
			self.index.insert((row.date(), row.series()), i);
		}
	}

	pub fn write_to<W: io::Write>(&self, w: W) -> Result<(), Error> {
		let mut w = csv::Writer::from_writer(w);
		for row in self.rows.iter() {
			w.serialize(row)?;
		}
		w.flush()?;
		Ok(())
	}

	/// Write the full table, replacing the previous snapshot atomically.
	pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
		let mut f = AtomicFile::create(path.as_ref())?;
		self.write_to(&mut f)?;
		f.commit()?;
		debug!("persisted {} rows to {}", self.rows.len(), path.as_ref().display());
		Ok(())
	}
}

impl<R: Record> Default for TimeSeriesStore<R> {
	fn default() -> Self {
		Self::new()
	}
}
