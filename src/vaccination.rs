use std::collections::HashMap;

use log::{debug, info, warn};

use serde::{Deserialize, Serialize};

use chrono::NaiveDate;

use enum_map::EnumMap;

use smartstring::alias::{String as SmartString};

use super::config::Feed;
use super::context::{flexible_date, normalize_name, DoseTier, Locality, Maybe};
use super::delta::{counter_delta, Baseline};
use super::error::Error;
use super::rates::ratio;
use super::seade::{read_raw, HospitalizationRecord};
use super::store::{Record, TimeSeriesStore};


/// Cumulative doses and derived coverage of one locality on one day.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VaccinationRecord {
	#[serde(deserialize_with = "flexible_date")]
	pub data: NaiveDate,
	pub municipio: String,
	pub doses_recebidas: Maybe<i64>,
	#[serde(rename = "1a_dose")]
	pub dose_1: Maybe<i64>,
	#[serde(rename = "2a_dose")]
	pub dose_2: Maybe<i64>,
	#[serde(rename = "3a_dose", default)]
	pub dose_3: Maybe<i64>,
	#[serde(rename = "4a_dose", default)]
	pub dose_4: Maybe<i64>,
	#[serde(rename = "5a_dose", default)]
	pub dose_5: Maybe<i64>,
	#[serde(rename = "6a_dose", default)]
	pub dose_6: Maybe<i64>,
	#[serde(default)]
	pub dose_unica: Maybe<i64>,
	#[serde(default)]
	pub populacao: Maybe<i64>,
	#[serde(default)]
	pub total_doses: Maybe<i64>,
	#[serde(rename = "perc_vacinadas_1a_dose", default)]
	pub perc_dose_1: Maybe<f64>,
	#[serde(rename = "perc_vacinadas_2a_dose", default)]
	pub perc_dose_2: Maybe<f64>,
	#[serde(rename = "perc_vacinadas_3a_dose", default)]
	pub perc_dose_3: Maybe<f64>,
	#[serde(rename = "perc_vacinadas_4a_dose", default)]
	pub perc_dose_4: Maybe<f64>,
	#[serde(rename = "perc_vacinadas_5a_dose", default)]
	pub perc_dose_5: Maybe<f64>,
	#[serde(rename = "perc_vacinadas_6a_dose", default)]
	pub perc_dose_6: Maybe<f64>,
	#[serde(rename = "perc_vacinadas_dose_unica", default)]
	pub perc_dose_unica: Maybe<f64>,
	#[serde(rename = "perc_vacinadas_1a_dose_dose_unica", default)]
	pub perc_dose_1_unica: Maybe<f64>,
	#[serde(default)]
	pub perc_imunizadas: Maybe<f64>,
	#[serde(default)]
	pub perc_aplicadas: Maybe<f64>,
	#[serde(default)]
	pub aplicadas_dia: Maybe<i64>,
	#[serde(default)]
	pub primeira_dose_dia: Maybe<i64>,
	#[serde(default)]
	pub segunda_dose_dia: Maybe<i64>,
	#[serde(default)]
	pub terceira_dose_dia: Maybe<i64>,
	#[serde(default)]
	pub quarta_dose_dia: Maybe<i64>,
	#[serde(default)]
	pub quinta_dose_dia: Maybe<i64>,
	#[serde(default)]
	pub sexta_dose_dia: Maybe<i64>,
	#[serde(default)]
	pub dose_unica_dia: Maybe<i64>,
}

impl VaccinationRecord {
	pub fn new(data: NaiveDate, locality: &Locality) -> Self {
		Self{
			data,
			municipio: locality.to_string(),
			..Default::default()
		}
	}

	pub fn dose(&self, tier: DoseTier) -> Option<i64> {
		match tier {
			DoseTier::First => *self.dose_1,
			DoseTier::Second => *self.dose_2,
			DoseTier::Third => *self.dose_3,
			DoseTier::Fourth => *self.dose_4,
			DoseTier::Fifth => *self.dose_5,
			DoseTier::Sixth => *self.dose_6,
			DoseTier::Single => *self.dose_unica,
		}
	}

	pub fn dose_mut(&mut self, tier: DoseTier) -> &mut Maybe<i64> {
		match tier {
			DoseTier::First => &mut self.dose_1,
			DoseTier::Second => &mut self.dose_2,
			DoseTier::Third => &mut self.dose_3,
			DoseTier::Fourth => &mut self.dose_4,
			DoseTier::Fifth => &mut self.dose_5,
			DoseTier::Sixth => &mut self.dose_6,
			DoseTier::Single => &mut self.dose_unica,
		}
	}

	pub fn vaccinated_pct(&self, tier: DoseTier) -> Option<f64> {
		match tier {
			DoseTier::First => *self.perc_dose_1,
			DoseTier::Second => *self.perc_dose_2,
			DoseTier::Third => *self.perc_dose_3,
			DoseTier::Fourth => *self.perc_dose_4,
			DoseTier::Fifth => *self.perc_dose_5,
			DoseTier::Sixth => *self.perc_dose_6,
			DoseTier::Single => *self.perc_dose_unica,
		}
	}

	fn vaccinated_pct_mut(&mut self, tier: DoseTier) -> &mut Maybe<f64> {
		match tier {
			DoseTier::First => &mut self.perc_dose_1,
			DoseTier::Second => &mut self.perc_dose_2,
			DoseTier::Third => &mut self.perc_dose_3,
			DoseTier::Fourth => &mut self.perc_dose_4,
			DoseTier::Fifth => &mut self.perc_dose_5,
			DoseTier::Sixth => &mut self.perc_dose_6,
			DoseTier::Single => &mut self.perc_dose_unica,
		}
	}

	pub fn new_doses(&self, tier: DoseTier) -> Option<i64> {
		match tier {
			DoseTier::First => *self.primeira_dose_dia,
			DoseTier::Second => *self.segunda_dose_dia,
			DoseTier::Third => *self.terceira_dose_dia,
			DoseTier::Fourth => *self.quarta_dose_dia,
			DoseTier::Fifth => *self.quinta_dose_dia,
			DoseTier::Sixth => *self.sexta_dose_dia,
			DoseTier::Single => *self.dose_unica_dia,
		}
	}

	fn new_doses_mut(&mut self, tier: DoseTier) -> &mut Maybe<i64> {
		match tier {
			DoseTier::First => &mut self.primeira_dose_dia,
			DoseTier::Second => &mut self.segunda_dose_dia,
			DoseTier::Third => &mut self.terceira_dose_dia,
			DoseTier::Fourth => &mut self.quarta_dose_dia,
			DoseTier::Fifth => &mut self.quinta_dose_dia,
			DoseTier::Sixth => &mut self.sexta_dose_dia,
			DoseTier::Single => &mut self.dose_unica_dia,
		}
	}
}

impl Record for VaccinationRecord {
	type Series = Locality;

	fn date(&self) -> NaiveDate {
		self.data
	}

	fn series(&self) -> Locality {
		Locality::from_name(&self.municipio)
	}
}


/// Count of one dose tier applied in one municipality.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedDose {
	pub municipio: SmartString,
	pub tier: DoseTier,
	pub count: i64,
}

fn feed_municipality(name: &str) -> SmartString {
	// the capital arrives with every conceivable mangling of "SÃO"
	if name.to_uppercase().contains("O PAULO") {
		return "SAO PAULO".into()
	}
	normalize_name(name)
}

fn parse_count(feed: Feed, s: &str) -> Result<Option<i64>, Error> {
	s.parse::<Maybe<i64>>()
		.map(|v| v.0)
		.map_err(|e| Error::Schema{feed, reason: format!("bad count {:?}: {}", s, e)})
}

/// Parse the doses-applied feed.
///
/// Two layouts exist: `municipio;dose;contagem` and
/// `municipio;dose;municipio;drs;contagem`. Anything else, notably the
/// single-column error page served on bad days, is rejected.
pub fn parse_doses_applied(data: &[u8]) -> Result<Vec<AppliedDose>, Error> {
	let feed = Feed::DosesApplied;
	let (header, rows) = read_raw(data)?;
	let count_column = match header.len() {
		3 => 2,
		5 => 4,
		n => return Err(Error::Schema{feed, reason: format!("{} columns", n)}),
	};
	let mut result = Vec::with_capacity(rows.len());
	for row in rows.iter() {
		let (name, label, count) = match (row.get(0), row.get(1), row.get(count_column)) {
			(Some(name), Some(label), Some(count)) => (name, label, count),
			_ => continue,
		};
		let tier = match DoseTier::from_feed_label(label) {
			Some(tier) => tier,
			None => {
				debug!("ignoring dose label {:?}", label);
				continue
			},
		};
		if let Some(count) = parse_count(feed, count)? {
			result.push(AppliedDose{
				municipio: feed_municipality(name),
				tier,
				count,
			});
		}
	}
	Ok(result)
}

/// Parse the doses-received feed (`municipio;contagem`).
pub fn parse_doses_received(data: &[u8]) -> Result<HashMap<SmartString, i64>, Error> {
	let feed = Feed::DosesReceived;
	let (header, rows) = read_raw(data)?;
	if header.len() != 2 {
		return Err(Error::Schema{feed, reason: format!("{} columns", header.len())})
	}
	let mut result = HashMap::new();
	for row in rows.iter() {
		if let (Some(name), Some(count)) = (row.get(0), row.get(1)) {
			if let Some(count) = parse_count(feed, count)? {
				result.entry(normalize_name(name)).or_insert(count);
			}
		}
	}
	Ok(result)
}


/// Today's dose feeds. `received` is `None` when that feed is unavailable.
#[derive(Debug, Clone, Default)]
pub struct DoseFeeds {
	pub applied: Vec<AppliedDose>,
	pub received: Option<HashMap<SmartString, i64>>,
}

impl DoseFeeds {
	fn city_dose(&self, city: &str, tier: DoseTier) -> Option<i64> {
		self.applied.iter()
			.find(|d| d.municipio.as_str() == city && d.tier == tier)
			.map(|d| d.count)
	}

	fn state_dose(&self, tier: DoseTier) -> i64 {
		self.applied.iter()
			.filter(|d| d.tier == tier)
			.map(|d| d.count)
			.sum()
	}
}


/// Latest record of `locality` before `date`, looking back to the start of
/// the campaign.
pub fn prior_record<'x>(store: &'x TimeSeriesStore<VaccinationRecord>, locality: &Locality, date: NaiveDate) -> Option<&'x VaccinationRecord> {
	store.most_recent_before(locality, date, None)
}

/// Most recent earlier count of a tier. Unavailable when there is none,
/// except for single doses, which count as zero.
pub fn prior_dose(store: &TimeSeriesStore<VaccinationRecord>, locality: &Locality, date: NaiveDate, tier: DoseTier) -> Option<i64> {
	prior_record(store, locality, date)
		.and_then(|r| r.dose(tier))
		.or(tier.missing_prior())
}

fn dose_baseline(prior: Option<&VaccinationRecord>, tier: DoseTier) -> Baseline {
	match (prior, tier.missing_prior()) {
		(Some(r), missing) => Baseline::Prior(r.dose(tier).or(missing)),
		(None, Some(missing)) => Baseline::Prior(Some(missing)),
		(None, None) => Baseline::First,
	}
}

fn upsert_counts(
	store: &mut TimeSeriesStore<VaccinationRecord>,
	locality: &Locality,
	date: NaiveDate,
	received: Option<i64>,
	doses: EnumMap<DoseTier, Option<i64>>,
) {
	let mut rec = match store.get(date, locality) {
		Some(rec) => rec.clone(),
		None => VaccinationRecord::new(date, locality),
	};
	rec.doses_recebidas = Maybe(received);
	for tier in DoseTier::ALL.iter() {
		*rec.dose_mut(*tier) = Maybe(doses[*tier]);
	}
	store.upsert(rec);
}

/// Update the city's counts: feed values, else the latest earlier count.
pub fn update_city(store: &mut TimeSeriesStore<VaccinationRecord>, date: NaiveDate, city: &Locality, feeds: &DoseFeeds) {
	let name = match city {
		Locality::Municipality(name) => name.as_str(),
		Locality::State => return,
	};
	let doses = EnumMap::from_fn(|tier: DoseTier| {
		feeds.city_dose(name, tier).or_else(|| prior_dose(store, city, date, tier))
	});
	let received = match &feeds.received {
		Some(received) => received.get(name).copied(),
		None => prior_record(store, city, date).and_then(|r| *r.doses_recebidas),
	};
	upsert_counts(store, city, date, received, doses);
}

/// Update the state's counts from the sum over all municipalities. A tier
/// summing to zero has not been published and keeps its latest count.
pub fn update_state(store: &mut TimeSeriesStore<VaccinationRecord>, date: NaiveDate, feeds: &DoseFeeds) {
	let state = Locality::State;
	let doses = EnumMap::from_fn(|tier: DoseTier| {
		match feeds.state_dose(tier) {
			0 => prior_dose(store, &state, date, tier),
			n => Some(n),
		}
	});
	let received = match &feeds.received {
		Some(received) => Some(received.values().sum()),
		None => prior_record(store, &state, date).and_then(|r| *r.doses_recebidas),
	};
	upsert_counts(store, &state, date, received, doses);
}

/// Population of the state and the capital, from the newest day of the
/// hospitalization table.
pub fn update_population(store: &mut TimeSeriesStore<VaccinationRecord>, date: NaiveDate, city: &Locality, hosp: &TimeSeriesStore<HospitalizationRecord>) {
	let latest = match hosp.last_date() {
		Some(latest) => latest,
		None => return,
	};
	for rec in hosp.rows().iter().filter(|r| r.data == latest) {
		let locality = if rec.is_state() {
			Locality::State
		} else if rec.is_capital() {
			city.clone()
		} else {
			continue
		};
		let pop = match *rec.pop {
			Some(pop) => pop.round() as i64,
			None => continue,
		};
		if let Some(row) = store.get(date, &locality) {
			let mut row = row.clone();
			row.populacao = Maybe(Some(pop));
			store.upsert(row);
		}
	}
}

/// Totals, coverage percentages and daily deltas of one row.
pub fn derive_fields(store: &mut TimeSeriesStore<VaccinationRecord>, date: NaiveDate, locality: &Locality) {
	let mut rec = match store.get(date, locality) {
		Some(rec) => rec.clone(),
		None => return,
	};
	let prior = prior_record(store, locality, date);

	let total: i64 = DoseTier::ALL.iter().map(|t| rec.dose(*t).unwrap_or(0)).sum();
	rec.total_doses = Maybe(Some(total));

	let population = Some(rec.populacao.unwrap_or(0));
	for tier in DoseTier::ALL.iter() {
		*rec.vaccinated_pct_mut(*tier) = Maybe(ratio(Some(rec.dose(*tier).unwrap_or(0)), population));
	}
	let first_or_single = rec.dose(DoseTier::First).unwrap_or(0) + rec.dose(DoseTier::Single).unwrap_or(0);
	rec.perc_dose_1_unica = Maybe(ratio(Some(first_or_single), population));
	rec.perc_imunizadas = rec.perc_dose_3;

	let received = match rec.doses_recebidas.unwrap_or(0) {
		0 => prior.and_then(|p| *p.doses_recebidas),
		n => Some(n),
	};
	rec.perc_aplicadas = Maybe(ratio(Some(total), received));

	let total_baseline = match prior {
		Some(p) => Baseline::Prior(*p.total_doses),
		None => Baseline::First,
	};
	rec.aplicadas_dia = Maybe(counter_delta(Some(total), total_baseline));
	for tier in DoseTier::ALL.iter() {
		*rec.new_doses_mut(*tier) = Maybe(counter_delta(rec.dose(*tier), dose_baseline(prior, *tier)));
	}

	store.upsert(rec);
}

/// Apply today's dose feeds to the vaccination table.
pub fn update_vaccination(
	store: &mut TimeSeriesStore<VaccinationRecord>,
	date: NaiveDate,
	city: &Locality,
	feeds: &DoseFeeds,
	hosp: &TimeSeriesStore<HospitalizationRecord>,
) {
	update_city(store, date, city, feeds);
	update_state(store, date, feeds);
	update_population(store, date, city, hosp);
	for locality in [Locality::State, city.clone()].iter() {
		derive_fields(store, date, locality);
	}
	store.sort_by_key(|r| (r.data, r.municipio.clone()));
	info!("vaccination updated for {}", date);
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmunizerRecord {
	#[serde(deserialize_with = "flexible_date")]
	pub data: NaiveDate,
	pub vacina: String,
	pub aplicadas: Maybe<i64>,
}

impl Record for ImmunizerRecord {
	type Series = String;

	fn date(&self) -> NaiveDate {
		self.data
	}

	fn series(&self) -> String {
		self.vacina.clone()
	}
}

pub fn canonical_vaccine(name: &str) -> String {
	let name = name.trim();
	match name.to_uppercase().as_str() {
		"ASTRAZENECA/OXFORD/FIOCRUZ" => "ASTRAZENECA | OXFORD".into(),
		"CORONAVAC" => "CORONAVAC | BUTANTAN".into(),
		"JANSSEN" => "JANSSEN | JOHNSON & JOHNSON".into(),
		"PFIZER" => "PFIZER | BIONTECH".into(),
		_ => name.into(),
	}
}

/// Parse the immunizer feed (`vacina;aplicadas`) into rows for `date`.
pub fn parse_immunizers(data: &[u8], date: NaiveDate) -> Result<Vec<ImmunizerRecord>, Error> {
	let feed = Feed::Immunizers;
	let (header, rows) = read_raw(data)?;
	if header.len() != 2 {
		return Err(Error::Schema{feed, reason: format!("{} columns", header.len())})
	}
	let mut result = Vec::with_capacity(rows.len());
	for row in rows.iter() {
		if let (Some(name), Some(count)) = (row.get(0), row.get(1)) {
			result.push(ImmunizerRecord{
				data: date,
				vacina: canonical_vaccine(name),
				aplicadas: Maybe(parse_count(feed, count)?),
			});
		}
	}
	result.sort_by(|a, b| a.vacina.cmp(&b.vacina));
	Ok(result)
}

/// Upsert today's immunizer rows. Days older than the table's newest day are
/// left alone, as the feed only describes the present.
pub fn update_immunizers(store: &mut TimeSeriesStore<ImmunizerRecord>, date: NaiveDate, rows: Vec<ImmunizerRecord>) -> usize {
	if let Some(last) = store.last_date() {
		if last > date {
			warn!("immunizer table already has {}, not rewriting {}", last, date);
			return 0
		}
	}
	let n = rows.len();
	for row in rows {
		store.upsert(row);
	}
	n
}
