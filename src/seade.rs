use std::borrow::Cow;

use log::{debug, warn};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use chrono::NaiveDate;

use smartstring::alias::{String as SmartString};

use super::config::Feed;
use super::context::{flexible_date, normalize_name, Locality, Maybe, STATE_NAME};
use super::error::Error;
use super::store::Record;


/// Normalised name of the capital's row in the hospitalization feed.
pub static CAPITAL_DRS: &'static str = "MUNICIPIO DE SAO PAULO";

pub static STATE_TOTALS_COLUMNS: &'static [&'static str] = &["data", "total_casos", "total_obitos"];

pub static HOSPITALIZATION_COLUMNS: &'static [&'static str] = &[
	"data", "drs", "pacientes_uti_mm7d", "total_covid_uti_mm7d", "ocupacao_leitos",
	"pop", "leitos_pc", "internacoes_7d", "internacoes_7d_l", "internacoes_7v7",
	"pacientes_uti_ultimo_dia", "total_covid_uti_ultimo_dia", "ocupacao_leitos_ultimo_dia",
	"internacoes_ultimo_dia", "pacientes_enf_mm7d", "total_covid_enf_mm7d",
	"pacientes_enf_ultimo_dia", "total_covid_enf_ultimo_dia",
];

pub static ISOLATION_CORRECTION_COLUMNS: &'static [&'static str] = &[
	"codigo_ibge", "data", "município", "populacao", "UF", "isolamento",
];


/// How the columns of a feed are named.
#[derive(Debug, Clone, Copy)]
pub enum Columns<'x> {
	/// Use the header row of the feed.
	Header,
	/// Replace the header row with these names; the widths must match.
	Rename(&'x [&'x str]),
}


/// Decode feed bytes. The upstream files are UTF-8 or Latin-1 depending on
/// which mirror served them.
pub fn decode_feed(data: &[u8]) -> Cow<str> {
	let data = data.strip_prefix(b"\xef\xbb\xbf").unwrap_or(data);
	match std::str::from_utf8(data) {
		Ok(s) => Cow::Borrowed(s),
		Err(_) => {
			debug!("feed is not UTF-8, decoding as Latin-1");
			Cow::Owned(data.iter().map(|b| *b as char).collect())
		},
	}
}

pub fn detect_delimiter(text: &str) -> u8 {
	let header = text.lines().next().unwrap_or("");
	if header.matches(';').count() >= header.matches(',').count() && header.contains(';') {
		b';'
	} else {
		b','
	}
}

/// Split a feed into its header and data rows.
pub fn read_raw(data: &[u8]) -> Result<(csv::StringRecord, Vec<csv::StringRecord>), Error> {
	let text = decode_feed(data);
	let mut r = csv::ReaderBuilder::new()
		.delimiter(detect_delimiter(&text))
		.has_headers(false)
		.flexible(true)
		.from_reader(text.as_bytes());
	let mut records = r.records();
	let header = match records.next() {
		Some(header) => header?,
		None => return Ok((csv::StringRecord::new(), Vec::new())),
	};
	let mut rows = Vec::new();
	for row in records {
		let row = row?;
		if row.iter().all(|v| v.trim().is_empty()) {
			continue
		}
		rows.push(row);
	}
	Ok((header, rows))
}

pub fn read_feed<R: DeserializeOwned>(feed: Feed, data: &[u8], columns: Columns) -> Result<Vec<R>, Error> {
	let (header, rows) = read_raw(data)?;
	let header = match columns {
		Columns::Header => header,
		Columns::Rename(names) => {
			if header.len() != names.len() {
				return Err(Error::Schema{
					feed,
					reason: format!("expected {} columns, got {}", names.len(), header.len()),
				})
			}
			csv::StringRecord::from(names.to_vec())
		},
	};
	let mut result = Vec::with_capacity(rows.len());
	let mut nskipped = 0;
	for row in rows {
		if row.len() != header.len() {
			// footers and notes appended by some mirrors
			nskipped += 1;
			continue
		}
		result.push(row.deserialize(Some(&header))?);
	}
	if nskipped > 0 {
		warn!("{}: skipped {} rows of unexpected width", feed, nskipped);
	}
	Ok(result)
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTotalsRecord {
	#[serde(deserialize_with = "flexible_date")]
	pub data: NaiveDate,
	pub total_casos: Maybe<i64>,
	pub total_obitos: Maybe<i64>,
}

impl Record for StateTotalsRecord {
	type Series = Locality;

	fn date(&self) -> NaiveDate {
		self.data
	}

	fn series(&self) -> Locality {
		Locality::State
	}
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalRecord {
	pub nome_munic: String,
	#[serde(default)]
	pub codigo_ibge: Maybe<i64>,
	#[serde(deserialize_with = "flexible_date")]
	pub datahora: NaiveDate,
	pub casos: Maybe<i64>,
	#[serde(default)]
	pub casos_novos: Maybe<i64>,
	pub obitos: Maybe<i64>,
	#[serde(default)]
	pub obitos_novos: Maybe<i64>,
	#[serde(default)]
	pub letalidade: Maybe<f64>,
	#[serde(default)]
	pub pop: Maybe<i64>,
}

impl Record for MunicipalRecord {
	type Series = Locality;

	fn date(&self) -> NaiveDate {
		self.datahora
	}

	fn series(&self) -> Locality {
		Locality::from_name(&self.nome_munic)
	}
}


/// One health-region ("DRS") row of the hospitalization feed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HospitalizationRecord {
	#[serde(deserialize_with = "flexible_date")]
	pub data: NaiveDate,
	pub drs: String,
	pub pacientes_uti_mm7d: Maybe<f64>,
	pub total_covid_uti_mm7d: Maybe<f64>,
	pub ocupacao_leitos: Maybe<f64>,
	pub pop: Maybe<f64>,
	pub leitos_pc: Maybe<f64>,
	pub internacoes_7d: Maybe<f64>,
	pub internacoes_7d_l: Maybe<f64>,
	pub internacoes_7v7: Maybe<f64>,
	pub pacientes_uti_ultimo_dia: Maybe<f64>,
	pub total_covid_uti_ultimo_dia: Maybe<f64>,
	pub ocupacao_leitos_ultimo_dia: Maybe<f64>,
	pub internacoes_ultimo_dia: Maybe<f64>,
	pub pacientes_enf_mm7d: Maybe<f64>,
	pub total_covid_enf_mm7d: Maybe<f64>,
	pub pacientes_enf_ultimo_dia: Maybe<f64>,
	pub total_covid_enf_ultimo_dia: Maybe<f64>,
}

impl HospitalizationRecord {
	pub fn is_state(&self) -> bool {
		normalize_name(&self.drs) == STATE_NAME
	}

	pub fn is_capital(&self) -> bool {
		normalize_name(&self.drs) == CAPITAL_DRS
	}

	/// The capital and the regions of greater São Paulo.
	pub fn is_metropolitan(&self) -> bool {
		self.drs.contains("SP") || self.is_capital()
	}
}

impl Record for HospitalizationRecord {
	type Series = SmartString;

	fn date(&self) -> NaiveDate {
		self.data
	}

	fn series(&self) -> SmartString {
		normalize_name(&self.drs)
	}
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationRecord {
	#[serde(deserialize_with = "flexible_date")]
	pub data: NaiveDate,
	#[serde(rename = "município")]
	pub municipio: String,
	pub populacao: Maybe<i64>,
	#[serde(rename = "UF")]
	pub uf: String,
	pub isolamento: Maybe<f64>,
}

impl Record for IsolationRecord {
	type Series = Locality;

	fn date(&self) -> NaiveDate {
		self.data
	}

	fn series(&self) -> Locality {
		Locality::from_name(&self.municipio)
	}
}


/// A row of the weekly isolation snapshot, dated by a label such as
/// `Monday, 04/01` rather than a full date.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IsolationCorrectionRow {
	pub codigo_ibge: Maybe<i64>,
	pub data: String,
	#[serde(rename = "município")]
	pub municipio: String,
	pub populacao: Maybe<i64>,
	#[serde(rename = "UF")]
	pub uf: String,
	pub isolamento: Maybe<f64>,
}
