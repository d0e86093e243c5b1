use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use log::debug;

use serde::{Deserialize, Serialize};

use enum_map::{Enum, EnumMap};

use super::config::Feed;
use super::error::Error;
use super::ioutil::AtomicFile;
use super::seade::{read_feed, read_raw, Columns};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Enum)]
pub enum Condition {
	Asthma,
	HeartDisease,
	Diabetes,
	Hematologic,
	Hepatic,
	Neurologic,
	Renal,
	Immunodeficiency,
	Obesity,
	Other,
	Pneumopathy,
	Puerperium,
	DownSyndrome,
}

impl Condition {
	pub const ALL: [Condition; 13] = [
		Self::Asthma,
		Self::HeartDisease,
		Self::Diabetes,
		Self::Hematologic,
		Self::Hepatic,
		Self::Neurologic,
		Self::Renal,
		Self::Immunodeficiency,
		Self::Obesity,
		Self::Other,
		Self::Pneumopathy,
		Self::Puerperium,
		Self::DownSyndrome,
	];

	pub fn column(&self) -> &'static str {
		match self {
			Self::Asthma => "asma",
			Self::HeartDisease => "cardiopatia",
			Self::Diabetes => "diabetes",
			Self::Hematologic => "doenca_hematologica",
			Self::Hepatic => "doenca_hepatica",
			Self::Neurologic => "doenca_neurologica",
			Self::Renal => "doenca_renal",
			Self::Immunodeficiency => "imunodepressao",
			Self::Obesity => "obesidade",
			Self::Other => "outros",
			Self::Pneumopathy => "pneumopatia",
			Self::Puerperium => "puerpera",
			Self::DownSyndrome => "sindrome_de_down",
		}
	}
}

/// municipio, codigo_ibge, idade, sexo, covid19, data_inicio_sintomas and
/// obito precede the condition columns.
const CONDITIONS_OFFSET: usize = 7;
const COVID_COLUMN: usize = 4;
const DEATH_COLUMN: usize = 6;


/// Confirmed cases and deaths with each pre-existing condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionTally {
	pub cases: EnumMap<Condition, u64>,
	pub deaths: EnumMap<Condition, u64>,
}

fn is_death(v: &str) -> bool {
	matches!(v.trim(), "1" | "1.0" | "SIM" | "sim")
}

/// Count the conditions feed.
///
/// The feed is only usable when every condition column holds exactly the
/// three answers yes, no and ignored; partial exports are rejected.
pub fn tally_conditions(data: &[u8]) -> Result<ConditionTally, Error> {
	let feed = Feed::Conditions;
	let (header, rows) = read_raw(data)?;
	let width = CONDITIONS_OFFSET + Condition::ALL.len();
	if header.len() != width {
		return Err(Error::Schema{feed, reason: format!("expected {} columns, got {}", width, header.len())})
	}

	let mut answers: EnumMap<Condition, BTreeSet<String>> = EnumMap::default();
	let mut result = ConditionTally::default();
	for row in rows.iter().filter(|r| r.len() == width) {
		let confirmed = row[COVID_COLUMN].trim().eq_ignore_ascii_case("CONFIRMADO");
		let died = is_death(&row[DEATH_COLUMN]);
		for (i, condition) in Condition::ALL.iter().enumerate() {
			let answer = row[CONDITIONS_OFFSET + i].trim().to_uppercase();
			if confirmed && answer == "SIM" {
				result.cases[*condition] += 1;
				if died {
					result.deaths[*condition] += 1;
				}
			}
			answers[*condition].insert(answer);
		}
	}

	for (condition, seen) in answers.iter() {
		if seen.len() != 3 {
			return Err(Error::Schema{
				feed,
				reason: format!("{} has {} distinct answers", condition.column(), seen.len()),
			})
		}
	}
	Ok(result)
}


#[derive(Debug, Clone, Deserialize)]
struct RaceRow {
	obito: String,
	#[serde(default)]
	raca_cor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceCount {
	pub obito: String,
	pub raca_cor: String,
	pub contagem: u64,
}

fn title_case(s: &str) -> String {
	s.split_whitespace().map(|word| {
		let lower = word.to_lowercase();
		let mut chars = lower.chars();
		match chars.next() {
			Some(first) => first.to_uppercase().chain(chars).collect(),
			None => String::new(),
		}
	}).collect::<Vec<String>>().join(" ")
}

fn race_label(s: &str) -> String {
	let s = s.trim();
	if s.is_empty() || s.eq_ignore_ascii_case("NONE") {
		return "Ignorado".into()
	}
	title_case(s)
}

/// Count cases per (death outcome, race/colour).
pub fn count_race(data: &[u8]) -> Result<Vec<RaceCount>, Error> {
	let rows: Vec<RaceRow> = read_feed(Feed::Race, data, Columns::Header)?;
	let mut groups: BTreeMap<(String, String), u64> = BTreeMap::new();
	for row in rows.iter() {
		let obito = match row.obito.trim() {
			"" => "IGNORADO".into(),
			v => v.to_string(),
		};
		*groups.entry((obito, race_label(&row.raca_cor))).or_insert(0) += 1;
	}
	debug!("{} race/colour groups from {} rows", groups.len(), rows.len());
	Ok(groups.into_iter().map(|((obito, raca_cor), contagem)| RaceCount{obito, raca_cor, contagem}).collect())
}


pub fn write_conditions(path: &Path, tally: &ConditionTally) -> Result<(), Error> {
	let mut f = AtomicFile::create(path)?;
	{
		let mut w = csv::Writer::from_writer(&mut f);
		w.write_record(&["doenca", "casos", "obitos"])?;
		for condition in Condition::ALL.iter() {
			w.write_record(&[
				condition.column().to_string(),
				tally.cases[*condition].to_string(),
				tally.deaths[*condition].to_string(),
			])?;
		}
		w.flush()?;
	}
	f.commit()?;
	Ok(())
}

pub fn write_race(path: &Path, counts: &[RaceCount]) -> Result<(), Error> {
	let mut f = AtomicFile::create(path)?;
	{
		let mut w = csv::Writer::from_writer(&mut f);
		for row in counts.iter() {
			w.serialize(row)?;
		}
		w.flush()?;
	}
	f.commit()?;
	Ok(())
}


#[cfg(test)]
mod tests {
	use super::*;

	static HEADER: &'static str = "municipio;codigo_ibge;idade;sexo;covid19;data_inicio_sintomas;obito;asma;cardiopatia;diabetes;doenca_hematologica;doenca_hepatica;doenca_neurologica;doenca_renal;imunodepressao;obesidade;outros;pneumopatia;puerpera;sindrome_de_down\n";

	fn row(covid: &str, obito: u8, answer: &str, asthma: &str) -> String {
		let mut answers = vec![asthma.to_string()];
		answers.extend(std::iter::repeat(answer.to_string()).take(12));
		format!("Santos;3548500;40;MASCULINO;{};2020-05-01;{};{}\n", covid, obito, answers.join(";"))
	}

	#[test]
	fn conditions_are_counted_for_confirmed_cases() {
		let data = format!("{}{}{}{}{}",
			HEADER,
			row("CONFIRMADO", 1, "SIM", "SIM"),
			row("CONFIRMADO", 0, "NÃO", "NÃO"),
			row("CONFIRMADO", 0, "IGNORADO", "IGNORADO"),
			row("SUSPEITO", 1, "SIM", "SIM"),
		);
		let tally = tally_conditions(data.as_bytes()).unwrap();
		assert_eq!(tally.cases[Condition::Asthma], 1);
		assert_eq!(tally.deaths[Condition::Asthma], 1);
		assert_eq!(tally.cases[Condition::Diabetes], 1);
	}

	#[test]
	fn incomplete_answers_make_the_feed_unusable() {
		let data = format!("{}{}{}",
			HEADER,
			row("CONFIRMADO", 1, "SIM", "SIM"),
			row("CONFIRMADO", 0, "NÃO", "NÃO"),
		);
		match tally_conditions(data.as_bytes()) {
			Err(Error::Schema{feed: Feed::Conditions, ..}) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn race_groups() {
		let data = "obito;raca_cor;idade\n0;PARDA;30\n0;parda;31\n1;NONE;80\n1;;70\n0;BRANCA;20\n";
		let counts = count_race(data.as_bytes()).unwrap();
		assert_eq!(counts, vec![
			RaceCount{obito: "0".into(), raca_cor: "Branca".into(), contagem: 1},
			RaceCount{obito: "0".into(), raca_cor: "Parda".into(), contagem: 2},
			RaceCount{obito: "1".into(), raca_cor: "Ignorado".into(), contagem: 2},
		]);
	}
}
