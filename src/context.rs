use std::fmt;
use std::num::ParseFloatError;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use chrono::NaiveDate;

use enum_map::Enum;

use num_traits::NumCast;

use smartstring::alias::{String as SmartString};

use unidecode::unidecode;


/// Normalised name of the state as a whole, as it appears (after accent
/// folding) in every upstream table that mixes state and municipal rows.
pub static STATE_NAME: &'static str = "ESTADO DE SAO PAULO";


/// Upper-case, accent-free, whitespace-collapsed form of a place name.
///
/// Upstream tables disagree on spelling ("São Paulo", "SAO PAULO",
/// "Sao  Paulo"), so every locality key goes through this.
pub fn normalize_name(s: &str) -> SmartString {
	let folded = unidecode(s).to_uppercase();
	let mut result = SmartString::new();
	for word in folded.split_whitespace() {
		if result.len() > 0 {
			result.push(' ');
		}
		result.push_str(word);
	}
	result
}

/// Title-case a municipality name the way the published tables spell it,
/// keeping Portuguese particles in lower case.
pub fn format_municipality(s: &str) -> String {
	let mut words = Vec::new();
	for (i, word) in s.split_whitespace().enumerate() {
		let lower = word.to_lowercase();
		if i > 0 && matches!(lower.as_str(), "da" | "de" | "do" | "das" | "dos") {
			words.push(lower);
			continue
		}
		let mut chars = lower.chars();
		let titled = match chars.next() {
			Some(first) => first.to_uppercase().chain(chars).collect(),
			None => String::new(),
		};
		words.push(titled);
	}
	words.join(" ")
}


#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Locality {
	State,
	Municipality(SmartString),
}

impl Locality {
	pub fn from_name(name: &str) -> Self {
		let name = normalize_name(name);
		if name == STATE_NAME {
			Self::State
		} else {
			Self::Municipality(name)
		}
	}

	/// File-name friendly identifier.
	pub fn slug(&self) -> String {
		match self {
			Self::State => "estado".into(),
			Self::Municipality(name) => name.to_lowercase().replace(' ', "_"),
		}
	}
}

impl fmt::Display for Locality {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::State => f.write_str(STATE_NAME),
			Self::Municipality(name) => f.write_str(name),
		}
	}
}


/// A numeric cell which may be unavailable.
///
/// Upstream files use empty cells, `NaN`, `None` and the occasional
/// `indisponível` for "no value", and pt-BR decimals (`1.234,5`). All of
/// them end up here as `None` or a parsed number; nothing is coerced to zero.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Maybe<T>(pub Option<T>);

impl<T> Deref for Maybe<T> {
	type Target = Option<T>;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<T> DerefMut for Maybe<T> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.0
	}
}

impl<T> From<Maybe<T>> for Option<T> {
	fn from(other: Maybe<T>) -> Self {
		other.0
	}
}

impl<T> From<Option<T>> for Maybe<T> {
	fn from(other: Option<T>) -> Self {
		Self(other)
	}
}

#[derive(Debug, Clone)]
pub enum ParseMaybeError {
	InvalidNumber(ParseFloatError),
	OutOfRange,
}

impl fmt::Display for ParseMaybeError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::InvalidNumber(e) => fmt::Display::fmt(e, f),
			Self::OutOfRange => f.write_str("number out of range for column type"),
		}
	}
}

impl From<ParseFloatError> for ParseMaybeError {
	fn from(other: ParseFloatError) -> Self {
		Self::InvalidNumber(other)
	}
}

pub fn parse_number(s: &str) -> Result<Option<f64>, ParseFloatError> {
	let s = s.trim().trim_end_matches('%').trim_end();
	if s.is_empty()
			|| s.eq_ignore_ascii_case("nan")
			|| s.eq_ignore_ascii_case("none")
			|| s.eq_ignore_ascii_case("null")
			|| s == "indisponível" {
		return Ok(None)
	}
	let v = if s.contains(',') {
		// pt-BR: dot groups thousands, comma separates decimals
		s.replace('.', "").replace(',', ".").parse::<f64>()?
	} else {
		s.parse::<f64>()?
	};
	if !v.is_finite() {
		return Ok(None)
	}
	Ok(Some(v))
}

impl<T: NumCast> FromStr for Maybe<T> {
	type Err = ParseMaybeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match parse_number(s)? {
			// integer columns written by float-typed writers come as "123.0"
			Some(v) => match <T as NumCast>::from(v) {
				Some(v) => Ok(Self(Some(v))),
				None => Err(ParseMaybeError::OutOfRange),
			},
			None => Ok(Self(None)),
		}
	}
}

impl<'de, T: NumCast> Deserialize<'de> for Maybe<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where D: Deserializer<'de>
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

impl<T: fmt::Display> Serialize for Maybe<T> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
		where S: Serializer
	{
		match &self.0 {
			Some(v) => serializer.collect_str(v),
			None => serializer.serialize_str(""),
		}
	}
}


pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
	let s = s.trim();
	// a cell whose tenth byte falls inside a character is never a date; the
	// whole cell is parsed then so that chrono reports the error
	let head = s.get(..10).unwrap_or(s);
	if s.len() >= 10 && s.as_bytes()[2] == b'/' {
		NaiveDate::parse_from_str(head, "%d/%m/%Y")
	} else if s.len() > 10 {
		// date with a time part, either "T" or " " separated
		NaiveDate::parse_from_str(head, "%Y-%m-%d")
	} else {
		NaiveDate::parse_from_str(s, "%Y-%m-%d")
	}
}

/// Accepts `2021-03-01`, `2021-03-01 00:00:00` and `01/03/2021`.
pub fn flexible_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
	where D: Deserializer<'de>
{
	let s = String::deserialize(deserializer)?;
	parse_date(&s).map_err(de::Error::custom)
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Enum)]
pub enum DoseTier {
	First,
	Second,
	Third,
	Fourth,
	Fifth,
	Sixth,
	Single,
}

impl DoseTier {
	pub const ALL: [DoseTier; 7] = [
		Self::First,
		Self::Second,
		Self::Third,
		Self::Fourth,
		Self::Fifth,
		Self::Sixth,
		Self::Single,
	];

	pub fn column(&self) -> &'static str {
		match self {
			Self::First => "1a_dose",
			Self::Second => "2a_dose",
			Self::Third => "3a_dose",
			Self::Fourth => "4a_dose",
			Self::Fifth => "5a_dose",
			Self::Sixth => "6a_dose",
			Self::Single => "dose_unica",
		}
	}

	/// Map a label of the doses-applied feed onto a tier.
	///
	/// The feed renamed "additional" doses to plain ordinals over time and is
	/// frequently served with a broken encoding, hence the variants.
	pub fn from_feed_label(label: &str) -> Option<Self> {
		let label = label
			.to_uppercase()
			.replace("쨘", "º")
			.replace("횣", "U")
			.replace('Ú', "U")
			.replace('°', "º");
		let label: Vec<&str> = label.split_whitespace().collect();
		match &label[..] {
			["1º", "DOSE"] => Some(Self::First),
			["2º", "DOSE"] => Some(Self::Second),
			["3º", "DOSE"] | ["1º", "DOSE", "ADICIONAL"] => Some(Self::Third),
			["4º", "DOSE"] | ["2º", "DOSE", "ADICIONAL"] => Some(Self::Fourth),
			["5º", "DOSE"] | ["3º", "DOSE", "ADICIONAL"] => Some(Self::Fifth),
			["6º", "DOSE"] | ["4º", "DOSE", "ADICIONAL"] => Some(Self::Sixth),
			["UNICA"] | ["DOSE", "UNICA"] => Some(Self::Single),
			_ => None,
		}
	}

	/// Value assumed for the tier when no earlier record exists.
	///
	/// Single-dose vaccines were introduced mid-campaign; a locality without
	/// an earlier record has applied none. Every other tier is unknown.
	pub fn missing_prior(&self) -> Option<i64> {
		match self {
			Self::Single => Some(0),
			_ => None,
		}
	}
}

impl fmt::Display for DoseTier {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.column())
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn localities_are_normalised() {
		assert_eq!(Locality::from_name("Estado de São Paulo"), Locality::State);
		assert_eq!(Locality::from_name("ESTADO  DE SAO PAULO"), Locality::State);
		assert_eq!(Locality::from_name("São Paulo"), Locality::Municipality("SAO PAULO".into()));
		assert_eq!(Locality::from_name("SAO PAULO").slug(), "sao_paulo");
		assert_eq!(Locality::State.slug(), "estado");
	}

	#[test]
	fn municipality_names_keep_particles_lowercase() {
		assert_eq!(format_municipality("SAO JOSE DOS CAMPOS"), "Sao Jose dos Campos");
		assert_eq!(format_municipality("santa bárbara do oeste"), "Santa Bárbara do Oeste");
		assert_eq!(format_municipality("DE MIRANDA"), "De Miranda");
	}

	#[test]
	fn maybe_parses_unavailable_markers() {
		assert_eq!(*"".parse::<Maybe<f64>>().unwrap(), None);
		assert_eq!(*"NaN".parse::<Maybe<f64>>().unwrap(), None);
		assert_eq!(*"indisponível".parse::<Maybe<i64>>().unwrap(), None);
		assert_eq!(*"12.5".parse::<Maybe<f64>>().unwrap(), Some(12.5));
		assert_eq!(*"1.234,5".parse::<Maybe<f64>>().unwrap(), Some(1234.5));
		assert_eq!(*"45%".parse::<Maybe<f64>>().unwrap(), Some(45.0));
		assert_eq!(*"123.0".parse::<Maybe<i64>>().unwrap(), Some(123));
		assert!("abc".parse::<Maybe<f64>>().is_err());
	}

	#[test]
	fn dates_in_all_upstream_formats() {
		let d = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
		assert_eq!(parse_date("2021-03-01").unwrap(), d);
		assert_eq!(parse_date("2021-03-01 00:00:00").unwrap(), d);
		assert_eq!(parse_date("01/03/2021").unwrap(), d);
	}

	#[test]
	fn multibyte_cells_are_not_dates() {
		assert!(parse_date("01/03/202ã").is_err());
		assert!(parse_date("2021-03-0ã 00:00").is_err());
		assert!(parse_date("São Paulo, 1º de março").is_err());
	}

	#[test]
	fn dose_labels() {
		assert_eq!(DoseTier::from_feed_label("1º DOSE"), Some(DoseTier::First));
		assert_eq!(DoseTier::from_feed_label("2° dose"), Some(DoseTier::Second));
		assert_eq!(DoseTier::from_feed_label("1º DOSE ADICIONAL"), Some(DoseTier::Third));
		assert_eq!(DoseTier::from_feed_label("3° DOSE"), Some(DoseTier::Third));
		assert_eq!(DoseTier::from_feed_label("4º DOSE ADICIONAL"), Some(DoseTier::Sixth));
		assert_eq!(DoseTier::from_feed_label("ÚNICA"), Some(DoseTier::Single));
		assert_eq!(DoseTier::from_feed_label("1쨘 DOSE"), Some(DoseTier::First));
		assert_eq!(DoseTier::from_feed_label("REFORÇO"), None);
	}

	#[test]
	fn only_single_dose_defaults_to_zero() {
		for tier in DoseTier::ALL.iter() {
			match tier {
				DoseTier::Single => assert_eq!(tier.missing_prior(), Some(0)),
				_ => assert_eq!(tier.missing_prior(), None),
			}
		}
	}
}
