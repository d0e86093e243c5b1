use std::env;
use std::fmt;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};

use enum_map::{Enum, EnumMap};

use super::context::{parse_date, Locality};
use super::error::Error;


static SEADE_BASE: &'static str = "https://raw.githubusercontent.com/seade-R/dados-covid-sp/master/data";
static GOV_UPLOADS: &'static str = "https://www.saopaulo.sp.gov.br/wp-content/uploads/{ano}/{mes}";


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum Feed {
	StateTotals,
	Municipal,
	Hospitalizations,
	DosesApplied,
	DosesReceived,
	IsolationCorrections,
	Immunizers,
	Conditions,
	Race,
}

impl Feed {
	pub const ALL: [Feed; 9] = [
		Self::StateTotals,
		Self::Municipal,
		Self::Hospitalizations,
		Self::DosesApplied,
		Self::DosesReceived,
		Self::IsolationCorrections,
		Self::Immunizers,
		Self::Conditions,
		Self::Race,
	];

	pub fn name(&self) -> &'static str {
		match self {
			Self::StateTotals => "estado",
			Self::Municipal => "municipios",
			Self::Hospitalizations => "internacoes",
			Self::DosesApplied => "doses_aplicadas",
			Self::DosesReceived => "doses_recebidas",
			Self::IsolationCorrections => "isolamento_correcao",
			Self::Immunizers => "imunizantes",
			Self::Conditions => "doencas_preexistentes",
			Self::Race => "raca_cor",
		}
	}

	fn env_name(&self) -> String {
		format!("COVIDSP_FEED_{}", self.name().to_uppercase())
	}

	fn default_url(&self) -> Option<String> {
		match self {
			Self::StateTotals => Some(format!("{}/sp.csv", SEADE_BASE)),
			Self::Municipal => Some(format!("{}/dados_covid_sp.csv", SEADE_BASE)),
			Self::Hospitalizations => Some(format!("{}/plano_sp_leitos_internacoes.csv", SEADE_BASE)),
			Self::DosesApplied => Some(format!("{}/{{data}}_vacinometro.csv", GOV_UPLOADS)),
			Self::DosesReceived => Some(format!("{}/{{data}}_painel_distribuicao_doses.csv", GOV_UPLOADS)),
			Self::Conditions => Some("http://www.seade.gov.br/wp-content/uploads/{ano}/{mes}/casos_obitos_doencas_preexistentes.csv".into()),
			Self::Race => Some(format!("{}/casos_obitos_raca_cor.csv.zip", SEADE_BASE)),
			// the upstream dashboards for these no longer export CSV
			Self::IsolationCorrections | Self::Immunizers => None,
		}
	}
}

impl fmt::Display for Feed {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.name())
	}
}


/// Durable tables kept in the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum Dataset {
	StateTotals,
	Municipal,
	Isolation,
	Hospitalizations,
	StateBeds,
	Vaccination,
	Immunizers,
}

impl Dataset {
	pub fn file_name(&self) -> &'static str {
		match self {
			Self::StateTotals => "dados_estado_sp.csv",
			Self::Municipal => "dados_munic.csv.gz",
			Self::Isolation => "isolamento_social.csv",
			Self::Hospitalizations => "internacoes.csv",
			Self::StateBeds => "leitos_estaduais.csv",
			Self::Vaccination => "dados_vacinacao.csv.gz",
			Self::Immunizers => "dados_imunizantes.csv",
		}
	}
}


#[derive(Debug, Clone)]
pub struct Config {
	pub data_dir: PathBuf,
	pub output_dir: PathBuf,
	/// The municipality reported alongside the state.
	pub city: Locality,
	/// First day searched for holes in the isolation series.
	pub isolation_start: NaiveDate,
	pub vaccination: bool,
	pub preexisting_conditions: bool,
	pub feeds: EnumMap<Feed, Option<String>>,
}

fn parse_flag(name: &str, value: &str) -> Result<bool, Error> {
	match value.trim().to_lowercase().as_str() {
		"1" | "true" | "yes" | "sim" => Ok(true),
		"" | "0" | "false" | "no" | "nao" => Ok(false),
		other => Err(Error::Config(format!("{} must be a boolean, got {:?}", name, other))),
	}
}

impl Config {
	pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(data_dir: P, output_dir: Q) -> Self {
		Self{
			data_dir: data_dir.into(),
			output_dir: output_dir.into(),
			city: Locality::from_name("SAO PAULO"),
			isolation_start: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or(NaiveDate::MIN),
			vaccination: false,
			preexisting_conditions: false,
			feeds: EnumMap::from_fn(|feed: Feed| feed.default_url()),
		}
	}

	pub fn from_env() -> Result<Self, Error> {
		let mut config = Self::new(
			env::var("COVIDSP_DATA_DIR").unwrap_or("dados".into()),
			env::var("COVIDSP_OUTPUT_DIR").unwrap_or("saida".into()),
		);
		if let Ok(city) = env::var("COVIDSP_CITY") {
			config.city = match Locality::from_name(&city) {
				Locality::State => return Err(Error::Config("COVIDSP_CITY must name a municipality".into())),
				city => city,
			};
		}
		if let Ok(start) = env::var("COVIDSP_ISOLATION_START") {
			config.isolation_start = parse_date(&start).map_err(|e| {
				Error::Config(format!("COVIDSP_ISOLATION_START: {}", e))
			})?;
		}
		if let Ok(v) = env::var("COVIDSP_VACCINATION") {
			config.vaccination = parse_flag("COVIDSP_VACCINATION", &v)?;
		}
		if let Ok(v) = env::var("COVIDSP_PREEXISTING_CONDITIONS") {
			config.preexisting_conditions = parse_flag("COVIDSP_PREEXISTING_CONDITIONS", &v)?;
		}
		for feed in Feed::ALL.iter() {
			match env::var(feed.env_name()) {
				Ok(url) if url.trim().is_empty() => config.feeds[*feed] = None,
				Ok(url) => config.feeds[*feed] = Some(url),
				Err(env::VarError::NotPresent) => (),
				Err(e) => return Err(Error::Config(format!("{}: {}", feed.env_name(), e))),
			}
		}
		Ok(config)
	}

	pub fn table_path(&self, dataset: Dataset) -> PathBuf {
		self.data_dir.join(dataset.file_name())
	}

	pub fn output_path(&self, name: &str) -> PathBuf {
		self.output_dir.join(name)
	}

	/// The feed URL for a processing date, with `{ano}`, `{mes}` and `{data}`
	/// expanded.
	pub fn feed_url(&self, feed: Feed, date: NaiveDate) -> Option<String> {
		let template = self.feeds[feed].as_ref()?;
		Some(template
			.replace("{ano}", &format!("{:04}", date.year()))
			.replace("{mes}", &format!("{:02}", date.month()))
			.replace("{data}", &date.format("%Y%m%d").to_string()))
	}

	/// Localities for which derived series are produced.
	pub fn localities(&self) -> Vec<Locality> {
		vec![Locality::State, self.city.clone()]
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn feed_urls_expand_dates() {
		let config = Config::new("dados", "saida");
		let date = NaiveDate::from_ymd_opt(2021, 3, 7).unwrap();
		assert_eq!(
			config.feed_url(Feed::DosesApplied, date).unwrap(),
			"https://www.saopaulo.sp.gov.br/wp-content/uploads/2021/03/20210307_vacinometro.csv",
		);
		assert!(config.feed_url(Feed::Immunizers, date).is_none());
		assert_eq!(
			config.feed_url(Feed::Race, date).unwrap(),
			"https://raw.githubusercontent.com/seade-R/dados-covid-sp/master/data/casos_obitos_raca_cor.csv.zip",
		);
	}

	#[test]
	fn flags() {
		assert!(parse_flag("X", "sim").unwrap());
		assert!(!parse_flag("X", "0").unwrap());
		assert!(parse_flag("X", "maybe").is_err());
	}

	#[test]
	fn optional_stages_are_off_by_default() {
		let config = Config::new("dados", "saida");
		assert!(!config.vaccination);
		assert!(!config.preexisting_conditions);
		assert_eq!(config.localities(), vec![Locality::State, Locality::Municipality("SAO PAULO".into())]);
	}
}
