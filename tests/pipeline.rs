use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use chrono::NaiveDate;

use covidsp::{
	run_day, Config, Dataset, DoseTier, Feed, LocalityReport, Locality, LogProgress, MemorySource,
};


static STATE_TOTALS: &'static str = "\
data;casos;obitos
2021-03-01;1000;50
2021-03-02;1050;52
2021-03-03;1050;52
";

static MUNICIPAL: &'static str = "\
nome_munic;codigo_ibge;datahora;casos;casos_novos;obitos;obitos_novos;letalidade;pop
São Paulo;3550308;2021-03-01;400;400;20;20;0,05;12325232
Santos;3548500;2021-03-01;100;100;5;5;0,05;433656
São Paulo;3550308;2021-03-02;420;20;21;1;0,05;12325232
Santos;3548500;2021-03-02;101;1;5;0;0,0495;433656
São Paulo;3550308;2021-03-03;425;5;21;0;0,0494;12325232
";

fn day(d: u32) -> NaiveDate {
	NaiveDate::from_ymd_opt(2021, 3, d).unwrap()
}

fn config(dir: &Path) -> Config {
	let mut config = Config::new(dir.join("dados"), dir.join("saida"));
	config.isolation_start = day(3);
	config
}

fn source() -> MemorySource {
	let mut source = MemorySource::new();
	source.set(Feed::StateTotals, STATE_TOTALS.as_bytes().to_vec());
	source.set(Feed::Municipal, MUNICIPAL.as_bytes().to_vec());
	source
}

fn report<'x>(reports: &'x [LocalityReport], locality: &Locality) -> &'x LocalityReport {
	reports.iter().find(|r| &r.locality == locality).unwrap()
}

#[test]
fn flat_day_yields_zero_delta_and_stable_lethality() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(dir.path());
	let reports = run_day(&config, day(3), &mut source(), &mut LogProgress).unwrap();

	let state = report(&reports, &Locality::State);
	let new_cases: Vec<Option<i64>> = state.daily.iter().map(|r| r.new_cases).collect();
	assert_eq!(new_cases, vec![Some(1000), Some(50), Some(0)]);
	let lethality: Vec<Option<f64>> = state.daily.iter().map(|r| r.lethality_pct).collect();
	assert_eq!(lethality, vec![Some(5.0), Some(4.95), Some(4.95)]);

	let city = report(&reports, &Locality::from_name("SAO PAULO"));
	let new_cases: Vec<Option<i64>> = city.daily.iter().map(|r| r.new_cases).collect();
	assert_eq!(new_cases, vec![Some(400), Some(20), Some(5)]);

	// 2021-03-01..03 all fall in one Sunday-based week
	assert_eq!(state.weekly.len(), 1);
	assert_eq!(state.weekly[0].sum_new_cases(), Some(1050.0));
	assert_eq!(state.weekly[0].mean_isolation(), None);

	for name in ["diario_estado.csv", "semanal_estado.csv", "resumo_semanal_estado.md", "diario_sao_paulo.csv"].iter() {
		assert!(config.output_path(name).exists(), "{} missing", name);
	}
	let summary = fs::read_to_string(config.output_path("resumo_semanal_estado.md")).unwrap();
	assert!(summary.contains("indisponível"));
}

#[test]
fn rerunning_a_day_is_idempotent() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(dir.path());
	let path = config.table_path(Dataset::StateTotals);

	run_day(&config, day(3), &mut source(), &mut LogProgress).unwrap();
	let first = fs::read_to_string(&path).unwrap();
	let reports = run_day(&config, day(3), &mut source(), &mut LogProgress).unwrap();
	let second = fs::read_to_string(&path).unwrap();

	assert_eq!(first, second);
	assert_eq!(first.lines().count(), 4);
	assert_eq!(report(&reports, &Locality::State).daily.len(), 3);
}

#[test]
fn late_day_from_feed_keeps_date_order() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(dir.path());
	let mut source = MemorySource::new();
	source.set(Feed::StateTotals, "\
data;casos;obitos
2021-03-01;1000;50
2021-03-03;1100;54
".as_bytes().to_vec());
	run_day(&config, day(3), &mut source, &mut LogProgress).unwrap();

	source.set(Feed::StateTotals, "\
data;casos;obitos
2021-03-01;1000;50
2021-03-02;1050;52
2021-03-03;1100;54
".as_bytes().to_vec());
	let reports = run_day(&config, day(3), &mut source, &mut LogProgress).unwrap();

	let state = report(&reports, &Locality::State);
	let new_cases: Vec<(NaiveDate, Option<i64>)> = state.daily.iter().map(|r| (r.date(), r.new_cases)).collect();
	assert_eq!(new_cases, vec![(day(1), Some(1000)), (day(2), Some(50)), (day(3), Some(50))]);
	let new_deaths: Vec<Option<i64>> = state.daily.iter().map(|r| r.new_deaths).collect();
	assert_eq!(new_deaths, vec![Some(50), Some(2), Some(2)]);

	let table = fs::read_to_string(config.table_path(Dataset::StateTotals)).unwrap();
	let dates: Vec<&str> = table.lines().skip(1).map(|l| &l[..10]).collect();
	assert_eq!(dates, vec!["2021-03-01", "2021-03-02", "2021-03-03"]);
}

#[test]
fn missing_feeds_fall_back_to_the_snapshot() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(dir.path());
	run_day(&config, day(3), &mut source(), &mut LogProgress).unwrap();

	let reports = run_day(&config, day(3), &mut MemorySource::new(), &mut LogProgress).unwrap();
	let state = report(&reports, &Locality::State);
	let new_cases: Vec<Option<i64>> = state.daily.iter().map(|r| r.new_cases).collect();
	assert_eq!(new_cases, vec![Some(1000), Some(50), Some(0)]);
}

#[test]
fn isolation_gap_is_backfilled_from_corrections() {
	let dir = tempfile::tempdir().unwrap();
	let config = config(dir.path());
	let mut source = source();
	source.set(Feed::IsolationCorrections, "\
codigo_ibge;data;municipio;populacao;uf;isolamento
35;Tuesday, 02/03;ESTADO DE SÃO PAULO;46289333;SP;41,5
3550308;Tuesday, 02/03;SÃO PAULO;12325232;SP;44
".as_bytes().to_vec());

	let reports = run_day(&config, day(3), &mut source, &mut LogProgress).unwrap();
	let state = report(&reports, &Locality::State);
	let yesterday = state.daily.iter().find(|r| r.date() == day(2)).unwrap();
	assert_eq!(yesterday.daily.isolation_index, Some(41.5));
	assert!(config.table_path(Dataset::Isolation).exists());

	// the day is now stored and not looked up again
	source.clear(Feed::IsolationCorrections);
	let reports = run_day(&config, day(3), &mut source, &mut LogProgress).unwrap();
	let city = report(&reports, &Locality::from_name("São Paulo"));
	let yesterday = city.daily.iter().find(|r| r.date() == day(2)).unwrap();
	assert_eq!(yesterday.daily.isolation_index, Some(44.0));
}

#[test]
fn malformed_dose_feed_skips_only_vaccination() {
	let dir = tempfile::tempdir().unwrap();
	let mut config = config(dir.path());
	config.vaccination = true;
	let mut source = source();
	source.set(Feed::DosesApplied, "<html>erro</html>\nfora do ar\n".as_bytes().to_vec());

	let reports = run_day(&config, day(3), &mut source, &mut LogProgress).unwrap();
	assert!(!config.table_path(Dataset::Vaccination).exists());
	assert_eq!(report(&reports, &Locality::State).daily.len(), 3);
}

#[test]
fn dose_feed_updates_state_and_city() {
	let dir = tempfile::tempdir().unwrap();
	let mut config = config(dir.path());
	config.vaccination = true;
	let mut source = source();
	source.set(Feed::DosesApplied, "\
municipio;dose;contagem
SAO PAULO;1º DOSE;100
SANTOS;1º DOSE;50
SANTOS;2º DOSE;10
".as_bytes().to_vec());

	let reports = run_day(&config, day(3), &mut source, &mut LogProgress).unwrap();
	assert!(config.table_path(Dataset::Vaccination).exists());

	let state = report(&reports, &Locality::State);
	let today = state.daily.iter().find(|r| r.date() == day(3)).unwrap();
	assert_eq!(today.daily.cumulative_doses[DoseTier::First], Some(150));
	assert_eq!(today.daily.cumulative_doses[DoseTier::Second], Some(10));
	assert_eq!(today.daily.cumulative_doses[DoseTier::Single], Some(0));
	assert_eq!(today.new_doses_total, Some(160));

	let city = report(&reports, &Locality::from_name("SAO PAULO"));
	let today = city.daily.iter().find(|r| r.date() == day(3)).unwrap();
	assert_eq!(today.daily.cumulative_doses[DoseTier::First], Some(100));
	assert_eq!(today.daily.cumulative_doses[DoseTier::Second], None);
}

#[test]
fn zipped_race_feed_is_counted() {
	let dir = tempfile::tempdir().unwrap();
	let mut config = config(dir.path());
	config.preexisting_conditions = true;

	let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
	w.start_file("casos_obitos_raca_cor.csv", zip::write::FileOptions::default()).unwrap();
	w.write_all("obito;raca_cor;idade\n0;PARDA;30\n1;NONE;80\n0;parda;41\n".as_bytes()).unwrap();
	let archive = w.finish().unwrap().into_inner();

	let mut source = source();
	source.set(Feed::Race, archive);
	run_day(&config, day(3), &mut source, &mut LogProgress).unwrap();

	let counts = fs::read_to_string(config.output_path("raca_cor.csv")).unwrap();
	assert_eq!(counts, "obito,raca_cor,contagem\n0,Parda,2\n1,Ignorado,1\n");
	assert!(!config.output_path("doencas_preexistentes.csv").exists());
}
