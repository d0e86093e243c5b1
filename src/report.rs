use std::fmt::Display;
use std::io::Write;
use std::path::Path;

use super::error::Error;
use super::ioutil::AtomicFile;
use super::weeks::{WeeklyAggregate, WeeklyMetric};


pub static UNAVAILABLE: &'static str = "indisponível";


/// pt-BR decimal with a fixed number of places, `indisponível` when unset.
pub fn format_number(v: Option<f64>, places: usize) -> String {
	match v {
		Some(v) if v.is_finite() => format!("{:.*}", places, v).replace('.', ","),
		_ => UNAVAILABLE.into(),
	}
}

/// Signed percent change, e.g. `+12,5%`.
pub fn format_variation(v: Option<f64>) -> String {
	match v {
		Some(v) if v.is_finite() => {
			let sign = if v >= 0.0 { "+" } else { "" };
			format!("{}{}%", sign, format_number(Some(v), 1))
		},
		_ => UNAVAILABLE.into(),
	}
}

fn cell<T: Display>(v: Option<T>) -> String {
	match v {
		Some(v) => v.to_string(),
		None => String::new(),
	}
}


pub fn weekly_header() -> Vec<String> {
	let mut result: Vec<String> = vec!["semana".into(), "periodo".into(), "local".into()];
	for metric in WeeklyMetric::ALL.iter() {
		result.push(metric.column().into());
	}
	for metric in WeeklyMetric::ALL.iter() {
		result.push(metric.variation_column().into());
	}
	result
}

pub fn write_weekly(path: &Path, weeks: &[WeeklyAggregate]) -> Result<(), Error> {
	let mut f = AtomicFile::create(path)?;
	{
		let mut w = csv::Writer::from_writer(&mut f);
		w.write_record(weekly_header())?;
		for week in weeks.iter() {
			let mut record = vec![
				week.week.to_string(),
				week.week.label(true),
				week.locality.to_string(),
			];
			for metric in WeeklyMetric::ALL.iter() {
				record.push(cell(week.values[*metric]));
			}
			for metric in WeeklyMetric::ALL.iter() {
				record.push(cell(week.variation[*metric]));
			}
			w.write_record(record)?;
		}
		w.flush()?;
	}
	f.commit()?;
	Ok(())
}


fn title(metric: WeeklyMetric) -> &'static str {
	match metric {
		WeeklyMetric::Isolation => "Isolamento (2 semanas antes)",
		WeeklyMetric::CurrentIsolation => "Isolamento",
		WeeklyMetric::NewCases => "Casos",
		WeeklyMetric::NewDeaths => "Óbitos",
		WeeklyMetric::NewDoses => "Doses aplicadas",
		WeeklyMetric::ImmunizedPct => "Imunizados",
		WeeklyMetric::Hospitalizations => "Internações",
		WeeklyMetric::Occupancy => "Ocupação UTI",
	}
}

fn value(metric: WeeklyMetric, v: Option<f64>) -> String {
	match metric {
		WeeklyMetric::NewCases | WeeklyMetric::NewDeaths | WeeklyMetric::NewDoses | WeeklyMetric::Hospitalizations => format_number(v, 0),
		_ => match v {
			Some(_) => format!("{}%", format_number(v, 1)),
			None => UNAVAILABLE.into(),
		},
	}
}

/// Markdown table of the weekly series, most recent week first.
pub fn render_summary<W: Write>(mut w: W, weeks: &[WeeklyAggregate]) -> Result<(), Error> {
	let locality = match weeks.first() {
		Some(week) => week.locality.to_string(),
		None => return Ok(()),
	};
	writeln!(w, "# Resumo semanal: {}", locality)?;
	writeln!(w)?;
	write!(w, "| Semana |")?;
	for metric in WeeklyMetric::ALL.iter() {
		write!(w, " {} | Variação |", title(*metric))?;
	}
	writeln!(w)?;
	write!(w, "|---|")?;
	for _ in WeeklyMetric::ALL.iter() {
		write!(w, "---:|---:|")?;
	}
	writeln!(w)?;
	for week in weeks.iter().rev() {
		write!(w, "| {} |", week.week.label(true))?;
		for metric in WeeklyMetric::ALL.iter() {
			write!(w, " {} | {} |", value(*metric, week.values[*metric]), format_variation(week.variation[*metric]))?;
		}
		writeln!(w)?;
	}
	Ok(())
}

pub fn write_summary(path: &Path, weeks: &[WeeklyAggregate]) -> Result<(), Error> {
	let mut f = AtomicFile::create(path)?;
	render_summary(&mut f, weeks)?;
	f.commit()?;
	Ok(())
}


#[cfg(test)]
mod tests {
	use super::*;

	use enum_map::EnumMap;

	use crate::context::Locality;
	use crate::variation::apply_variations;
	use crate::weeks::WeekKey;

	#[test]
	fn variations_in_ptbr() {
		assert_eq!(format_variation(Some(12.5)), "+12,5%");
		assert_eq!(format_variation(Some(-3.0)), "-3,0%");
		assert_eq!(format_variation(Some(0.0)), "+0,0%");
		assert_eq!(format_variation(None), "indisponível");
		assert_eq!(format_variation(Some(f64::NAN)), "indisponível");
	}

	fn week(n: u32, cases: f64) -> WeeklyAggregate {
		let mut values = EnumMap::default();
		values[WeeklyMetric::NewCases] = Some(cases);
		WeeklyAggregate{
			week: WeekKey{year: 2021, week: n},
			locality: Locality::State,
			values,
			variation: EnumMap::default(),
		}
	}

	#[test]
	fn summary_lists_latest_week_first() {
		let mut weeks = vec![week(9, 200.0), week(10, 250.0)];
		apply_variations(&mut weeks);
		let mut buf = Vec::new();
		render_summary(&mut buf, &weeks).unwrap();
		let text = String::from_utf8(buf).unwrap();
		let lines: Vec<&str> = text.lines().collect();
		assert_eq!(lines[0], "# Resumo semanal: ESTADO DE SAO PAULO");
		assert!(lines[4].starts_with("| 07/mar/21 a 13/mar/21 |"));
		assert!(lines[4].contains(" 250 | +25,0% |"));
		assert!(lines[5].contains(" 200 | indisponível |"));
		assert!(!text.contains("| 0 |"));
	}

	#[test]
	fn weekly_csv_leaves_unavailable_cells_empty() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("semanal_estado.csv");
		write_weekly(&path, &[week(10, 250.0)]).unwrap();
		let text = std::fs::read_to_string(&path).unwrap();
		let mut lines = text.lines();
		assert_eq!(lines.next().unwrap().split(',').count(), weekly_header().len());
		let row: Vec<&str> = lines.next().unwrap().split(',').collect();
		assert_eq!(row[0], "2021-W10");
		assert_eq!(row[5], "250");
		assert_eq!(row[3], "");
	}
}
