use chrono::Duration;

use log::info;

use covidsp::{default_output, naive_today, run_day, Config, HttpSource, LogProgress, StepMeter};


fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let argv: Vec<String> = std::env::args().collect();
	let days = match argv.get(1) {
		Some(v) => v.parse::<i64>()?,
		None => 0,
	};
	if days < 0 {
		return Err(format!("number of days must not be negative, got {}", days).into())
	}

	let config = Config::from_env()?;
	let mut source = HttpSource::new(config.clone())?;
	let today = naive_today();

	let mut output = default_output();
	let mut loads = LogProgress;
	let mut pm = StepMeter::new(&mut *output, (days + 1) as usize);
	for (i, back) in (0..=days).rev().enumerate() {
		let date = today - Duration::days(back);
		let reports = run_day(&config, date, &mut source, &mut loads)?;
		for report in reports.iter() {
			info!("{}: wrote {} daily and {} weekly rows for {}", date, report.daily.len(), report.weekly.len(), report.locality);
		}
		pm.update(i+1);
	}
	pm.finish();
	Ok(())
}
