use std::io;
use std::io::Write;
use std::time;

use log::{debug, info};


pub trait ProgressSink {
	fn update(&mut self, inow: usize, n: Option<usize>);
	fn finish(&mut self, inow: usize, n: Option<usize>);
}


/// Rewrites a single status line on an interactive terminal.
pub struct ProgressMeter {
	t0: time::Instant,
	tprev: time::Instant,
	iprev: usize,
}

impl ProgressMeter {
	pub fn start() -> Self {
		let now = time::Instant::now();
		Self{
			t0: now,
			tprev: now,
			iprev: 0,
		}
	}
}

impl ProgressSink for ProgressMeter {
	fn update(&mut self, inow: usize, n: Option<usize>) {
		let now = time::Instant::now();
		let dt = (now - self.tprev).as_secs_f64();
		let rate = inow.saturating_sub(self.iprev) as f64 / dt;
		match n {
			Some(n) => {
				let done = (inow as f64) / (n as f64);
				print!("{:6.0}% [{:6.2}/s]\r", done * 100.0, rate);
			},
			None => {
				print!("{:12} [{:6.2}/s]\r", inow, rate);
			},
		}
		let _ = io::stdout().flush();
		self.iprev = inow;
		self.tprev = now;
	}

	fn finish(&mut self, inow: usize, n: Option<usize>) {
		let dt = (time::Instant::now() - self.t0).as_secs_f64();
		let rate = inow as f64 / dt;
		match n {
			Some(_) => println!("{:6.0}% [{:6.2}/s]", 100.0, rate),
			None => println!("{:12} [{:6.2}/s]", inow, rate),
		}
		self.iprev = 0;
		self.t0 = time::Instant::now();
		self.tprev = self.t0;
	}
}


/// Sends progress to the log when nobody watches a terminal.
pub struct LogProgress;

impl ProgressSink for LogProgress {
	fn update(&mut self, inow: usize, n: Option<usize>) {
		match n {
			Some(n) => debug!("progress: {}/{}", inow, n),
			None => debug!("progress: {}", inow),
		}
	}

	fn finish(&mut self, inow: usize, _n: Option<usize>) {
		info!("done: {} items", inow);
	}
}


pub fn default_output() -> Box<dyn ProgressSink> {
	if isatty::stdout_isatty() {
		Box::new(ProgressMeter::start())
	} else {
		Box::new(LogProgress)
	}
}


/// Progress over a known number of steps.
pub struct StepMeter<'s, S: ProgressSink + ?Sized> {
	sink: &'s mut S,
	n: usize,
	inow: usize,
}

impl<'s, S: ProgressSink + ?Sized> StepMeter<'s, S> {
	pub fn new(sink: &'s mut S, n: usize) -> Self {
		Self{sink, n, inow: 0}
	}

	pub fn update(&mut self, inow: usize) {
		self.inow = inow;
		self.sink.update(inow, Some(self.n));
	}

	pub fn finish(self) {
		self.sink.finish(self.inow.max(self.n), Some(self.n));
	}
}


/// Progress over an open-ended stream of rows.
pub struct CountMeter<'s, S: ProgressSink + ?Sized> {
	sink: &'s mut S,
}

impl<'s, S: ProgressSink + ?Sized> CountMeter<'s, S> {
	pub fn new(sink: &'s mut S) -> Self {
		Self{sink}
	}

	pub fn update(&mut self, inow: usize) {
		self.sink.update(inow, None);
	}

	pub fn finish(self, n: usize) {
		self.sink.finish(n, None);
	}
}
