use std::collections::HashMap;
use std::time::Duration;

use log::{debug, warn};

use bytes::Bytes;

use chrono::NaiveDate;

use super::config::{Config, Feed};
use super::error::Error;


/// Where raw feed bytes come from.
///
/// `None` means the feed could not be obtained; callers carry on with the
/// last persisted snapshot.
pub trait Source {
	fn fetch(&mut self, feed: Feed, date: NaiveDate) -> Option<Bytes>;
}


pub struct HttpSource {
	client: reqwest::blocking::Client,
	config: Config,
}

impl HttpSource {
	pub fn new(config: Config) -> Result<Self, Error> {
		let client = reqwest::blocking::Client::builder()
			.timeout(Duration::from_secs(120))
			.build()?;
		Ok(Self{client, config})
	}

	fn get(&self, url: &str) -> Result<Bytes, Error> {
		let resp = self.client.get(url).send()?.error_for_status()?;
		Ok(resp.bytes()?)
	}
}

impl Source for HttpSource {
	fn fetch(&mut self, feed: Feed, date: NaiveDate) -> Option<Bytes> {
		let url = match self.config.feed_url(feed, date) {
			Some(url) => url,
			None => {
				debug!("no url configured for {} feed", feed);
				return None
			},
		};
		debug!("fetching {} feed from {}", feed, url);
		match self.get(&url) {
			Ok(data) => {
				debug!("{} feed: {} bytes", feed, data.len());
				Some(data)
			},
			Err(e) => {
				warn!("failed to fetch {} feed for {}: {}", feed, date, e);
				None
			},
		}
	}
}


/// Serves canned feed bodies, regardless of date.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
	feeds: HashMap<Feed, Bytes>,
}

impl MemorySource {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set<B: Into<Bytes>>(&mut self, feed: Feed, data: B) {
		self.feeds.insert(feed, data.into());
	}

	pub fn clear(&mut self, feed: Feed) {
		self.feeds.remove(&feed);
	}
}

impl Source for MemorySource {
	fn fetch(&mut self, feed: Feed, _date: NaiveDate) -> Option<Bytes> {
		self.feeds.get(&feed).cloned()
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn memory_source_serves_what_was_set() {
		let mut source = MemorySource::new();
		let date = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
		source.set(Feed::StateTotals, &b"data;total_casos\n"[..]);
		assert_eq!(source.fetch(Feed::StateTotals, date).unwrap(), Bytes::from_static(b"data;total_casos\n"));
		assert!(source.fetch(Feed::Municipal, date).is_none());
		source.clear(Feed::StateTotals);
		assert!(source.fetch(Feed::StateTotals, date).is_none());
	}

	#[test]
	fn unconfigured_feed_is_unavailable() {
		let mut config = Config::new("dados", "saida");
		config.feeds[Feed::Race] = None;
		let mut source = HttpSource::new(config).unwrap();
		let date = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
		assert!(source.fetch(Feed::Race, date).is_none());
	}
}
