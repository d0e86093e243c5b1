use std::fmt;
use std::io;

use super::config::Feed;


#[derive(Debug)]
pub enum Error {
	Io(io::Error),
	Csv(csv::Error),
	Request(reqwest::Error),
	/// A feed arrived but its layout does not match any known shape.
	Schema{feed: Feed, reason: String},
	Config(String),
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Io(e) => fmt::Display::fmt(e, f),
			Self::Csv(e) => fmt::Display::fmt(e, f),
			Self::Request(e) => fmt::Display::fmt(e, f),
			Self::Schema{feed, reason} => write!(f, "malformed {} feed: {}", feed, reason),
			Self::Config(msg) => write!(f, "invalid configuration: {}", msg),
		}
	}
}

impl From<io::Error> for Error {
	fn from(err: io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<csv::Error> for Error {
	fn from(err: csv::Error) -> Self {
		Self::Csv(err)
	}
}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		Self::Request(err)
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			Self::Csv(e) => Some(e),
			Self::Request(e) => Some(e),
			_ => None,
		}
	}
}
