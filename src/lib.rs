use chrono::{Local, NaiveDate};

mod beds;
mod config;
mod context;
mod daily;
mod delta;
mod demographics;
mod error;
mod gaps;
mod ioutil;
mod pipeline;
mod progress;
mod rates;
mod report;
mod seade;
mod source;
mod store;
mod vaccination;
mod variation;
mod weeks;

pub use beds::*;
pub use config::*;
pub use context::*;
pub use daily::*;
pub use delta::*;
pub use demographics::*;
pub use error::*;
pub use gaps::*;
pub use ioutil::{magic_open, unpack_archive, AtomicFile};
pub use pipeline::*;
pub use progress::*;
pub use rates::*;
pub use report::*;
pub use seade::*;
pub use source::*;
pub use store::*;
pub use vaccination::*;
pub use variation::*;
pub use weeks::*;


pub fn naive_today() -> NaiveDate {
	Local::now().date_naive()
}
