use std::fs;
use std::io;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2;


fn is_gzip(path: &Path) -> bool {
	match path.extension() {
		Some(x) => x == "gz",
		None => false,
	}
}

pub fn magic_open<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Read>> {
	let path = path.as_ref();
	if is_gzip(path) {
		Ok(Box::new(flate2::read::GzDecoder::new(fs::File::open(path)?)))
	} else {
		Ok(Box::new(fs::File::open(path)?))
	}
}


static ZIP_MAGIC: &'static [u8] = b"PK\x03\x04";

fn zip_error(e: zip::result::ZipError) -> io::Error {
	io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Contents of the first file of a zip archive, or `None` when `data` is
/// not a zip archive.
pub fn unpack_archive(data: &[u8]) -> io::Result<Option<Vec<u8>>> {
	if !data.starts_with(ZIP_MAGIC) {
		return Ok(None)
	}
	let mut archive = zip::ZipArchive::new(io::Cursor::new(data)).map_err(zip_error)?;
	if archive.len() == 0 {
		return Err(io::Error::new(io::ErrorKind::InvalidData, "empty zip archive"))
	}
	let mut entry = archive.by_index(0).map_err(zip_error)?;
	let mut result = Vec::new();
	entry.read_to_end(&mut result)?;
	Ok(Some(result))
}


/// Writer which lands at `path` only once `commit` is called.
///
/// Data goes to a sibling temporary file which is renamed over the target,
/// so an interrupted run leaves the previous table intact.
pub struct AtomicFile {
	inner: Option<Box<dyn Write>>,
	tmp_path: PathBuf,
	path: PathBuf,
	gzip: Option<flate2::write::GzEncoder<fs::File>>,
}

impl AtomicFile {
	pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
		let path = path.as_ref().to_path_buf();
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent)?;
			}
		}
		let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
		tmp_name.push(".tmp");
		let tmp_path = path.with_file_name(tmp_name);
		let f = fs::File::create(&tmp_path)?;
		let (inner, gzip): (Option<Box<dyn Write>>, _) = if is_gzip(&path) {
			(None, Some(flate2::write::GzEncoder::new(f, flate2::Compression::default())))
		} else {
			(Some(Box::new(io::BufWriter::new(f))), None)
		};
		Ok(Self{inner, tmp_path, path, gzip})
	}

	pub fn commit(mut self) -> io::Result<()> {
		if let Some(mut w) = self.inner.take() {
			w.flush()?;
		}
		if let Some(gz) = self.gzip.take() {
			gz.finish()?.sync_all()?;
		}
		fs::rename(&self.tmp_path, &self.path)
	}
}

impl Write for AtomicFile {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match (&mut self.inner, &mut self.gzip) {
			(Some(w), _) => w.write(buf),
			(None, Some(gz)) => gz.write(buf),
			(None, None) => Err(io::Error::new(io::ErrorKind::Other, "write after commit")),
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match (&mut self.inner, &mut self.gzip) {
			(Some(w), _) => w.flush(),
			(None, Some(gz)) => gz.flush(),
			(None, None) => Ok(()),
		}
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn gzip_roundtrip_through_magic_open() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("table.csv.gz");
		let mut f = AtomicFile::create(&path).unwrap();
		f.write_all(b"a,b\n1,2\n").unwrap();
		assert!(!path.exists());
		f.commit().unwrap();

		let mut s = String::new();
		magic_open(&path).unwrap().read_to_string(&mut s).unwrap();
		assert_eq!(s, "a,b\n1,2\n");
	}

	#[test]
	fn zip_archives_are_unpacked() {
		let mut w = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
		w.start_file("casos_obitos_raca_cor.csv", zip::write::FileOptions::default()).unwrap();
		w.write_all(b"obito;raca_cor\n0;PARDA\n").unwrap();
		let archive = w.finish().unwrap().into_inner();

		assert_eq!(unpack_archive(&archive).unwrap().unwrap(), b"obito;raca_cor\n0;PARDA\n".to_vec());
		assert!(unpack_archive(b"obito;raca_cor\n").unwrap().is_none());
		assert!(unpack_archive(b"PK\x03\x04truncated").is_err());
	}

	#[test]
	fn uncommitted_file_leaves_target_alone() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("table.csv");
		fs::write(&path, "old").unwrap();
		{
			let mut f = AtomicFile::create(&path).unwrap();
			f.write_all(b"new").unwrap();
		}
		assert_eq!(fs::read_to_string(&path).unwrap(), "old");
	}
}
