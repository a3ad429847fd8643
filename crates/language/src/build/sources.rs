//! Locating the C/C++ sources of grammar repositories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use super::{BuildError, Result};

/// Scanner file names in lookup order. Only the first match per repository is used.
const SCANNERS: [(&str, SourceKind); 2] = [("scanner.cc", SourceKind::ScannerCpp), ("scanner.c", SourceKind::ScannerC)];

/// Role of a source file within a grammar repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
	/// The generated `parser.c`.
	Parser,
	/// A hand-written external scanner in C.
	ScannerC,
	/// A hand-written external scanner in C++.
	ScannerCpp,
}

impl SourceKind {
	pub fn is_cpp(self) -> bool {
		self == Self::ScannerCpp
	}
}

/// A grammar source file and its modification time.
#[derive(Debug, Clone)]
pub struct SourceFile {
	pub path: PathBuf,
	pub kind: SourceKind,
	pub modified: SystemTime,
}

impl SourceFile {
	/// Directory searched for grammar-local headers when compiling this file.
	pub fn include_dir(&self) -> &Path {
		self.path.parent().unwrap_or(Path::new("."))
	}

	/// Whether the file has a `.c` extension, as opposed to a C++ one.
	pub fn is_c(&self) -> bool {
		self.path.extension().is_some_and(|ext| ext == "c")
	}
}

/// All sources of one build, in repository order.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
	pub files: Vec<SourceFile>,
	/// Set when any repository contributed a C++ scanner.
	pub needs_cxx: bool,
}

/// Collects the parser and scanner sources of every repository in `repos`.
///
/// # Errors
///
/// Returns [`BuildError::NoRepositories`] for an empty slice and
/// [`BuildError::NoParserSource`] when a repository lacks `src/parser.c`.
pub fn collect_sources<P: AsRef<Path>>(repos: &[P]) -> Result<SourceSet> {
	if repos.is_empty() {
		return Err(BuildError::NoRepositories);
	}

	let mut set = SourceSet::default();
	for repo in repos {
		let src_dir = repo.as_ref().join("src");

		let parser = src_dir.join("parser.c");
		let modified = match modified_time(&parser) {
			Ok(time) => time,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(BuildError::NoParserSource(parser)),
			Err(e) => return Err(BuildError::io(parser, e)),
		};
		set.files.push(SourceFile {
			path: parser,
			kind: SourceKind::Parser,
			modified,
		});

		if let Some((path, kind)) = SCANNERS
			.iter()
			.map(|&(file, kind)| (src_dir.join(file), kind))
			.find(|(path, _)| path.is_file())
		{
			let modified = modified_time(&path).map_err(|e| BuildError::io(&path, e))?;
			set.needs_cxx |= kind.is_cpp();
			set.files.push(SourceFile { path, kind, modified });
		}

		debug!(repo = %repo.as_ref().display(), "Collected grammar sources");
	}

	Ok(set)
}

pub(crate) fn modified_time(path: &Path) -> io::Result<SystemTime> {
	fs::metadata(path)?.modified()
}
