//! Grammar library building.
//!
//! Turns one or more tree-sitter grammar repositories into a single shared
//! library. Every repository contributes `src/parser.c` and, when present, one
//! external scanner (`src/scanner.cc` or `src/scanner.c`). The library is only
//! rebuilt when a source file (or the running executable) is newer than the
//! existing artifact.

mod compile;
mod parallel;
mod sources;
mod staleness;
mod toolchain;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use parallel::{ProgressCallback, build_all_libraries};
pub use sources::{SourceFile, SourceKind, SourceSet, collect_sources};
pub use staleness::needs_rebuild;
use thiserror::Error;
pub use toolchain::{CxxRuntime, Toolchain};
use tracing::{debug, info, warn};

use crate::grammar::library_extension;

/// Errors that can occur while building a grammar library.
#[derive(Debug, Error)]
pub enum BuildError {
	#[error("at least one grammar repository is required")]
	NoRepositories,
	#[error("no parser.c found at {0}")]
	NoParserSource(PathBuf),
	#[error("I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("no {0} compiler found; install one or set the matching environment variable")]
	NoCompiler(&'static str),
	#[error("compilation failed: {0}")]
	Compiler(#[from] cc::Error),
	#[error("linking {output} failed ({status}): {stderr}")]
	Link {
		output: PathBuf,
		status: std::process::ExitStatus,
		stderr: String,
	},
	#[error("more than one build targets {0}")]
	DuplicateOutput(PathBuf),
}

impl BuildError {
	pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		Self::Io { path: path.into(), source }
	}
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Status of a build operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
	/// The library was already newer than every source.
	AlreadyBuilt,
	/// The library was (re)compiled.
	Built,
}

impl BuildStatus {
	pub fn rebuilt(self) -> bool {
		self == Self::Built
	}
}

/// A single shared library assembled from one or more grammar repositories.
#[derive(Debug, Clone)]
pub struct LibraryBuild {
	output: PathBuf,
	repos: Vec<PathBuf>,
	toolchain: Option<Toolchain>,
	logic_witness: Option<PathBuf>,
}

impl LibraryBuild {
	/// Starts a build targeting `output`.
	///
	/// The running executable is used as the logic witness, so a rebuilt host
	/// binary also invalidates previously compiled libraries.
	pub fn new(output: impl Into<PathBuf>) -> Self {
		Self {
			output: output.into(),
			repos: Vec::new(),
			toolchain: None,
			logic_witness: std::env::current_exe().ok(),
		}
	}

	pub fn repo(mut self, path: impl Into<PathBuf>) -> Self {
		self.repos.push(path.into());
		self
	}

	pub fn repos<I, P>(mut self, paths: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<PathBuf>,
	{
		self.repos.extend(paths.into_iter().map(Into::into));
		self
	}

	/// Uses `toolchain` instead of resolving one from the environment at run time.
	pub fn toolchain(mut self, toolchain: Toolchain) -> Self {
		self.toolchain = Some(toolchain);
		self
	}

	/// Overrides the file whose mtime counts as a source, or disables it with `None`.
	pub fn logic_witness(mut self, path: Option<PathBuf>) -> Self {
		self.logic_witness = path;
		self
	}

	pub fn output(&self) -> &Path {
		&self.output
	}

	pub fn repo_paths(&self) -> &[PathBuf] {
		&self.repos
	}

	/// Compiles every source into the output library if any of them is stale.
	///
	/// A rebuild recompiles every source of every repository. The library is
	/// linked to a temporary file next to `output` and renamed into place, so a
	/// failed build leaves any previous artifact untouched.
	///
	/// # Errors
	///
	/// * [`BuildError::NoRepositories`] when no repository was added.
	/// * [`BuildError::NoParserSource`] or [`BuildError::Io`] for filesystem failures.
	/// * [`BuildError::NoCompiler`], [`BuildError::Compiler`] or [`BuildError::Link`]
	///   when the toolchain fails.
	pub fn run(&self) -> Result<BuildStatus> {
		let sources = collect_sources(&self.repos)?;

		if !needs_rebuild(&self.output, &sources.files, self.logic_witness.as_deref())? {
			debug!(output = %self.output.display(), "Grammar library is up to date");
			return Ok(BuildStatus::AlreadyBuilt);
		}

		info!(
			output = %self.output.display(),
			sources = sources.files.len(),
			cxx = sources.needs_cxx,
			"Compiling grammar library"
		);

		let toolchain = self.toolchain.clone().unwrap_or_else(Toolchain::from_env);
		let libraries: Vec<String> = if sources.needs_cxx {
			let runtime = toolchain.select_cxx_runtime(|name| toolchain.find_library(name));
			if runtime.is_none() {
				warn!(output = %self.output.display(), "No C++ runtime library found; linking without one");
			}
			runtime.into_iter().collect()
		} else {
			Vec::new()
		};

		let parent = match self.output.parent() {
			Some(dir) if !dir.as_os_str().is_empty() => dir,
			_ => Path::new("."),
		};
		fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;

		let obj_dir = tempfile::Builder::new()
			.prefix("sitterforge-")
			.suffix("-objects")
			.tempdir()
			.map_err(|e| BuildError::io(std::env::temp_dir(), e))?;
		let objects = compile::compile_objects(&toolchain, &sources, obj_dir.path())?;

		let staged = tempfile::Builder::new()
			.prefix(".sitterforge-")
			.suffix(&format!(".{}", library_extension()))
			.tempfile_in(parent)
			.map_err(|e| BuildError::io(parent, e))?
			.into_temp_path();
		compile::link_shared_library(&toolchain, &objects, &libraries, &staged)?;
		staged.persist(&self.output).map_err(|e| BuildError::io(&self.output, e.error))?;

		info!(output = %self.output.display(), objects = objects.len(), "Grammar library built");
		Ok(BuildStatus::Built)
	}
}

/// Builds a shared library at `output` from the grammar repositories in `repos`.
///
/// Returns `true` if the library was compiled and `false` if it already
/// existed and was newer than every source file.
pub fn build_library<P: AsRef<Path>>(output: impl Into<PathBuf>, repos: &[P]) -> Result<bool> {
	LibraryBuild::new(output)
		.repos(repos.iter().map(|p| p.as_ref().to_path_buf()))
		.run()
		.map(BuildStatus::rebuilt)
}
