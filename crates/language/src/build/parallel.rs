//! Parallel library building.
//!
//! Builds targeting the same output would race, so each worker owns a
//! distinct output path and duplicates are rejected up front.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use super::{BuildError, BuildStatus, LibraryBuild, Result};

/// Callback type for progress reporting: output path and a short status.
pub type ProgressCallback = Box<dyn Fn(&Path, &str) + Send + Sync>;

/// Runs `builds` on up to `jobs` threads (default: available parallelism, at most 8).
///
/// Results arrive in completion order, not input order. A worker that panics
/// drops the rest of its chunk, so callers must not assume one result per build.
///
/// # Errors
///
/// Returns [`BuildError::DuplicateOutput`] without building anything if two
/// builds share an output path. Per-library failures are reported in the
/// returned list.
pub fn build_all_libraries(
	builds: Vec<LibraryBuild>,
	jobs: Option<usize>,
	on_progress: Option<ProgressCallback>,
) -> Result<Vec<(LibraryBuild, Result<BuildStatus>)>> {
	let mut outputs = HashSet::new();
	for build in &builds {
		if !outputs.insert(output_key(build.output())) {
			return Err(BuildError::DuplicateOutput(build.output().to_path_buf()));
		}
	}

	let (tx, rx) = mpsc::channel();
	let num_jobs = jobs
		.unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(4).min(8))
		.max(1);

	let chunk_size = builds.len().div_ceil(num_jobs).max(1);
	let chunks: Vec<Vec<LibraryBuild>> = builds.chunks(chunk_size).map(|c| c.to_vec()).collect();

	for chunk in chunks {
		let tx = tx.clone();

		thread::spawn(move || {
			for build in chunk {
				let result = build.run();
				let _ = tx.send((build, result));
			}
		});
	}

	drop(tx);

	let mut results = Vec::new();
	for (build, result) in rx {
		if let Some(ref cb) = on_progress {
			let status = match &result {
				Ok(BuildStatus::AlreadyBuilt) => "up to date",
				Ok(BuildStatus::Built) => "built",
				Err(_) => "error",
			};
			cb(build.output(), status);
		}
		results.push((build, result));
	}

	Ok(results)
}

/// Identity of an output file, so different spellings of one path collide.
///
/// `.` and `..` are resolved lexically, then the parent directory is
/// canonicalised when it exists to see through symlinks.
fn output_key(output: &Path) -> PathBuf {
	let absolute = std::path::absolute(output).unwrap_or_else(|_| output.to_path_buf());

	let mut lexical = PathBuf::new();
	for component in absolute.components() {
		match component {
			Component::CurDir => {}
			Component::ParentDir => {
				lexical.pop();
			}
			other => lexical.push(other),
		}
	}

	let resolved = lexical
		.parent()
		.zip(lexical.file_name())
		.and_then(|(parent, name)| parent.canonicalize().ok().map(|dir| dir.join(name)));
	resolved.unwrap_or(lexical)
}
