//! Modification-time based rebuild detection.

use std::io;
use std::path::Path;

use tracing::debug;

use super::sources::{SourceFile, modified_time};
use super::{BuildError, Result};

/// Returns true if `output` must be (re)built from `sources`.
///
/// A missing output is always stale. Otherwise the output is stale when the
/// newest of `sources` and `logic_witness` is strictly newer than it. A
/// witness that no longer exists (a host binary replaced in place shows up as
/// `<path> (deleted)` on Linux) also makes the output stale.
pub fn needs_rebuild(output: &Path, sources: &[SourceFile], logic_witness: Option<&Path>) -> Result<bool> {
	let output_mtime = match modified_time(output) {
		Ok(time) => time,
		Err(e) if e.kind() == io::ErrorKind::NotFound => {
			debug!(output = %output.display(), "Grammar library does not exist yet");
			return Ok(true);
		}
		Err(e) => return Err(BuildError::io(output, e)),
	};

	let witness_mtime = match logic_witness.map(|path| (path, modified_time(path))) {
		None => None,
		Some((_, Ok(time))) => Some(time),
		Some((path, Err(e))) if e.kind() == io::ErrorKind::NotFound => {
			debug!(witness = %path.display(), "Logic witness vanished, rebuilding");
			return Ok(true);
		}
		Some((path, Err(e))) => return Err(BuildError::io(path, e)),
	};

	let newest = sources.iter().map(|s| s.modified).chain(witness_mtime).max();
	let stale = newest.is_some_and(|time| time > output_mtime);

	debug!(output = %output.display(), stale, "Checked grammar library staleness");
	Ok(stale)
}
