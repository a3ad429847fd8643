//! Compiler and C++ runtime selection.
//!
//! Nothing here is cached process-wide: a [`Toolchain`] is resolved once per
//! build (or supplied by the caller) and threaded through compilation and
//! linking explicitly.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use super::{BuildError, Result};

#[cfg(windows)]
const CC_CANDIDATES: &[&str] = &["cl", "clang-cl", "clang", "gcc"];
#[cfg(windows)]
const CXX_CANDIDATES: &[&str] = &["cl", "clang-cl", "clang++", "g++"];
#[cfg(not(windows))]
const CC_CANDIDATES: &[&str] = &["cc", "clang", "gcc"];
#[cfg(not(windows))]
const CXX_CANDIDATES: &[&str] = &["c++", "clang++", "g++"];

/// C++ runtimes tried by [`CxxRuntime::Auto`], in order of preference.
const CXX_RUNTIMES: [&str; 2] = ["c++", "stdc++"];

/// How the C++ standard library is linked when a grammar has a C++ scanner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CxxRuntime {
	/// Link `c++` if it can be found, else `stdc++`, else nothing.
	#[default]
	Auto,
	/// Always link the named library.
	Named(String),
	/// Never add a C++ runtime dependency.
	Disabled,
}

/// The compilers and target used for one build.
#[derive(Debug, Clone)]
pub struct Toolchain {
	pub cc: Option<PathBuf>,
	pub cxx: Option<PathBuf>,
	pub target: String,
	pub host: String,
	pub opt_level: u32,
	pub cxx_runtime: CxxRuntime,
}

impl Toolchain {
	/// Resolves compilers from `CC`/`CXX`, falling back to probing common names.
	///
	/// On Unix, probes `cc`, `clang`, `gcc` (and `c++`, `clang++`, `g++`). On
	/// Windows, probes `cl`, `clang-cl`, then the GNU-style drivers.
	pub fn from_env() -> Self {
		let cc = std::env::var_os("CC").map(PathBuf::from).or_else(|| find_compiler(CC_CANDIDATES));
		let cxx = std::env::var_os("CXX").map(PathBuf::from).or_else(|| find_compiler(CXX_CANDIDATES));
		let target = std::env::var("TARGET").unwrap_or_else(|_| default_target());
		let host = std::env::var("HOST").unwrap_or_else(|_| target.clone());

		debug!(?cc, ?cxx, %target, "Resolved grammar toolchain");
		Self {
			cc,
			cxx,
			target,
			host,
			opt_level: 2,
			cxx_runtime: CxxRuntime::Auto,
		}
	}

	pub fn with_cc(mut self, cc: impl Into<PathBuf>) -> Self {
		self.cc = Some(cc.into());
		self
	}

	pub fn with_cxx(mut self, cxx: impl Into<PathBuf>) -> Self {
		self.cxx = Some(cxx.into());
		self
	}

	pub fn with_target(mut self, target: impl Into<String>) -> Self {
		let target = target.into();
		self.host = target.clone();
		self.target = target;
		self
	}

	pub fn with_cxx_runtime(mut self, runtime: CxxRuntime) -> Self {
		self.cxx_runtime = runtime;
		self
	}

	pub fn is_windows(&self) -> bool {
		self.target.contains("windows")
	}

	fn is_apple(&self) -> bool {
		self.target.contains("apple")
	}

	pub(crate) fn c_compiler(&self) -> Result<&Path> {
		self.cc.as_deref().ok_or(BuildError::NoCompiler("C"))
	}

	pub(crate) fn cxx_compiler(&self) -> Result<&Path> {
		self.cxx.as_deref().ok_or(BuildError::NoCompiler("C++"))
	}

	/// A `cc::Build` configured for this toolchain, detached from cargo's
	/// build-script environment.
	pub(crate) fn cc_build(&self) -> cc::Build {
		let mut build = cc::Build::new();
		build
			.cargo_metadata(false)
			.cargo_warnings(false)
			.emit_rerun_if_env_changed(false)
			.warnings(false)
			.debug(false)
			.opt_level(self.opt_level)
			.host(&self.host)
			.target(&self.target);
		build
	}

	/// Picks the C++ runtime to link, using `exists` to test for a library by name.
	pub fn select_cxx_runtime(&self, exists: impl Fn(&str) -> bool) -> Option<String> {
		match &self.cxx_runtime {
			CxxRuntime::Auto => CXX_RUNTIMES.into_iter().find(|name| exists(name)).map(String::from),
			CxxRuntime::Named(name) => Some(name.clone()),
			CxxRuntime::Disabled => None,
		}
	}

	/// Returns true if a library named `name` (as in `-l<name>`) is discoverable.
	///
	/// Asks the C compiler first, then scans the usual library directories.
	pub fn find_library(&self, name: &str) -> bool {
		if self.is_windows() {
			return false;
		}
		// libc++ lives in the dyld shared cache on macOS, not on disk.
		if self.is_apple() && name == "c++" {
			return true;
		}

		let found = self.compiler_knows_library(name) || library_dirs().iter().any(|dir| dir_has_library(dir, name));
		debug!(library = name, found, "Probed for library");
		found
	}

	fn compiler_knows_library(&self, name: &str) -> bool {
		let Some(cc) = self.cc.as_deref() else {
			return false;
		};
		let ext = if self.is_apple() { "dylib" } else { "so" };

		let Ok(output) = Command::new(cc)
			.arg(format!("-print-file-name=lib{name}.{ext}"))
			.stderr(Stdio::null())
			.output()
		else {
			return false;
		};
		let reported = String::from_utf8_lossy(&output.stdout);
		let reported = Path::new(reported.trim());
		output.status.success() && reported.is_absolute() && reported.exists()
	}
}

/// Returns the first compiler from `candidates` that executes successfully.
fn find_compiler(candidates: &[&str]) -> Option<PathBuf> {
	candidates
		.iter()
		.copied()
		.find(|name| {
			Command::new(name)
				.arg("--version")
				.stdout(Stdio::null())
				.stderr(Stdio::null())
				.status()
				.is_ok()
		})
		.map(PathBuf::from)
}

fn default_target() -> String {
	let arch = std::env::consts::ARCH;
	if cfg!(target_os = "windows") {
		if cfg!(target_env = "gnu") {
			format!("{arch}-pc-windows-gnu")
		} else {
			format!("{arch}-pc-windows-msvc")
		}
	} else if cfg!(target_os = "macos") {
		format!("{arch}-apple-darwin")
	} else if cfg!(target_env = "musl") {
		format!("{arch}-unknown-linux-musl")
	} else {
		format!("{arch}-unknown-linux-gnu")
	}
}

fn library_dirs() -> Vec<PathBuf> {
	let mut dirs = Vec::new();
	for var in ["LIBRARY_PATH", "LD_LIBRARY_PATH", "DYLD_LIBRARY_PATH"] {
		if let Some(paths) = std::env::var_os(var) {
			dirs.extend(std::env::split_paths(&paths));
		}
	}

	let arch = std::env::consts::ARCH;
	dirs.extend(
		[
			format!("/usr/lib/{arch}-linux-gnu"),
			format!("/lib/{arch}-linux-gnu"),
			"/usr/local/lib".into(),
			"/usr/lib64".into(),
			"/lib64".into(),
			"/usr/lib".into(),
			"/lib".into(),
		]
		.map(PathBuf::from),
	);
	dirs
}

/// Only shared objects count; static archives are never linked into a grammar library.
fn dir_has_library(dir: &Path, name: &str) -> bool {
	let Ok(entries) = fs::read_dir(dir) else {
		return false;
	};
	let so = format!("lib{name}.so");
	let versioned = format!("{so}.");
	let dylib = format!("lib{name}.dylib");

	entries.flatten().any(|entry| {
		let file = entry.file_name();
		let file = file.to_string_lossy();
		file == so || file == dylib || file.starts_with(&versioned)
	})
}
