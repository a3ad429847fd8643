//! Loading grammars from shared libraries.
//!
//! A grammar library exports one `tree_sitter_<name>` function per grammar.
//! Calling it yields a pointer to the grammar's static tables, which is only
//! valid while the library stays mapped. [`Language`] owns both, so the
//! tables cannot outlive the mapping.

use std::fmt;
use std::num::NonZeroU16;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use thiserror::Error;
use tracing::{debug, info};
use tree_sitter::ffi::TSLanguage;

/// Prefix of the exported entry function of every grammar.
pub const LANGUAGE_SYMBOL_PREFIX: &str = "tree_sitter_";

type LanguageFn = unsafe extern "C" fn() -> *const TSLanguage;

/// Errors that can occur when loading a grammar.
#[derive(Error, Debug)]
pub enum GrammarError {
	/// Grammar library not found in any search path.
	#[error("grammar not found: {0}")]
	NotFound(String),

	/// Failed to map the dynamic library.
	#[error("failed to load grammar library {path}: {source}")]
	Load {
		path: PathBuf,
		#[source]
		source: libloading::Error,
	},

	/// Library exists but doesn't export the expected symbol.
	#[error("grammar library {path} missing language function {symbol}: {source}")]
	MissingSymbol {
		symbol: String,
		path: PathBuf,
		#[source]
		source: libloading::Error,
	},

	/// The entry function returned a null pointer.
	#[error("language function {symbol} returned null")]
	NullLanguage { symbol: String },

	/// The grammar was generated for an ABI the linked runtime cannot read.
	#[error("grammar {name} has ABI version {version}, supported range is {min}..={max}")]
	IncompatibleAbi {
		name: String,
		version: usize,
		min: usize,
		max: usize,
	},
}

/// Result type for grammar loading.
pub type Result<T> = std::result::Result<T, GrammarError>;

/// Identifier of a named field, relative to one grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(NonZeroU16);

impl FieldId {
	pub fn get(self) -> u16 {
		self.0.get()
	}
}

impl fmt::Display for FieldId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}

/// A grammar loaded from a shared library.
///
/// Dropping a `Language` unmaps its library. Use [`Language::leak`] to keep
/// the grammar for the rest of the process instead.
pub struct Language {
	name: String,
	path: PathBuf,
	// Declared before `library` so it is dropped while the tables are still mapped.
	language: tree_sitter::Language,
	library: Library,
}

impl Language {
	/// Loads grammar `name` from the shared library at `path`.
	///
	/// The library's `tree_sitter_<name>` function is called exactly once, here.
	///
	/// # Errors
	///
	/// Returns [`GrammarError::Load`] if the library cannot be mapped,
	/// [`GrammarError::MissingSymbol`] if it lacks the entry function, and
	/// [`GrammarError::NullLanguage`] or [`GrammarError::IncompatibleAbi`] if
	/// the function's result is unusable.
	pub fn load(path: impl AsRef<Path>, name: &str) -> Result<Self> {
		let path = path.as_ref();
		let symbol = language_symbol(name);

		// SAFETY: mapping the library runs its initialisers; grammar libraries
		// consist of static parse tables and a few pure functions.
		let library = unsafe { Library::new(path) }.map_err(|source| GrammarError::Load {
			path: path.to_path_buf(),
			source,
		})?;

		let raw = {
			// SAFETY: grammar entry functions take no arguments and return a pointer.
			let entry: Symbol<LanguageFn> =
				unsafe { library.get(symbol.as_bytes()) }.map_err(|source| GrammarError::MissingSymbol {
					symbol: symbol.clone(),
					path: path.to_path_buf(),
					source,
				})?;
			// SAFETY: the library is loaded and the signature matches the generated parser.
			unsafe { entry() }
		};

		if raw.is_null() {
			return Err(GrammarError::NullLanguage { symbol });
		}

		// SAFETY: `raw` is non-null and points into `library`, which outlives it.
		let language = unsafe { tree_sitter::Language::from_raw(raw) };

		let version = language.abi_version();
		let supported = tree_sitter::MIN_COMPATIBLE_LANGUAGE_VERSION..=tree_sitter::LANGUAGE_VERSION;
		if !supported.contains(&version) {
			return Err(GrammarError::IncompatibleAbi {
				name: name.to_string(),
				version,
				min: *supported.start(),
				max: *supported.end(),
			});
		}

		info!(grammar = name, path = %path.display(), abi = version, "Loaded grammar");
		Ok(Self {
			name: name.to_string(),
			path: path.to_path_buf(),
			language,
			library,
		})
	}

	/// Loads grammar `name` from the first of `search_dirs` holding its library.
	///
	/// # Errors
	///
	/// Returns [`GrammarError::NotFound`] if no directory contains
	/// [`library_file_name`]`(name)`, otherwise whatever [`Language::load`] returns.
	pub fn find<P: AsRef<Path>>(name: &str, search_dirs: &[P]) -> Result<Self> {
		let lib_name = library_file_name(name);

		for dir in search_dirs {
			let lib_path = dir.as_ref().join(&lib_name);
			debug!(grammar = name, path = %lib_path.display(), "Probing grammar library");

			if lib_path.exists() {
				return Self::load(&lib_path, name);
			}
		}

		Err(GrammarError::NotFound(name.to_string()))
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn abi_version(&self) -> usize {
		self.language.abi_version()
	}

	pub fn field_count(&self) -> usize {
		self.language.field_count()
	}

	/// Returns the id of the field called `name`, or `None` if the grammar has no such field.
	pub fn field_id_for_name(&self, name: &str) -> Option<FieldId> {
		self.language.field_id_for_name(name).map(FieldId)
	}

	/// Borrows the grammar for use with a tree-sitter parser.
	pub fn tree_sitter(&self) -> &tree_sitter::Language {
		&self.language
	}

	/// Keeps the library mapped for the rest of the process and returns the grammar.
	pub fn leak(self) -> tree_sitter::Language {
		let Self { language, library, .. } = self;
		std::mem::forget(library);
		language
	}
}

impl fmt::Debug for Language {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Language")
			.field("name", &self.name)
			.field("path", &self.path)
			.finish_non_exhaustive()
	}
}

/// Name of the entry function exported for grammar `name`.
pub fn language_symbol(name: &str) -> String {
	format!("{LANGUAGE_SYMBOL_PREFIX}{name}")
}

/// Platform file extension of shared libraries.
pub fn library_extension() -> &'static str {
	if cfg!(target_os = "windows") {
		"dll"
	} else if cfg!(target_os = "macos") {
		"dylib"
	} else {
		"so"
	}
}

/// Returns the platform-specific library filename for a grammar.
pub fn library_file_name(name: &str) -> String {
	let safe_name = name.replace('-', "_");
	if cfg!(target_os = "windows") {
		format!("{safe_name}.{}", library_extension())
	} else {
		format!("lib{safe_name}.{}", library_extension())
	}
}
