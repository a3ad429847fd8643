// Diagnostics from grammar operations must go through tracing, not stderr
#![deny(clippy::print_stderr)]

//! Tree-sitter grammars as loadable parsing backends.
//!
//! This crate compiles grammar repositories (generated C parsers plus optional
//! C/C++ scanners) into shared libraries and loads them back into the process.
//!
//! # Architecture
//!
//! * [`build`]: Source discovery, staleness checks, compilation and linking
//! * [`grammar`]: Dynamic loading and field lookup
//! * [`manifest`]: `grammars.kdl` parsing for multi-library builds
//!
//! ```no_run
//! use sitterforge_language::{Language, build_library};
//!
//! let rebuilt = build_library("build/languages.so", &["vendor/tree-sitter-json"])?;
//! let json = Language::load("build/languages.so", "json")?;
//! let key = json.field_id_for_name("key");
//! # let _ = (rebuilt, key);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod build;
pub mod grammar;
pub mod manifest;

pub use build::{
	BuildError, BuildStatus, CxxRuntime, LibraryBuild, ProgressCallback, SourceFile, SourceKind, SourceSet, Toolchain,
	build_all_libraries, build_library, collect_sources, needs_rebuild,
};
pub use grammar::{
	FieldId, GrammarError, LANGUAGE_SYMBOL_PREFIX, Language, language_symbol, library_extension, library_file_name,
};
pub use manifest::{GrammarSpec, LibrarySpec, MANIFEST_FILE, Manifest, ManifestError, load_manifest, parse_manifest};
