//! Grammar manifest parsing from KDL.
//!
//! A manifest lists the shared libraries to build and the grammar
//! repositories linked into each one. Relative paths are resolved against
//! the manifest's directory.
//!
//! # KDL Format
//!
//! ```kdl
//! library "build/languages.so" {
//!     grammar json path="vendor/tree-sitter-json"
//!     grammar python path="vendor/tree-sitter-python"
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use kdl::{KdlDocument, KdlNode, KdlValue};
use thiserror::Error;

use crate::build::LibraryBuild;

/// Default manifest file name.
pub const MANIFEST_FILE: &str = "grammars.kdl";

/// Errors from manifest loading.
#[derive(Debug, Error)]
pub enum ManifestError {
	/// KDL syntax error.
	#[error("failed to parse KDL: {0}")]
	Kdl(#[from] kdl::KdlError),

	/// Error reading the manifest file.
	#[error("I/O error reading {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },

	/// A node lacks a required value.
	#[error("missing required field: {0}")]
	MissingField(String),

	/// The manifest is well-formed KDL but not a valid manifest.
	#[error("invalid manifest: {0}")]
	Invalid(String),
}

/// Result type for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;

/// A parsed `grammars.kdl`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
	pub libraries: Vec<LibrarySpec>,
}

/// One shared library and the grammars compiled into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySpec {
	pub output: PathBuf,
	pub grammars: Vec<GrammarSpec>,
}

/// A grammar repository contributing to a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarSpec {
	/// Grammar name, used to resolve `tree_sitter_<name>`.
	pub name: String,
	/// Repository root (the directory containing `src/`).
	pub path: PathBuf,
}

impl Manifest {
	/// One [`LibraryBuild`] per declared library.
	pub fn builds(&self) -> Vec<LibraryBuild> {
		self.libraries.iter().map(LibrarySpec::to_build).collect()
	}
}

impl LibrarySpec {
	pub fn to_build(&self) -> LibraryBuild {
		LibraryBuild::new(&self.output).repos(self.grammars.iter().map(|g| g.path.clone()))
	}
}

/// Reads and parses the manifest at `path`.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
	let input = fs::read_to_string(path).map_err(|error| ManifestError::Io {
		path: path.to_path_buf(),
		error,
	})?;
	let base_dir = path.parent().unwrap_or(Path::new(""));
	parse_manifest(&input, base_dir)
}

/// Parses a manifest from a KDL string, resolving relative paths against `base_dir`.
pub fn parse_manifest(input: &str, base_dir: &Path) -> Result<Manifest> {
	let doc: KdlDocument = input.parse()?;
	let mut libraries = Vec::new();
	let mut outputs = HashSet::new();

	for node in doc.nodes() {
		match node.name().value() {
			"library" => {
				let library = parse_library_node(node, base_dir)?;
				if !outputs.insert(library.output.clone()) {
					return Err(ManifestError::Invalid(format!(
						"library {} is declared more than once",
						library.output.display()
					)));
				}
				libraries.push(library);
			}
			other => return Err(ManifestError::Invalid(format!("unknown node `{other}`"))),
		}
	}

	Ok(Manifest { libraries })
}

fn parse_library_node(node: &KdlNode, base_dir: &Path) -> Result<LibrarySpec> {
	let output = positional_string(node, 0)
		.map(|s| base_dir.join(s))
		.ok_or_else(|| ManifestError::MissingField("library output path".into()))?;

	let mut grammars = Vec::new();
	for child in node.children().map(KdlDocument::nodes).unwrap_or_default() {
		match child.name().value() {
			"grammar" => grammars.push(parse_grammar_node(child, base_dir)?),
			other => return Err(ManifestError::Invalid(format!("unknown node `{other}` in library"))),
		}
	}

	if grammars.is_empty() {
		return Err(ManifestError::Invalid(format!(
			"library {} declares no grammars",
			output.display()
		)));
	}

	Ok(LibrarySpec { output, grammars })
}

fn parse_grammar_node(node: &KdlNode, base_dir: &Path) -> Result<GrammarSpec> {
	let name = positional_string(node, 0).ok_or_else(|| ManifestError::MissingField("grammar name".into()))?;
	let path = property_string(node, "path")
		.map(|s| base_dir.join(s))
		.ok_or_else(|| ManifestError::MissingField(format!("path for grammar {name}")))?;

	Ok(GrammarSpec {
		name: name.to_string(),
		path,
	})
}

fn positional_string(node: &KdlNode, index: usize) -> Option<&str> {
	node.entries()
		.iter()
		.filter(|e| e.name().is_none())
		.nth(index)
		.and_then(|e| e.value().as_string())
}

fn property_string<'a>(node: &'a KdlNode, key: &str) -> Option<&'a str> {
	node.entries()
		.iter()
		.find(|e| e.name().is_some_and(|n| n.value() == key))
		.map(|e| e.value())
		.and_then(KdlValue::as_string)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn parse_single_library() {
		let kdl = r#"
library "build/languages.so" {
    grammar json path="vendor/tree-sitter-json"
    grammar python path="/abs/tree-sitter-python"
}
"#;
		let manifest = parse_manifest(kdl, Path::new("/work")).unwrap();
		assert_eq!(
			manifest,
			Manifest {
				libraries: vec![LibrarySpec {
					output: PathBuf::from("/work/build/languages.so"),
					grammars: vec![
						GrammarSpec {
							name: "json".into(),
							path: PathBuf::from("/work/vendor/tree-sitter-json"),
						},
						GrammarSpec {
							name: "python".into(),
							path: PathBuf::from("/abs/tree-sitter-python"),
						},
					],
				}],
			}
		);
	}

	#[test]
	fn builds_follow_declaration_order() {
		let kdl = r#"
library "a.so" { grammar a path="a"; }
library "b.so" { grammar b path="b"; grammar c path="c"; }
"#;
		let manifest = parse_manifest(kdl, Path::new("root")).unwrap();
		let builds = manifest.builds();
		assert_eq!(builds.len(), 2);
		assert_eq!(builds[0].output(), Path::new("root/a.so"));
		assert_eq!(builds[1].repo_paths(), [PathBuf::from("root/b"), PathBuf::from("root/c")]);
	}

	#[test]
	fn library_without_grammars_is_invalid() {
		let err = parse_manifest(r#"library "empty.so""#, Path::new("")).unwrap_err();
		assert!(matches!(err, ManifestError::Invalid(_)));
	}

	#[test]
	fn grammar_without_path_is_missing_field() {
		let err = parse_manifest(r#"library "x.so" { grammar json; }"#, Path::new("")).unwrap_err();
		assert!(matches!(err, ManifestError::MissingField(field) if field.contains("json")));
	}

	#[test]
	fn duplicate_outputs_are_invalid() {
		let kdl = r#"
library "x.so" { grammar a path="a"; }
library "x.so" { grammar b path="b"; }
"#;
		assert!(matches!(parse_manifest(kdl, Path::new("")), Err(ManifestError::Invalid(_))));
	}

	#[test]
	fn unknown_nodes_are_rejected() {
		assert!(matches!(parse_manifest("grammar json", Path::new("")), Err(ManifestError::Invalid(_))));
	}

	#[test]
	fn syntax_errors_surface_as_kdl_errors() {
		assert!(matches!(parse_manifest("library {", Path::new("")), Err(ManifestError::Kdl(_))));
	}

	#[test]
	fn load_resolves_against_manifest_dir() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(MANIFEST_FILE);
		fs::write(&path, r#"library "out.so" { grammar json path="json"; }"#).unwrap();

		let manifest = load_manifest(&path).unwrap();
		assert_eq!(manifest.libraries[0].output, dir.path().join("out.so"));
		assert_eq!(manifest.libraries[0].grammars[0].path, dir.path().join("json"));
	}

	#[test]
	fn load_reports_missing_file() {
		let err = load_manifest(Path::new("/nonexistent/grammars.kdl")).unwrap_err();
		assert!(matches!(err, ManifestError::Io { .. }));
	}
}
