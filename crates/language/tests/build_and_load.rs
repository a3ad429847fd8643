#![allow(unused_crate_dependencies)]

//! End-to-end tests compiling fixture grammars with the system toolchain.
//!
//! Tests return early when no suitable compiler is installed.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sitterforge_language::{
	BuildError, BuildStatus, CxxRuntime, GrammarError, Language, LibraryBuild, Toolchain, build_library, library_file_name,
};
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
	Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Copies fixture repository `name` into a fresh scratch directory.
fn scratch_repo(name: &str) -> (TempDir, PathBuf) {
	let dir = tempfile::tempdir().unwrap();
	let repo = dir.path().join(format!("tree-sitter-{name}"));
	fs::create_dir_all(repo.join("src")).unwrap();
	for entry in fs::read_dir(fixture(name).join("src")).unwrap() {
		let entry = entry.unwrap();
		fs::copy(entry.path(), repo.join("src").join(entry.file_name())).unwrap();
	}
	(dir, repo)
}

fn c_toolchain() -> Option<Toolchain> {
	let toolchain = Toolchain::from_env();
	toolchain.cc.is_some().then_some(toolchain)
}

fn cxx_toolchain() -> Option<Toolchain> {
	let toolchain = Toolchain::from_env();
	(toolchain.cc.is_some() && toolchain.cxx.is_some()).then_some(toolchain)
}

fn mtime(path: &Path) -> SystemTime {
	fs::metadata(path).unwrap().modified().unwrap()
}

fn set_mtime(path: &Path, time: SystemTime) {
	File::options().write(true).open(path).unwrap().set_modified(time).unwrap();
}

#[test]
fn rebuild_only_when_sources_change() {
	let Some(toolchain) = c_toolchain() else { return };
	let (dir, repo) = scratch_repo("fields");
	let output = dir.path().join("out").join(library_file_name("fixture"));
	let build = LibraryBuild::new(&output).repo(&repo).toolchain(toolchain).logic_witness(None);

	assert_eq!(build.run().unwrap(), BuildStatus::Built);
	assert!(output.is_file());
	let first = mtime(&output);

	assert_eq!(build.run().unwrap(), BuildStatus::AlreadyBuilt);
	assert_eq!(mtime(&output), first);

	set_mtime(&repo.join("src/parser.c"), first + Duration::from_secs(5));
	assert_eq!(build.run().unwrap(), BuildStatus::Built);
	assert!(mtime(&output) > first);
}

#[test]
fn replaced_host_binary_triggers_rebuild_instead_of_failing() {
	let Some(toolchain) = c_toolchain() else { return };
	let (dir, repo) = scratch_repo("fields");
	let output = dir.path().join(library_file_name("fixture"));
	let witness = dir.path().join("host-binary");
	fs::write(&witness, b"old host").unwrap();
	set_mtime(&witness, SystemTime::UNIX_EPOCH + Duration::from_secs(1));
	let build = LibraryBuild::new(&output)
		.repo(&repo)
		.toolchain(toolchain)
		.logic_witness(Some(witness.clone()));

	assert_eq!(build.run().unwrap(), BuildStatus::Built);
	assert_eq!(build.run().unwrap(), BuildStatus::AlreadyBuilt);

	fs::remove_file(&witness).unwrap();
	assert_eq!(build.run().unwrap(), BuildStatus::Built);
	assert!(Language::load(&output, "fixture").is_ok());
}

#[test]
fn touching_a_header_alone_does_not_rebuild() {
	let Some(toolchain) = c_toolchain() else { return };
	let (dir, repo) = scratch_repo("fields");
	let output = dir.path().join(library_file_name("fixture"));
	let build = LibraryBuild::new(&output).repo(&repo).toolchain(toolchain).logic_witness(None);

	build.run().unwrap();
	set_mtime(&repo.join("src/fields.h"), mtime(&output) + Duration::from_secs(5));
	assert_eq!(build.run().unwrap(), BuildStatus::AlreadyBuilt);
}

#[test]
fn build_library_entry_point_reports_bool() {
	if c_toolchain().is_none() {
		return;
	}
	let (dir, repo) = scratch_repo("fields");
	let output = dir.path().join(library_file_name("fixture"));

	assert!(build_library(&output, &[&repo]).unwrap());
	assert!(!build_library(&output, &[&repo]).unwrap());
}

#[test]
fn empty_repository_list_never_builds() {
	let dir = tempfile::tempdir().unwrap();
	let output = dir.path().join(library_file_name("fixture"));
	let repos: [&Path; 0] = [];

	assert!(matches!(build_library(&output, &repos), Err(BuildError::NoRepositories)));
	assert!(!output.exists());
}

#[test]
fn field_ids_resolve_against_loaded_grammar() {
	let Some(toolchain) = c_toolchain() else { return };
	let (dir, repo) = scratch_repo("fields");
	let output = dir.path().join(library_file_name("fixture"));
	LibraryBuild::new(&output).repo(&repo).toolchain(toolchain).run().unwrap();

	let language = Language::load(&output, "fixture").unwrap();
	assert_eq!(language.name(), "fixture");
	assert_eq!(language.path(), output);
	assert_eq!(language.abi_version(), 14);
	assert_eq!(language.field_count(), 2);

	let body = language.field_id_for_name("body").map(|id| id.get());
	let name = language.field_id_for_name("name").map(|id| id.get());
	assert_eq!(body, Some(1));
	assert_eq!(name, Some(2));
	assert_eq!(language.field_id_for_name("body").map(|id| id.get()), body);

	assert_eq!(language.field_id_for_name("missing"), None);
	assert_eq!(language.field_id_for_name("nam"), None);
	assert_eq!(language.field_id_for_name(""), None);
}

#[test]
fn misspelled_grammar_name_is_a_load_error() {
	let Some(toolchain) = c_toolchain() else { return };
	let (dir, repo) = scratch_repo("fields");
	let output = dir.path().join(library_file_name("fixture"));
	LibraryBuild::new(&output).repo(&repo).toolchain(toolchain).run().unwrap();

	match Language::load(&output, "fixtrue") {
		Err(GrammarError::MissingSymbol { symbol, .. }) => assert_eq!(symbol, "tree_sitter_fixtrue"),
		other => panic!("expected missing symbol, got {other:?}"),
	}
}

#[test]
fn null_language_pointer_is_rejected() {
	let Some(toolchain) = c_toolchain() else { return };
	let (dir, repo) = scratch_repo("fields");
	let output = dir.path().join(library_file_name("fixture"));
	LibraryBuild::new(&output).repo(&repo).toolchain(toolchain).run().unwrap();

	assert!(matches!(
		Language::load(&output, "broken"),
		Err(GrammarError::NullLanguage { symbol }) if symbol == "tree_sitter_broken"
	));
}

#[test]
fn find_searches_directories_in_order() {
	let Some(toolchain) = c_toolchain() else { return };
	let (dir, repo) = scratch_repo("fields");
	let lib_dir = dir.path().join("grammars");
	LibraryBuild::new(lib_dir.join(library_file_name("fixture")))
		.repo(&repo)
		.toolchain(toolchain)
		.run()
		.unwrap();

	let empty = dir.path().join("empty");
	fs::create_dir_all(&empty).unwrap();
	let language = Language::find("fixture", &[&empty, &lib_dir]).unwrap();
	assert_eq!(language.path(), lib_dir.join(library_file_name("fixture")));
}

#[test]
fn leaked_language_stays_usable() {
	let Some(toolchain) = c_toolchain() else { return };
	let (dir, repo) = scratch_repo("fields");
	let output = dir.path().join(library_file_name("fixture"));
	LibraryBuild::new(&output).repo(&repo).toolchain(toolchain).run().unwrap();

	let language = Language::load(&output, "fixture").unwrap().leak();
	assert!(language.field_id_for_name("name").is_some());
}

#[test]
fn c_only_grammar_links_no_cxx_runtime() {
	let Some(toolchain) = c_toolchain() else { return };
	let (dir, repo) = scratch_repo("fields");
	let output = dir.path().join(library_file_name("fixture"));
	// Linking would fail if this library were requested.
	let toolchain = toolchain.with_cxx_runtime(CxxRuntime::Named("sitterforge-no-such-runtime".into()));

	assert_eq!(
		LibraryBuild::new(&output).repo(&repo).toolchain(toolchain).run().unwrap(),
		BuildStatus::Built
	);
	assert!(Language::load(&output, "fixture").is_ok());
}

#[test]
fn cxx_scanner_links_a_cxx_runtime() {
	let Some(toolchain) = cxx_toolchain() else { return };
	let (dir, repo) = scratch_repo("cxx");
	let output = dir.path().join(library_file_name("fixture"));

	assert_eq!(
		LibraryBuild::new(&output).repo(&repo).toolchain(toolchain).run().unwrap(),
		BuildStatus::Built
	);
	let language = Language::load(&output, "fixture").unwrap();
	assert!(language.field_id_for_name("body").is_some());
}

#[test]
fn failed_link_leaves_previous_library_untouched() {
	let Some(toolchain) = cxx_toolchain() else { return };
	if toolchain.is_windows() {
		return;
	}
	let (dir, repo) = scratch_repo("cxx");
	let output = dir.path().join(library_file_name("fixture"));
	fs::write(&output, b"previous artifact").unwrap();
	set_mtime(&output, SystemTime::UNIX_EPOCH + Duration::from_secs(1));

	let toolchain = toolchain.with_cxx_runtime(CxxRuntime::Named("sitterforge-no-such-runtime".into()));
	let err = LibraryBuild::new(&output).repo(&repo).toolchain(toolchain).run().unwrap_err();

	assert!(matches!(err, BuildError::Link { .. }));
	assert_eq!(fs::read(&output).unwrap(), b"previous artifact");
	let leftovers: Vec<_> = fs::read_dir(dir.path())
		.unwrap()
		.flatten()
		.filter(|e| e.file_name().to_string_lossy().starts_with(".sitterforge-"))
		.collect();
	assert!(leftovers.is_empty());
}

#[test]
fn multiple_repositories_share_one_library() {
	let Some(toolchain) = c_toolchain() else { return };
	let (dir, fields) = scratch_repo("fields");
	let extra = dir.path().join("tree-sitter-extra");
	fs::create_dir_all(extra.join("src")).unwrap();
	fs::write(extra.join("src/parser.c"), "const void *tree_sitter_extra(void) { return (const void *)0; }\n").unwrap();
	let output = dir.path().join(library_file_name("combined"));

	LibraryBuild::new(&output)
		.repos([&fields, &extra])
		.toolchain(toolchain)
		.run()
		.unwrap();

	assert!(Language::load(&output, "fixture").is_ok());
	assert!(matches!(Language::load(&output, "extra"), Err(GrammarError::NullLanguage { .. })));
}
