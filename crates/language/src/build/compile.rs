//! Compiling grammar sources to objects and linking them into a shared library.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::sources::{SourceFile, SourceSet};
use super::toolchain::Toolchain;
use super::{BuildError, Result};

/// Compiles every file in `sources` into `obj_dir`, returning the object paths.
pub(crate) fn compile_objects(toolchain: &Toolchain, sources: &SourceSet, obj_dir: &Path) -> Result<Vec<PathBuf>> {
	let mut objects = Vec::with_capacity(sources.files.len());

	for source in &sources.files {
		let build = configure(toolchain, source, obj_dir)?;
		debug!(source = %source.path.display(), kind = ?source.kind, "Compiling grammar object");
		objects.extend(build.try_compile_intermediates()?);
	}

	Ok(objects)
}

/// A `cc::Build` compiling `source` alone into `obj_dir`.
///
/// The file's own directory is the only extra include path.
fn configure(toolchain: &Toolchain, source: &SourceFile, obj_dir: &Path) -> Result<cc::Build> {
	let mut build = toolchain.cc_build();
	build.out_dir(obj_dir).include(source.include_dir()).file(&source.path);

	if source.kind.is_cpp() {
		build.cpp(true).compiler(toolchain.cxx_compiler()?);
	} else {
		build.compiler(toolchain.c_compiler()?);
	}

	for flag in source_flags(toolchain, source) {
		build.flag(flag);
	}
	Ok(build)
}

/// None on Windows; elsewhere `-fPIC`, plus `-std=c99` for `.c` files.
fn source_flags(toolchain: &Toolchain, source: &SourceFile) -> &'static [&'static str] {
	if toolchain.is_windows() {
		&[]
	} else if source.is_c() {
		&["-fPIC", "-std=c99"]
	} else {
		&["-fPIC"]
	}
}

/// Links `objects` into a shared library at `output`, adding `-l<lib>` for each of `libraries`.
pub(crate) fn link_shared_library(toolchain: &Toolchain, objects: &[PathBuf], libraries: &[String], output: &Path) -> Result<()> {
	let mut build = toolchain.cc_build();
	build.compiler(toolchain.c_compiler()?);
	if !toolchain.is_windows() {
		build.pic(true);
	}
	let linker = build.try_get_compiler()?;

	let mut cmd = linker.to_command();
	if linker.is_like_msvc() {
		cmd.arg("/LD").args(objects).arg(format!("/Fe:{}", output.display()));
		if !libraries.is_empty() {
			cmd.arg("/link").args(libraries.iter().map(|lib| format!("{lib}.lib")));
		}
	} else {
		cmd.arg("-shared").args(objects).arg("-o").arg(output);
		cmd.args(libraries.iter().map(|lib| format!("-l{lib}")));
	}

	debug!(output = %output.display(), ?libraries, "Linking grammar library");
	run_linker(cmd, output)
}

fn run_linker(mut cmd: Command, output: &Path) -> Result<()> {
	let program = PathBuf::from(cmd.get_program());
	let result = cmd.output().map_err(|e| BuildError::io(program, e))?;

	if result.status.success() {
		Ok(())
	} else {
		Err(BuildError::Link {
			output: output.to_path_buf(),
			status: result.status,
			stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
		})
	}
}
