//! sitterforge command line.
//!
//! Builds tree-sitter grammar libraries and inspects loaded grammars.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use sitterforge_language::{
	BuildError, BuildStatus, Language, LibraryBuild, MANIFEST_FILE, Manifest, ProgressCallback, build_all_libraries,
	load_manifest,
};
use tracing::{info, warn};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "sitterforge")]
#[command(about = "Build and load tree-sitter grammar libraries")]
struct Args {
	/// Verbose logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Compile grammar repositories into one shared library
	Build {
		/// Output library path
		#[arg(short, long, value_name = "PATH")]
		output: PathBuf,

		/// Grammar repositories (directories containing `src/parser.c`)
		#[arg(required = true, value_name = "REPO")]
		repos: Vec<PathBuf>,
	},
	/// Build every library declared in a manifest, then verify its grammars load
	Sync {
		/// Manifest path
		#[arg(short, long, value_name = "PATH", default_value = MANIFEST_FILE)]
		manifest: PathBuf,

		/// Maximum parallel builds
		#[arg(short, long)]
		jobs: Option<usize>,
	},
	/// Print field ids of a loaded grammar
	Fields {
		/// Library containing the grammar
		#[arg(short, long, value_name = "PATH")]
		library: PathBuf,

		/// Grammar name (resolves `tree_sitter_<name>`)
		#[arg(short, long)]
		grammar: String,

		/// Field names to look up
		#[arg(required = true)]
		fields: Vec<String>,
	},
}

fn main() -> anyhow::Result<ExitCode> {
	let args = Args::parse();

	let subscriber = tracing_subscriber::fmt()
		.with_max_level(if args.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.with_writer(std::io::stderr)
		.finish();

	tracing::subscriber::set_global_default(subscriber)?;

	match args.command {
		Command::Build { output, repos } => build(output, repos),
		Command::Sync { manifest, jobs } => sync(manifest, jobs),
		Command::Fields { library, grammar, fields } => print_fields(library, &grammar, &fields),
	}
}

fn build(output: PathBuf, repos: Vec<PathBuf>) -> anyhow::Result<ExitCode> {
	let status = LibraryBuild::new(&output)
		.repos(repos)
		.run()
		.with_context(|| format!("building {}", output.display()))?;

	println!("{}: {}", output.display(), status_label(status));
	Ok(ExitCode::SUCCESS)
}

fn sync(manifest_path: PathBuf, jobs: Option<usize>) -> anyhow::Result<ExitCode> {
	let manifest = load_manifest(&manifest_path).with_context(|| format!("loading {}", manifest_path.display()))?;
	if manifest.libraries.is_empty() {
		bail!("{} declares no libraries", manifest_path.display());
	}

	let progress: ProgressCallback = Box::new(|output, status| info!(library = %output.display(), status, "Library finished"));
	let results = build_all_libraries(manifest.builds(), jobs, Some(progress))?;

	let failed = report(&manifest, &results);
	Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

/// Prints each build result and checks that every built library's grammars load.
///
/// Returns true if anything failed, including a library with no result at all.
fn report(manifest: &Manifest, results: &[(LibraryBuild, Result<BuildStatus, BuildError>)]) -> bool {
	let mut failed = false;
	for (build, result) in results {
		match result {
			Ok(status) => println!("{}: {}", build.output().display(), status_label(*status)),
			Err(e) => {
				failed = true;
				println!("{}: error: {e}", build.output().display());
			}
		}
	}

	for library in &manifest.libraries {
		let Some((_, result)) = results.iter().find(|(build, _)| build.output() == library.output) else {
			failed = true;
			warn!(library = %library.output.display(), "Library produced no build result");
			println!("{}: error: no build result", library.output.display());
			continue;
		};
		if result.is_err() {
			continue;
		}
		for grammar in &library.grammars {
			if let Err(e) = Language::load(&library.output, &grammar.name) {
				failed = true;
				warn!(grammar = %grammar.name, error = %e, "Grammar failed to load");
				println!("{}: {}: error: {e}", library.output.display(), grammar.name);
			}
		}
	}

	failed
}

fn print_fields(library: PathBuf, grammar: &str, fields: &[String]) -> anyhow::Result<ExitCode> {
	let language = Language::load(&library, grammar)?;

	for field in fields {
		match language.field_id_for_name(field) {
			Some(id) => println!("{field}\t{id}"),
			None => println!("{field}\t-"),
		}
	}
	Ok(ExitCode::SUCCESS)
}

fn status_label(status: BuildStatus) -> &'static str {
	match status {
		BuildStatus::Built => "built",
		BuildStatus::AlreadyBuilt => "up to date",
	}
}
