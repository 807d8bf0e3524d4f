//! # smallc Executable
//!
//! Command-line entry point for the compiler. Parses arguments with `clap`
//! and runs the [`Compiler`] driver; any failure prints a single diagnostic
//! to stderr and exits with status 1.

use std::path::PathBuf;
use std::process;

use clap::{Arg, ArgAction, Command};
use tracing_subscriber::EnvFilter;

use smallc::{Compiler, DumpMode, Target};

fn main() {
    // Logging is opt-in via the environment (e.g. RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("smallc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A single-pass compiler for a small C-like language")
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_name("TARGET")
                .default_value("nasm")
                .help("Code generation target: nasm or aarch64"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("PATH")
                .default_value("out.asm")
                .help("Output assembly path"),
        )
        .arg(
            Arg::new("dump-ast")
                .short('a')
                .long("dump-ast")
                .action(ArgAction::SetTrue)
                .help("Dump each function's AST to stdout after parsing"),
        )
        .arg(
            Arg::new("dump-ast-compacted")
                .short('A')
                .long("dump-ast-compacted")
                .action(ArgAction::SetTrue)
                .help("Dump ASTs with glue chains flattened"),
        )
        .arg(
            Arg::new("file")
                .required(true)
                .value_name("FILE")
                .help("Source file to compile"),
        )
        .get_matches();

    let target_name = matches.get_one::<String>("target").unwrap();
    let Some(target) = Target::from_name(target_name) else {
        eprintln!("Unsupported target '{target_name}' (expected 'nasm' or 'aarch64')");
        process::exit(1);
    };

    let mut compiler = Compiler::new(target);
    compiler.output_path = PathBuf::from(matches.get_one::<String>("output").unwrap());
    compiler.dump_mode = if matches.get_flag("dump-ast-compacted") {
        Some(DumpMode::Compacted)
    } else if matches.get_flag("dump-ast") {
        Some(DumpMode::Full)
    } else {
        None
    };

    let input = PathBuf::from(matches.get_one::<String>("file").unwrap());
    if let Err(error) = compiler.compile_file(&input) {
        eprintln!("Error: {error}");
        process::exit(1);
    }
}
