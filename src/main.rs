//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, bail, Context};
use clap::{Arg, Command};
use flispcc::{
    codegen::{self, Options},
    semantic,
};

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Parsing de CLI
    let args = Command::new("flispcc")
        .about("C-- compiler for the FLISP processor")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("source")
                .required(true)
                .value_name("SOURCE")
                .help("C-- source file"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .help("Output file ('-' for stdout), defaults to SOURCE with .sflisp extension"),
        )
        .arg(
            Arg::new("module")
                .long("module")
                .takes_value(true)
                .value_name("NAME")
                .help("Module name used to qualify symbols, defaults to the file stem"),
        )
        .arg(
            Arg::new("no-comments")
                .long("no-comments")
                .help("Do not interleave source statements as comments"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Stop after type checking"),
        )
        .get_matches();

    // Se extraen argumentos necesarios
    let path = Path::new(args.value_of("source").unwrap_or_default());
    let module = match args.value_of("module") {
        Some(module) => module.to_owned(),
        None => module_name(path)?,
    };

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read source file: {}", path.display()))?;

    let program = match flispcc::syntax_tree(&path.display().to_string(), &text) {
        Ok(program) => program,
        Err(diagnostics) => {
            eprint!("{}", diagnostics);
            process::exit(1);
        }
    };

    let program = match semantic::typecheck(program) {
        Ok(program) => program,
        Err(error) => {
            eprintln!("TYPE ERROR");
            eprintln!("{}", error);
            process::exit(1);
        }
    };

    if args.is_present("check") {
        return Ok(());
    }

    let mut options = Options::default();
    if args.is_present("no-comments") {
        options.remove(Options::COMMENTS);
    }

    let assembly = codegen::lower(&module, &program, options)
        .with_context(|| format!("Failed to compile module `{}`", module))?;

    match args.value_of("output") {
        // Salida a stdout
        Some("-") => {
            let mut stdout = io::stdout();
            write!(stdout, "{}", assembly).context("Failed to emit to stdout")?;
        }

        // Salida a archivo
        output => {
            let output = output
                .map(PathBuf::from)
                .unwrap_or_else(|| path.with_extension("sflisp"));

            fs::write(&output, assembly.to_string())
                .with_context(|| format!("Failed to emit to file: {}", output.display()))?;
        }
    }

    Ok(())
}

/// Nombre de módulo a partir de la ruta, apto como prefijo de símbolos.
fn module_name(path: &Path) -> anyhow::Result<String> {
    let stem = match path.file_stem().and_then(|stem| stem.to_str()) {
        Some(stem) => stem,
        None => bail!("Cannot derive a module name from: {}", path.display()),
    };

    let module: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    match module.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => Ok(module),
        _ => bail!("Invalid module name `{}`, use --module", module),
    }
}
