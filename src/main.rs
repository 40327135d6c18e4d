//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, Context};
use clap::{crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use log::info;
use seal::{
    codegen,
    config::{CompileOptions, Config, DEFAULT_PRAGMA_VERSION},
    error::Diagnostics,
    langspec::LangSpec,
};

use std::{
    fs::File,
    io::{self, BufReader, Write},
    process,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Parsing de CLI
    let args = Command::new("seal")
        .version(crate_version!())
        .about("Compiles fully-parenthesized S-expressions into TEAL assembly")
        .subcommand_required(true)
        .arg(
            Arg::new("langspec")
                .long("langspec")
                .value_name("FILE")
                .global(true)
                .help("Instruction table to use instead of the bundled one"),
        )
        .subcommand(
            Command::new("compile")
                .about("Compile a source file")
                .arg(
                    Arg::new("input")
                        .value_name("FILE")
                        .required(true)
                        .help("Source file ('-' for stdin)"),
                )
                .arg(
                    Arg::new("pragma-version")
                        .short('p')
                        .long("pragma-version")
                        .value_name("VERSION")
                        .value_parser(value_parser!(u32))
                        .help("Version stamped into `#pragma version`"),
                )
                .arg(
                    Arg::new("no-strict")
                        .long("no-strict")
                        .action(ArgAction::SetTrue)
                        .help("Skip stack and immediate argument checks"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .default_value("-")
                        .help("Output file ('-' for stdout)"),
                ),
        )
        .subcommand(
            Command::new("spec")
                .about("Print the specification of an instruction")
                .arg(Arg::new("opcode").value_name("OPCODE").required(true)),
        )
        .get_matches();

    let loaded;
    let spec = match args.get_one::<String>("langspec") {
        Some(path) => {
            loaded = LangSpec::open(path)
                .with_context(|| format!("Failed to load instruction table: {}", path))?;

            &loaded
        }

        None => LangSpec::bundled(),
    };

    match args.subcommand() {
        Some(("compile", args)) => compile(args, spec),
        Some(("spec", args)) => describe(args, spec),
        _ => unreachable!("clap requires a subcommand"),
    }
}

fn compile(args: &ArgMatches, spec: &LangSpec) -> anyhow::Result<()> {
    // Se extraen argumentos necesarios
    let input = argument(args, "input");
    let output = argument(args, "output");

    let pragma_version = args
        .get_one::<u32>("pragma-version")
        .copied()
        .unwrap_or(DEFAULT_PRAGMA_VERSION);

    let mut options = CompileOptions::default();
    if args.get_flag("no-strict") {
        options.remove(CompileOptions::STRICT);
    }

    let config = Config::default()
        .with_pragma_version(pragma_version)
        .with_options(options);

    info!("Compiling {}", input);
    let result = match input {
        "-" => seal::compile(io::stdin().lock(), "<stdin>", &config, spec),
        path => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open for reading: {}", path))?;

            seal::compile(BufReader::new(file), path, &config, spec)
        }
    };

    // Un error de compilación no produce salida alguna
    let root = match result {
        Ok(root) => root,
        Err(error) => {
            eprint!("{}", Diagnostics::from(error).kind("Compiler error"));
            process::exit(1);
        }
    };

    info!("Writing output to {}", output);
    match output {
        "-" => {
            let mut stdout = io::stdout().lock();
            codegen::write(&root, &mut stdout).context("Failed to emit to stdout")?;
            stdout.flush().context("Failed to emit to stdout")?;
        }

        path => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            codegen::write(&root, &mut file)
                .with_context(|| format!("Failed to emit to file: {}", path))?;
        }
    }

    Ok(())
}

fn describe(args: &ArgMatches, spec: &LangSpec) -> anyhow::Result<()> {
    let name = argument(args, "opcode");

    let opcode = match spec.opcode(name) {
        Some(opcode) => opcode,
        None => {
            eprintln!("Opcode not found");
            process::exit(1);
        }
    };

    let json = serde_json::to_string_pretty(&**opcode)
        .with_context(|| format!("Failed to serialize specification of `{}`", name))?;

    println!("{}", json);
    Ok(())
}

fn argument<'a>(args: &'a ArgMatches, name: &str) -> &'a str {
    args.get_one::<String>(name)
        .map(String::as_str)
        .unwrap_or("-")
}
