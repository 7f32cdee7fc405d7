use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Error};
use clap::ArgMatches;
use stencil::machinery::{parse, tokenize, Instructions};
use stencil::{context, Environment, Error as SError, TemplateStore, Value};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::output::{Output, STDOUT};

mod cli;
mod config;
mod output;

/// The environment variable with a log filter directive.
const LOG_ENV_VAR: &str = "STENCIL_LOG";

fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("error")),
        1 => EnvFilter::new("warn"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn detect_format<'a>(format: &'a str, path: &Path) -> Result<&'a str, Error> {
    if format != "auto" {
        return Ok(format);
    }
    if path == Path::new(STDOUT) {
        bail!("auto detection does not work with data from stdin");
    }
    let ext = path.extension().and_then(|x| x.to_str()).unwrap_or("");
    cli::SUPPORTED_FORMATS
        .iter()
        .find(|(_, _, exts)| exts.contains(&ext))
        .map(|(fmt, _, _)| *fmt)
        .ok_or_else(|| anyhow!("cannot auto detect format from extension"))
}

fn load_data(format: &str, path: &Path) -> Result<Value, Error> {
    let contents = if path == Path::new(STDOUT) {
        io::read_to_string(io::stdin()).context("unable to read data from stdin")?
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("unable to read data file '{}'", path.display()))?
    };

    let data = match detect_format(format, path)? {
        "json" => Value::from_serialize(&serde_json::from_str::<serde_json::Value>(&contents)?),
        "toml" => Value::from_serialize(&toml::from_str::<toml::Value>(&contents)?),
        #[cfg(feature = "yaml")]
        "yaml" => Value::from_serialize(&serde_yaml::from_str::<serde_yaml::Value>(&contents)?),
        other => bail!("unsupported data format '{}'", other),
    };

    if data.as_map().is_none() {
        bail!("input data must be a map, got {}", data.kind());
    }
    Ok(data)
}

fn dump(
    matches: &ArgMatches,
    config: &Config,
    env: &Environment,
    name: &str,
    output: &mut Output,
) -> Result<(), Error> {
    let kind = matches.get_one::<String>("dump").map(|x| x.as_str());
    let load_source = || -> Result<String, Error> {
        config
            .store()
            .read(name)?
            .ok_or_else(|| anyhow!("template '{}' does not exist", name))
    };
    match kind {
        Some("tokens") => {
            let source = load_source()?;
            for result in tokenize(&source) {
                let (token, _) = result?;
                writeln!(output, "{:?}", token)?;
            }
        }
        Some("ast") => {
            let source = load_source()?;
            writeln!(output, "{:#?}", parse(&source, name)?)?;
        }
        Some("instructions") => {
            let tmpl = env.compile(name)?;
            print_instructions(output, tmpl.instructions(), name)?;
        }
        _ => unreachable!(),
    }
    Ok(())
}

fn print_instructions(
    output: &mut Output,
    instructions: &Instructions,
    name: &str,
) -> Result<(), Error> {
    writeln!(output, "Template: {name:?}")?;
    for idx in 0.. {
        if let Some(instruction) = instructions.get(idx) {
            writeln!(output, "  {idx:4}: {instruction:?}")?;
        } else {
            break;
        }
    }
    Ok(())
}

fn execute() -> Result<i32, Error> {
    let matches = cli::make_command().get_matches();
    init_logging(matches.get_count("verbose"));

    let mut config = Config::load(matches.get_one::<PathBuf>("config").map(|x| x.as_path()))?;
    config.update_from_matches(&matches)?;

    let data = match matches.get_one::<PathBuf>("data") {
        Some(path) => load_data(config.format(), path)?,
        None => Value::from(()),
    };

    let mut env = Environment::new();
    config.apply_to_env(&mut env);

    // template names are store relative and always use forward slashes
    let name = matches
        .get_one::<String>("template")
        .map(|x| x.replace('\\', "/"))
        .unwrap_or_default();
    let mut output = Output::open(
        matches
            .get_one::<PathBuf>("output")
            .map_or(Path::new(STDOUT), |x| x.as_path()),
    )?;

    if matches.get_one::<String>("dump").is_some() {
        dump(&matches, &config, &env, &name, &mut output)?;
    } else {
        let defines = config.defines();
        let result = env.render_with(&name, context!(..defines, ..data))?;
        if config.newline() {
            writeln!(&mut output, "{result}")?;
        } else {
            write!(&mut output, "{result}")?;
        }
    }

    output.commit()?;
    Ok(0)
}

pub fn print_error(err: &Error) {
    eprintln!("error: {err}");
    if let Some(err) = err.downcast_ref::<SError>() {
        print_engine_detail(err);
    }
    let mut source_opt = err.source();
    while let Some(source) = source_opt {
        eprintln!();
        eprintln!("caused by: {source}");
        if let Some(source) = source.downcast_ref::<SError>() {
            print_engine_detail(source);
        }
        source_opt = source.source();
    }
}

fn print_engine_detail(err: &SError) {
    let detail = format!("{err:#}");
    // the alternate form starts with the plain message which is already shown
    if let Some(rest) = detail.strip_prefix(&err.to_string()) {
        let rest = rest.trim_start_matches('\n');
        if !rest.is_empty() {
            eprintln!("{rest}");
        }
    }
}

fn main() {
    match execute() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            print_error(&err);
            std::process::exit(1);
        }
    }
}
