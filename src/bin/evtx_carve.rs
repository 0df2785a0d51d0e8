use anyhow::{Context, Result, bail, format_err};
use clap::{Arg, ArgAction, ArgMatches, Command};
use dialoguer::Confirm;
use indoc::indoc;

use evtx_carve::{
    CarveSettings, DecodedEvent, Disposition, EventPrinter, EvtxChunkDecoder,
    OutputSettings, ParserSettings, TimeWindow, carve_file, dump_file, parse_datetime,
};
use jiff::Timestamp;
use log::{LevelFilter, debug, error};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

#[cfg(all(feature = "fast-alloc", not(windows)))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[cfg(all(feature = "fast-alloc", windows))]
#[global_allocator]
static ALLOC: rpmalloc::RpMalloc = rpmalloc::RpMalloc;

const LICENSE: &str = indoc! {"
    Licensed under either of Apache License, Version 2.0 or MIT license at your option.
    This program comes with ABSOLUTELY NO WARRANTY.
"};

struct EvtxCarve {
    inputs: Vec<PathBuf>,
    carve: bool,
    carve_settings: CarveSettings,
    parser_settings: ParserSettings,
    output_settings: OutputSettings,
    output: Box<dyn Write>,
    strict: bool,
}

impl EvtxCarve {
    pub fn from_cli_matches(matches: &ArgMatches) -> Result<Self> {
        let inputs: Vec<PathBuf> = matches
            .get_many::<PathBuf>("INPUT")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();

        let limit = *matches.get_one::<i64>("limit").expect("has default");
        let limit = usize::try_from(limit).ok().filter(|&l| l > 0);

        let validate_checksums = matches.get_flag("validate-checksums");

        let carve_settings = CarveSettings::new()
            .start_offset(*matches.get_one::<u64>("offset").expect("has default"))
            .limit(limit)
            .validate_checksums(validate_checksums);

        let num_threads = *matches.get_one::<usize>("num-threads").expect("has default");
        let parser_settings = ParserSettings::default()
            .num_threads(num_threads)
            .validate_checksums(validate_checksums);

        let window = TimeWindow::new(
            matches.get_one::<Timestamp>("start").copied(),
            matches.get_one::<Timestamp>("stop").copied(),
        );
        if !window.is_unbounded() {
            debug!(
                "Only printing events created between {:?} and {:?}",
                window.start, window.stop
            );
        }
        let output_settings = OutputSettings::new()
            .timestamp_prefix(matches.get_flag("timestamp"))
            .window(window);

        if matches.get_flag("unordered") {
            debug!("unordered output requested, records are written in decoding order");
        }

        let output: Box<dyn Write> = match matches.get_one::<PathBuf>("output-target") {
            Some(path) => {
                let file =
                    Self::create_output_file(path, !matches.get_flag("no-confirm-overwrite"))
                        .with_context(|| {
                            format!(
                                "An error occurred while creating output file at `{}`",
                                path.display()
                            )
                        })?;
                Box::new(BufWriter::new(file))
            }
            None => Box::new(BufWriter::new(io::stdout())),
        };

        Ok(EvtxCarve {
            inputs,
            carve: matches.get_flag("carve"),
            carve_settings,
            parser_settings,
            output_settings,
            output,
            strict: matches.get_flag("strict"),
        })
    }

    /// Processes every input in order. Returns the number of inputs that failed.
    ///
    /// Only output failures abort the run.
    pub fn run(self) -> Result<usize> {
        let decoder = EvtxChunkDecoder::new(self.parser_settings.clone());
        let mut printer = EventPrinter::new(self.output, self.output_settings);
        let mut missing_timestamps = 0_usize;

        let mut sink = |event: DecodedEvent| -> evtx_carve::Result<()> {
            if printer.print(&event)? == Disposition::MissingTimestamp {
                missing_timestamps += 1;
            }
            Ok(())
        };

        let mut failed = 0;
        for input in &self.inputs {
            let result = if self.carve {
                carve_file(input, &self.carve_settings, &decoder, &mut sink).map(|_| ())
            } else {
                dump_file(input, self.parser_settings.clone(), &mut sink).map(|_| ())
            };

            match result {
                Ok(()) => {}
                Err(e) if e.is_output_failure() => return Err(e.into()),
                Err(e) => {
                    error!("{}", e);
                    failed += 1;
                }
            }
        }

        drop(sink);
        printer.flush()?;

        if missing_timestamps > 0 {
            debug!("{} event(s) had no creation time", missing_timestamps);
        }

        if failed > 0 && self.strict {
            bail!("{} of {} input(s) could not be processed", failed, self.inputs.len());
        }

        Ok(failed)
    }

    /// If `prompt` is passed, will display a confirmation prompt before overwriting files.
    fn create_output_file(path: impl AsRef<Path>, prompt: bool) -> Result<File> {
        let p = path.as_ref();

        if p.is_dir() {
            bail!(
                "There is a directory at {}, refusing to overwrite",
                p.display()
            );
        }

        if p.exists() && prompt {
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Are you sure you want to override output file at {}",
                    p.display()
                ))
                .default(false)
                .interact()
                .context("Failed to write confirmation prompt to term")?;

            if !confirmed {
                bail!("Cancelled");
            }
        }

        // Ok to assume p is not an existing directory
        match p.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                fs::create_dir_all(parent)?;
            }
            Some(_) => {}
            None => return Err(format_err!("Output file cannot be root.")),
        }

        Ok(File::create(p)?)
    }
}

/// Rewrites single dash `-start`/`-stop` into their `--` form, so both spellings work.
fn normalize_legacy_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| {
            let Some(s) = arg.to_str() else {
                return arg;
            };

            for name in ["start", "stop"] {
                let legacy = format!("-{}", name);
                if s == legacy || s.starts_with(&format!("{}=", legacy)) {
                    return OsString::from(format!("-{}", s));
                }
            }

            arg
        })
        .collect()
}

fn version_banner() -> String {
    format!(
        "evtx_carve {}\nCopyright (C) {}\n{}",
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_AUTHORS"),
        LICENSE
    )
}

fn cli() -> Command {
    Command::new("evtx_carve")
        .author("Omer B. <omerbenamram@gmail.com>")
        .about("Utility to dump EVTX files and carve EVTX chunks out of raw data")
        .disable_version_flag(true)
        .arg(
            Arg::new("INPUT")
                .num_args(1..)
                .value_parser(clap::value_parser!(PathBuf))
                .required_unless_present("version")
                .help("EVTX files, or raw images when carving"),
        )
        .arg(
            Arg::new("carve")
                .short('c')
                .long("carve")
                .action(ArgAction::SetTrue)
                .help("Carve chunks from raw data instead of reading a well-formed EVTX file"),
        )
        .arg(
            Arg::new("offset")
                .short('o')
                .long("offset")
                .value_parser(clap::value_parser!(u64))
                .default_value("0")
                .help("Offset to start carving from (carving mode only)"),
        )
        .arg(
            Arg::new("limit")
                .short('l')
                .long("limit")
                .value_parser(clap::value_parser!(i64))
                .allow_negative_numbers(true)
                .default_value("0")
                .help("Maximum number of chunks to parse, 0 or less means no limit (carving mode only)"),
        )
        .arg(
            Arg::new("timestamp")
                .short('t')
                .long("timestamp")
                .action(ArgAction::SetTrue)
                .help("Prefix every event with its creation time as Unix seconds, to make sorting easier"),
        )
        .arg(
            Arg::new("unordered")
                .short('u')
                .long("unordered")
                .action(ArgAction::SetTrue)
                .help("Do not care about the order events are printed in (accepted for compatibility)"),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .value_name("DATETIME")
                .value_parser(parse_datetime)
                .help("Only print events created at or after this time")
                .long_help(indoc! {"
                    Only print events created at or after this time.
                    Accepts RFC 3339 (`2017-01-02T10:00:00Z`) or `YYYY-MM-DD[ HH:MM[:SS]]` in UTC.
                "}),
        )
        .arg(
            Arg::new("stop")
                .long("stop")
                .value_name("DATETIME")
                .value_parser(parse_datetime)
                .help("Only print events created at or before this time"),
        )
        .arg(
            Arg::new("output-target")
                .short('f')
                .long("output")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Writes output to the file specified instead of stdout, errors will still be printed to stderr. \
                       Will ask for confirmation before overwriting files, to allow overwriting, pass `--no-confirm-overwrite`. \
                       Will create parent directories if needed."),
        )
        .arg(
            Arg::new("no-confirm-overwrite")
                .long("no-confirm-overwrite")
                .action(ArgAction::SetTrue)
                .help("When set, will not ask for confirmation before overwriting files, useful for automation"),
        )
        .arg(
            Arg::new("validate-checksums")
                .long("validate-checksums")
                .action(ArgAction::SetTrue)
                .help("When set, chunks with invalid checksums will not be parsed. \
                Usually dirty files have bad checksums, so using this flag will result in fewer records."),
        )
        .arg(
            Arg::new("num-threads")
                .long("threads")
                .value_parser(clap::value_parser!(usize))
                .default_value("1")
                .help("Number of worker threads used to read well-formed files, 0 uses all CPU cores"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .action(ArgAction::SetTrue)
                .help("Exit with a non-zero status if any input could not be opened or parsed"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Enable debug output"),
        )
        .arg(
            Arg::new("version")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Show version and exit"),
        )
}

fn try_to_initialize_logging(level: LevelFilter) {
    if let Err(e) = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    ) {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

fn main() {
    let matches = cli().get_matches_from(normalize_legacy_args(std::env::args_os()));

    let level = if matches.get_flag("debug") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    try_to_initialize_logging(level);

    if matches.get_flag("version") {
        eprint!("{}", version_banner());
        return;
    }

    let app = match EvtxCarve::from_cli_matches(&matches) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("{:?}", e);
            exit(1);
        }
    };

    if let Err(e) = app.run() {
        eprintln!("{:?}", e);
        exit(1);
    }
}
