use crate::{Error, Result};

/// Options for the `run` command; values are `None` when not provided on CLI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub config: Option<String>,
    pub interval_ms: Option<u64>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub journal_file: Option<String>,
    pub statm_path: Option<String>,
    pub samples: Option<u64>,
    pub once: bool,
    pub json: bool,
    pub demo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunOptions),
    ShowHelp,
    ShowVersion,
}

impl Command {
    /// Parse arguments, excluding the program name. `run` is optional.
    pub fn parse(args: &[String]) -> Result<Self> {
        let rest = match args.first().map(String::as_str) {
            Some("-h") | Some("--help") => return Ok(Command::ShowHelp),
            Some("-V") | Some("--version") => return Ok(Command::ShowVersion),
            Some("run") => &args[1..],
            _ => args,
        };
        if rest.iter().any(|a| a == "-h" || a == "--help") {
            return Ok(Command::ShowHelp);
        }
        let opts = parse_run_options(&mut rest.iter())?;
        Ok(Command::Run(opts))
    }

    pub fn help() -> String {
        concat!(
            "gcpulse - GC and resident-memory telemetry sampler\n",
            "\n",
            "USAGE:\n",
            "  gcpulse [run] [OPTIONS]\n",
            "  gcpulse --help\n",
            "  gcpulse --version\n",
            "\n",
            "OPTIONS:\n",
            "  --interval-ms <number>   Sampling interval (default: 5000)\n",
            "  --config <path>          Config file (default: $GCPULSE_CONFIG or ~/.config/gcpulse/config.toml)\n",
            "  --log-level <error|warn|info|debug|trace>  Log verbosity (default: info)\n",
            "  --log-file <path>        Append logs to a file (also honors GCPULSE_LOG_PATH)\n",
            "  --journal-file <path>    Append every published snapshot as a JSON line\n",
            "  --statm-path <path>      OS counter file (default: /proc/self/statm)\n",
            "  --samples <number>       Stop after this many published samples\n",
            "  --once                   Take one sample, print it and exit\n",
            "  --json                   Print snapshots as JSON (with --once)\n",
            "  --demo                   Sample a synthetic runtime instead of reporting unsupported counters\n",
            "  -h, --help               Show this help\n",
            "  -V, --version            Show version\n",
        )
        .to_string()
    }

    pub fn print_help() {
        println!("{}", Self::help());
    }
}

fn parse_run_options(iter: &mut std::slice::Iter<String>) -> Result<RunOptions> {
    let mut opts = RunOptions::default();

    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--config" => opts.config = Some(take_value(flag, iter)?),
            "--interval-ms" => {
                let raw = take_value(flag, iter)?;
                opts.interval_ms = Some(raw.parse().map_err(|_| {
                    Error::InvalidArgs("interval-ms must be a positive integer".to_string())
                })?);
            }
            "--log-level" => opts.log_level = Some(take_value(flag, iter)?),
            "--log-file" => opts.log_file = Some(take_value(flag, iter)?),
            "--journal-file" => opts.journal_file = Some(take_value(flag, iter)?),
            "--statm-path" => opts.statm_path = Some(take_value(flag, iter)?),
            "--samples" => {
                let raw = take_value(flag, iter)?;
                let samples: u64 = raw.parse().map_err(|_| {
                    Error::InvalidArgs("samples must be a positive integer".to_string())
                })?;
                if samples == 0 {
                    return Err(Error::InvalidArgs(
                        "samples must be a positive integer".to_string(),
                    ));
                }
                opts.samples = Some(samples);
            }
            "--once" => opts.once = true,
            "--json" => opts.json = true,
            "--demo" => opts.demo = true,
            other => {
                return Err(Error::InvalidArgs(format!(
                    "unknown flag '{other}', try --help"
                )));
            }
        }
    }

    if opts.once && opts.samples.is_some() {
        return Err(Error::InvalidArgs(
            "--once cannot be combined with --samples".to_string(),
        ));
    }
    Ok(opts)
}

fn take_value(flag: &str, iter: &mut std::slice::Iter<String>) -> Result<String> {
    iter.next()
        .cloned()
        .ok_or_else(|| Error::InvalidArgs(format!("expected a value after {flag}")))
}
