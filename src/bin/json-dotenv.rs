use std::collections::BTreeMap;
use std::env;
use std::process;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser, Subcommand};
use log::debug;

use json_dotenv::{
    Config, Error, JsonDotEnv, Output, OutputFormat, QuotePolicy, Source, SubstitutionMode,
    Target, exit_code,
};

#[derive(Parser, Debug)]
#[command(name = "json-dotenv")]
#[command(version)]
#[command(about = "Read, edit and convert dotenv files to JSON or env listings", long_about = None)]
struct Cli {
    /// Dotenv file to read (`-` for standard input; none reads an empty file)
    #[arg(short, long, env = "JSON_DOTENV_FILE", global = true)]
    input: Option<String>,

    /// Output target (`-` for standard output)
    #[arg(short, long, env = "JSON_DOTENV_OUTPUT", default_value = "-", global = true)]
    output: String,

    /// Output format: json or env
    #[arg(long, env = "JSON_DOTENV_FORMAT", default_value_t = OutputFormat::Json, global = true)]
    format: OutputFormat,

    /// Quoting for env output: always, never or auto
    #[arg(long, env = "JSON_DOTENV_QUOTE", default_value_t = QuotePolicy::Always, global = true)]
    quote: QuotePolicy,

    /// Expand `${VAR}` placeholders instead of keeping them literally
    #[arg(
        long,
        env = "JSON_DOTENV_ALLOW_EXPANSION",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new(),
        global = true
    )]
    allow_expansion: bool,

    /// Warn and continue when a key is missing
    #[arg(short, long, global = true)]
    force: bool,

    /// More diagnostics on stderr (repeat for more)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Print every key and value
    List,
    /// Print every key, in declaration order
    Keys,
    /// Print the values of the given keys
    Get {
        #[arg(short = 'k', long = "key", value_name = "KEY")]
        keys: Vec<String>,
    },
    /// Assign values and print the resulting mapping
    Set {
        #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
        assignments: Vec<String>,
    },
    /// Remove keys and print the resulting mapping
    Unset {
        #[arg(short = 'k', long = "key", value_name = "KEY")]
        keys: Vec<String>,
    },
}

impl Cli {
    fn config(&self) -> Config {
        let substitution_mode = if self.allow_expansion {
            SubstitutionMode::Expand
        } else {
            SubstitutionMode::Disabled
        };

        let config = Config::new()
            .source(Source::from_arg(self.input.as_deref()))
            .target(Target::from_arg(&self.output))
            .format(self.format)
            .quote(self.quote)
            .substitution_mode(substitution_mode)
            .force(self.force);

        if self.allow_expansion {
            config.environment(snapshot_process_env())
        } else {
            config
        }
    }

    fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level()))
        .format_timestamp(None)
        .init();

    process::exit(match run(&cli) {
        Ok(()) => exit_code::SUCCESS,
        Err(err) => {
            eprintln!("json-dotenv: {err}");
            err.exit_code()
        }
    });
}

fn run(cli: &Cli) -> Result<(), Error> {
    let config = cli.config();
    debug!("running {:?} on {:?}", cli.command, config.input_source());

    let mut session = JsonDotEnv::open(config)?;
    let output = execute(&mut session, &cli.command)?;
    session.write(&output)
}

fn execute(session: &mut JsonDotEnv, command: &Command) -> Result<Output, Error> {
    match command {
        Command::List => Ok(session.list()),
        Command::Keys => Ok(session.keys()),
        Command::Get { keys } => session.get(keys),
        Command::Set { assignments } => session.set(assignments),
        Command::Unset { keys } => session.unset(keys),
    }
}

fn snapshot_process_env() -> BTreeMap<String, String> {
    env::vars_os()
        .map(|(key, value)| {
            (
                key.to_string_lossy().into_owned(),
                value.to_string_lossy().into_owned(),
            )
        })
        .collect()
}
