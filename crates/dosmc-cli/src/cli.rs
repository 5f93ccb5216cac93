use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "The dosmc developers",
    version,
    about = "dosmc CLI - Wang-Landau density-of-states sampling for particle systems in periodic boxes.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sample the density of states of the configured system.
    Run(RunArgs),
    /// Print the energy breakdown and pressure of every world in the configured system.
    Energy(EnergyArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the simulation file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path for the final density-of-states CSV.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Override the number of Wang-Landau stages.
    #[arg(long, value_name = "INT")]
    pub stages: Option<usize>,

    /// Override the random seed of the walker.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Override the histogram flatness required to finish a stage.
    #[arg(long, value_name = "FLOAT")]
    pub target_flatness: Option<f64>,

    /// Start from the log density of states stored in a previous output CSV.
    #[arg(long, value_name = "PATH")]
    pub restart: Option<PathBuf>,

    /// Split the order-parameter interval over this many independent walkers.
    #[arg(long, value_name = "INT")]
    pub replicas: Option<usize>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S ensemble.bin-count=50
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `energy` subcommand.
#[derive(Args, Debug)]
pub struct EnergyArgs {
    /// Path to the simulation file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Also write the report to this TOML file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_arguments_parse_with_overrides() {
        let cli = Cli::try_parse_from([
            "dosmc", "-vv", "run", "-c", "sim.toml", "-o", "out.csv", "--stages", "5", "--seed",
            "9", "-S", "ensemble.bin-count=10", "-S", "output.histogram=x.csv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected the run subcommand");
        };
        assert_eq!(args.config, PathBuf::from("sim.toml"));
        assert_eq!(args.output, Some(PathBuf::from("out.csv")));
        assert_eq!(args.stages, Some(5));
        assert_eq!(args.seed, Some(9));
        assert_eq!(args.set_values.len(), 2);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["dosmc", "-q", "-v", "energy", "-c", "sim.toml"]);
        assert!(result.is_err());
    }

    #[test]
    fn config_is_required() {
        assert!(Cli::try_parse_from(["dosmc", "energy"]).is_err());
        assert!(Cli::try_parse_from(["dosmc", "run"]).is_err());
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["dosmc", "energy", "-c", "sim.toml", "-j", "4"]).unwrap();
        assert_eq!(cli.threads, Some(4));
        assert!(matches!(cli.command, Commands::Energy(_)));
    }
}
