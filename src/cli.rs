use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// ForceAtlas2 graph layout from the command line.
#[derive(Parser, Debug)]
#[command(name = "forcelayout")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Lay out a graph and write the final positions
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Graph file (JSON with `nodes` and `edges`)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write positions; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Layout config file (JSON, camelCase keys)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Total steps to run (overrides `maxSteps`)
    #[arg(short, long)]
    pub steps: Option<u32>,

    /// Run on the GPU backend
    #[arg(long)]
    pub gpu: bool,

    /// Force Barnes-Hut repulsion on or off
    #[arg(long, value_enum)]
    pub barnes_hut: Option<Toggle>,

    /// Seed for placing nodes without coordinates
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(toggle: Toggle) -> Self {
        toggle == Toggle::On
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Run(args) => args,
        }
    }

    #[test]
    fn run_parses_with_defaults() {
        let args = run_args(&["forcelayout", "run", "--input", "graph.json"]);
        assert_eq!(args.input, PathBuf::from("graph.json"));
        assert!(args.output.is_none());
        assert!(args.config.is_none());
        assert!(args.steps.is_none());
        assert!(!args.gpu);
        assert!(args.barnes_hut.is_none());
        assert!(args.seed.is_none());
    }

    #[test]
    fn run_parses_every_override() {
        let args = run_args(&[
            "forcelayout",
            "run",
            "-i",
            "g.json",
            "-o",
            "out.json",
            "--config",
            "cfg.json",
            "--steps",
            "250",
            "--gpu",
            "--barnes-hut",
            "off",
            "--seed",
            "7",
        ]);
        assert_eq!(args.output, Some(PathBuf::from("out.json")));
        assert_eq!(args.config, Some(PathBuf::from("cfg.json")));
        assert_eq!(args.steps, Some(250));
        assert!(args.gpu);
        assert_eq!(args.barnes_hut, Some(Toggle::Off));
        assert_eq!(args.seed, Some(7));
    }

    #[test]
    fn run_requires_input() {
        assert!(Cli::try_parse_from(["forcelayout", "run"]).is_err());
    }

    #[test]
    fn barnes_hut_rejects_unknown_values() {
        let result =
            Cli::try_parse_from(["forcelayout", "run", "-i", "g.json", "--barnes-hut", "maybe"]);
        assert!(result.is_err());
    }

    #[test]
    fn toggle_converts_to_bool() {
        assert!(bool::from(Toggle::On));
        assert!(!bool::from(Toggle::Off));
    }
}
