use crate::constants::DEFAULT_P4;
use clap::Parser;

/// p4-reconcile: bring perforce's opened-file bookkeeping in line with the workspace on disk
#[derive(Parser, Debug)]
#[command(
    name = "p4-reconcile",
    about,
    long_about = None,
    disable_version_flag = true
)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// print the classification and exit without writing a plan
    #[arg(short, long)]
    pub status: bool,

    /// with --status, print the buckets as JSON
    #[arg(long, requires = "status")]
    pub json: bool,

    /// print the plan instead of editing and running it
    #[arg(short = 'n', long, conflicts_with = "status")]
    pub dry_run: bool,

    /// page through `p4 diff` of modified files before planning
    #[arg(short, long)]
    pub diff: bool,

    /// perforce command line client to run
    #[arg(long, value_name = "PATH", default_value = DEFAULT_P4)]
    pub p4: String,

    /// print the perforce commands being run and dropped records
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
