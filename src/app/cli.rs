use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Combine watched text files into generated output files"
)]
pub struct Cli {
    /// Configuration file (defaults to ./combotext.toml, then the user config dir)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Combine every output once and exit without watching
    #[arg(long)]
    pub once: bool,

    /// Load the configuration, print a summary and exit
    #[arg(long)]
    pub check: bool,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
