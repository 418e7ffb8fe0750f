use clap::Parser;

/// Command line options for the bot process.
#[derive(Debug, Parser)]
#[command(name = "tally-bot", version, about = "Discord community points bot")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<String>,
}
