use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use const_format::concatcp;
use eyre::Result as EyreResult;

use crate::defaults;

mod init;
mod run;

use init::InitCommand;
use run::RunCommand;

pub const EXAMPLES: &str = r"
  # Initialize a sybil that dials two honest peers
  $ sybild --home data/ --node-name sybil1 init \
      --target /ip4/10.0.0.2/tcp/2428/p2p/12D3KooW... \
      --target /ip4/10.0.0.3/tcp/2428/p2p/12D3KooW...

  # Run it for five minutes
  $ sybild --home data/ --node-name sybil1 run --runtime 5m
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concatcp!(
    "Environment variables:\n",
    "  SYBIL_HOME    Directory for node configs\n\n",
    "Examples:",
    EXAMPLES
))]
pub struct RootCommand {
    #[command(flatten)]
    pub args: RootArgs,

    #[command(subcommand)]
    pub action: SubCommands,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    Init(InitCommand),
    #[command(alias = "up")]
    Run(RunCommand),
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    /// Directory for node configs
    #[arg(long, value_name = "PATH", default_value_t = defaults::default_node_dir())]
    #[arg(env = "SYBIL_HOME", hide_env_values = true)]
    pub home: Utf8PathBuf,

    /// Name of node
    #[arg(short, long, value_name = "NAME")]
    pub node_name: Utf8PathBuf,
}

impl RootArgs {
    pub fn node_dir(&self) -> Utf8PathBuf {
        self.home.join(&self.node_name)
    }
}

impl RootCommand {
    pub async fn run(self) -> EyreResult<()> {
        match self.action {
            SubCommands::Init(init) => init.run(&self.args),
            SubCommands::Run(run) => run.run(&self.args).await,
        }
    }
}
