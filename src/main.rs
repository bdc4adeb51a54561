use clap::Parser;

use git_plugin_updater::cli::{self, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(cli::run(cli))
}
