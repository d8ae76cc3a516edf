use anyhow::Result;
use clap::Parser;

mod cmd;
mod net;

fn main() -> Result<()> {
    env_logger::init();

    cmd::Cli::parse().exec()
}
