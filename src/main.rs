use clap::Parser;

use comment_sentiment::cli::{dispatch, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dispatch(cli)?;
    Ok(())
}
