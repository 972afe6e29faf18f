//! Flowstat CLI entry point.

use flowstat::cli::{self, Cli};
use flowstat::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
