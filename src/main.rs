use anyhow::Result;
use tmsbot::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
