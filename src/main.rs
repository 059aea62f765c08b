use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    post_tracker_cli::cli::run().await
}
