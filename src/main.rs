use anyhow::Result;
use clap::Parser;
use swagger_to_sdk::cli::{run, Cli};
use swagger_to_sdk::telemetry;
use swagger_to_sdk_core::context::RunContext;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    telemetry::init(cli.verbose, cli.debug);

    let ctx = RunContext::from_env();
    tracing::debug!(ctx = ?ctx, "Run context loaded");

    let result = run(cli, ctx).await;
    match &result {
        Ok(report) => {
            println!("Build SDK complete.\nReport:");
            println!("{:#?}", report);
        }
        Err(e) => tracing::error!(error = %e, "CLI exited with error"),
    }
    result.map(|_| ())
}
