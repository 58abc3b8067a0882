//! Obligation transfer demo host
//!
//! Starts three in-process nodes, issues an obligation from the borrower
//! to the lender and transfers it to a new lender:
//!
//! ```text
//! ┌──────────┐  issue   ┌──────────┐  transfer  ┌───────────┐
//! │ Borrower │─────────▶│  Lender  │───────────▶│ NewLender │
//! └──────────┘          └──────────┘            └───────────┘
//!                  all three record the same version
//! ```
//!
//! Usage: `obligation_transfer [--env dev]`

use anyhow::Context;
use tracing::info;

use obligation_transfer::config::AppConfig;
use obligation_transfer::logging::init_logging;
use obligation_transfer::node::LocalNetwork;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _guard = init_logging(&config)?;
    info!(env = %env, anonymous = config.protocol.anonymous, "Starting obligation transfer demo");

    let network = LocalNetwork::new(config.protocol.clone());
    let lender = network.create_node("O=Lender,L=London,C=GB");
    let borrower = network.create_node("O=Borrower,L=New York,C=US");
    let new_lender = network.create_node("O=NewLender,L=Paris,C=FR");
    let anonymous = config.protocol.anonymous;

    let issued = borrower
        .issue_obligation(lender.identity(), 1000, anonymous)
        .await
        .context("issuance failed")?;
    let linear_id = issued
        .tx
        .outputs()
        .first()
        .map(|o| o.linear_id)
        .context("issuance produced no obligation")?;
    info!(linear_id = %linear_id, tx_id = %issued.id().short(), "Issued");

    let transferred = lender
        .transfer_obligation(linear_id, new_lender.identity(), anonymous)
        .await
        .context("transfer failed")?;
    info!(tx_id = %transferred.id().short(), "Transferred");

    for node in [&lender, &borrower, &new_lender] {
        let state = node.vault().load_state(&transferred.tx.out_ref(0));
        let row = node.vault().index().get(&linear_id);
        info!(
            node = %node.identity(),
            state = %serde_json::to_string(&state)?,
            index_row = %serde_json::to_string(&row)?,
            "Recorded version"
        );
    }

    Ok(())
}
