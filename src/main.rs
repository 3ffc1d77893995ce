//! `agentcore` binary entry point: parses CLI args and drives the agent
//! loop non-interactively. Terminal UI rendering is out of scope for this
//! crate (see lib.rs); this binary exists so the core can be exercised and
//! so downstream crates have a reference caller.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agentcore::cli::run().await
}
