#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quota_ledger::server::run().await
}
