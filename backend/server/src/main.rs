#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kisan_server::start_server().await
}
