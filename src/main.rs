use blogsphere::{config::Config, init_tracing, run_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    if let Err(error) = run_app(config).await {
        tracing::error!(%error, "server stopped with an error");
        return Err(error);
    }
    Ok(())
}
