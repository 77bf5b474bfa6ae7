use std::net::SocketAddr;

use spikr_testserver::{TestServerConfig, TestServerStats};
use tokio::net::TcpListener;
use tokio::time::Duration;

const USAGE: &str = "spikr-testserver\n\nUSAGE:\n  spikr-testserver [--bind 127.0.0.1:0] [--latency-ms N] [--fail-every N]\n\nOUTPUT:\n  Prints BASE_URL=<url> to stdout once ready.";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut config = TestServerConfig::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "--latency-ms" => {
                let ms = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--latency-ms requires a value"))?;
                config = config.with_latency(Duration::from_millis(ms.parse()?));
            }
            "--fail-every" => {
                let n = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--fail-every requires a value"))?;
                config = config.with_fail_every(n.parse()?);
            }
            "-h" | "--help" => {
                eprintln!("{USAGE}");
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let app = spikr_testserver::router(config, TestServerStats::default());

    println!("BASE_URL=http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
