#[tokio::main]
async fn main() {
    if let Err(e) = boletim_lib::run().await {
        tracing::error!(error = %e, "Startup failed");
        eprintln!("boletim: {e}");
        std::process::exit(1);
    }
}
