use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Quiet by default; RUST_LOG=info or RUST_LOG=debug for round-trip details.
    // Logs go to stderr so JSON on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    searchd_client::run()
}
