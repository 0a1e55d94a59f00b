use clap::Parser;
use fusetrader::cli::{run, Cli};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> std::process::ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: failed to install log subscriber: {e}");
    }

    run(Cli::parse())
}
