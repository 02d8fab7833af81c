use clap::Parser;
use petstyle::config::setup_logging;
use petstyle::web::AppState;
use tracing::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = petstyle::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let state = match AppState::from_cli(&cli) {
        Ok(state) => state,
        Err(err) => {
            error!("Configuration error: {}", err);
            return;
        }
    };

    if let Err(err) =
        petstyle::web::setup_server(&cli.listen_address, cli.port, cli.body_limit, state).await
    {
        error!("Application error: {}", err);
    }
}
