//! blitfeed - protocol replay with live injection

use clap::{CommandFactory, FromArgMatches};
use tracing::error;

use blitfeed_cli::{
    cli::Cli,
    logging::{level_for, setup_logging},
    ReplayApp,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments; usage errors exit with code 2
    let matches = Cli::command().get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    if let Err(e) = setup_logging(level_for(cli.verbose, cli.quiet), cli.output.as_deref()) {
        eprintln!("blitfeed: {}", e);
        std::process::exit(e.exit_code());
    }

    let app = match ReplayApp::from_cli(&cli, &matches) {
        Ok(app) => app,
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    let outcome = app.run().await;
    // Exit directly; a blocked stdin reader would otherwise stall runtime shutdown
    std::process::exit(outcome.exit_code());
}
