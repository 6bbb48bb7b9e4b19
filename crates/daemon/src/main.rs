use std::process;

use clap::Parser;
use tracing::{error, info};

use siprec_daemon::cli::Cli;
use siprec_daemon::{exit_codes, Config, SipServer};
use siprec_infra_common::logging::init_logging;

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("siprecd: {}", err);
            process::exit(err.exit_code());
        }
    };

    let mut logging = config.logging();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    // the appender guard must outlive the runtime or buffered log lines
    // are lost on shutdown.
    let _guard = match init_logging(&logging) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("siprecd: {}", err);
            process::exit(exit_codes::EINVAL);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to initialize runtime: {}", err);
            process::exit(exit_codes::EAGAIN);
        }
    };

    let code = runtime.block_on(async {
        let server = match SipServer::start(config).await {
            Ok(server) => server,
            Err(err) => {
                error!("{}", err);
                return err.exit_code();
            }
        };
        info!("siprecd {} listening on {}", env!("CARGO_PKG_VERSION"), server.local_addr());

        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to wait for interrupt: {}", err);
        }
        info!("interrupt received; shutting down");
        server.shutdown().await;
        exit_codes::OK
    });

    // flush the disk sink before the no-destructor exit below.
    drop(runtime);
    drop(_guard);
    process::exit(code);
}
