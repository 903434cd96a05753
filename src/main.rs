//! tubeauth CLI binary entry point.

use tubeauth::cli::{Cli, Commands, LogFormat};
use tubeauth::config::AuthConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.log_format);

    let mut config = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };
    if let Some(dir) = cli.token_dir {
        config.token_dir = dir;
    }

    let result = match cli.command {
        Commands::Login => tubeauth::cli::auth::handle_login(&config).await,
        Commands::Status => tubeauth::cli::auth::handle_status(&config).await,
        Commands::Token => tubeauth::cli::auth::handle_token(&config).await,
        Commands::Account => tubeauth::cli::auth::handle_account(&config).await,
        Commands::Logout => tubeauth::cli::auth::handle_logout(&config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
