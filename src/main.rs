use clap::Parser;
use emberdrop::cli::{load_settings, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    emberdrop::telemetry::init(cli.log_format);

    let result = match cli.command {
        Commands::Serve(args) => match load_settings(&cli.config, args) {
            Ok(settings) => emberdrop::cli::commands::serve::execute(settings).await,
            Err(e) => Err(e),
        },
        Commands::Generate { length, special } => {
            emberdrop::cli::commands::generate::execute(length, special)
        }
        Commands::Config(args) => emberdrop::cli::commands::config_cmd::execute(&cli.config, args),
        Commands::Completions { shell } => emberdrop::cli::commands::completions::execute(shell),
    };

    if let Err(e) = result {
        emberdrop::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}
