use std::path::Path;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use backup_cloud::adapters::keyrings::KeyRingBackend;
use backup_cloud::cli::context::Session;
use backup_cloud::cli::{Cli, Commands, commands, output};
use backup_cloud::config::app_config::AppConfig;
use backup_cloud::core::errors::Result;

fn main() {
    let args = Cli::parse();
    init_tracing(args.verbose, args.quiet, &args.config);

    if let Err(e) = run(&args) {
        output::error(&format!("Error: {e}"));
        std::process::exit(1);
    }
}

fn run(args: &Cli) -> Result<()> {
    match &args.command {
        Commands::Object {
            src_bucket,
            src_key,
            dest_key,
        } => commands::object::execute(&Session::open(args)?, src_bucket, src_key, dest_key),
        Commands::File { path, dest_key } => {
            commands::file::execute(&Session::open(args)?, path, dest_key)
        }
        Commands::Upload { dir, dest_path } => {
            commands::upload::execute(&Session::open(args)?, dir, dest_path)
        }
        Commands::Recipients => commands::recipients::execute(&Session::open(args)?),
        Commands::Target => commands::target::execute(&Session::open(args)?),
        Commands::Keygen { uid, out } => commands::keygen::execute(uid, out, args.quiet),
        Commands::Decrypt {
            file,
            identity,
            out,
        } => {
            let backend = match &args.cipher {
                Some(name) => name.parse()?,
                None => KeyRingBackend::default(),
            };
            commands::decrypt::execute(file, identity, out.as_deref(), backend, args.quiet)
        }
    }
}

/// Initialize tracing on stderr.
///
/// `RUST_LOG` wins; otherwise `-q` means errors only, `-v`/`-vv` raise the
/// level, and the default comes from `[log] level` in the config file.
fn init_tracing(verbose: u8, quiet: bool, config: &Path) {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => {
                let level = AppConfig::load(config)
                    .map(|c| c.log.level)
                    .unwrap_or_else(|_| "warn".to_string());
                EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"))
            }
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
