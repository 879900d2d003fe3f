#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use hoist_core::pkg::{InstallOptions, SaveTarget};
use hoist_core::{paths, Config};
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hoist")]
#[command(author, version, about = "Plans node_modules installs as add/update/remove actions", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Plan an install of the project's dependencies or of the given packages
    Install {
        /// Packages to install (name, name@range, ./folder, tarball URL)
        specs: Vec<String>,

        /// Record the packages in dependencies
        #[arg(short = 'S', long)]
        save: bool,

        /// Record the packages in devDependencies
        #[arg(short = 'D', long)]
        save_dev: bool,

        /// Record the packages in optionalDependencies
        #[arg(short = 'O', long)]
        save_optional: bool,

        /// Record exact versions instead of ranges
        #[arg(short = 'E', long)]
        save_exact: bool,

        /// Skip devDependencies
        #[arg(long)]
        production: bool,

        /// Registry base URL
        #[arg(long, value_name = "URL", env = "HOIST_REGISTRY")]
        registry: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        None | Some(Commands::Version) => commands::version::run(),
        Some(Commands::Install {
            specs,
            save,
            save_dev,
            save_optional,
            save_exact,
            production,
            registry,
        }) => {
            config = config.with_registry(registry);
            let target = SaveTarget::from_flags(!specs.is_empty(), save, save_dev, save_optional);
            let options = InstallOptions::default()
                .with_production(production)
                .with_save(target)
                .with_save_exact(save_exact);
            // Without a package.json anywhere above, cwd is an empty project.
            let project_root = paths::project_root(&config.cwd).unwrap_or_else(|| config.cwd.clone());

            commands::install::run(
                commands::install::InstallAction {
                    project_root,
                    specs,
                    options,
                },
                &config,
            )
        }
    }
}
