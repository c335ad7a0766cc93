use clap::{Parser, Subcommand};
use quire::{builder, config, output};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Static site generator with incremental builds")]
#[command(long_about = "\
Static site generator with incremental builds

Project structure:

  my-site/
  ├── config.toml                  # Site config (optional)
  ├── content/
  │   ├── index.md                 # → index.html
  │   ├── about.md                 # → about.html
  │   ├── authors.yaml             # Data, referenced via `data:` in front-matter
  │   └── blog/
  │       ├── _index.md            # → blog/index.html
  │       └── first.md             # → blog/first.html
  ├── static/                      # Copied verbatim (images get resized copies)
  └── templates/
      ├── base.html
      └── default.html

Only pages whose inputs changed are rebuilt. Inputs are the page source, its
effective metadata, its template and everything that template extends or
includes, referenced data files, children (for section pages) and the
post-processor settings.

Run 'quire gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Project root
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file (default: <root>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site into the output directory
    Build {
        /// Ignore the previous build's cache and render every page
        #[arg(long)]
        no_cache: bool,
    },
    /// Collect and plan the site without writing anything
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every node succeeded.
fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    match cli.command {
        Command::Build { no_cache } => {
            let site_config = load_config(&cli.root, cli.config.as_deref())?;
            let output_dir = site_config.output_path(&cli.root);
            println!("==> Building {}", cli.root.display());
            let report = builder::build_project(&cli.root, site_config, !no_cache)?;
            output::print_build_output(&report);
            if report.is_success() {
                println!("==> Build complete: {}", output_dir.display());
            }
            Ok(report.is_success())
        }
        Command::Check => {
            let site_config = load_config(&cli.root, cli.config.as_deref())?;
            println!("==> Checking {}", cli.root.display());
            let report = builder::check_project(&cli.root, site_config)?;
            output::print_check_output(&report);
            if report.is_success() {
                println!("==> Site is valid");
            }
            Ok(report.is_success())
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(true)
        }
    }
}

fn load_config(root: &Path, explicit: Option<&Path>) -> Result<config::SiteConfig, config::ConfigError> {
    match explicit {
        Some(path) => config::load_config_file(path),
        None => config::load_config(root),
    }
}

/// `RUST_LOG` wins; otherwise `-v` raises the default level.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "quire=info",
        1 => "quire=debug",
        _ => "quire=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
