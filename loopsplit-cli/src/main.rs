// CLI application
use clap::Parser;
use std::path::PathBuf;

use loopsplit_cli::commands;
use loopsplit_cli::walker::Exclusions;

/// Rewrites JVM class files in place to eliminate irreducible loops from
/// compiled method bodies.
#[derive(Parser)]
#[command(name = "loopsplit")]
#[command(about = "Eliminates irreducible loops from JVM class files")]
#[command(version)]
struct Cli {
    /// `.class` or `.jar` paths to rewrite in place; anything else is ignored.
    paths: Vec<PathBuf>,

    /// Comma-separated internal package prefixes to leave untouched (dots
    /// are converted to slashes, e.g. `com.example.internal`).
    #[arg(long = "excludePackages")]
    exclude_packages: Option<String>,

    /// Comma-separated internal class names to leave untouched.
    #[arg(long = "excludeClasses")]
    exclude_classes: Option<String>,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if cli.paths.is_empty() {
        eprintln!("error: no input paths given");
        std::process::exit(1);
    }

    let exclusions = Exclusions::parse(cli.exclude_packages.as_deref(), cli.exclude_classes.as_deref());
    let any_failed = commands::run(&cli.paths, &exclusions);
    if any_failed {
        std::process::exit(1);
    }
}
