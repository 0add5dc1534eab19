//! Command line interface definition

use clap::{Parser, Subcommand};
use pkgd_types::{BackendKind, Filter, PackageRef};
use std::path::PathBuf;

/// pkgd - transaction engine for native package managers
#[derive(Parser)]
#[command(name = "pkgd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run package transactions against APT/dpkg or Yum/RPM")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Print transaction events as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Package catalog backing the cache
    #[arg(long, global = true, value_name = "PATH")]
    pub catalog: Option<PathBuf>,

    /// Native package manager flavour (apt or yum)
    #[arg(long, global = true, value_name = "KIND")]
    pub backend: Option<BackendKind>,
}

/// Available commands. Packages are given as `name;version;arch;origin`.
#[derive(Subcommand)]
pub enum Commands {
    /// Install packages and their dependencies
    #[command(alias = "i")]
    Install {
        #[arg(required = true)]
        packages: Vec<PackageRef>,
    },

    /// Remove packages
    #[command(alias = "rm")]
    Remove {
        #[arg(required = true)]
        packages: Vec<PackageRef>,

        /// Also remove packages that depend on the targets
        #[arg(long)]
        allow_deps: bool,
    },

    /// Update installed packages to the given versions
    #[command(alias = "up")]
    Update {
        #[arg(required = true)]
        packages: Vec<PackageRef>,
    },

    /// Upgrade every package with a newer candidate
    UpgradeSystem,

    /// Download fresh package indices
    Refresh,

    /// Search package names
    Search {
        #[arg(required = true)]
        terms: Vec<String>,

        #[arg(long, value_enum, default_value = "none")]
        filter: Filter,
    },

    /// Look up packages by exact name
    Resolve {
        #[arg(required = true)]
        names: Vec<String>,

        #[arg(long, value_enum, default_value = "none")]
        filter: Filter,
    },

    /// Fetch package artifacts into a directory without installing them
    Download {
        /// Destination directory
        #[arg(short, long)]
        dest: PathBuf,

        #[arg(required = true)]
        packages: Vec<PackageRef>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_package_ids() {
        let cli = Cli::try_parse_from(["pkgd", "install", "foo;1.0;amd64;repoA"]).unwrap();
        match cli.command {
            Commands::Install { packages } => {
                assert_eq!(packages, vec![PackageRef::new("foo", "1.0", "amd64", "repoA")]);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn rejects_bare_names_for_changes() {
        assert!(Cli::try_parse_from(["pkgd", "remove", "foo"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pkgd",
            "search",
            "foo",
            "--filter",
            "installed",
            "--json",
            "--backend",
            "yum",
        ])
        .unwrap();
        assert!(cli.global.json);
        assert_eq!(cli.global.backend, Some(BackendKind::Yum));
        assert!(matches!(
            cli.command,
            Commands::Search {
                filter: Filter::Installed,
                ..
            }
        ));
    }
}
