//! Native package manager command flavours

use crate::executor::Artifact;
use pkgd_platform::{PlatformCommand, STATUS_FD};
use pkgd_types::{Action, BackendKind, ChangeSet, PackageRef};
use std::sync::Arc;

/// One native invocation of an apply phase
#[derive(Debug, Clone)]
pub struct ApplyStep {
    pub command: PlatformCommand,
    /// Packages the invocation touches
    pub packages: Vec<(PackageRef, Action)>,
}

/// Builds the commands that apply a change set.
///
/// Apply commands write progress to [`STATUS_FD`] as colon-separated status
/// lines.
pub trait NativeBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Invocations applying `changes`, in execution order
    fn apply_steps(&self, changes: &ChangeSet, artifacts: &[Artifact]) -> Vec<ApplyStep>;

    /// Forced repair of a half-applied package database
    fn recover_command(&self) -> PlatformCommand;
}

/// Backend for the configured flavour
#[must_use]
pub fn for_kind(kind: BackendKind) -> Arc<dyn NativeBackend> {
    match kind {
        BackendKind::Apt => Arc::new(AptBackend::default()),
        BackendKind::Yum => Arc::new(YumBackend::default()),
    }
}

fn removals(changes: &ChangeSet) -> Vec<(PackageRef, Action)> {
    changes
        .iter()
        .filter(|(_, action)| !action.leaves_installed())
        .cloned()
        .collect()
}

/// Installs paired with their fetched artifact
fn installs<'a>(
    changes: &ChangeSet,
    artifacts: &'a [Artifact],
) -> Vec<((PackageRef, Action), &'a Artifact)> {
    changes
        .iter()
        .filter(|(_, action)| action.leaves_installed())
        .filter_map(|(package, action)| {
            let artifact = artifacts.iter().find(|a| a.package.as_ref() == Some(package));
            if artifact.is_none() {
                tracing::warn!(package = %package, "no artifact for package, skipping");
            }
            artifact.map(|a| ((package.clone(), *action), a))
        })
        .collect()
}

/// dpkg driven apply for APT systems
#[derive(Debug, Clone)]
pub struct AptBackend {
    pub dpkg: String,
}

impl Default for AptBackend {
    fn default() -> Self {
        Self {
            dpkg: "dpkg".to_string(),
        }
    }
}

impl AptBackend {
    fn dpkg(&self) -> PlatformCommand {
        let mut cmd = PlatformCommand::new(&self.dpkg);
        cmd.args(["--status-fd", STATUS_FD.to_string().as_str()])
            .args(["--force-confdef", "--force-confold"])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .env("DPKG_FRONTEND_LOCKED", "1")
            .env("APT_LISTCHANGES_FRONTEND", "none");
        cmd
    }
}

impl NativeBackend for AptBackend {
    fn name(&self) -> &str {
        "apt"
    }

    fn apply_steps(&self, changes: &ChangeSet, artifacts: &[Artifact]) -> Vec<ApplyStep> {
        let mut steps = Vec::new();

        let remove = removals(changes);
        if !remove.is_empty() {
            let mut command = self.dpkg();
            command.arg("--remove");
            for (package, _) in &remove {
                command.arg(format!("{}:{}", package.name, package.arch));
            }
            steps.push(ApplyStep {
                command,
                packages: remove,
            });
        }

        let install = installs(changes, artifacts);
        if !install.is_empty() {
            let mut command = self.dpkg();
            command.arg("--install");
            for (_, artifact) in &install {
                command.arg(artifact.path.display().to_string());
            }
            steps.push(ApplyStep {
                command,
                packages: install.into_iter().map(|(entry, _)| entry).collect(),
            });
        }

        steps
    }

    fn recover_command(&self) -> PlatformCommand {
        let mut cmd = self.dpkg();
        cmd.args(["--configure", "-a"]);
        cmd
    }
}

/// rpm driven apply for Yum systems.
///
/// rpm has no status descriptor of its own; `helper` runs the rpm
/// transaction and translates its callbacks into status lines.
#[derive(Debug, Clone)]
pub struct YumBackend {
    pub helper: String,
    pub rpm: String,
}

impl Default for YumBackend {
    fn default() -> Self {
        Self {
            helper: "/usr/libexec/pkgd/rpm-status".to_string(),
            rpm: "rpm".to_string(),
        }
    }
}

impl YumBackend {
    fn rpm(&self, mode: &str) -> PlatformCommand {
        let mut cmd = PlatformCommand::new(&self.helper);
        cmd.args(["--status-fd", STATUS_FD.to_string().as_str(), "--", self.rpm.as_str(), mode]);
        cmd
    }
}

impl NativeBackend for YumBackend {
    fn name(&self) -> &str {
        "yum"
    }

    fn apply_steps(&self, changes: &ChangeSet, artifacts: &[Artifact]) -> Vec<ApplyStep> {
        let mut steps = Vec::new();

        let install = installs(changes, artifacts);
        if !install.is_empty() {
            let mut command = self.rpm("-U");
            for (_, artifact) in &install {
                command.arg(artifact.path.display().to_string());
            }
            steps.push(ApplyStep {
                command,
                packages: install.into_iter().map(|(entry, _)| entry).collect(),
            });
        }

        // Obsoleted packages go away with the upgrade that replaces them
        let remove: Vec<_> = removals(changes)
            .into_iter()
            .filter(|(_, action)| *action == Action::Remove)
            .collect();
        if !remove.is_empty() {
            let mut command = self.rpm("-e");
            for (package, _) in &remove {
                command.arg(format!("{}-{}.{}", package.name, package.version, package.arch));
            }
            steps.push(ApplyStep {
                command,
                packages: remove,
            });
        }

        steps
    }

    fn recover_command(&self) -> PlatformCommand {
        let mut cmd = PlatformCommand::new(&self.rpm);
        cmd.arg("--rebuilddb");
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn changes() -> (ChangeSet, Vec<Artifact>) {
        let foo = PackageRef::new("foo", "1.0", "amd64", "repoA");
        let bar = PackageRef::new("bar", "2.0", "amd64", "repoA");
        let mut set = ChangeSet::new();
        set.push(foo.clone(), Action::Install).unwrap();
        set.push(bar, Action::Remove).unwrap();
        let artifacts = vec![Artifact {
            package: Some(foo),
            path: PathBuf::from("/var/cache/apt/archives/foo_1.0_amd64.deb"),
            digest: None,
        }];
        (set, artifacts)
    }

    #[test]
    fn test_apt_removes_before_installing() {
        let (set, artifacts) = changes();
        let steps = AptBackend::default().apply_steps(&set, &artifacts);

        assert_eq!(steps.len(), 2);
        assert!(steps[0].command.get_args().contains(&"--remove".to_string()));
        assert!(steps[0].command.get_args().contains(&"bar:amd64".to_string()));
        assert!(steps[1]
            .command
            .get_args()
            .contains(&"/var/cache/apt/archives/foo_1.0_amd64.deb".to_string()));
        assert_eq!(steps[1].packages[0].1, Action::Install);
    }

    #[test]
    fn test_apt_recovery_configures_pending() {
        let cmd = AptBackend::default().recover_command();
        assert_eq!(cmd.program(), "dpkg");
        assert!(cmd.get_args().ends_with(&["--configure".to_string(), "-a".to_string()]));
    }

    #[test]
    fn test_apt_dpkg_runs_under_held_frontend_lock() {
        let cmd = AptBackend::default().recover_command();
        assert!(cmd
            .get_env_vars()
            .contains(&("DPKG_FRONTEND_LOCKED".to_string(), "1".to_string())));
    }

    #[test]
    fn test_yum_uses_rpm_through_helper() {
        let (set, artifacts) = changes();
        let steps = YumBackend::default().apply_steps(&set, &artifacts);

        assert_eq!(steps.len(), 2);
        assert!(steps[0].command.get_args().contains(&"-U".to_string()));
        assert!(steps[1].command.get_args().contains(&"bar-2.0.amd64".to_string()));
        assert_eq!(YumBackend::default().recover_command().program(), "rpm");
    }
}
