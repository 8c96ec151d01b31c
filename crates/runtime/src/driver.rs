//! Locating the Playwright Node.js driver.
//!
//! Search order mirrors the official language bindings: explicit environment
//! overrides first, then npm installations as a development fallback.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Locate the driver, returning `(node_executable, cli_js)`.
///
/// Candidates are tried in order:
/// 1. `PLAYWRIGHT_NODE_EXE` + `PLAYWRIGHT_CLI_JS` environment variables
/// 2. `PLAYWRIGHT_DRIVER_PATH` (a driver directory with `node` and
///    `package/cli.js`)
/// 3. `npm root -g` then `npm root`, looking for the `playwright` or
///    `@playwright/test` package
///
/// A candidate whose node binary cannot run (`node --version` fails, e.g. a
/// dynamically-linked binary on NixOS) is retried with a node found on PATH.
///
/// # Errors
///
/// Returns [`Error::DriverNotFound`] when no candidate resolves.
pub fn get_driver_executable() -> Result<(PathBuf, PathBuf)> {
    if let Some((node, cli)) = from_node_cli_env() {
        if let Some(paths) = resolve_candidate_with_fallback(
            "PLAYWRIGHT_NODE_EXE/PLAYWRIGHT_CLI_JS",
            node,
            cli,
            find_node_executable,
        ) {
            return Ok(paths);
        }
    }

    if let Some((node, cli)) = from_driver_path_env() {
        if let Some(paths) = resolve_candidate_with_fallback(
            "PLAYWRIGHT_DRIVER_PATH",
            node,
            cli,
            find_node_executable,
        ) {
            return Ok(paths);
        }
    }

    for global in [true, false] {
        let label = if global { "npm global" } else { "npm local" };
        if let Some((node, cli)) = from_npm_root(global) {
            if let Some(paths) = resolve_candidate_with_fallback(label, node, cli, find_node_executable)
            {
                return Ok(paths);
            }
        }
    }

    Err(Error::DriverNotFound)
}

fn resolve_candidate_with_fallback<F>(
    label: &str,
    node: PathBuf,
    cli: PathBuf,
    find_node: F,
) -> Option<(PathBuf, PathBuf)>
where
    F: Fn() -> Result<PathBuf>,
{
    if node_is_usable(&node) {
        debug!(
            target = "probe.runtime",
            source = label,
            node = %node.display(),
            cli = %cli.display(),
            "using Playwright driver candidate"
        );
        return Some((node, cli));
    }

    warn!(
        target = "probe.runtime",
        source = label,
        node = %node.display(),
        cli = %cli.display(),
        "driver candidate node is not runnable; trying fallback node"
    );

    let fallback_node = find_node().ok()?;
    if fallback_node == node || !node_is_usable(&fallback_node) {
        return None;
    }

    warn!(
        target = "probe.runtime",
        source = label,
        node = %fallback_node.display(),
        cli = %cli.display(),
        "using fallback node executable for Playwright CLI"
    );
    Some((fallback_node, cli))
}

fn from_node_cli_env() -> Option<(PathBuf, PathBuf)> {
    let node = PathBuf::from(std::env::var("PLAYWRIGHT_NODE_EXE").ok()?);
    let cli = PathBuf::from(std::env::var("PLAYWRIGHT_CLI_JS").ok()?);
    (node.exists() && cli.exists()).then_some((node, cli))
}

fn from_driver_path_env() -> Option<(PathBuf, PathBuf)> {
    let driver_dir = PathBuf::from(std::env::var("PLAYWRIGHT_DRIVER_PATH").ok()?);
    let node = if cfg!(windows) {
        driver_dir.join("node.exe")
    } else {
        driver_dir.join("node")
    };
    let cli = driver_dir.join("package").join("cli.js");
    (node.exists() && cli.exists()).then_some((node, cli))
}

fn from_npm_root(global: bool) -> Option<(PathBuf, PathBuf)> {
    let args: &[&str] = if global { &["root", "-g"] } else { &["root"] };
    let output = Command::new("npm").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }

    let node_modules = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
    if !node_modules.exists() {
        return None;
    }
    find_playwright_in_node_modules(&node_modules)
}

fn node_is_usable(node: &Path) -> bool {
    Command::new(node)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn find_playwright_in_node_modules(node_modules: &Path) -> Option<(PathBuf, PathBuf)> {
    let package_dirs = [
        node_modules.join("playwright"),
        node_modules.join("@playwright").join("test"),
    ];

    for package_dir in &package_dirs {
        let cli_js = package_dir.join("cli.js");
        if !cli_js.exists() {
            continue;
        }
        if let Ok(node) = find_node_executable() {
            return Some((node, cli_js));
        }
    }

    None
}

/// Find a node executable on PATH or in common install locations.
fn find_node_executable() -> Result<PathBuf> {
    #[cfg(not(windows))]
    let which_cmd = "which";
    #[cfg(windows)]
    let which_cmd = "where";

    if let Ok(output) = Command::new(which_cmd).arg("node").output() {
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if let Some(first) = stdout.lines().next() {
                let path = PathBuf::from(first.trim());
                if path.exists() {
                    return Ok(path);
                }
            }
        }
    }

    #[cfg(not(windows))]
    let common_locations = [
        "/usr/local/bin/node",
        "/usr/bin/node",
        "/opt/homebrew/bin/node",
        "/opt/local/bin/node",
    ];

    #[cfg(windows)]
    let common_locations = [
        "C:\\Program Files\\nodejs\\node.exe",
        "C:\\Program Files (x86)\\nodejs\\node.exe",
    ];

    for location in &common_locations {
        let path = PathBuf::from(location);
        if path.exists() {
            return Ok(path);
        }
    }

    Err(Error::LaunchFailed(
        "Node.js executable not found. Install Node.js or set PLAYWRIGHT_NODE_EXE.".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use std::fs;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;
    #[cfg(unix)]
    use std::path::Path;

    #[cfg(unix)]
    use tempfile::TempDir;

    use super::*;

    #[cfg(unix)]
    fn write_mock_node(path: &Path, exit_code: i32) {
        let script = format!("#!/bin/sh\n[ \"$1\" = \"--version\" ]\nexit {exit_code}\n");
        fs::write(path, script).unwrap();
        let mut perms = fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).unwrap();
    }

    #[test]
    fn find_node_returns_existing_path_when_installed() {
        if let Ok(node_path) = find_node_executable() {
            assert!(node_path.exists());
        }
    }

    #[cfg(unix)]
    #[test]
    fn candidate_falls_back_to_second_node() {
        let temp = TempDir::new().unwrap();
        let candidate_node = temp.path().join("candidate-node");
        let fallback_node = temp.path().join("fallback-node");
        let cli_js = temp.path().join("cli.js");

        write_mock_node(&candidate_node, 1);
        write_mock_node(&fallback_node, 0);
        fs::write(&cli_js, "// cli").unwrap();

        let resolved =
            resolve_candidate_with_fallback("test", candidate_node, cli_js.clone(), || {
                Ok(fallback_node.clone())
            });

        assert_eq!(resolved, Some((fallback_node, cli_js)));
    }

    #[cfg(unix)]
    #[test]
    fn candidate_kept_when_node_is_usable() {
        let temp = TempDir::new().unwrap();
        let candidate_node = temp.path().join("candidate-node");
        let cli_js = temp.path().join("cli.js");

        write_mock_node(&candidate_node, 0);
        fs::write(&cli_js, "// cli").unwrap();

        let resolved =
            resolve_candidate_with_fallback("test", candidate_node.clone(), cli_js.clone(), || {
                panic!("fallback must not be consulted when the candidate node works");
            });

        assert_eq!(resolved, Some((candidate_node, cli_js)));
    }

    #[cfg(unix)]
    #[test]
    fn candidate_dropped_when_fallback_unavailable() {
        let temp = TempDir::new().unwrap();
        let candidate_node = temp.path().join("candidate-node");
        let cli_js = temp.path().join("cli.js");

        write_mock_node(&candidate_node, 1);
        fs::write(&cli_js, "// cli").unwrap();

        let resolved = resolve_candidate_with_fallback("test", candidate_node, cli_js, || {
            Err(Error::LaunchFailed("missing node".to_string()))
        });

        assert!(resolved.is_none());
    }
}
