//! Driver process lifecycle.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::driver::get_driver_executable;
use crate::error::{Error, Result};

/// A running `node cli.js run-driver` process speaking the protocol over
/// its stdio pipes.
pub struct DriverProcess {
    child: Child,
}

impl DriverProcess {
    /// Locate the driver and spawn it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverNotFound`] when no driver installation exists,
    /// or [`Error::LaunchFailed`] when the process cannot be spawned or exits
    /// immediately.
    pub async fn launch() -> Result<Self> {
        let (node_exe, cli_js) = get_driver_executable()?;
        debug!(
            target = "probe.runtime",
            node = %node_exe.display(),
            cli = %cli_js.display(),
            "spawning Playwright driver"
        );

        let mut child = Command::new(&node_exe)
            .arg(&cli_js)
            .arg("run-driver")
            .env("PW_LANG_NAME", "rust")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::LaunchFailed(format!("failed to spawn driver: {e}")))?;

        // A driver that dies instantly (bad node, broken install) would
        // otherwise surface as an opaque transport error later.
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Some(status) = child
            .try_wait()
            .map_err(|e| Error::LaunchFailed(format!("failed to poll driver: {e}")))?
        {
            return Err(Error::LaunchFailed(format!(
                "driver exited immediately with {status}"
            )));
        }

        Ok(Self { child })
    }

    /// Take the stdio pipes for the transport layer. Each can be taken once.
    pub fn take_pipes(&mut self) -> Result<(ChildStdin, ChildStdout)> {
        let stdin = self
            .child
            .stdin
            .take()
            .ok_or_else(|| Error::LaunchFailed("driver stdin already taken".to_string()))?;
        let stdout = self
            .child
            .stdout
            .take()
            .ok_or_else(|| Error::LaunchFailed("driver stdout already taken".to_string()))?;
        Ok((stdin, stdout))
    }

    /// Terminate the driver process and reap it.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.child.start_kill().ok();
        match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(status) => {
                status?;
                Ok(())
            }
            Err(_) => Err(Error::Timeout(
                "driver did not exit within 5s of being killed".to_string(),
            )),
        }
    }

    /// Best-effort synchronous kill, used from Drop paths.
    pub fn force_kill(&mut self) {
        self.child.start_kill().ok();
    }
}
