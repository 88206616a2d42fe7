//! Installing a new resolver configuration.
//!
//! Installation is two privileged steps: copy the file over the system
//! resolver config, then restart the resolver service. They are not atomic
//! together. If the restart fails after the copy succeeded, the new file is
//! on disk but not active; this is reported as
//! [`ChangerError::PartialApply`] and can be finished with
//! [`ResolverWriter::restart`] without copying again.

use crate::config::ChangerConfig;
use crate::error::{ChangerError, Result};
use crate::privileged::PrivilegedExecutor;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes the system resolver configuration through a [`PrivilegedExecutor`].
#[derive(Debug, Clone)]
pub struct ResolverWriter {
    target: PathBuf,
    scratch_dir: PathBuf,
    copy_program: String,
    systemctl_program: String,
    service: String,
}

impl ResolverWriter {
    /// Creates a writer for the resolver file and service named by `config`.
    #[must_use]
    pub fn new(config: &ChangerConfig) -> Self {
        Self {
            target: config.resolved_conf.clone(),
            scratch_dir: config.scratch_dir.clone(),
            copy_program: config.copy_program.clone(),
            systemctl_program: config.systemctl_program.clone(),
            service: config.service.clone(),
        }
    }

    /// Stages `config_text` in a private temp file and installs it.
    ///
    /// # Errors
    ///
    /// Returns [`ChangerError::Io`] if the staged file cannot be written, any
    /// [`PrivilegedExecutor::run`] error from the copy, or
    /// [`ChangerError::PartialApply`] if only the restart failed.
    pub fn apply(&self, exec: &mut PrivilegedExecutor, config_text: &str) -> Result<()> {
        let mut staged = tempfile::Builder::new()
            .prefix("dns-changer-")
            .suffix(".conf")
            .tempfile_in(&self.scratch_dir)?;
        staged.write_all(config_text.as_bytes())?;
        staged.flush()?;
        // `cp` keeps the source mode when it creates the target.
        staged
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;

        self.install(exec, staged.path())?;
        tracing::info!(path = %self.target.display(), "Applied resolver configuration");
        Ok(())
    }

    /// Copies `source` over the system resolver file, then restarts the
    /// resolver.
    ///
    /// # Errors
    ///
    /// Same as [`apply`](Self::apply), minus staging.
    pub fn install(&self, exec: &mut PrivilegedExecutor, source: &Path) -> Result<()> {
        let source = source.to_string_lossy();
        let target = self.target.to_string_lossy();
        exec.run(&[self.copy_program.as_str(), &*source, &*target])?;
        tracing::debug!(from = %source, to = %target, "Copied resolver configuration");

        self.restart(exec).map_err(|e| ChangerError::PartialApply {
            cause: Box::new(e),
        })
    }

    /// Restarts the resolver service.
    ///
    /// # Errors
    ///
    /// Any [`PrivilegedExecutor::run`] error.
    pub fn restart(&self, exec: &mut PrivilegedExecutor) -> Result<()> {
        exec.run(&[self.systemctl_program.as_str(), "restart", self.service.as_str()])?;
        tracing::info!(service = %self.service, "Restarted resolver service");
        Ok(())
    }

    /// The system resolver file this writer replaces.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }
}
