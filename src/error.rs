//! Error types.

use thiserror::Error;

/// Result alias for dns-changer operations.
pub type Result<T> = std::result::Result<T, ChangerError>;

/// Errors returned by mutating operations.
///
/// Read paths (registry loading, state detection, probes) never return
/// these; they degrade to empty / `"Unknown"` / `false` instead. The
/// `Display` text of every variant is meant to be shown to the user as-is.
#[derive(Debug, Error)]
pub enum ChangerError {
    /// Filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A provider with this name is already in the mapping.
    #[error("A DNS with that name already exists: {name}")]
    DuplicateName {
        /// The colliding name.
        name: String,
    },

    /// No provider with this name is in the mapping.
    #[error("Unknown DNS provider: {name}")]
    UnknownProvider {
        /// The requested name.
        name: String,
    },

    /// Nothing has been stored for the promo provider yet.
    #[error("No NextDNS block configured.")]
    NoPromoConfig,

    /// The credential prompt was cancelled or returned nothing.
    #[error("Sudo password not provided.")]
    NoCredential,

    /// The elevation tool rejected the cached credential.
    #[error("Wrong password! Please try again.")]
    WrongCredential,

    /// A privileged command exited unsuccessfully for a reason other than
    /// authentication. Carries the command's diagnostic output.
    #[error("{message}")]
    Command {
        /// Trimmed stderr of the command, or a description of the failure.
        message: String,
    },

    /// The resolver file was replaced but the service restart failed, so
    /// the new configuration is on disk but not yet active.
    #[error("Configuration written, but restarting the resolver failed: {cause}")]
    PartialApply {
        /// Why the restart failed. Part of the message, not chained as a
        /// source, so it is printed once.
        cause: Box<ChangerError>,
    },

    /// The backup directory is missing or holds no backups.
    #[error("No backups available.")]
    NoBackups,

    /// The backup directory does not exist.
    #[error("No backup directory exists.")]
    NoBackupDirectory,

    /// A backup name that would escape the backup directory.
    #[error("invalid backup name: {name}")]
    InvalidBackupName {
        /// The rejected name.
        name: String,
    },
}

impl ChangerError {
    /// Returns `true` if the underlying I/O error is `PermissionDenied`.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied)
    }

    /// Returns `true` for failures caused by the elevation credential, in
    /// which case retrying the same operation will prompt again.
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        match self {
            Self::NoCredential | Self::WrongCredential => true,
            Self::PartialApply { cause } => cause.is_credential_error(),
            _ => false,
        }
    }
}
