//! Session credential resolution.

use std::path::PathBuf;

use tracing::debug;

/// Default environment variable / dotenv key holding the session cookie
pub const DEFAULT_CREDENTIAL_VAR: &str = "CLAUDE_SESSION_COOKIE";

/// Supplies the session credential for one fetch attempt
pub trait CredentialSupplier: Send + Sync + 'static {
    /// Resolve the credential, or `None` when absent
    fn credential(&self) -> Option<String>;
}

/// Fixed credential, mainly for tests and embedding
pub struct StaticCredential(pub Option<String>);

impl CredentialSupplier for StaticCredential {
    fn credential(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Resolves the credential from the environment, then a dotenv file.
///
/// Re-read on every call so a rotated cookie is picked up without restart.
pub struct EnvCredentialSupplier {
    var: String,
    env_file: Option<PathBuf>,
}

impl EnvCredentialSupplier {
    pub fn new(var: impl Into<String>, env_file: Option<PathBuf>) -> Self {
        Self {
            var: var.into(),
            env_file,
        }
    }

    fn from_env_file(&self) -> Option<String> {
        let path = self.env_file.as_ref()?;
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(e) => {
                debug!("Credential file {:?} not readable: {}", path, e);
                return None;
            }
        };
        iter.filter_map(Result::ok)
            .find(|(key, _)| key == &self.var)
            .map(|(_, value)| value)
    }
}

impl Default for EnvCredentialSupplier {
    fn default() -> Self {
        Self::new(DEFAULT_CREDENTIAL_VAR, Some(PathBuf::from(".env")))
    }
}

/// Trimmed value, or `None` when blank
fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl CredentialSupplier for EnvCredentialSupplier {
    /// A blank environment value falls through to the dotenv file.
    fn credential(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .and_then(non_blank)
            .or_else(|| self.from_env_file().and_then(non_blank))
    }
}
