//! Watch registrations.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ServerError;
use crate::live_reload::ShellAction;

/// Patterns ignored by every registration unless replaced with
/// [`WatchRegistration::with_ignore`]. Matched relative to the watched path.
pub const DEFAULT_IGNORE: &[&str] = &[".git/**", "**/.*.swp", "**/*~"];

/// A path to watch, how long to debounce it, and what to run on change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchRegistration {
    pub(crate) path: PathBuf,
    pub(crate) delay: Duration,
    pub(crate) action: Option<ShellAction>,
    pub(crate) ignore: Vec<String>,
}

impl WatchRegistration {
    /// Watch `path` (recursively, if it is a directory) with the given delay.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, delay: Duration) -> Self {
        Self {
            path: path.into(),
            delay,
            action: None,
            ignore: DEFAULT_IGNORE.iter().map(|&p| p.to_owned()).collect(),
        }
    }

    /// Run `action` after each debounced change, before notifying browsers.
    #[must_use]
    pub fn with_action(mut self, action: ShellAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Replace the ignore patterns.
    #[must_use]
    pub fn with_ignore(mut self, patterns: Vec<String>) -> Self {
        self.ignore = patterns;
        self
    }

    /// The watched path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The debounce delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// The build action, if any.
    #[must_use]
    pub fn action(&self) -> Option<&ShellAction> {
        self.action.as_ref()
    }

    /// Resolve the path to its canonical form, failing if it does not exist.
    pub(crate) fn canonicalized(mut self) -> Result<Self, ServerError> {
        self.path = match std::fs::canonicalize(&self.path) {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ServerError::WatchPathNotFound(self.path));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_default_ignores() {
        let registration = WatchRegistration::new(".", Duration::from_secs(1));

        assert_eq!(registration.ignore, DEFAULT_IGNORE);
        assert!(registration.action().is_none());
    }

    #[test]
    fn test_with_ignore_replaces_defaults() {
        let registration =
            WatchRegistration::new(".", Duration::from_secs(1)).with_ignore(vec!["*.o".to_owned()]);

        assert_eq!(registration.ignore, vec!["*.o".to_owned()]);
    }

    #[test]
    fn test_canonicalized_missing_path() {
        let err = WatchRegistration::new("/nonexistent/devsrv/src", Duration::from_secs(1))
            .canonicalized()
            .unwrap_err();

        assert!(matches!(err, ServerError::WatchPathNotFound(_)));
    }

    #[test]
    fn test_canonicalized_resolves_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("web");
        std::fs::create_dir(&nested).unwrap();

        let registration = WatchRegistration::new(nested.join(".."), Duration::from_secs(1))
            .canonicalized()
            .unwrap();

        assert_eq!(registration.path(), dir.path().canonicalize().unwrap());
    }
}
