// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Handle and manager configuration.

use std::time::Duration;

use strata_tier::{Error, ExpirationMode, Result};

/// Default number of retries for optimistic updates and the add-or-update loop.
pub const DEFAULT_MAX_RETRIES: u32 = 50;

/// How a read hit in a deeper handle is propagated to the handles in front of it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UpdateMode {
    /// Leave the other handles untouched.
    None,
    /// Add the item to every handle with a lower index than the one that produced the hit.
    #[default]
    Up,
}

/// Configuration of a single cache handle.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use strata::{CacheHandleConfiguration, ExpirationMode};
///
/// let config = CacheHandleConfiguration::new("local")
///     .with_expiration(ExpirationMode::Sliding, Duration::from_secs(60))
///     .with_statistics(false);
///
/// assert_eq!(config.name(), "local");
/// assert!(!config.enable_statistics());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheHandleConfiguration {
    name: String,
    expiration_mode: ExpirationMode,
    expiration_timeout: Duration,
    enable_statistics: bool,
    is_backplane_source: bool,
}

impl CacheHandleConfiguration {
    /// Creates a configuration with statistics enabled and no default expiration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expiration_mode: ExpirationMode::Default,
            expiration_timeout: Duration::ZERO,
            enable_statistics: true,
            is_backplane_source: false,
        }
    }

    /// Sets the expiration applied to items that don't choose their own.
    #[must_use]
    pub fn with_expiration(mut self, mode: ExpirationMode, timeout: Duration) -> Self {
        self.expiration_mode = mode;
        self.expiration_timeout = timeout;
        self
    }

    /// Enables or disables statistics collection.
    #[must_use]
    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.enable_statistics = enabled;
        self
    }

    /// Marks the handle as the authoritative source for backplane notifications.
    ///
    /// Inbound backplane messages evict from every handle except this one.
    #[must_use]
    pub fn as_backplane_source(mut self) -> Self {
        self.is_backplane_source = true;
        self
    }

    /// Returns the handle name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the default expiration mode.
    #[must_use]
    pub fn expiration_mode(&self) -> ExpirationMode {
        self.expiration_mode
    }

    /// Returns the default expiration timeout.
    #[must_use]
    pub fn expiration_timeout(&self) -> Duration {
        self.expiration_timeout
    }

    /// Returns `true` if statistics are collected.
    #[must_use]
    pub fn enable_statistics(&self) -> bool {
        self.enable_statistics
    }

    /// Returns `true` if this is the backplane source handle.
    #[must_use]
    pub fn is_backplane_source(&self) -> bool {
        self.is_backplane_source
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::configuration("handle name must not be empty"));
        }
        if self.expiration_mode.requires_timeout() && self.expiration_timeout.is_zero() {
            return Err(Error::configuration(format!(
                "handle '{}' uses {:?} expiration without a timeout",
                self.name, self.expiration_mode
            )));
        }
        Ok(())
    }
}

/// Configuration of a cache manager, as validated by the builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheManagerConfiguration {
    pub(crate) name: String,
    pub(crate) update_mode: UpdateMode,
    pub(crate) max_retries: u32,
    pub(crate) handles: Vec<CacheHandleConfiguration>,
    pub(crate) has_backplane: bool,
}

impl CacheManagerConfiguration {
    /// Returns the manager name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the read propagation mode.
    #[must_use]
    pub fn update_mode(&self) -> UpdateMode {
        self.update_mode
    }

    /// Returns the retry budget for updates.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the handle configurations in priority order.
    #[must_use]
    pub fn handles(&self) -> &[CacheHandleConfiguration] {
        &self.handles
    }

    /// Returns `true` if a backplane is configured.
    #[must_use]
    pub fn has_backplane(&self) -> bool {
        self.has_backplane
    }

    /// Returns the index of the backplane source handle, if any.
    #[must_use]
    pub fn backplane_source(&self) -> Option<usize> {
        self.handles.iter().position(CacheHandleConfiguration::is_backplane_source)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.handles.is_empty() {
            return Err(Error::configuration("a cache manager needs at least one handle"));
        }

        for (index, handle) in self.handles.iter().enumerate() {
            handle.validate()?;
            if self.handles[..index].iter().any(|other| other.name == handle.name) {
                return Err(Error::configuration(format!("handle name '{}' is used twice", handle.name)));
            }
        }

        let sources = self.handles.iter().filter(|handle| handle.is_backplane_source).count();
        if !self.has_backplane {
            if sources > 0 {
                return Err(Error::configuration("a backplane source handle requires a backplane"));
            }
            return Ok(());
        }

        match sources {
            0 => Err(Error::configuration("a backplane requires exactly one backplane source handle")),
            1 if self.handles.last().is_some_and(CacheHandleConfiguration::is_backplane_source) => Ok(()),
            1 => Err(Error::configuration("the backplane source handle must be the last handle")),
            _ => Err(Error::configuration("only one handle may be the backplane source")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(handles: Vec<CacheHandleConfiguration>, has_backplane: bool) -> CacheManagerConfiguration {
        CacheManagerConfiguration {
            name: "test".to_string(),
            update_mode: UpdateMode::Up,
            max_retries: DEFAULT_MAX_RETRIES,
            handles,
            has_backplane,
        }
    }

    #[test]
    fn handle_defaults() {
        let config = CacheHandleConfiguration::new("h");

        assert_eq!(config.expiration_mode(), ExpirationMode::Default);
        assert_eq!(config.expiration_timeout(), Duration::ZERO);
        assert!(config.enable_statistics());
        assert!(!config.is_backplane_source());
    }

    #[test]
    fn timed_handle_expiration_requires_timeout() {
        let config = CacheHandleConfiguration::new("h").with_expiration(ExpirationMode::Absolute, Duration::ZERO);
        assert!(config.validate().unwrap_err().is_configuration());

        let config = CacheHandleConfiguration::new("h").with_expiration(ExpirationMode::None, Duration::ZERO);
        config.validate().unwrap();
    }

    #[test]
    fn requires_handles() {
        assert!(manager(Vec::new(), false).validate().unwrap_err().is_configuration());
    }

    #[test]
    fn rejects_duplicate_and_blank_names() {
        let duplicate = manager(
            vec![CacheHandleConfiguration::new("a"), CacheHandleConfiguration::new("a")],
            false,
        );
        assert!(duplicate.validate().is_err());

        let blank = manager(vec![CacheHandleConfiguration::new(" ")], false);
        assert!(blank.validate().is_err());
    }

    #[test]
    fn backplane_source_rules() {
        let source = || CacheHandleConfiguration::new("remote").as_backplane_source();
        let local = || CacheHandleConfiguration::new("local");

        manager(vec![local(), source()], true).validate().unwrap();
        assert!(manager(vec![local()], true).validate().is_err());
        assert!(manager(vec![source(), local()], true).validate().is_err());
        assert!(manager(vec![local(), source()], false).validate().is_err());

        let two = manager(
            vec![
                CacheHandleConfiguration::new("a").as_backplane_source(),
                CacheHandleConfiguration::new("b").as_backplane_source(),
            ],
            true,
        );
        assert!(two.validate().is_err());
    }

    #[test]
    fn backplane_source_index() {
        let config = manager(
            vec![CacheHandleConfiguration::new("a"), CacheHandleConfiguration::new("b").as_backplane_source()],
            true,
        );
        assert_eq!(config.backplane_source(), Some(1));
    }
}
