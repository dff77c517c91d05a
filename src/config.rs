/// Default bound, in bytes, on multipart value fields held in memory.
pub const DEFAULT_MULTIPART_MEMORY_LIMIT: usize = 10_240;

/// Default bound, in bytes, on a JSON or url-encoded body read into memory.
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 << 20;

/// Pipeline configuration shared by every invocation of a [`Binder`].
///
/// # Examples
///
/// ```
/// use param_bind::BindConfig;
///
/// let config = BindConfig::default()
///     .multipart_memory_limit(64 * 1024)
///     .max_body_size(1 << 20);
/// assert_eq!(config.get_multipart_memory_limit(), 65_536);
/// assert_eq!(config.get_max_body_size(), 1_048_576);
/// ```
///
/// [`Binder`]: crate::Binder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindConfig {
    multipart_memory_limit: usize,
    max_body_size: usize,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            multipart_memory_limit: DEFAULT_MULTIPART_MEMORY_LIMIT,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl BindConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the multipart in-memory bound. A multipart body whose value
    /// fields exceed it is skipped like any other multipart parse failure.
    #[must_use]
    pub fn multipart_memory_limit(mut self, bytes: usize) -> Self {
        self.multipart_memory_limit = bytes;
        self
    }

    /// Returns the multipart in-memory bound.
    pub fn get_multipart_memory_limit(&self) -> usize {
        self.multipart_memory_limit
    }

    /// Sets the largest JSON or url-encoded body that is read. A longer body
    /// fails extraction; multipart bodies are streamed and not subject to it.
    #[must_use]
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Returns the body size bound.
    pub fn get_max_body_size(&self) -> usize {
        self.max_body_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let config = BindConfig::new();
        assert_eq!(config.get_multipart_memory_limit(), DEFAULT_MULTIPART_MEMORY_LIMIT);
        assert_eq!(config.get_max_body_size(), 10_485_760);
    }

    #[test]
    fn limit_is_configurable() {
        let config = BindConfig::default().multipart_memory_limit(1).max_body_size(2);
        assert_eq!(config.get_multipart_memory_limit(), 1);
        assert_eq!(config.get_max_body_size(), 2);
    }
}
