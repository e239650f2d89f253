//! Allow/block list evaluation shared by every policy dimension.

/// A pair of optional allow and block lists.
///
/// Rules, in order:
/// - neither list configured: everything is permitted
/// - an allow list is configured: default is deny
/// - a block match denies
/// - an allow match permits, overriding any block match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    allow: Option<Vec<String>>,
    block: Option<Vec<String>>,
}

impl ListFilter {
    /// Creates a filter from optional lists.
    #[must_use]
    pub fn new(allow: Option<Vec<String>>, block: Option<Vec<String>>) -> Self {
        Self { allow, block }
    }

    /// A filter that permits everything.
    #[must_use]
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// Returns true when at least one list is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.allow.is_some() || self.block.is_some()
    }

    /// Evaluates the lists with a caller-supplied matcher over list entries.
    pub fn permits_by<F>(&self, matches: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        if !self.is_configured() {
            return true;
        }

        if let Some(allow) = &self.allow
            && allow.iter().any(|entry| matches(entry))
        {
            return true;
        }
        if let Some(block) = &self.block
            && block.iter().any(|entry| matches(entry))
        {
            return false;
        }
        self.allow.is_none()
    }

    /// Case-insensitive exact match against `value`.
    #[must_use]
    pub fn permits(&self, value: &str) -> bool {
        self.permits_by(|entry| entry.eq_ignore_ascii_case(value))
    }

    /// Substring match against `value`, ignoring empty and blank entries.
    #[must_use]
    pub fn permits_containing(&self, value: &str) -> bool {
        self.permits_by(|entry| !entry.trim().is_empty() && value.contains(entry))
    }

    /// Exact match where any of `values` may hit an entry.
    #[must_use]
    pub fn permits_any<'a, I>(&self, values: I) -> bool
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        self.permits_by(|entry| values.clone().into_iter().any(|v| v == entry))
    }
}
