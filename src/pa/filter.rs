//! Include/exclude glob filtering for pack/unpack (spec §4.3.3).

use crate::utils::glob_match;

#[derive(Debug, Default, Clone)]
pub struct EntryFilter {
    exclude: Vec<String>,
    include: Vec<String>,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude(mut self, glob: impl Into<String>) -> Self {
        self.exclude.push(glob.into());
        self
    }

    pub fn include(mut self, glob: impl Into<String>) -> Self {
        self.include.push(glob.into());
        self
    }

    /// A name is kept if it matches no exclude glob, and — when any
    /// include globs were given — matches at least one of them.
    pub fn keep(&self, name: &str) -> bool {
        if self.exclude.iter().any(|g| glob_match(g, name)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|g| glob_match(g, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_takes_precedence_and_include_restricts() {
        let filter = EntryFilter::new().exclude("*.bak").include("*.sqf");
        assert!(filter.keep("script.sqf"));
        assert!(!filter.keep("script.sqf.bak"));
        assert!(!filter.keep("config.hpp"));
    }

    #[test]
    fn no_include_list_keeps_everything_not_excluded() {
        let filter = EntryFilter::new().exclude("*.bak");
        assert!(filter.keep("a.txt"));
        assert!(!filter.keep("a.bak"));
    }
}
