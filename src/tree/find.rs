//! Fuzzy branch lookup: exact, then prefix, then substring, all
//! case-insensitive. Ties surface every candidate instead of guessing.

use super::StackTree;
use crate::errors::{PkError, PkResult};

/// The outcome of a fuzzy lookup before ambiguity is turned into an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    None,
    One(String),
    Many(Vec<String>),
}

impl StackTree {
    /// Resolves a fuzzy pattern to candidate branch names.
    pub fn find(&self, pattern: &str) -> Match {
        let needle = pattern.to_lowercase();

        let exact: Vec<String> = self
            .branches
            .keys()
            .filter(|name| name.to_lowercase() == needle)
            .cloned()
            .collect();
        if let Some(m) = Self::collapse(exact) {
            return m;
        }

        let prefix: Vec<String> = self
            .branches
            .keys()
            .filter(|name| name.to_lowercase().starts_with(&needle))
            .cloned()
            .collect();
        if let Some(m) = Self::collapse(prefix) {
            return m;
        }

        let substring: Vec<String> = self
            .branches
            .keys()
            .filter(|name| name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        Self::collapse(substring).unwrap_or(Match::None)
    }

    fn collapse(mut matches: Vec<String>) -> Option<Match> {
        match matches.len() {
            0 => None,
            1 => Some(Match::One(matches.remove(0))),
            _ => Some(Match::Many(matches)),
        }
    }

    /// Resolves a fuzzy pattern to exactly one branch, or errors.
    pub fn resolve(&self, pattern: &str) -> PkResult<String> {
        match self.find(pattern) {
            Match::One(name) => Ok(name),
            Match::None => Err(PkError::BranchNotTracked(pattern.to_string())),
            Match::Many(matches) => Err(PkError::AmbiguousMatch {
                pattern: pattern.to_string(),
                matches,
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree::{InsertPos, TrackedBranch};

    fn tree() -> StackTree {
        let mut tree = StackTree::new("main");
        for name in ["feat-auth", "feat-auth-ui", "fix-typo"] {
            tree.insert("main", TrackedBranch::new(name, None, "", None), InsertPos::Last)
                .unwrap();
        }
        tree
    }

    #[test]
    fn exact_beats_prefix() {
        // "feat-auth" is an exact match even though it prefixes feat-auth-ui.
        assert_eq!(tree().resolve("feat-auth").unwrap(), "feat-auth");
        assert_eq!(tree().resolve("FEAT-AUTH").unwrap(), "feat-auth");
    }

    #[test]
    fn prefix_beats_substring() {
        assert_eq!(tree().resolve("fix").unwrap(), "fix-typo");
    }

    #[test]
    fn substring_matches() {
        assert_eq!(tree().resolve("typo").unwrap(), "fix-typo");
    }

    #[test]
    fn ambiguity_surfaces_all_candidates() {
        let err = tree().resolve("auth").unwrap_err();
        match err {
            PkError::AmbiguousMatch { matches, .. } => {
                assert_eq!(matches, ["feat-auth", "feat-auth-ui"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn no_match_is_untracked() {
        assert!(matches!(
            tree().resolve("nope"),
            Err(PkError::BranchNotTracked(_))
        ));
    }
}
