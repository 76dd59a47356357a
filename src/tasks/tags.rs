//! Tag reconciliation.
//!
//! Tag names are normalized (trimmed, lower-cased) before any comparison, so `" Work"`
//! and `"work"` name the same tag. Planning is pure: the store computes a [`TagPlan`]
//! inside its transaction and then applies it, reusing tag rows by name and creating
//! missing ones.

use std::collections::BTreeSet;

/// Normalizes a tag name; returns `None` for blank input.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes a list of tag names, dropping blanks and collapsing duplicates.
pub fn normalize_tags<I, S>(raw: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|tag| normalize_tag(tag.as_ref()))
        .collect()
}

/// The association changes needed to move a task from its stored tag set to a desired one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagPlan {
    /// Drop every association of the task.
    ClearAll,
    /// Remove the listed associations and add the listed ones.
    Apply {
        remove: BTreeSet<String>,
        add: BTreeSet<String>,
    },
}

impl TagPlan {
    /// Whether applying the plan would leave the associations unchanged.
    pub fn is_noop(&self) -> bool {
        match self {
            TagPlan::ClearAll => false,
            TagPlan::Apply { remove, add } => remove.is_empty() && add.is_empty(),
        }
    }
}

/// Plan for a task that has no stored associations yet: only the "add" half.
pub fn plan_for_new_task(desired: &BTreeSet<String>) -> TagPlan {
    TagPlan::Apply {
        remove: BTreeSet::new(),
        add: desired.clone(),
    }
}

/// Diffs the stored tag names of a task against the desired (normalized) set.
///
/// An empty desired set short-circuits to [`TagPlan::ClearAll`].
pub fn reconcile(existing: &BTreeSet<String>, desired: &BTreeSet<String>) -> TagPlan {
    if desired.is_empty() {
        return TagPlan::ClearAll;
    }
    TagPlan::Apply {
        remove: existing.difference(desired).cloned().collect(),
        add: desired.difference(existing).cloned().collect(),
    }
}
