use super::ChangeEvent;
use std::collections::HashSet;
use std::hash::Hash;

/// Membership difference between two reference sets
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetDiff<R> {
    /// In the new set but not the old one
    pub added: Vec<R>,

    /// In the old set but not the new one
    pub removed: Vec<R>,
}

impl<R> SetDiff<R> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Flatten into notifications: every removal first, then every addition.
    pub fn into_events(self) -> Vec<ChangeEvent<R>> {
        self.removed
            .into_iter()
            .map(ChangeEvent::Removed)
            .chain(self.added.into_iter().map(ChangeEvent::Added))
            .collect()
    }
}

/// Compute `new - old` and `old - new` by reference identity.
pub fn diff<R>(old: &HashSet<R>, new: &HashSet<R>) -> SetDiff<R>
where
    R: Eq + Hash + Clone,
{
    SetDiff {
        added: new.difference(old).cloned().collect(),
        removed: old.difference(new).cloned().collect(),
    }
}
