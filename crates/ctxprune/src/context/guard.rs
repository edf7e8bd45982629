//! Structural filter keeping internal bookkeeping out of user transcripts.
//!
//! Context-info notes, nudges, prune tool calls and squash summaries are
//! tagged internal when created. The guard drops them from any view
//! regardless of their status, then applies the caller's own visibility
//! predicate to what remains.

use crate::history::{HistoryView, ViewItem};

type VisibilityPredicate = Box<dyn Fn(&ViewItem<'_>) -> bool + Send + Sync>;

/// Filters a [`HistoryView`] down to user-visible items.
pub struct InjectionGuard {
    predicate: VisibilityPredicate,
}

impl std::fmt::Debug for InjectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionGuard").finish_non_exhaustive()
    }
}

impl InjectionGuard {
    /// Guard with an extra visibility predicate. Internal items are dropped
    /// before the predicate is consulted.
    pub fn new(predicate: impl Fn(&ViewItem<'_>) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }

    /// Guard that only drops internal items.
    pub fn allow_all() -> Self {
        Self::new(|_| true)
    }

    /// Whether `item` may be shown to the user.
    pub fn is_visible(&self, item: &ViewItem<'_>) -> bool {
        !item.is_internal() && (self.predicate)(item)
    }

    pub fn filter<'a>(&self, view: &HistoryView<'a>) -> HistoryView<'a> {
        HistoryView::new(
            view.items()
                .iter()
                .filter(|item| self.is_visible(item))
                .copied()
                .collect(),
        )
    }
}

impl Default for InjectionGuard {
    fn default() -> Self {
        Self::allow_all()
    }
}
