use dagsync_primitives::ContentId;

/// Describes which part of a DAG a traversal explores.
///
/// The default explores every reachable block. A recursion limit bounds the
/// link depth below the root (a limit of zero visits only the root), and a
/// stop node is neither visited nor descended into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    recursion_limit: Option<usize>,
    stop_at: Option<ContentId>,
}

impl Selector {
    #[must_use]
    pub const fn explore_all() -> Self {
        Self {
            recursion_limit: None,
            stop_at: None,
        }
    }

    #[must_use]
    pub const fn with_recursion_limit(mut self, limit: Option<usize>) -> Self {
        self.recursion_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_stop_at(mut self, cid: ContentId) -> Self {
        self.stop_at = Some(cid);
        self
    }

    /// Sets the stop node only if none was chosen yet.
    #[must_use]
    pub fn or_stop_at(mut self, cid: Option<ContentId>) -> Self {
        if self.stop_at.is_none() {
            self.stop_at = cid;
        }
        self
    }

    #[must_use]
    pub const fn recursion_limit(&self) -> Option<usize> {
        self.recursion_limit
    }

    #[must_use]
    pub const fn stop_at(&self) -> Option<ContentId> {
        self.stop_at
    }

    pub(crate) fn descends_below(&self, depth: usize) -> bool {
        self.recursion_limit.map_or(true, |limit| depth < limit)
    }

    pub(crate) fn is_stop(&self, cid: &ContentId) -> bool {
        self.stop_at.as_ref() == Some(cid)
    }
}
