//! The active tenant and its transition bookkeeping.

use std::fmt;

/// Process-wide record of which tenant is current.
///
/// `epoch` increases on every transition that clears the cache. Work started
/// under one epoch must not publish results into a later one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantContext {
    current: Option<String>,
    epoch: u64,
}

impl TenantContext {
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Records `next` as current without starting a new epoch.
    pub(crate) fn select(&mut self, next: Option<&str>) {
        self.current = next.map(str::to_owned);
    }

    /// Records `next` as current and starts a new epoch.
    pub(crate) fn advance(&mut self, next: Option<&str>) {
        self.current = next.map(str::to_owned);
        self.epoch += 1;
    }

    /// Whether a result stamped with `tenant` under `epoch` may still be published.
    pub(crate) fn accepts(&self, tenant: &str, epoch: u64) -> bool {
        epoch == self.epoch && self.current.as_deref().is_none_or(|current| current == tenant)
    }
}

/// What a call to `on_tenant_change` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantTransition {
    /// First tenant selection of the session; nothing to clear.
    Initial,
    /// The tenant did not actually change; nothing was cleared.
    Unchanged,
    /// A real switch: the cache was cleared and pending requests were detached.
    Switched {
        /// Cache entries removed.
        cleared: usize,
        /// In-flight records dropped; their results will be discarded on arrival.
        abandoned: usize,
    },
}

impl TenantTransition {
    pub fn is_switch(&self) -> bool {
        matches!(self, Self::Switched { .. })
    }
}

impl fmt::Display for TenantTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => f.write_str("initial tenant selection"),
            Self::Unchanged => f.write_str("tenant unchanged"),
            Self::Switched { cleared, abandoned } => write!(
                f,
                "tenant switched ({cleared} cache entries cleared, {abandoned} in-flight requests detached)"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_invalidates_older_epochs() {
        let mut ctx = TenantContext::default();
        ctx.select(Some("a"));
        assert!(ctx.accepts("a", 0));

        ctx.advance(Some("b"));
        assert_eq!(ctx.epoch(), 1);
        assert!(!ctx.accepts("a", 0));
        assert!(!ctx.accepts("a", 1));
        assert!(ctx.accepts("b", 1));
    }

    #[test]
    fn no_current_tenant_accepts_any_stamp_of_the_same_epoch() {
        let ctx = TenantContext::default();
        assert!(ctx.accepts("anyone", 0));
        assert!(!ctx.accepts("anyone", 1));
    }
}
