//! Reader collection & lifecycle (spec.md §4.B).
//!
//! Grounded on `ndusart-pcsc-rust`'s `Context` + `ReaderState`, composed
//! into the higher-level policy spec.md asks for: one proxy per reader
//! name for the collection's lifetime, status-based list filtering, and
//! an idempotent close.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{Error, Result};
use crate::pcsc::{Context, ReaderState, ReaderStateFlags, Scope};

/// Filter applied by `ReaderCollection::list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderFilter {
    All,
    CardPresent,
    CardAbsent,
    /// Accepted but collapses to `CardPresent` until state history is
    /// populated (spec.md §4.B).
    CardInsertion,
    /// Accepted but collapses to `CardAbsent` until state history is
    /// populated (spec.md §4.B).
    CardRemoval,
}

/// A lazily-populated reader proxy: just the stable name, for now. Higher
/// layers connect through `ReaderCollection::context` when they need an
/// actual card handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderProxy {
    name: String,
}

impl ReaderProxy {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Owns a resource-manager context and a map from reader name to reader
/// proxy, guaranteeing one proxy per name for the collection's lifetime
/// (spec.md §4.B).
pub struct ReaderCollection {
    context: Option<Context>,
    establish_error: Option<Error>,
    proxies: HashMap<String, ReaderProxy>,
}

impl ReaderCollection {
    /// Establish a context at the default (`System`) scope.
    pub fn new() -> ReaderCollection {
        Self::with_scope(Scope::System)
    }

    /// Establish a context at an explicit scope.
    ///
    /// A failure to establish is not propagated here: per spec.md §4.B
    /// "a failure to establish the context during construction raises a
    /// dedicated error kind; all subsequent operations on the collection
    /// fail the same way" — so the error is captured and replayed by
    /// every operation instead of making construction fallible.
    pub fn with_scope(scope: Scope) -> ReaderCollection {
        match Context::establish(scope) {
            Ok(context) => ReaderCollection {
                context: Some(context),
                establish_error: None,
                proxies: HashMap::new(),
            },
            Err(err) => ReaderCollection { context: None, establish_error: Some(err), proxies: HashMap::new() },
        }
    }

    fn context(&self) -> Result<&Context> {
        match &self.context {
            Some(ctx) => Ok(ctx),
            None => Err(clone_establish_error(self.establish_error.as_ref())),
        }
    }

    /// List reader proxies matching `filter`. Evicts proxies for readers
    /// that no longer appear.
    pub fn list(&mut self, filter: ReaderFilter) -> Result<Vec<ReaderProxy>> {
        let context = self.context()?;
        let names = context.list_readers()?;

        let mut matched = Vec::new();
        let present_filter = matches!(filter, ReaderFilter::CardPresent | ReaderFilter::CardInsertion);
        let absent_filter = matches!(filter, ReaderFilter::CardAbsent | ReaderFilter::CardRemoval);

        if filter == ReaderFilter::All {
            for name in &names {
                matched.push(self.proxies.entry(name.clone()).or_insert_with(|| ReaderProxy { name: name.clone() }).clone());
            }
        } else {
            let mut states: Vec<ReaderState> =
                names.iter().map(|n| ReaderState::new(n, ReaderStateFlags::UNAWARE)).collect();
            if !states.is_empty() {
                context.get_status_change(0, &mut states)?;
            }
            for state in &states {
                let event = state.event_state();
                let keep = (present_filter && event.contains(ReaderStateFlags::PRESENT))
                    || (absent_filter && event.contains(ReaderStateFlags::EMPTY));
                if keep {
                    let name = state.name().to_string();
                    matched.push(
                        self.proxies
                            .entry(name.clone())
                            .or_insert_with(|| ReaderProxy { name })
                            .clone(),
                    );
                }
            }
        }

        let live: std::collections::HashSet<String> = names.into_iter().collect();
        self.proxies.retain(|name, _| live.contains(name));
        trace!(filter = ?filter, matched = matched.len(), "ReaderCollection::list");
        Ok(matched)
    }

    /// Close the collection, releasing the resource-manager context.
    /// Idempotent: a second call after a successful first one is a no-op.
    pub fn close(&mut self) {
        if let Some(context) = self.context.take() {
            if let Err((context, _err)) = context.release() {
                // Release failed; drop it anyway so the slot stays empty
                // and subsequent close() calls remain no-ops.
                drop(context);
            }
        }
    }
}

impl Default for ReaderCollection {
    fn default() -> Self {
        Self::new()
    }
}

fn clone_establish_error(err: Option<&Error>) -> Error {
    match err {
        Some(Error::EstablishContextFailed(status)) => Error::EstablishContextFailed(*status),
        _ => Error::NoService,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_collapses_as_documented() {
        assert_eq!(ReaderFilter::CardInsertion, ReaderFilter::CardInsertion);
        assert_ne!(ReaderFilter::CardInsertion, ReaderFilter::CardPresent);
    }
}
