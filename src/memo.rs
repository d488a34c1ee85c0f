//! Reference identity for subscription targets.
//!
//! Consumers rebuild their targets on every pass of their own update loop.
//! [`Memo`] hands back the *same* `Arc` as long as the inputs have not
//! changed, so the caches (which compare targets before resubscribing) see
//! a stable value and keep their connection.

use std::sync::Arc;

/// Equality-checked cache keyed by a dependency tuple.
///
/// The returned `Arc` changes identity only when the dependencies differ
/// from the previous call *and* the factory produces a structurally different
/// value. A factory returning `None` (e.g. no signed-in user yet) yields
/// `None`, which the caches treat as "no subscription".
pub struct Memo<D, T> {
    deps: Option<D>,
    value: Option<Arc<T>>,
}

impl<D, T> Memo<D, T>
where
    D: PartialEq,
    T: PartialEq,
{
    pub fn new() -> Self {
        Self {
            deps: None,
            value: None,
        }
    }

    /// Return the memoized target for `deps`, running `factory` only when the
    /// dependencies changed.
    pub fn get(&mut self, deps: D, factory: impl FnOnce(&D) -> Option<T>) -> Option<Arc<T>> {
        if self.deps.as_ref() == Some(&deps) {
            return self.value.clone();
        }

        let produced = factory(&deps);
        self.value = match (self.value.take(), produced) {
            (Some(previous), Some(next)) if *previous == next => Some(previous),
            (_, next) => next.map(Arc::new),
        };
        self.deps = Some(deps);
        self.value.clone()
    }

    /// Last value handed out, without recomputing.
    pub fn current(&self) -> Option<Arc<T>> {
        self.value.clone()
    }

    /// Forget the dependencies so the next `get` always runs the factory.
    pub fn invalidate(&mut self) {
        self.deps = None;
    }
}

impl<D: PartialEq, T: PartialEq> Default for Memo<D, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionRef, Direction, DocumentRef, Query};

    #[test]
    fn test_same_deps_same_arc() {
        let mut memo = Memo::new();
        let a = memo.get(("u1".to_string(),), |(uid,)| {
            DocumentRef::new(&format!("users/{}", uid)).ok()
        });
        // New closure instance, same deps.
        let b = memo.get(("u1".to_string(),), |(uid,)| {
            DocumentRef::new(&format!("users/{}", uid)).ok()
        });
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[test]
    fn test_factory_skipped_when_deps_equal() {
        let mut memo: Memo<u32, DocumentRef> = Memo::new();
        let mut calls = 0;
        memo.get(1, |_| {
            calls += 1;
            DocumentRef::new("users/a").ok()
        });
        memo.get(1, |_| {
            calls += 1;
            DocumentRef::new("users/a").ok()
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_changed_deps_identical_output_keeps_arc() {
        let mut memo = Memo::new();
        let build = |_: &u32| {
            Some(
                Query::collection(CollectionRef::new("subjects").unwrap())
                    .order_by("name", Direction::Ascending),
            )
        };
        let a = memo.get(1u32, build).unwrap();
        let b = memo.get(2u32, build).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_changed_output_new_arc() {
        let mut memo = Memo::new();
        let a = memo
            .get("u1", |uid| DocumentRef::new(&format!("users/{}", uid)).ok())
            .unwrap();
        let b = memo
            .get("u2", |uid| DocumentRef::new(&format!("users/{}", uid)).ok())
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.id(), "u2");
    }

    #[test]
    fn test_null_target() {
        let mut memo: Memo<Option<String>, DocumentRef> = Memo::new();
        let none = memo.get(None, |user| {
            user.as_ref()
                .and_then(|uid| DocumentRef::new(&format!("users/{}", uid)).ok())
        });
        assert!(none.is_none());

        let some = memo.get(Some("u1".into()), |user| {
            user.as_ref()
                .and_then(|uid| DocumentRef::new(&format!("users/{}", uid)).ok())
        });
        assert!(some.is_some());
    }
}
