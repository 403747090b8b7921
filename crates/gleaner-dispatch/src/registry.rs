//! Item registry
//!
//! The canonical set of work items for one run. Items are keyed by
//! [`ItemId`], whose ordering is numeric-aware, so every query below returns
//! ids in natural order regardless of dispatch completion order.
//!
//! Each item sits behind its own mutex. Transitions on one item are
//! serialized; transitions on different items never contend.

use crate::error::DispatchError;
use gleaner_domain::{AttemptRecord, ExhaustReason, ItemId, ItemOutput, ItemState, SourceRef, WorkItem};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock(item: &Mutex<WorkItem>) -> MutexGuard<'_, WorkItem> {
    item.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of work items for a single run
///
/// # Examples
///
/// ```
/// use gleaner_dispatch::Registry;
/// use gleaner_domain::{ItemId, SourceRef};
///
/// let registry = Registry::from_sources(
///     ["item10", "item2", "item1"]
///         .into_iter()
///         .map(|id| (ItemId::new(id), SourceRef::new(format!("{}.jpeg", id)))),
/// )
/// .unwrap();
///
/// let pending: Vec<String> = registry.pending_ids().iter().map(|id| id.to_string()).collect();
/// assert_eq!(pending, vec!["item1", "item2", "item10"]);
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    order: Vec<ItemId>,
    items: BTreeMap<ItemId, Mutex<WorkItem>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with `sources`
    pub fn from_sources<I>(sources: I) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = (ItemId, SourceRef)>,
    {
        let mut registry = Self::new();
        registry.register(sources)?;
        Ok(registry)
    }

    /// Seed items as `Pending`
    ///
    /// Returns the number of items added. Fails on the first id that is
    /// already registered; items before it stay registered.
    pub fn register<I>(&mut self, sources: I) -> Result<usize, DispatchError>
    where
        I: IntoIterator<Item = (ItemId, SourceRef)>,
    {
        let mut added = 0;
        for (id, source) in sources {
            if self.items.contains_key(&id) {
                return Err(DispatchError::DuplicateItem(id));
            }
            self.order.push(id.clone());
            self.items
                .insert(id.clone(), Mutex::new(WorkItem::new(id, source)));
            added += 1;
        }
        Ok(added)
    }

    /// Number of registered items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids in discovery (insertion) order
    pub fn ids(&self) -> &[ItemId] {
        &self.order
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    /// Copy of one item
    pub fn get(&self, id: &ItemId) -> Option<WorkItem> {
        self.items.get(id).map(|item| lock(item).clone())
    }

    /// Copies of all items, naturally ordered
    pub fn snapshot(&self) -> Vec<WorkItem> {
        self.items.values().map(|item| lock(item).clone()).collect()
    }

    /// Current state of one item
    pub fn state(&self, id: &ItemId) -> Option<ItemState> {
        self.items.get(id).map(|item| lock(item).state)
    }

    /// Naturally sorted snapshot of the `Pending` ids
    pub fn pending_ids(&self) -> Vec<ItemId> {
        self.ids_in(ItemState::Pending).cloned().collect()
    }

    /// Lazy view over the ids currently in `state`, naturally ordered
    pub fn ids_in(&self, state: ItemState) -> impl Iterator<Item = &ItemId> + '_ {
        self.items
            .iter()
            .filter(move |(_, item)| lock(item).state == state)
            .map(|(id, _)| id)
    }

    /// Lazy view over succeeded ids
    pub fn succeeded_ids(&self) -> impl Iterator<Item = &ItemId> + '_ {
        self.ids_in(ItemState::Succeeded)
    }

    /// Lazy view over ids waiting for another round
    pub fn failed_ids(&self) -> impl Iterator<Item = &ItemId> + '_ {
        self.ids_in(ItemState::Failed)
    }

    /// Lazy view over exhausted ids
    pub fn exhausted_ids(&self) -> impl Iterator<Item = &ItemId> + '_ {
        self.ids_in(ItemState::Exhausted)
    }

    /// Number of items in `state`
    pub fn count(&self, state: ItemState) -> usize {
        self.ids_in(state).count()
    }

    /// Whether every item is `Succeeded` or `Exhausted`
    pub fn all_terminal(&self) -> bool {
        self.items.values().all(|item| lock(item).state.is_terminal())
    }

    fn with_item<T>(
        &self,
        id: &ItemId,
        f: impl FnOnce(&mut WorkItem) -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        let item = self
            .items
            .get(id)
            .ok_or_else(|| DispatchError::UnknownItem(id.clone()))?;
        let mut guard = lock(item);
        f(&mut guard)
    }

    /// Move an item from `Pending` to `InFlight`, returning its source
    pub fn begin(&self, id: &ItemId) -> Result<SourceRef, DispatchError> {
        self.with_item(id, |item| {
            item.transition(ItemState::InFlight)?;
            Ok(item.source.clone())
        })
    }

    /// Apply a plain state transition, appending `attempts`
    ///
    /// `Succeeded` and `Exhausted` carry data and must go through
    /// [`succeed`](Self::succeed) and [`exhaust`](Self::exhaust).
    pub fn set_state(
        &self,
        id: &ItemId,
        state: ItemState,
        attempts: Vec<AttemptRecord>,
    ) -> Result<(), DispatchError> {
        self.with_item(id, |item| {
            if state.is_terminal() {
                return Err(DispatchError::Transition(gleaner_domain::TransitionError {
                    id: item.id.clone(),
                    from: item.state,
                    to: state,
                }));
            }
            item.transition(state)?;
            item.attempts.extend(attempts);
            Ok(())
        })
    }

    /// Record a successful dispatch
    pub fn succeed(
        &self,
        id: &ItemId,
        output: ItemOutput,
        attempts: Vec<AttemptRecord>,
    ) -> Result<(), DispatchError> {
        self.with_item(id, |item| {
            item.succeed(output)?;
            item.attempts.extend(attempts);
            Ok(())
        })
    }

    /// Record a retryable dispatch failure (`InFlight` to `Failed`)
    pub fn fail(&self, id: &ItemId, attempts: Vec<AttemptRecord>) -> Result<(), DispatchError> {
        self.set_state(id, ItemState::Failed, attempts)
    }

    /// Mark an item `Exhausted`
    pub fn exhaust(
        &self,
        id: &ItemId,
        reason: ExhaustReason,
        attempts: Vec<AttemptRecord>,
    ) -> Result<(), DispatchError> {
        self.with_item(id, |item| {
            item.exhaust(reason)?;
            item.attempts.extend(attempts);
            Ok(())
        })
    }

    /// Move every `Failed` item back to `Pending`, returning how many moved
    pub fn requeue_failed(&self) -> usize {
        let mut moved = 0;
        for item in self.items.values() {
            let mut item = lock(item);
            if item.state == ItemState::Failed && item.transition(ItemState::Pending).is_ok() {
                moved += 1;
            }
        }
        moved
    }

    /// Exhaust every non-terminal item, returning their ids in natural order
    ///
    /// `reason` is computed per item so the caller can record how many
    /// rounds that item actually went through.
    pub fn exhaust_remaining(&self, reason: impl Fn(&WorkItem) -> ExhaustReason) -> Vec<ItemId> {
        let mut exhausted = Vec::new();
        for (id, item) in &self.items {
            let mut item = lock(item);
            if item.state.is_terminal() {
                continue;
            }
            // InFlight items are only left behind when their task was lost
            if item.state == ItemState::InFlight {
                let _ = item.transition(ItemState::Failed);
            }
            let why = reason(&item);
            if item.exhaust(why).is_ok() {
                exhausted.push(id.clone());
            }
        }
        exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_domain::{Extraction, ProviderId};

    fn registry(ids: &[&str]) -> Registry {
        Registry::from_sources(
            ids.iter()
                .map(|id| (ItemId::new(*id), SourceRef::new(format!("{}.jpeg", id)))),
        )
        .unwrap()
    }

    fn output(text: &str) -> ItemOutput {
        ItemOutput {
            extraction: Extraction::text(text),
            provider: ProviderId::new("a"),
            round: 1,
        }
    }

    #[test]
    fn test_register_seeds_pending() {
        let registry = registry(&["q1", "q2", "q3"]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.count(ItemState::Pending), 3);
        assert_eq!(registry.state(&ItemId::new("q2")), Some(ItemState::Pending));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = registry(&["q1"]);
        let err = registry
            .register(vec![(ItemId::new("q1"), SourceRef::new("again.jpeg"))])
            .unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateItem(id) if id.as_str() == "q1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_discovery_order_is_kept_separately() {
        let registry = registry(&["item10", "item2", "item1"]);
        let discovered: Vec<&str> = registry.ids().iter().map(|id| id.as_str()).collect();
        assert_eq!(discovered, vec!["item10", "item2", "item1"]);

        let natural: Vec<String> = registry.pending_ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(natural, vec!["item1", "item2", "item10"]);
    }

    #[test]
    fn test_lifecycle_through_registry() {
        let registry = registry(&["q1", "q2"]);
        let q1 = ItemId::new("q1");
        let q2 = ItemId::new("q2");

        let source = registry.begin(&q1).unwrap();
        assert_eq!(source.file_name(), "q1.jpeg");
        registry.succeed(&q1, output("text"), vec![]).unwrap();

        registry.begin(&q2).unwrap();
        registry.fail(&q2, vec![]).unwrap();
        assert_eq!(registry.failed_ids().count(), 1);

        assert_eq!(registry.requeue_failed(), 1);
        assert_eq!(registry.pending_ids(), vec![q2.clone()]);

        let item = registry.get(&q1).unwrap();
        assert_eq!(item.result.unwrap().extraction.text, "text");
    }

    #[test]
    fn test_unknown_item() {
        let registry = registry(&["q1"]);
        let err = registry.begin(&ItemId::new("nope")).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownItem(_)));
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let registry = registry(&["q1"]);
        let q1 = ItemId::new("q1");
        assert!(matches!(
            registry.fail(&q1, vec![]),
            Err(DispatchError::Transition(_))
        ));
        assert!(registry.set_state(&q1, ItemState::Succeeded, vec![]).is_err());
        assert_eq!(registry.state(&q1), Some(ItemState::Pending));
    }

    #[test]
    fn test_exhaust_remaining_leaves_terminal_items() {
        let registry = registry(&["q1", "q2", "q3"]);
        let q1 = ItemId::new("q1");
        registry.begin(&q1).unwrap();
        registry.succeed(&q1, output("ok"), vec![]).unwrap();
        registry.begin(&ItemId::new("q3")).unwrap();

        let exhausted = registry.exhaust_remaining(|_| ExhaustReason::Cancelled);
        let exhausted: Vec<&str> = exhausted.iter().map(|id| id.as_str()).collect();
        assert_eq!(exhausted, vec!["q2", "q3"]);
        assert!(registry.all_terminal());
        assert_eq!(registry.count(ItemState::Succeeded), 1);
        assert_eq!(
            registry.get(&ItemId::new("q2")).unwrap().exhaust_reason,
            Some(ExhaustReason::Cancelled)
        );
    }
}
