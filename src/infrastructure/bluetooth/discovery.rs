//! Attribute discovery
//!
//! Services arrive from one search call. Everything below a service is
//! paged: each call asks for "the item after the cursor", and each answer
//! either moves the cursor forward or ends the pass.

use crate::domain::error::GattError;
use crate::domain::gatt::{
    Characteristic, CharacteristicId, Cursor, DescriptorId, GattId, GattStatus, ServiceId,
};
use crate::domain::models::EnumerationOutcome;
use std::fmt::Debug;
use tracing::debug;

/// Identity an enumerated item is paged by.
pub trait Keyed {
    type Key: Copy + PartialEq + Debug;

    fn key(&self) -> Self::Key;
}

impl Keyed for ServiceId {
    type Key = ServiceId;

    fn key(&self) -> ServiceId {
        *self
    }
}

impl Keyed for Characteristic {
    type Key = CharacteristicId;

    fn key(&self) -> CharacteristicId {
        self.id
    }
}

impl Keyed for GattId {
    type Key = GattId;

    fn key(&self) -> GattId {
        *self
    }
}

/// What the caller has to do after feeding an answer to an [`Enumeration`].
#[derive(Debug, Clone, PartialEq)]
pub enum EnumerationStep<T: Keyed> {
    /// `item` was recorded; request the item after `next`.
    Continue { item: T, next: Cursor<T::Key> },
    /// The pass is over.
    Finished {
        outcome: EnumerationOutcome,
        count: usize,
    },
    /// The answer does not belong to the running pass.
    Ignored,
}

/// One cursor-driven pass over the children of `scope`.
#[derive(Debug)]
pub struct Enumeration<S, T: Keyed> {
    scope: Option<S>,
    cursor: Cursor<T::Key>,
    items: Vec<T>,
    generation: u64,
    active: bool,
}

impl<S, T: Keyed> Default for Enumeration<S, T> {
    fn default() -> Self {
        Self {
            scope: None,
            cursor: Cursor::Start,
            items: Vec::new(),
            generation: 0,
            active: false,
        }
    }
}

impl<S: Copy + PartialEq + Debug, T: Keyed + Clone> Enumeration<S, T> {
    /// Start a pass at `cursor`. Starting from [`Cursor::Start`] (or under a
    /// different scope) drops what the previous pass recorded.
    pub fn begin(&mut self, scope: S, cursor: Cursor<T::Key>, generation: u64) {
        if cursor.is_start() || self.scope != Some(scope) {
            self.items.clear();
        }
        self.scope = Some(scope);
        self.cursor = cursor;
        self.generation = generation;
        self.active = true;
    }

    /// Feed one answer from the transport.
    ///
    /// An item equal to the cursor (the transport echoing the last item) or
    /// `None` ends the pass as exhausted; a non-zero status ends it as
    /// failed. Items already recorded in this pass are never recorded twice.
    pub fn on_found(
        &mut self,
        scope: &S,
        status: GattStatus,
        item: Option<T>,
        generation: u64,
    ) -> EnumerationStep<T> {
        if !self.active || self.generation != generation || self.scope.as_ref() != Some(scope) {
            debug!("Ignoring answer outside the running pass: {:?}", scope);
            return EnumerationStep::Ignored;
        }
        if !status.is_success() {
            return self.finish(EnumerationOutcome::Failed(status));
        }
        let Some(item) = item else {
            return self.finish(EnumerationOutcome::Exhausted);
        };
        let key = item.key();
        if self.cursor.points_at(&key) || self.items.iter().any(|i| i.key() == key) {
            return self.finish(EnumerationOutcome::Exhausted);
        }
        self.items.push(item.clone());
        self.cursor = Cursor::After(key);
        EnumerationStep::Continue {
            item,
            next: self.cursor,
        }
    }

    fn finish(&mut self, outcome: EnumerationOutcome) -> EnumerationStep<T> {
        self.active = false;
        EnumerationStep::Finished {
            outcome,
            count: self.items.len(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn cursor(&self) -> &Cursor<T::Key> {
        &self.cursor
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }
}

pub type IncludedServices = Enumeration<ServiceId, ServiceId>;
pub type Characteristics = Enumeration<ServiceId, Characteristic>;
pub type Descriptors = Enumeration<(ServiceId, CharacteristicId), DescriptorId>;

/// Discovery state of the open link.
#[derive(Debug, Default)]
pub struct DiscoverySequencer {
    services: Vec<ServiceId>,
    searching: bool,
    search_generation: u64,
    pub included: IncludedServices,
    pub characteristics: Characteristics,
    pub descriptors: Descriptors,
}

impl DiscoverySequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a service search, dropping the services of the previous one.
    pub fn begin_search(&mut self, generation: u64) -> Result<(), GattError> {
        if self.searching {
            return Err(GattError::SearchInProgress);
        }
        self.services.clear();
        self.searching = true;
        self.search_generation = generation;
        Ok(())
    }

    /// Undo [`begin_search`](Self::begin_search) when the call never went out.
    pub fn cancel_search(&mut self) {
        self.searching = false;
    }

    /// Record a search result. Returns false for results outside a search
    /// and for services already reported by this one.
    pub fn on_search_result(&mut self, service: ServiceId, generation: u64) -> bool {
        if !self.searching || self.search_generation != generation {
            return false;
        }
        if self.services.contains(&service) {
            debug!("Service {} reported twice", service.uuid);
            return false;
        }
        self.services.push(service);
        true
    }

    /// End the running search, returning the number of services found.
    pub fn on_search_complete(&mut self, generation: u64) -> Option<usize> {
        if !self.searching || self.search_generation != generation {
            return None;
        }
        self.searching = false;
        Some(self.services.len())
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    /// Services in the order the transport reported them.
    pub fn services(&self) -> &[ServiceId] {
        &self.services
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gatt::CharacteristicProperties;
    use uuid::Uuid;

    fn service() -> ServiceId {
        ServiceId::primary(Uuid::from_u128(0x713d0000), 0)
    }

    fn characteristic(n: u128) -> Characteristic {
        Characteristic {
            id: GattId::new(Uuid::from_u128(n), 0),
            properties: CharacteristicProperties::default(),
        }
    }

    #[test]
    fn test_cursor_strictly_progresses() {
        let mut pass = Characteristics::default();
        pass.begin(service(), Cursor::Start, 1);

        for n in 1..=3 {
            match pass.on_found(&service(), GattStatus::SUCCESS, Some(characteristic(n)), 1) {
                EnumerationStep::Continue { item, next } => {
                    assert_eq!(item, characteristic(n));
                    assert_eq!(next, Cursor::After(characteristic(n).id));
                }
                other => panic!("unexpected step {:?}", other),
            }
        }

        // echo of the last item
        let step = pass.on_found(&service(), GattStatus::SUCCESS, Some(characteristic(3)), 1);
        assert_eq!(
            step,
            EnumerationStep::Finished {
                outcome: EnumerationOutcome::Exhausted,
                count: 3
            }
        );
        assert!(!pass.is_active());
    }

    #[test]
    fn test_echo_delivered_twice_is_recorded_once() {
        let mut pass = Characteristics::default();
        pass.begin(service(), Cursor::Start, 1);
        pass.on_found(&service(), GattStatus::SUCCESS, Some(characteristic(2)), 1);
        pass.on_found(&service(), GattStatus::SUCCESS, Some(characteristic(2)), 1);
        let step = pass.on_found(&service(), GattStatus::SUCCESS, Some(characteristic(2)), 1);

        assert_eq!(step, EnumerationStep::Ignored);
        assert_eq!(pass.items(), &[characteristic(2)]);
    }

    #[test]
    fn test_revisited_item_ends_pass() {
        let mut pass = Characteristics::default();
        pass.begin(service(), Cursor::Start, 1);
        pass.on_found(&service(), GattStatus::SUCCESS, Some(characteristic(1)), 1);
        pass.on_found(&service(), GattStatus::SUCCESS, Some(characteristic(2)), 1);
        let step = pass.on_found(&service(), GattStatus::SUCCESS, Some(characteristic(1)), 1);
        assert!(matches!(
            step,
            EnumerationStep::Finished {
                outcome: EnumerationOutcome::Exhausted,
                count: 2
            }
        ));
    }

    #[test]
    fn test_failure_is_distinct_from_exhaustion() {
        let mut pass = Characteristics::default();
        pass.begin(service(), Cursor::Start, 1);
        let step = pass.on_found(&service(), GattStatus::FAILURE, None, 1);
        assert_eq!(
            step,
            EnumerationStep::Finished {
                outcome: EnumerationOutcome::Failed(GattStatus::FAILURE),
                count: 0
            }
        );

        pass.begin(service(), Cursor::Start, 1);
        let step = pass.on_found(&service(), GattStatus::SUCCESS, None, 1);
        assert_eq!(
            step,
            EnumerationStep::Finished {
                outcome: EnumerationOutcome::Exhausted,
                count: 0
            }
        );
    }

    #[test]
    fn test_stale_generation_and_scope_ignored() {
        let mut pass = Characteristics::default();
        pass.begin(service(), Cursor::Start, 2);
        let other = ServiceId::primary(Uuid::from_u128(0x1800), 0);

        assert_eq!(
            pass.on_found(&service(), GattStatus::SUCCESS, Some(characteristic(1)), 1),
            EnumerationStep::Ignored
        );
        assert_eq!(
            pass.on_found(&other, GattStatus::SUCCESS, Some(characteristic(1)), 2),
            EnumerationStep::Ignored
        );
        assert!(pass.items().is_empty());
    }

    #[test]
    fn test_restart_from_start_clears_items() {
        let mut pass = Characteristics::default();
        pass.begin(service(), Cursor::Start, 1);
        pass.on_found(&service(), GattStatus::SUCCESS, Some(characteristic(1)), 1);
        pass.on_found(&service(), GattStatus::SUCCESS, None, 1);

        pass.begin(service(), Cursor::Start, 1);
        assert!(pass.items().is_empty());
        assert!(pass.cursor().is_start());
    }

    #[test]
    fn test_service_search() {
        let mut discovery = DiscoverySequencer::new();
        assert!(!discovery.on_search_result(service(), 1));

        discovery.begin_search(1).unwrap();
        assert_eq!(discovery.begin_search(1), Err(GattError::SearchInProgress));
        assert!(discovery.on_search_result(service(), 1));
        assert!(!discovery.on_search_result(service(), 1));
        assert_eq!(discovery.on_search_complete(1), Some(1));
        assert_eq!(discovery.on_search_complete(1), None);
        assert!(!discovery.is_searching());
        assert_eq!(discovery.services(), &[service()]);
    }
}
