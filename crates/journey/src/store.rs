//! Journey persistence.
//!
//! [`JourneyStore`] is the seam to the storage engine: exclusive row locks,
//! the active-journey-per-hero uniqueness rule and the scans needed by the
//! schedulers, recovery and housekeeping. [`InMemoryJourneyStore`] implements
//! it with one mutex per row.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use stepper_core::{HeroRef, StepperError, StepperResult};

use crate::types::Journey;

pub trait JourneyStore: Send + Sync {
    /// Inserts a new row. Fails with `DuplicateActiveJourney` when the row
    /// would be a second active journey of its type for the same hero.
    fn insert(&self, journey: &Journey) -> StepperResult<()>;

    fn find(&self, id: &Uuid) -> StepperResult<Option<Journey>>;

    /// Runs `f` on the row while holding its exclusive lock and returns the
    /// row as written. When `f` fails nothing is written.
    fn with_lock(
        &self,
        id: Uuid,
        f: &mut dyn FnMut(&mut Journey) -> StepperResult<()>,
    ) -> StepperResult<Journey>;

    /// `ready` journeys with a next step due strictly before `cutoff`,
    /// earliest first.
    fn ready_due_before(&self, cutoff: DateTime<Utc>) -> StepperResult<Vec<Journey>>;

    /// `performing` journeys last updated before `cutoff`.
    fn stuck_since(&self, cutoff: DateTime<Utc>) -> StepperResult<Vec<Journey>>;

    /// `finished` or `canceled` journeys last updated before `cutoff`.
    fn terminal_updated_before(&self, cutoff: DateTime<Utc>) -> StepperResult<Vec<Journey>>;

    /// Removes rows, returning how many existed.
    fn delete(&self, ids: &[Uuid]) -> StepperResult<usize>;

    fn for_hero(&self, journey_type: Option<&str>, hero: &HeroRef) -> StepperResult<Vec<Journey>>;
}

/// Runs `f` under the row lock and hands back both the written row and the
/// closure's own result.
pub fn locked<R>(
    store: &dyn JourneyStore,
    id: Uuid,
    f: impl FnOnce(&mut Journey) -> StepperResult<R>,
) -> StepperResult<(Journey, R)> {
    let mut f = Some(f);
    let mut output = None;
    let journey = store.with_lock(id, &mut |row| {
        let f = f
            .take()
            .ok_or_else(|| StepperError::Internal(anyhow!("row lock callback ran twice")))?;
        output = Some(f(row)?);
        Ok(())
    })?;
    let output =
        output.ok_or_else(|| StepperError::Internal(anyhow!("row lock callback did not run")))?;
    Ok((journey, output))
}

type HeroSlot = (String, HeroRef);

fn hero_slot(journey: &Journey) -> Option<HeroSlot> {
    journey
        .hero
        .as_ref()
        .map(|hero| (journey.journey_type.clone(), hero.clone()))
}

#[derive(Default)]
pub struct InMemoryJourneyStore {
    rows: DashMap<Uuid, Arc<Mutex<Journey>>>,
    active_heroes: DashMap<HeroSlot, Uuid>,
}

impl std::fmt::Debug for InMemoryJourneyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryJourneyStore")
            .field("rows", &self.rows.len())
            .field("active_heroes", &self.active_heroes.len())
            .finish()
    }
}

impl InMemoryJourneyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<Mutex<Journey>>> {
        self.rows.iter().map(|r| Arc::clone(r.value())).collect()
    }

    fn scan(&self, keep: impl Fn(&Journey) -> bool) -> Vec<Journey> {
        self.snapshot()
            .into_iter()
            .filter_map(|row| {
                let journey = row.lock();
                if keep(&journey) {
                    Some(journey.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    fn claim_hero_slot(&self, journey: &Journey) -> StepperResult<()> {
        let Some(slot) = hero_slot(journey) else {
            return Ok(());
        };
        match self.active_heroes.entry(slot) {
            Entry::Occupied(existing) if *existing.get() != journey.id => {
                Err(StepperError::DuplicateActiveJourney {
                    journey_type: journey.journey_type.clone(),
                    hero: existing.key().1.to_string(),
                })
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(vacant) => {
                vacant.insert(journey.id);
                Ok(())
            }
        }
    }

    fn release_hero_slot(&self, journey: &Journey) {
        if let Some(slot) = hero_slot(journey) {
            self.active_heroes.remove_if(&slot, |_, id| *id == journey.id);
        }
    }

    /// Keeps the uniqueness index in step with a row update. Runs under the
    /// row lock.
    fn reindex(&self, before: &Journey, after: &Journey) -> StepperResult<()> {
        match (before.holds_hero_slot(), after.holds_hero_slot()) {
            (true, false) => self.release_hero_slot(before),
            (false, true) => self.claim_hero_slot(after)?,
            _ => {}
        }
        Ok(())
    }
}

impl JourneyStore for InMemoryJourneyStore {
    fn insert(&self, journey: &Journey) -> StepperResult<()> {
        if self.rows.contains_key(&journey.id) {
            return Err(StepperError::Storage(format!(
                "journey {} already exists",
                journey.id
            )));
        }
        if journey.holds_hero_slot() {
            self.claim_hero_slot(journey)?;
        }
        self.rows
            .insert(journey.id, Arc::new(Mutex::new(journey.clone())));
        Ok(())
    }

    fn find(&self, id: &Uuid) -> StepperResult<Option<Journey>> {
        let row = self.rows.get(id).map(|r| Arc::clone(r.value()));
        Ok(row.map(|row| row.lock().clone()))
    }

    fn with_lock(
        &self,
        id: Uuid,
        f: &mut dyn FnMut(&mut Journey) -> StepperResult<()>,
    ) -> StepperResult<Journey> {
        let row = self
            .rows
            .get(&id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(StepperError::JourneyNotFound(id))?;

        let mut current = row.lock();
        // Deleted while we were waiting for the lock.
        if !self.rows.contains_key(&id) {
            return Err(StepperError::JourneyNotFound(id));
        }

        let mut draft = current.clone();
        f(&mut draft)?;
        self.reindex(&current, &draft)?;
        *current = draft.clone();
        Ok(draft)
    }

    fn ready_due_before(&self, cutoff: DateTime<Utc>) -> StepperResult<Vec<Journey>> {
        let mut due = self.scan(|j| {
            j.is_ready()
                && j.next_step_name.is_some()
                && j.next_step_to_be_performed_at.is_some_and(|at| at < cutoff)
        });
        due.sort_by_key(|j| j.next_step_to_be_performed_at);
        Ok(due)
    }

    fn stuck_since(&self, cutoff: DateTime<Utc>) -> StepperResult<Vec<Journey>> {
        Ok(self.scan(|j| j.is_performing() && j.updated_at < cutoff))
    }

    fn terminal_updated_before(&self, cutoff: DateTime<Utc>) -> StepperResult<Vec<Journey>> {
        Ok(self.scan(|j| j.state.is_terminal() && j.updated_at < cutoff))
    }

    fn delete(&self, ids: &[Uuid]) -> StepperResult<usize> {
        let mut deleted = 0;
        for id in ids {
            if let Some((_, row)) = self.rows.remove(id) {
                let journey = row.lock();
                self.release_hero_slot(&journey);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn for_hero(&self, journey_type: Option<&str>, hero: &HeroRef) -> StepperResult<Vec<Journey>> {
        let mut journeys = self.scan(|j| {
            j.hero.as_ref() == Some(hero)
                && journey_type.map_or(true, |t| j.journey_type == t)
        });
        journeys.sort_by_key(|j| j.created_at);
        Ok(journeys)
    }
}
