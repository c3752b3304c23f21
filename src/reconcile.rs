use crate::models::{ListingKey, ListingRecord, ReconciliationDecision, NOTE_PRICE_UPDATED};

/// Read access to previously recorded observations.
pub trait ListingLookup {
    /// The most recently recorded observation for `key`, if any.
    fn latest_for(&self, key: &ListingKey) -> Option<&ListingRecord>;
}

impl ListingLookup for [ListingRecord] {
    fn latest_for(&self, key: &ListingKey) -> Option<&ListingRecord> {
        self.iter().rev().find(|r| r.has_key(key))
    }
}

impl ListingLookup for Vec<ListingRecord> {
    fn latest_for(&self, key: &ListingKey) -> Option<&ListingRecord> {
        self.as_slice().latest_for(key)
    }
}

/// Records collected during the current run layered over the persisted dataset,
/// so a listing enumerated twice in one run is compared against its first sighting.
pub struct PendingBatch<'a, L: ListingLookup + ?Sized> {
    pub batch: &'a [ListingRecord],
    pub persisted: &'a L,
}

impl<'a, L: ListingLookup + ?Sized> ListingLookup for PendingBatch<'a, L> {
    fn latest_for(&self, key: &ListingKey) -> Option<&ListingRecord> {
        self.batch
            .latest_for(key)
            .or_else(|| self.persisted.latest_for(key))
    }
}

/// Work the orchestrator has to perform for a reconciled listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideEffect {
    DownloadPhotos,
    SaveDescription,
    AppendRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub decision: ReconciliationDecision,
    /// The record to append, `None` when the observation is redundant.
    pub record: Option<ListingRecord>,
    pub side_effects: Vec<SideEffect>,
}

impl Reconciliation {
    pub fn requires(&self, effect: SideEffect) -> bool {
        self.side_effects.contains(&effect)
    }
}

/// Classifies a fresh observation against the latest prior one.
///
/// Only the asking price is compared; two absent prices compare equal.
pub fn decide(fresh: &ListingRecord, prior: Option<&ListingRecord>) -> ReconciliationDecision {
    match prior {
        None => ReconciliationDecision::New,
        Some(prior) if prior.vraagprijs == fresh.vraagprijs => ReconciliationDecision::Unchanged,
        Some(_) => ReconciliationDecision::PriceChanged,
    }
}

pub fn reconcile<L: ListingLookup + ?Sized>(fresh: ListingRecord, lookup: &L) -> Reconciliation {
    let key = fresh.key();
    let decision = decide(&fresh, lookup.latest_for(&key));

    match decision {
        ReconciliationDecision::New => Reconciliation {
            decision,
            record: Some(fresh),
            side_effects: vec![
                SideEffect::DownloadPhotos,
                SideEffect::SaveDescription,
                SideEffect::AppendRecord,
            ],
        },
        ReconciliationDecision::Unchanged => Reconciliation {
            decision,
            record: None,
            side_effects: Vec::new(),
        },
        ReconciliationDecision::PriceChanged => {
            let mut record = fresh;
            record.add_note(NOTE_PRICE_UPDATED);
            Reconciliation {
                decision,
                record: Some(record),
                side_effects: vec![SideEffect::AppendRecord],
            }
        }
    }
}
