//! Per-call referent bookkeeping
//!
//! The writer side hands out referent ids and remembers which full-pointer
//! targets were already announced so that a second pointer to the same target
//! is written as a back-reference. The reader side is an id-indexed arena: the
//! inline pass registers each id, the deferred pass fills in the pointee, and
//! later occurrences of a full-pointer id share the slot of the first one.

use crate::{NdrError, Result};
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::trace;

/// First referent id handed out in a call. Ids advance by 4, matching the
/// numbering Windows stubs produce.
pub const FIRST_REFERENT_ID: u32 = 0x0002_0000;

/// Writer-side referent allocator
pub(crate) struct ReferentAllocator {
    next: u32,
    /// Full-pointer target identity -> referent id
    full: HashMap<(TypeId, usize), u32>,
    /// Referent id -> address of the pointer that owns the body
    owners: HashMap<u32, usize>,
    /// Full-pointer bodies already written
    written: HashSet<u32>,
}

impl ReferentAllocator {
    pub(crate) fn new() -> Self {
        Self {
            next: FIRST_REFERENT_ID,
            full: HashMap::new(),
            owners: HashMap::new(),
            written: HashSet::new(),
        }
    }

    /// Fresh id for a unique or embedded reference pointer
    pub(crate) fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(4).max(FIRST_REFERENT_ID);
        id
    }

    /// Referent id for a full-pointer target.
    ///
    /// The first pointer to reach a target (`site`) becomes the owner of the
    /// body; every later pointer writes only the id.
    pub(crate) fn full_referent(&mut self, target: (TypeId, usize), site: usize) -> u32 {
        if let Some(&id) = self.full.get(&target) {
            return id;
        }
        let id = self.allocate();
        self.full.insert(target, id);
        self.owners.insert(id, site);
        id
    }

    /// True exactly once, for the owning pointer, when its body is due
    pub(crate) fn take_full_body(&mut self, id: u32, site: usize) -> bool {
        self.owners.get(&id) == Some(&site) && self.written.insert(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Pending,
    InProgress,
    Resolved,
}

struct FullSlot {
    cell: Box<dyn Any>,
    pointee: &'static str,
    state: SlotState,
}

/// Claim on a full-pointer referent made during the inline pass
pub(crate) struct FullClaim<T> {
    pub(crate) cell: Arc<OnceLock<T>>,
    /// The first occurrence of an id owns the body on the wire
    pub(crate) owner: bool,
}

/// Reader-side referent arena
pub(crate) struct ReferentTable {
    exclusive: HashSet<u32>,
    full: HashMap<u32, FullSlot>,
}

impl ReferentTable {
    pub(crate) fn new() -> Self {
        Self {
            exclusive: HashSet::new(),
            full: HashMap::new(),
        }
    }

    /// Register the id of a unique or embedded reference pointer
    pub(crate) fn claim_exclusive(&mut self, id: u32, kind: &'static str) -> Result<()> {
        if self.full.contains_key(&id) || !self.exclusive.insert(id) {
            return Err(NdrError::violation(format!(
                "{kind} pointer referent {id:#010x} reused"
            )));
        }
        trace!(referent = id, kind, "registered referent");
        Ok(())
    }

    /// Register or look up a full-pointer id
    pub(crate) fn claim_full<T: 'static>(&mut self, id: u32) -> Result<FullClaim<T>> {
        if self.exclusive.contains(&id) {
            return Err(NdrError::violation(format!(
                "full pointer referent {id:#010x} was already used by a unique pointer"
            )));
        }
        match self.full.get(&id) {
            None => {
                let cell: Arc<OnceLock<T>> = Arc::new(OnceLock::new());
                self.full.insert(
                    id,
                    FullSlot {
                        cell: Box::new(cell.clone()),
                        pointee: std::any::type_name::<T>(),
                        state: SlotState::Pending,
                    },
                );
                trace!(referent = id, "registered full pointer referent");
                Ok(FullClaim { cell, owner: true })
            }
            Some(slot) => {
                let cell = slot
                    .cell
                    .downcast_ref::<Arc<OnceLock<T>>>()
                    .cloned()
                    .ok_or(NdrError::AliasMismatch {
                        referent: id,
                        reason: "was registered with a different pointee type",
                    })?;
                if slot.state == SlotState::InProgress {
                    return Err(NdrError::violation(format!(
                        "full pointer referent {id:#010x} ({}) refers back into its own body",
                        slot.pointee
                    )));
                }
                trace!(referent = id, "full pointer alias");
                Ok(FullClaim { cell, owner: false })
            }
        }
    }

    pub(crate) fn begin_body(&mut self, id: u32) {
        if let Some(slot) = self.full.get_mut(&id) {
            slot.state = SlotState::InProgress;
        }
    }

    pub(crate) fn end_body(&mut self, id: u32) {
        if let Some(slot) = self.full.get_mut(&id) {
            slot.state = SlotState::Resolved;
        }
    }

    /// Some full-pointer id whose body never arrived
    pub(crate) fn unresolved(&self) -> Option<u32> {
        self.full
            .iter()
            .find(|(_, slot)| slot.state != SlotState::Resolved)
            .map(|(&id, _)| id)
    }
}
