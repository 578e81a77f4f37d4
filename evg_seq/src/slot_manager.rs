//! Slot manager: the fixed pool of Sequence RAMs on one card.
//!
//! Allocation is first-fit over the pool with no priority and no
//! preemption; a caller that gets `NoFreeSlot` retries later. The owner
//! link on each slot is set and cleared inside that slot's critical
//! section, so two sequences racing for the last free slot cannot both
//! win.

use crate::definition::SequenceDefinition;
use crate::hw_slot::HardwareSlot;
use evg_common::seq::error::SequenceError;
use evg_common::seq::registers::SeqRamRegisters;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fixed pool of Sequence RAMs.
#[derive(Debug)]
pub struct SlotManager {
    slots: Vec<Arc<HardwareSlot>>,
}

impl SlotManager {
    /// Build the pool from per-slot register blocks, ids assigned in order.
    pub fn new(registers: Vec<Box<dyn SeqRamRegisters>>) -> Self {
        let slots = registers
            .into_iter()
            .enumerate()
            .map(|(id, regs)| Arc::new(HardwareSlot::new(id as u8, regs)))
            .collect();
        Self { slots }
    }

    /// Number of slots in the pool.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True for an empty pool.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot by id.
    ///
    /// # Errors
    /// `SequenceError::UnknownSlot` if `id` is outside the pool.
    pub fn slot(&self, id: u8) -> Result<&Arc<HardwareSlot>, SequenceError> {
        self.slots
            .get(id as usize)
            .ok_or(SequenceError::UnknownSlot(id))
    }

    /// All slots in id order.
    pub fn slots(&self) -> &[Arc<HardwareSlot>] {
        &self.slots
    }

    /// Number of slots without an owner.
    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_allocated()).count()
    }

    /// Claim the first free slot for `definition`.
    ///
    /// # Errors
    /// `SequenceError::NoFreeSlot` if every slot is owned.
    pub fn allocate(
        &self,
        definition: &Arc<SequenceDefinition>,
    ) -> Result<Arc<HardwareSlot>, SequenceError> {
        for slot in &self.slots {
            if slot.try_claim(Arc::downgrade(definition)) {
                debug!(slot = slot.id(), sequence = definition.id(), "sequence RAM allocated");
                return Ok(Arc::clone(slot));
            }
        }
        Err(SequenceError::NoFreeSlot {
            sequence: definition.id(),
        })
    }

    /// Clear the owner link of `slot`.
    ///
    /// The caller must already have quiesced the slot.
    pub fn release(&self, slot: &HardwareSlot) {
        slot.clear_owner();
        debug!(slot = slot.id(), "sequence RAM released");
    }

    /// Compare hardware state with ownership.
    ///
    /// A slot armed or running in hardware without an owner is a
    /// hardware inconsistency: it is logged and disarmed. Returns the
    /// inconsistencies found; none of them is fatal.
    pub fn audit(&self) -> Vec<SequenceError> {
        let mut found = Vec::new();
        for slot in &self.slots {
            if let Some(status) = slot.disarm_if_orphaned() {
                let err = SequenceError::HardwareInconsistency {
                    slot: slot.id(),
                    detail: format!("unowned sequence RAM reports {status:?}"),
                };
                warn!(slot = slot.id(), "{err}");
                found.push(err);
            }
        }
        found
    }
}
