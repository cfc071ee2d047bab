use parking_lot::{const_mutex, Mutex};

use crate::errors::{Result, SegError};

/// A single permit shared by the whole process.
///
/// The native module keeps its engine in global state with no handle
/// parameter, so two live sessions would silently share it. Whoever holds the
/// `SlotGuard` owns the module until the guard is dropped.
pub struct ExclusiveSlot {
    taken: Mutex<bool>,
}

pub struct SlotGuard<'a> {
    slot: &'a ExclusiveSlot,
}

/// Guards the one native module instance the process may load.
pub static NATIVE_MODULE_SLOT: ExclusiveSlot = ExclusiveSlot::new();

impl ExclusiveSlot {
    pub const fn new() -> Self {
        Self {
            taken: const_mutex(false),
        }
    }

    /// Fails with `SessionBusy` while another guard is alive.
    pub fn try_acquire(&self) -> Result<SlotGuard<'_>> {
        let mut taken = self.taken.lock();
        if *taken {
            return Err(SegError::SessionBusy);
        }
        *taken = true;
        Ok(SlotGuard { slot: self })
    }

    pub fn is_taken(&self) -> bool {
        *self.taken.lock()
    }
}

impl Default for ExclusiveSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        *self.slot.taken.lock() = false;
    }
}
