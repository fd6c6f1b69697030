use std::hash::BuildHasherDefault;
use std::sync::{Mutex, OnceLock};

// we will use a fast hashing algo for maps keyed by names and identifiers
use seahash::SeaHasher;

use crate::error::Result;

pub type NameHasher = BuildHasherDefault<SeaHasher>;

/// A value computed at most once, on first use, and then shared by every
/// reader. Concurrent first readers wait on the same build instead of each
/// computing their own copy. A failed build leaves the cache empty.
#[derive(Debug)]
pub struct OnceCache<T> {
    cell: OnceLock<T>,
    building: Mutex<()>,
}

impl<T> OnceCache<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            building: Mutex::new(()),
        }
    }
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }
    pub fn get_or_try_init<F>(&self, build: F) -> Result<&T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(kept) = self.cell.get() {
            return Ok(kept);
        }
        let _guard = self.building.lock()?;
        if let Some(kept) = self.cell.get() {
            return Ok(kept);
        }
        let built = build()?;
        Ok(self.cell.get_or_init(|| built))
    }
}

impl<T> Default for OnceCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
