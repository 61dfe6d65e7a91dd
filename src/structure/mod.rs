mod region;
mod slice;

pub use region::{Structure, StructureKind, StructureMetadata, DEFAULT_COLOR};
pub use slice::PolygonSlice;

use slotmap::SlotMap;

use crate::error::StoreError;

slotmap::new_key_type! {
    /// Unique identifier for a structure in the structure store.
    pub struct StructureId;
}

/// Arena owning every imported [`Structure`].
///
/// Other components refer to structures by [`StructureId`] only.
#[derive(Debug, Default)]
pub struct StructureStore {
    structures: SlotMap<StructureId, Structure>,
}

impl StructureStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a structure and returns its ID.
    pub fn add(&mut self, structure: Structure) -> StructureId {
        self.structures.insert(structure)
    }

    /// Returns a reference to the structure, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn structure(&self, id: StructureId) -> Result<&Structure, StoreError> {
        self.structures
            .get(id)
            .ok_or_else(|| StoreError::EntityNotFound("structure".into()))
    }

    /// Removes a structure, returning it.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found in the store.
    pub fn remove(&mut self, id: StructureId) -> Result<Structure, StoreError> {
        self.structures
            .remove(id)
            .ok_or_else(|| StoreError::EntityNotFound("structure".into()))
    }

    /// Finds the structure with the given region number in the given frame
    /// of reference.
    #[must_use]
    pub fn find_by_number(&self, number: i32, frame_of_reference_uid: &str) -> Option<StructureId> {
        self.structures.iter().find_map(|(id, s)| {
            (s.number() == number && s.frame_of_reference_uid() == frame_of_reference_uid)
                .then_some(id)
        })
    }

    /// Iterates over all structures.
    pub fn iter(&self) -> impl Iterator<Item = (StructureId, &Structure)> {
        self.structures.iter()
    }

    /// Number of structures in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.structures.len()
    }

    /// Returns `true` if the store holds no structures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }
}
