mod structure_set;

pub use structure_set::{
    ContourRecord, ImportParams, ImportStructureSet, ImportedStructureSet, RegionRecord,
    SkippedRegion, StructureSetRecord,
};
