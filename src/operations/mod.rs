pub mod conversion;
pub mod import;
pub mod query;
pub mod shaping;
