mod ribbon;

pub use ribbon::BuildRibbon;
