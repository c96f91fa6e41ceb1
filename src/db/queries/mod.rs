pub mod chapters;
pub mod duplicates;
pub mod libraries;
pub mod media;
pub mod tags;
