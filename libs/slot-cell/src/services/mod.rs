pub mod generation;
pub mod slot;
