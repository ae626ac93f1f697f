pub mod annotations;
pub mod common_structs;
pub mod data_loaders;
pub mod masks;
pub mod split;

/// Extends the iterator trait so a loader can report its progress
pub trait DataLoader: Iterator {
    /// Returns the next element index, starting from 0
    fn next_element_index(&self) -> usize;
    /// Returns the number of elements the loader yields
    fn max_elem_index(&self) -> usize;
}
