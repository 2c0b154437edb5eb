//! Port traits defining external boundaries.
//!
//! The engine reaches time and the filesystem only through these traits.
//! Implementations live in `src/adapters/`.

pub mod clock;
pub mod filesystem;

pub use clock::Clock;
pub use filesystem::FileSystem;
