//! Level classification.
//!
//! A declaration-order-sensitive constraint tree maps a POI's tag set to one
//! Level from an immutable registry; the Level doubles as filter and priority
//! key for the downstream label-placement stage.

mod levels;

pub use levels::{Constraint, ConstraintKind, Level, LevelClassifier, LevelDoc, LevelId};
