//! Domain types shared by every stage of the signal pipeline.

pub mod bar;
pub mod label;
pub mod probabilities;

pub use bar::{check_ordering, closes, highs, lows, volumes, Bar, BarError};
pub use label::{forward_labels, Label};
pub use probabilities::{ClassProbabilities, NO_SIGNAL};
