//! The Carver2D data model: blocks, accounting addresses, and movements.
//!
//! See the submodules for invariants.

mod address;
mod block;
mod movement;

pub use address::{CarverAddress, Label, LabelKind};
pub use block::Block;
pub use movement::{CarverMovement, MovementType, ParsedMovement, RequiredMovement, RewardCategory};
