//! Server-side computation graphs: encoding, band math and spectral indices.

mod band_math;
mod graph;
mod indices;

pub use band_math::{BandExpr, BinaryOp};
pub use graph::{Expression, Node, ValueNode};
pub use indices::{IndexCalculator, SpectralIndices, SCENE_ARGUMENT};
