//! Point table loading.

mod points;

pub use points::{PointRecord, PointTable, TableLayout};
