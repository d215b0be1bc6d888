mod dual;
pub mod error;
pub mod finite_diff;
pub mod tape;

pub use dual::Dual;
pub use error::AutodiffError;
pub use tape::{Graph, NodeId, NodeInfo, Operand, Tape, TapeTerm};
