//! Shape and element-type propagation over SSA tensor dataflow graphs.
//!
//! [propagate_shapes] walks a [Graph] and refines the type of every value: tensor rank, sizes,
//! element type, device and whether it requires a gradient. Per-operator knowledge lives in a
//! table of formulas keyed by operator schema ([registry]); operators without a formula can be run
//! on representative inputs through a caller-supplied [Executor]. [erase_shapes] undoes a pass.
#[macro_use]
pub mod common;
pub mod display;
pub mod dtype;
pub mod erase;
pub mod fallback;
mod formulas;
pub mod graph;
pub mod ivalue;
pub mod propagate;
pub mod registry;
pub mod schema;
pub mod types;

pub use common::PropagationError;
pub use dtype::{Device, DeviceKind, ScalarType};
pub use erase::erase_shapes;
pub use fallback::{ExecutionError, Executor, NoExecutor};
pub use graph::{Attr, BlockId, Graph, Kind, NodeId, ValueId};
pub use ivalue::{IValue, Tensor};
pub use propagate::{propagate_shapes, propagate_shapes_with, Config};
pub use types::{Dim, TensorType, Type};
