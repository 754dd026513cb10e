//! Recovering output types by running an operator on representative inputs.
//!
//! When no formula knows an operator, but every input is a literal or a fully known tensor, we can
//! build zero-filled stand-ins for the inputs, run the operator, and read the result types off its
//! outputs. Running the operator is left to an [Executor] supplied by the caller.
use crate::common::{Failure, Result};
use crate::graph::{Graph, NodeId, ValueId};
use crate::ivalue::{IValue, Tensor};
use crate::types::Type;

use std::fmt;

/// An error raised while running an operator.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionError {
    pub op: String,
    pub message: String,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "error running {}: {}", self.op, self.message)
    }
}

impl std::error::Error for ExecutionError {}

/// Runs individual graph operators on concrete values.
pub trait Executor {
    /// Whether `run` supports node `n` at all.
    fn can_run(&self, _g: &Graph, _n: NodeId) -> bool {
        true
    }

    /// Run `n` on `inputs`, one per input of the node, returning one value per output.
    fn run(
        &self,
        g: &Graph,
        n: NodeId,
        inputs: Vec<IValue>,
    ) -> std::result::Result<Vec<IValue>, ExecutionError>;
}

/// An executor that cannot run anything, disabling the fallback.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoExecutor;

impl Executor for NoExecutor {
    fn can_run(&self, _g: &Graph, _n: NodeId) -> bool {
        false
    }
    fn run(
        &self,
        _g: &Graph,
        n: NodeId,
        _inputs: Vec<IValue>,
    ) -> std::result::Result<Vec<IValue>, ExecutionError> {
        Err(ExecutionError {
            op: format!("node {}", n.index()),
            message: "no executor available".into(),
        })
    }
}

// Operators whose result on zero-filled inputs says nothing useful (or that fail on them).
const NEVER_RUN: &[&str] = &["aten::inverse"];

fn is_valid_argument(g: &Graph, v: ValueId) -> bool {
    if g.is_constant(v) {
        return true;
    }
    match g.ty(v) {
        Type::Tensor(t) => match t.scalar_type() {
            Some(st) => !st.is_integral(false),
            None => false,
        },
        Type::Float | Type::Int | Type::Number => true,
        _ => false,
    }
}

fn is_valid_return(g: &Graph, v: ValueId) -> bool {
    matches!(g.ty(v), Type::Tensor(_) | Type::Float | Type::Int | Type::Number)
}

fn can_run(g: &Graph, n: NodeId, exec: &dyn Executor) -> bool {
    let node = g.node(n);
    if node.kind.schema().is_none() || NEVER_RUN.contains(&node.name()) {
        return false;
    }
    node.inputs.iter().all(|v| is_valid_argument(g, *v))
        && node.outputs.iter().all(|v| is_valid_return(g, *v))
        && exec.can_run(g, n)
}

/// A concrete stand-in for `v`: its literal value, or zeros of its type.
fn representative_value(g: &Graph, v: ValueId) -> Option<IValue> {
    if let Some(c) = g.constant_of(v) {
        return Some(c);
    }
    match g.ty(v) {
        Type::Tensor(t) => {
            let sizes = t.concrete_sizes()?;
            let mut z = Tensor::zeros(t.scalar_type()?, t.device()?, &sizes[..]);
            z.requires_grad = t.requires_grad().unwrap_or(false);
            Some(IValue::Tensor(z))
        }
        Type::Float | Type::Number => Some(IValue::Double(0.0)),
        Type::Int => Some(IValue::Int(0)),
        _ => None,
    }
}

/// Try to refine the outputs of `n` by running it. Returns whether it ran.
///
/// Errors from the executor are fatal: by the time we get here the node has passed every check,
/// so a failure points at a bad schema or executor rather than at the graph.
pub(crate) fn propagate_by_running(g: &mut Graph, n: NodeId, exec: &dyn Executor) -> Result<bool> {
    if !can_run(g, n, exec) {
        return Ok(false);
    }
    let inputs = match g
        .node(n)
        .inputs
        .iter()
        .map(|v| representative_value(g, *v))
        .collect::<Option<Vec<_>>>()
    {
        Some(inputs) => inputs,
        // Some tensor input is not complete.
        None => return Ok(false),
    };
    log::debug!("running {} on representative inputs", g.node(n).name());
    let results = match exec.run(g, n, inputs) {
        Ok(r) => r,
        Err(e) => return Err(Failure::Fatal(e.to_string())),
    };
    let outputs = g.node(n).outputs.clone();
    assert_eq!(
        results.len(),
        outputs.len(),
        "executor returned {} values for {} outputs of {}",
        results.len(),
        outputs.len(),
        g.node(n).name()
    );
    for (v, res) in outputs.iter().zip(results.iter()) {
        // Primitive outputs already have their most specific type.
        let t = match res {
            IValue::Tensor(t) => t,
            _ => continue,
        };
        let requires_grad = match g.ty(*v) {
            Type::Tensor(old) => old.requires_grad(),
            _ => continue,
        };
        // Zeros carry no gradient information; keep what was declared.
        g.set_type(*v, Type::Tensor(t.descriptor().with_requires_grad(requires_grad)));
    }
    Ok(true)
}
