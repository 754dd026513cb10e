//! Helpers shared by the end-to-end tests.
#![allow(dead_code)]
use ndarray::{ArrayD, IxDyn};
use shapeprop::{
    ExecutionError, Executor, Graph, IValue, NodeId, ScalarType, Tensor, TensorType, Type,
    ValueId,
};

pub const ADD: &str = "aten::add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor";
pub const HYPOT: &str = "aten::hypot(Tensor self, Tensor other) -> Tensor";
pub const OUTER: &str = "aten::outer(Tensor self, Tensor vec2) -> Tensor";

/// Runs a handful of operators that have no formula, using ndarray.
pub struct NdExecutor;

fn fail(op: &str, message: impl Into<String>) -> ExecutionError {
    ExecutionError {
        op: op.into(),
        message: message.into(),
    }
}

fn tensors<'a>(op: &str, inputs: &'a [IValue]) -> Result<(&'a Tensor, &'a Tensor), ExecutionError> {
    match (inputs.get(0), inputs.get(1)) {
        (Some(IValue::Tensor(a)), Some(IValue::Tensor(b))) => Ok((a, b)),
        _ => Err(fail(op, "expected two tensors")),
    }
}

impl Executor for NdExecutor {
    fn can_run(&self, g: &Graph, n: NodeId) -> bool {
        matches!(g.node(n).name(), "aten::hypot" | "aten::outer")
    }

    fn run(&self, g: &Graph, n: NodeId, inputs: Vec<IValue>) -> Result<Vec<IValue>, ExecutionError> {
        let op = g.node(n).name();
        let (a, b) = tensors(op, &inputs[..])?;
        let st = a.scalar_type.promote(b.scalar_type);
        let res = match op {
            "aten::hypot" => {
                let sum = &a.data * &a.data + &b.data * &b.data;
                sum.mapv(f64::sqrt)
            }
            "aten::outer" => {
                if a.rank() != 1 || b.rank() != 1 {
                    return Err(fail(op, "outer product of non-vectors"));
                }
                let (m, k) = (a.data.len(), b.data.len());
                ArrayD::from_shape_fn(IxDyn(&[m, k]), |ix| a.data[[ix[0]]] * b.data[[ix[1]]])
            }
            _ => return Err(fail(op, "unsupported operator")),
        };
        Ok(vec![IValue::Tensor(Tensor::from_array(res, st))])
    }
}

pub fn complete(st: ScalarType, sizes: &[u64]) -> Type {
    Type::Tensor(TensorType::complete(st, shapeprop::Device::CPU, sizes))
}

pub fn ranked(st: ScalarType, rank: usize) -> Type {
    Type::Tensor(TensorType::new(
        Some(st),
        Some(shapeprop::Device::CPU),
        Some(rank),
        None,
    ))
}

pub fn out(g: &Graph, n: NodeId) -> ValueId {
    g.node(n).outputs[0]
}

pub fn tensor_of(g: &Graph, v: ValueId) -> TensorType {
    match g.ty(v) {
        Type::Tensor(t) => t.clone(),
        other => panic!("expected a tensor, got {}", other),
    }
}

/// The types of `vs`, for comparing before and after a pass.
pub fn snapshot(g: &Graph, vs: &[ValueId]) -> Vec<Type> {
    vs.iter().map(|v| g.ty(*v).clone()).collect()
}
