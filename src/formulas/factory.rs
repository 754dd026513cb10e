//! Tensor factories: the result's type comes from literal arguments rather than from data.
use super::scalar_type_of;
use crate::common::Result;
use crate::dtype::{Device, ScalarType};
use crate::graph::NodeId;
use crate::ivalue::IValue;
use crate::registry::{Ctx, Refinement, Registry};
use crate::types::{Dim, Dims, TensorType, Type};

pub(super) fn register(reg: &mut Registry) {
    reg.register(
        "like_factory",
        &[
            "aten::empty_like(Tensor self, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None, MemoryFormat? memory_format=None) -> Tensor",
            "aten::full_like(Tensor self, Scalar fill_value, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None, MemoryFormat? memory_format=None) -> Tensor",
            "aten::ones_like(Tensor self, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None, MemoryFormat? memory_format=None) -> Tensor",
            "aten::rand_like(Tensor self, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None, MemoryFormat? memory_format=None) -> Tensor",
            "aten::randint_like(Tensor self, SymInt high, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None, MemoryFormat? memory_format=None) -> Tensor",
            "aten::randint_like.low_dtype(Tensor self, SymInt low, SymInt high, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None, MemoryFormat? memory_format=None) -> Tensor",
            "aten::randn_like(Tensor self, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None, MemoryFormat? memory_format=None) -> Tensor",
            "aten::zeros_like(Tensor self, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None, MemoryFormat? memory_format=None) -> Tensor",
            "aten::_to_copy(Tensor self, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None, bool non_blocking=False, MemoryFormat? memory_format=None) -> Tensor",
        ],
        like_factory,
    );
    reg.register(
        "new_size_factory",
        &["aten::new_zeros(Tensor self, SymInt[] size, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None) -> Tensor"],
        new_size_factory,
    );
    reg.register(
        "size_factory",
        &[
            "aten::empty.memory_format(SymInt[] size, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None, MemoryFormat? memory_format=None) -> Tensor",
            "aten::full(SymInt[] size, Scalar fill_value, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None) -> Tensor",
            "aten::ones(SymInt[] size, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None) -> Tensor",
            "aten::rand(SymInt[] size, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None) -> Tensor",
            "aten::randn(SymInt[] size, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None) -> Tensor",
            "aten::zeros(SymInt[] size, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None) -> Tensor",
            "aten::randint(SymInt high, SymInt[] size, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None) -> Tensor",
            "aten::randint.low(SymInt low, SymInt high, SymInt[] size, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None) -> Tensor",
        ],
        size_factory,
    );
    reg.register(
        "arange",
        &["aten::arange(Scalar end, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None) -> Tensor"],
        arange,
    );
    reg.register(
        "list_to_tensor",
        &["aten::tensor(t[] data, *, ScalarType? dtype=None, Device? device=None, bool requires_grad=False) -> Tensor"],
        list_to_tensor,
    );
}

/// The literal `dtype`, `layout` and `device` options of a factory. `None` unless all three are
/// literals; each inner `None` means the option was passed as `None`.
fn options(ctx: &Ctx, n: NodeId) -> Option<(Option<ScalarType>, Option<Device>)> {
    ctx.get_const(n, "layout")?;
    let device = ctx.get_device(n, "device")?;
    let dtype = ctx.get_dtype(n, "dtype")?;
    Some((dtype, device))
}

fn like_factory(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.named_tensor(n, "self") {
        Some(t) if t.rank().is_some() => t,
        _ => return Ok(Refinement::Declined),
    };
    let (dtype, device) = match options(ctx, n) {
        Some(opts) => opts,
        None => return Ok(Refinement::Declined),
    };
    let mut res = TensorType::new(
        dtype.or_else(|| t.scalar_type()),
        device.or_else(|| t.device()),
        t.rank(),
        None,
    );
    if t.is_complete() {
        if let Some(dims) = t.dims() {
            res = res.with_dims(dims.to_vec());
        }
    }
    Ok(Refinement::one(res))
}

fn new_size_factory(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.named_tensor(n, "self") {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let rank = match ctx.graph.named_input(n, "size") {
        Some(v) => ctx.graph.list_size(v),
        None => None,
    };
    let (dtype, device) = match (rank, options(ctx, n)) {
        (Some(_), Some(opts)) => opts,
        _ => return Ok(Refinement::Declined),
    };
    let res = TensorType::new(
        dtype.or_else(|| t.scalar_type()),
        device.or_else(|| t.device()),
        rank,
        None,
    );
    Ok(Refinement::one(with_literal_sizes(ctx, n, res)?))
}

/// Exact dimensions from a literal `size` argument, when there is one.
fn with_literal_sizes(ctx: &Ctx, n: NodeId, t: TensorType) -> Result<TensorType> {
    match ctx.get_int_list(n, "size") {
        Some(sizes) => {
            let mut dims = Dims::with_capacity(sizes.len());
            for s in sizes.into_iter() {
                shape_assert!(s >= 0, "negative factory size {}", s);
                dims.push(Dim::Static(s as u64));
            }
            Ok(t.with_dims(dims))
        }
        None => Ok(t),
    }
}

fn size_factory(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    if ctx.get_int_list(n, "size").is_none() {
        return Ok(Refinement::Declined);
    }
    let (dtype, device) = match options(ctx, n) {
        Some(opts) => opts,
        None => return Ok(Refinement::Declined),
    };
    let res = TensorType::new(
        Some(dtype.unwrap_or(ctx.config.default_dtype)),
        Some(device.unwrap_or(Device::CPU)),
        None,
        None,
    );
    Ok(Refinement::one(with_literal_sizes(ctx, n, res)?))
}

fn arange(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let from_end = match ctx.input_type(n, 0) {
        Some(ty) => scalar_type_of(ctx, ty),
        None => None,
    };
    let (dtype, device) = match options(ctx, n) {
        Some(opts) => opts,
        None => return Ok(Refinement::Declined),
    };
    let st = match dtype.or(from_end) {
        Some(st) => st,
        None => return Ok(Refinement::Declined),
    };
    let res = TensorType::new(Some(st), Some(device.unwrap_or(Device::CPU)), Some(1), None);
    let len = match ctx.get_const(n, "end") {
        Some(IValue::Int(end)) => Some(end.max(0) as u64),
        Some(IValue::Double(end)) if end.is_finite() => Some(end.max(0.0).ceil() as u64),
        _ => None,
    };
    Ok(Refinement::one(match len {
        Some(len) => res.with_sizes(&[len]),
        None => res,
    }))
}

// Runs after the element type and rank have been set from the list's type; fills in the length of
// the outermost dimension.
fn list_to_tensor(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let data = ctx.graph.node(n).inputs[0];
    let len = match ctx.graph.list_size(data) {
        Some(len) => len,
        None => return Ok(Refinement::Declined),
    };
    let t = match ctx.output_type(n, 0) {
        Type::Tensor(t) => t.clone(),
        _ => return Ok(Refinement::Declined),
    };
    let rank = match t.rank() {
        Some(r) if r > 0 => r,
        _ => return Ok(Refinement::Declined),
    };
    let mut dims = vec![Dim::Static(len as u64)];
    dims.extend((1..rank).map(|_| Dim::fresh()));
    Ok(Refinement::one(t.with_dims(dims)))
}
