//! Operators that reshape, restride or reindex their input.
use super::{dimensioned_input, gather_tensor_types};
use crate::common::{wrap_dim, Failure, Result};
use crate::dtype::ScalarType;
use crate::graph::{Kind, NodeId};
use crate::ivalue::IValue;
use crate::registry::{Ctx, Refinement, Registry};
use crate::types::{Dim, Dims, TensorType};

pub(super) fn register(reg: &mut Registry) {
    reg.register(
        "as_strided",
        &["aten::as_strided(Tensor(a) self, SymInt[] size, SymInt[] stride, SymInt? storage_offset=None) -> Tensor(a)"],
        as_strided,
    );
    reg.register(
        "expand",
        &["aten::expand(Tensor(a) self, SymInt[] size, *, bool implicit=False) -> Tensor(a)"],
        expand,
    );
    reg.register(
        "reshape",
        &[
            "aten::reshape(Tensor(a) self, SymInt[] shape) -> Tensor(a)",
            "aten::view(Tensor(a) self, SymInt[] size) -> Tensor(a)",
        ],
        reshape,
    );
    reg.register(
        "repeat",
        &["aten::repeat(Tensor self, SymInt[] repeats) -> Tensor"],
        repeat,
    );
    reg.register(
        "masked_select",
        &["aten::masked_select(Tensor self, Tensor mask) -> Tensor"],
        masked_select,
    );
    reg.register(
        "einsum",
        &["aten::einsum(str equation, Tensor[] tensors, *, int[]? path=None) -> Tensor"],
        einsum,
    );
    reg.register(
        "list_getitem",
        &["aten::__getitem__.t(t[](a) list, int idx) -> t(*)"],
        list_getitem,
    );
    reg.register(
        "type_as",
        &["aten::type_as(Tensor self, Tensor other) -> Tensor"],
        type_as,
    );
    reg.register(
        "shape_of_other",
        &[
            "aten::view_as(Tensor(a) self, Tensor other) -> Tensor(a)",
            "aten::expand_as(Tensor(a) self, Tensor other) -> Tensor(a)",
            "aten::reshape_as(Tensor(a) self, Tensor other) -> Tensor(a)",
        ],
        shape_of_other,
    );
    reg.register(
        "as_tensor",
        &["aten::as_tensor(Tensor data, *, ScalarType? dtype=None, Device? device=None) -> Tensor"],
        as_tensor,
    );
    reg.register(
        "unsqueeze",
        &["aten::unsqueeze(Tensor(a) self, int dim) -> Tensor(a)"],
        unsqueeze,
    );
    reg.register(
        "flatten",
        &["aten::flatten.using_ints(Tensor(a) self, int start_dim=0, int end_dim=-1) -> Tensor(a)"],
        flatten,
    );
    reg.register(
        "select",
        &[
            "aten::select.int(Tensor(a) self, int dim, SymInt index) -> Tensor(a)",
            "aten::diagonal(Tensor(a) self, int offset=0, int dim1=0, int dim2=1) -> Tensor(a)",
        ],
        select,
    );
    reg.register(
        "slice",
        &["aten::slice.Tensor(Tensor(a) self, int dim=0, SymInt? start=None, SymInt? end=None, SymInt step=1) -> Tensor(a)"],
        slice,
    );
    reg.register(
        "nonzero",
        &["aten::nonzero(Tensor self) -> Tensor"],
        nonzero,
    );
    reg.register("take", &["aten::take(Tensor self, Tensor index) -> Tensor"], take);
    reg.register(
        "diagflat",
        &["aten::diagflat(Tensor self, int offset=0) -> Tensor"],
        diagflat,
    );
    reg.register("diag", &["aten::diag(Tensor self, int diagonal=0) -> Tensor"], diag);
    reg.register(
        "unfold",
        &["aten::unfold(Tensor(a) self, int dimension, int size, int step) -> Tensor(a)"],
        unfold,
    );
    reg.register(
        "polygamma",
        &["aten::polygamma(int n, Tensor self) -> Tensor"],
        polygamma,
    );
}

/// The elements of the int-list argument of `n` following the tensor, as far as they are
/// literal. `None` if not even the length of the list is known.
fn size_list(ctx: &Ctx, n: NodeId) -> Option<Vec<Option<i64>>> {
    let v = *ctx.graph.node(n).inputs.get(1)?;
    if let Some(sizes) = ctx.graph.constant_of(v).and_then(|c| c.to_int_list()) {
        return Some(sizes.into_iter().map(Some).collect());
    }
    let node = ctx.graph.producer(v)?;
    if node.kind != Kind::ListConstruct {
        return None;
    }
    Some(
        node.inputs
            .iter()
            .map(|i| ctx.graph.constant_of(*i).and_then(|c| c.to_int()))
            .collect(),
    )
}

fn to_dim(size: Option<i64>) -> Result<Dim> {
    match size {
        Some(s) => {
            shape_assert!(s >= 0, "negative size {}", s);
            Ok(Dim::Static(s as u64))
        }
        None => Ok(Dim::fresh()),
    }
}

fn as_strided(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let (t, sizes) = match (ctx.input_tensor(n, 0), size_list(ctx, n)) {
        (Some(t), Some(sizes)) => (t, sizes),
        _ => return Ok(Refinement::Declined),
    };
    let dims = sizes.into_iter().map(to_dim).collect::<Result<Dims>>()?;
    Ok(Refinement::one(t.with_dims(dims)))
}

// Sizes align with the input at the trailing end; -1 keeps the input's size.
fn expand(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let (t, sizes) = match (ctx.input_tensor(n, 0), size_list(ctx, n)) {
        (Some(t), Some(sizes)) => (t, sizes),
        _ => return Ok(Refinement::Declined),
    };
    if let Some(rank) = t.rank() {
        shape_assert!(
            sizes.len() >= rank,
            "cannot expand a rank-{} tensor to {} dimensions",
            rank,
            sizes.len()
        );
    }
    let lead = t.rank().map(|r| sizes.len() - r);
    let mut dims = Dims::with_capacity(sizes.len());
    for (i, s) in sizes.into_iter().enumerate() {
        dims.push(match s {
            Some(-1) => match (lead, t.dims()) {
                (Some(lead), Some(in_dims)) if i >= lead => in_dims[i - lead],
                _ => Dim::fresh(),
            },
            s => to_dim(s)?,
        });
    }
    Ok(Refinement::one(t.with_dims(dims)))
}

fn reshape(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let sizes = match size_list(ctx, n) {
        Some(sizes) => sizes,
        None => return Ok(Refinement::Declined),
    };
    let inferred = sizes.iter().filter(|s| **s == Some(-1)).count();
    shape_assert!(inferred <= 1, "only one dimension can be inferred");
    let numel: Option<u64> = t.concrete_sizes().map(|s| s.iter().product());
    let known: Option<u64> = sizes
        .iter()
        .filter(|s| **s != Some(-1))
        .map(|s| s.and_then(|x| if x >= 0 { Some(x as u64) } else { None }))
        .product();
    let mut dims = Dims::with_capacity(sizes.len());
    for s in sizes.iter() {
        dims.push(match s {
            Some(-1) => match (numel, known) {
                (Some(numel), Some(known)) => {
                    shape_assert!(
                        known != 0 && numel % known == 0,
                        "cannot view {} elements with a known size product of {}",
                        numel,
                        known
                    );
                    Dim::Static(numel / known)
                }
                _ => Dim::fresh(),
            },
            s => to_dim(*s)?,
        });
    }
    if let (0, Some(numel), Some(known)) = (inferred, numel, known) {
        shape_assert!(numel == known, "cannot view {} elements as {}", numel, known);
    }
    Ok(Refinement::one(t.with_dims(dims)))
}

fn repeat(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let (t, repeats) = match (ctx.input_tensor(n, 0), size_list(ctx, n)) {
        (Some(t), Some(r)) => (t, r),
        _ => return Ok(Refinement::Declined),
    };
    let in_dims = match t.dims() {
        Some(d) => d,
        None => return Ok(Refinement::one(t.with_rank(Some(repeats.len())))),
    };
    shape_assert!(
        repeats.len() >= in_dims.len(),
        "fewer repeats than dimensions"
    );
    let lead = repeats.len() - in_dims.len();
    let mut dims = Dims::with_capacity(repeats.len());
    for (i, r) in repeats.iter().enumerate() {
        let d = if i < lead { Dim::Static(1) } else { in_dims[i - lead] };
        dims.push(match (d, r) {
            (d, Some(1)) => d,
            (Dim::Static(s), Some(r)) => {
                shape_assert!(*r >= 0, "negative repeat count {}", r);
                Dim::Static(s * *r as u64)
            }
            _ => Dim::fresh(),
        });
    }
    Ok(Refinement::one(t.with_dims(dims)))
}

fn masked_select(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(dimensioned_input(ctx, n, 0).map(|t| t.with_rank(Some(1))).into())
}

// The output rank is the number of subscripts to the right of the arrow.
fn einsum(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let equation = match ctx.get_const(n, "equation") {
        Some(IValue::Str(s)) => s,
        _ => return Ok(Refinement::Declined),
    };
    let rank = match equation.find("->") {
        Some(ix) => equation[ix..].chars().filter(|c| c.is_ascii_alphabetic()).count(),
        None => return Ok(Refinement::Declined),
    };
    let first = ctx
        .graph
        .named_input(n, "tensors")
        .and_then(|l| ctx.graph.producer(l))
        .filter(|p| p.kind == Kind::ListConstruct)
        .and_then(|p| p.inputs.first().cloned())
        .and_then(|v| ctx.graph.ty(v).as_tensor().cloned());
    Ok(first.map(|t| t.with_rank(Some(rank))).into())
}

fn list_getitem(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let list = ctx.graph.node(n).inputs[0];
    let elts = match ctx.graph.producer(list) {
        Some(p) if p.kind == Kind::ListConstruct => p.inputs.clone(),
        _ => return Ok(Refinement::Declined),
    };
    let idx = match ctx.get_int(n, "idx") {
        Some(i) if i < 0 => i + elts.len() as i64,
        Some(i) => i,
        None => return Ok(Refinement::Declined),
    };
    if idx < 0 || idx as usize >= elts.len() {
        return Ok(Refinement::Declined);
    }
    let ty = ctx.graph.ty(elts[idx as usize]).clone();
    Ok(Refinement::Refined(smallvec::smallvec![ty]))
}

fn type_as(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    match gather_tensor_types(ctx, n, false) {
        Some(ts) => Ok(Refinement::one(ts[0].1.with_scalar_type(ts[1].1.scalar_type()))),
        None => Ok(Refinement::Declined),
    }
}

fn shape_of_other(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let ts = match gather_tensor_types(ctx, n, false) {
        Some(ts) => ts,
        None => return Ok(Refinement::Declined),
    };
    let (t, other) = (&ts[0].1, &ts[1].1);
    Ok(Refinement::one(match other.dims() {
        Some(d) => t.with_dims(d.to_vec()),
        None => t.with_rank(other.rank()),
    }))
}

fn as_tensor(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let (st, device) = match (t.scalar_type(), t.device()) {
        (Some(st), Some(d)) => (st, d),
        _ => return Ok(Refinement::Declined),
    };
    let (dtype, dev) = match (ctx.get_dtype(n, "dtype"), ctx.get_device(n, "device")) {
        (Some(dtype), Some(dev)) => (dtype, dev),
        _ => return Ok(Refinement::Declined),
    };
    Ok(Refinement::one(TensorType::new(
        Some(dtype.unwrap_or(st)),
        Some(dev.unwrap_or(device)),
        t.rank(),
        None,
    )))
}

fn unsqueeze(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let rank = match t.rank() {
        Some(r) => r,
        None => return Ok(Refinement::one(t)),
    };
    match (t.dims(), ctx.get_int(n, "dim")) {
        (Some(dims), Some(dim)) => {
            let at = match wrap_dim(dim, rank + 1) {
                Some(at) => at,
                None => return Ok(Refinement::one(t.with_rank(Some(rank + 1)))),
            };
            let mut dims = dims.to_vec();
            dims.insert(at, Dim::Static(1));
            Ok(Refinement::one(t.with_dims(dims)))
        }
        _ => Ok(Refinement::one(t.with_rank(Some(rank + 1)))),
    }
}

fn flatten(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let (start, end) = match (ctx.get_int(n, "start_dim"), ctx.get_int(n, "end_dim")) {
        (Some(s), Some(e)) => (s, e),
        _ => return Ok(Refinement::Declined),
    };
    let rank = match t.rank() {
        Some(0) => return Ok(Refinement::one(t.with_rank(Some(1)))),
        Some(r) => r,
        None => return Ok(Refinement::Declined),
    };
    let (start, end) = match (wrap_dim(start, rank), wrap_dim(end, rank)) {
        (Some(s), Some(e)) if s <= e => (s, e),
        _ => {
            return Err(Failure::Shape(format!(
                "bad flatten range {}..{} for rank {}",
                start, end, rank
            )))
        }
    };
    let dims = match t.dims() {
        Some(d) => d,
        None => return Ok(Refinement::one(t.with_rank(Some(rank - end + start)))),
    };
    let merged = dims[start..=end]
        .iter()
        .map(|d| d.static_size())
        .product::<Option<u64>>()
        .map(Dim::Static)
        .unwrap_or_else(Dim::fresh);
    let mut out = dims[..start].to_vec();
    out.push(merged);
    out.extend_from_slice(&dims[end + 1..]);
    Ok(Refinement::one(t.with_dims(out)))
}

fn select(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let rank = match t.rank() {
        Some(r) if r > 0 => r,
        _ => return Ok(Refinement::Declined),
    };
    if ctx.graph.node(n).name() == "aten::select" {
        let at = ctx.get_int(n, "dim").and_then(|d| wrap_dim(d, rank));
        if let (Some(at), Some(dims)) = (at, t.dims()) {
            let mut dims = dims.to_vec();
            dims.remove(at);
            return Ok(Refinement::one(t.with_dims(dims)));
        }
    }
    Ok(Refinement::one(t.with_rank(Some(rank - 1))))
}

fn slice(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let (dims, dim) = match (t.dims(), ctx.get_int(n, "dim")) {
        (Some(d), Some(dim)) => (d.to_vec(), dim),
        _ => return Ok(Refinement::Declined),
    };
    let at = match wrap_dim(dim, dims.len()) {
        Some(at) => at,
        None => return Err(Failure::Shape(format!("slice dimension {} out of range", dim))),
    };
    let bound = |name: &str, size: u64, default: i64| -> Option<u64> {
        let b = match ctx.get_const(n, name)? {
            IValue::None => default,
            v => v.to_int()?,
        };
        let b = if b < 0 { b + size as i64 } else { b };
        Some(b.max(0).min(size as i64) as u64)
    };
    let mut out = dims.clone();
    out[at] = match (dims[at], ctx.get_int(n, "step")) {
        (Dim::Static(size), Some(step)) => {
            shape_assert!(step > 0, "slice step must be positive");
            match (bound("start", size, 0), bound("end", size, i64::MAX)) {
                (Some(start), Some(end)) => {
                    let len = end.saturating_sub(start);
                    Dim::Static((len + step as u64 - 1) / step as u64)
                }
                _ => Dim::fresh(),
            }
        }
        _ => Dim::fresh(),
    };
    Ok(Refinement::one(t.with_dims(out)))
}

// One row of coordinates per nonzero element.
fn nonzero(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t.with_scalar_type(Some(ScalarType::Long)),
        None => return Ok(Refinement::Declined),
    };
    Ok(Refinement::one(match t.rank() {
        Some(r) => t.with_dims(vec![Dim::fresh(), Dim::Static(r as u64)]),
        None => t.with_rank(Some(2)),
    }))
}

fn take(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    match gather_tensor_types(ctx, n, false) {
        Some(ts) => Ok(Refinement::one(ts[1].1.with_scalar_type(ts[0].1.scalar_type()))),
        None => Ok(Refinement::Declined),
    }
}

fn diagflat(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(ctx.input_tensor(n, 0).map(|t| t.with_rank(Some(2))).into())
}

fn diag(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(ctx
        .input_tensor(n, 0)
        .and_then(|t| match t.rank() {
            Some(1) => Some(t.with_rank(Some(2))),
            Some(2) => Some(t.with_rank(Some(1))),
            _ => None,
        })
        .into())
}

fn unfold(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(ctx
        .input_tensor(n, 0)
        .and_then(|t| t.rank().map(|r| t.with_rank(Some(r + 1))))
        .into())
}

fn polygamma(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(ctx.named_tensor(n, "self").into())
}

#[cfg(test)]
mod tests {
    use crate::dtype::{Device, ScalarType};
    use crate::fallback::NoExecutor;
    use crate::graph::{Graph, Kind, NodeId, ValueId};
    use crate::ivalue::IValue;
    use crate::propagate::propagate_shapes;
    use crate::types::{Dim, TensorType, Type};

    const VIEW: &str = "aten::view(Tensor(a) self, SymInt[] size) -> Tensor(a)";

    fn input(g: &mut Graph, sizes: &[u64]) -> ValueId {
        g.add_input(Type::Tensor(TensorType::complete(
            ScalarType::Float,
            Device::CPU,
            sizes,
        )))
    }

    fn out(g: &Graph, n: NodeId) -> TensorType {
        g.ty(g.node(n).outputs[0]).as_tensor().cloned().unwrap()
    }

    #[test]
    fn view_infers_missing_size() {
        let mut g = Graph::new();
        let top = g.top();
        let x = input(&mut g, &[2, 3, 4]);
        let size = g.constant(top, IValue::IntList(vec![6, -1]));
        let n = g.append_op(top, VIEW, &[x, size]).unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        assert_eq!(out(&g, n).concrete_sizes(), Some(vec![6, 4]));
    }

    #[test]
    fn view_of_unknown_list_has_rank() {
        let mut g = Graph::new();
        let top = g.top();
        let x = input(&mut g, &[2, 3, 4]);
        let a = g.add_input(Type::Int);
        let b = g.constant(top, IValue::Int(4));
        let l = g.append_node(top, Kind::ListConstruct, &[a, b], vec![Type::list(Type::Int)]);
        let l = g.node(l).outputs[0];
        let n = g.append_op(top, VIEW, &[x, l]).unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let t = out(&g, n);
        assert_eq!(t.rank(), Some(2));
        assert_eq!(t.dims().unwrap()[1], Dim::Static(4));
        assert!(!t.dims().unwrap()[0].is_static());
    }

    #[test]
    fn bad_view_is_forgotten() {
        let mut g = Graph::new();
        let top = g.top();
        let x = input(&mut g, &[2, 3]);
        let size = g.constant(top, IValue::IntList(vec![4, -1]));
        let n = g.append_op(top, VIEW, &[x, size]).unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        assert!(out(&g, n).is_unshaped());
    }

    #[test]
    fn expand_keeps_minus_one() {
        let mut g = Graph::new();
        let top = g.top();
        let x = input(&mut g, &[1, 3]);
        let size = g.constant(top, IValue::IntList(vec![5, 2, -1]));
        let f = g.constant(top, IValue::Bool(false));
        let n = g
            .append_op(
                top,
                "aten::expand(Tensor(a) self, SymInt[] size, *, bool implicit=False) -> Tensor(a)",
                &[x, size, f],
            )
            .unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        assert_eq!(out(&g, n).concrete_sizes(), Some(vec![5, 2, 3]));
    }

    #[test]
    fn slice_with_static_bounds() {
        let mut g = Graph::new();
        let top = g.top();
        let x = input(&mut g, &[4, 10]);
        let dim = g.constant(top, IValue::Int(1));
        let start = g.constant(top, IValue::Int(1));
        let end = g.constant(top, IValue::Int(-1));
        let step = g.constant(top, IValue::Int(2));
        let n = g
            .append_op(
                top,
                "aten::slice.Tensor(Tensor(a) self, int dim=0, SymInt? start=None, \
                 SymInt? end=None, SymInt step=1) -> Tensor(a)",
                &[x, dim, start, end, step],
            )
            .unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        // Elements 1, 3, 5, 7.
        assert_eq!(out(&g, n).concrete_sizes(), Some(vec![4, 4]));
    }

    #[test]
    fn flatten_and_unsqueeze() {
        let mut g = Graph::new();
        let top = g.top();
        let x = input(&mut g, &[2, 3, 4]);
        let one = g.constant(top, IValue::Int(1));
        let last = g.constant(top, IValue::Int(-1));
        let f = g
            .append_op(
                top,
                "aten::flatten.using_ints(Tensor(a) self, int start_dim=0, int end_dim=-1) -> Tensor(a)",
                &[x, one, last],
            )
            .unwrap();
        let u = g
            .append_op(top, "aten::unsqueeze(Tensor(a) self, int dim) -> Tensor(a)", &[x, last])
            .unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        assert_eq!(out(&g, f).concrete_sizes(), Some(vec![2, 12]));
        assert_eq!(out(&g, u).concrete_sizes(), Some(vec![2, 3, 4, 1]));
    }

    #[test]
    fn getitem_of_list_construct() {
        let mut g = Graph::new();
        let top = g.top();
        let x = input(&mut g, &[2]);
        let y = input(&mut g, &[7]);
        let l = g.append_node(
            top,
            Kind::ListConstruct,
            &[x, y],
            vec![Type::list(Type::unshaped())],
        );
        let l = g.node(l).outputs[0];
        let idx = g.constant(top, IValue::Int(-1));
        let n = g
            .append_op(top, "aten::__getitem__.t(t[](a) list, int idx) -> t(*)", &[l, idx])
            .unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        assert_eq!(out(&g, n).concrete_sizes(), Some(vec![7]));
    }
}
