//! Shape-transfer formulas, and the helpers they share.
//!
//! Each submodule registers one or more families of operators with the [Registry]. A family is a
//! list of schemas that share a formula. Registration order matters only when two families claim
//! the same schema: the earlier one wins.
use crate::common::Result;
use crate::dtype::ScalarType;
use crate::graph::NodeId;
use crate::ivalue::IValue;
use crate::registry::{Ctx, Refinement, Registry};
use crate::schema::ArgType;
use crate::types::{Dim, Dims, TensorType, Type};

use smallvec::SmallVec;

mod arith;
mod factory;
mod index;
mod linalg;
mod nn;
mod reduce;
mod shape;
mod unary;

pub(crate) fn register_all(reg: &mut Registry) {
    unary::register(reg);
    arith::register(reg);
    nn::register_first_input(reg);
    unary::register_conversions(reg);
    reduce::register(reg);
    factory::register(reg);
    shape::register(reg);
    nn::register(reg);
    linalg::register(reg);
    index::register(reg);
}

pub(crate) type TensorArgs = SmallVec<[(usize, TensorType); 4]>;

/// The types of every `Tensor` argument of `n`, alongside their input positions.
///
/// Returns `None` if any of them is not known to be a tensor, if `complete` is set and one of
/// them is not complete, or if the operator takes varargs or a tensor list, since then we cannot
/// tell which inputs are tensors.
pub(crate) fn gather_tensor_types(ctx: &Ctx, n: NodeId, complete: bool) -> Option<TensorArgs> {
    let node = ctx.graph.node(n);
    let schema = node.kind.schema()?;
    if schema.is_vararg {
        return None;
    }
    let mut res = TensorArgs::new();
    for (i, arg) in schema.arguments.iter().enumerate() {
        match &arg.ty {
            ArgType::List(t) if t.is_tensor() => return None,
            ArgType::Tensor => {
                let t = ctx.graph.ty(node.inputs[i]).as_tensor()?;
                if complete && !t.is_complete() {
                    return None;
                }
                res.push((i, t.clone()));
            }
            _ => {}
        }
    }
    Some(res)
}

/// Per-dimension sizes of the broadcast of `shapes`, aligned at their trailing dimension.
pub(crate) fn broadcast_dims(shapes: &[&[Dim]]) -> Result<Dims> {
    let rank = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut res = Dims::with_capacity(rank);
    for i in 0..rank {
        let mut cur: Option<Dim> = None;
        for s in shapes.iter() {
            // Index from the right.
            let d = match (i + s.len()).checked_sub(rank) {
                Some(ix) => s[ix],
                None => continue,
            };
            cur = Some(match (cur, d) {
                (None, d) => d,
                (Some(Dim::Static(1)), d) | (Some(d), Dim::Static(1)) => d,
                (Some(Dim::Static(x)), Dim::Static(y)) => {
                    shape_assert!(x == y, "cannot broadcast dimension of size {} with {}", x, y);
                    Dim::Static(x)
                }
                // The symbolic side must be 1 or equal to the static side.
                (Some(s @ Dim::Static(_)), Dim::Symbolic(_))
                | (Some(Dim::Symbolic(_)), s @ Dim::Static(_)) => s,
                (Some(a @ Dim::Symbolic(_)), b @ Dim::Symbolic(_)) => {
                    if a == b {
                        a
                    } else {
                        Dim::fresh()
                    }
                }
            });
        }
        res.push(cur.unwrap_or(Dim::Static(1)));
    }
    Ok(res)
}

/// The type of an elementwise combination of `types`, with element type `st`.
///
/// The result has the rank of the widest input (unknown if any input rank is unknown), and exact
/// dimensions when every input has them.
pub(crate) fn broadcast(types: &[TensorType], st: Option<ScalarType>) -> Result<TensorType> {
    assert!(!types.is_empty(), "broadcast of no tensors");
    if types.len() == 1 {
        return Ok(types[0].dimensioned_only().with_scalar_type(st));
    }
    let mut rank = types[0].rank();
    for t in types.iter() {
        rank = match (rank, t.rank()) {
            (Some(r1), Some(r2)) => Some(r1.max(r2)),
            _ => None,
        };
    }
    let res = TensorType::new(st, types[0].device(), rank, None);
    let all_dims: Option<Vec<&[Dim]>> = types.iter().map(|t| t.dims()).collect();
    match all_dims {
        Some(shapes) => Ok(res.with_dims(broadcast_dims(&shapes[..])?)),
        None => Ok(res),
    }
}

/// `broadcast` over the gathered tensor arguments of a node.
pub(crate) fn broadcast_args(args: &TensorArgs, st: Option<ScalarType>) -> Result<TensorType> {
    let types: SmallVec<[TensorType; 4]> = args.iter().map(|(_, t)| t.clone()).collect();
    broadcast(&types[..], st)
}

/// The element type of a binary arithmetic operation on two tensors: dimensioned operands take
/// precedence over zero-dim ones unless a zero-dim operand is of a higher category.
pub(crate) fn promoted_arith_type(ctx: &Ctx, n: NodeId) -> Option<ScalarType> {
    let mut dimmed: Option<ScalarType> = None;
    let mut zerodim: Option<ScalarType> = None;
    fn union(acc: Option<ScalarType>, next: ScalarType) -> Option<ScalarType> {
        Some(match acc {
            Some(a) => a.promote(next),
            None => next,
        })
    }
    for i in 0..2 {
        let t = ctx.input_tensor(n, i)?;
        let st = t.scalar_type()?;
        if t.rank().map(|r| r > 0).unwrap_or(false) {
            dimmed = union(dimmed, st);
        } else if !dimmed.map(ScalarType::is_floating).unwrap_or(false) {
            zerodim = union(zerodim, st);
        }
    }
    match (dimmed, zerodim) {
        (Some(d), _) if d.is_floating() => Some(d),
        (Some(d), Some(z)) if d.is_integral(false) && z.is_floating() => Some(z),
        (Some(ScalarType::Bool), Some(z)) => Some(z),
        (Some(d), _) => Some(d),
        (None, z) => z,
    }
}

/// The element type a tensor built from a value of type `ty` gets.
pub(crate) fn scalar_type_of(ctx: &Ctx, ty: &Type) -> Option<ScalarType> {
    match ty {
        Type::Float => Some(ctx.config.default_dtype),
        Type::Int => Some(ScalarType::Long),
        Type::Bool => Some(ScalarType::Bool),
        _ => None,
    }
}

/// Shared tail of the reduction formulas: reduce `num_reduced` dimensions of the first input,
/// applying an explicit `dtype` or, when `upcast` is set, widening non-floating inputs to `Long`.
pub(crate) fn reduce_first_input(
    ctx: &Ctx,
    n: NodeId,
    num_reduced: usize,
    upcast: bool,
    dtype: Option<ScalarType>,
) -> Refinement {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Refinement::Declined,
    };
    let (st, rank) = match (t.scalar_type(), t.rank()) {
        (Some(st), Some(rank)) => (st, rank),
        _ => return Refinement::Declined,
    };
    let t = if let Some(d) = dtype {
        t.with_scalar_type(Some(d))
    } else if upcast && !st.is_floating() {
        t.with_scalar_type(Some(ScalarType::Long))
    } else {
        t
    };
    if rank >= num_reduced {
        Refinement::one(t.with_rank(Some(rank - num_reduced)))
    } else {
        Refinement::one(t)
    }
}

/// Like [reduce_first_input], reducing `num_reduced` dimensions unless the literal `keepdim`
/// argument is true.
pub(crate) fn reduce_with_keepdim(
    ctx: &Ctx,
    n: NodeId,
    num_reduced: usize,
    upcast: bool,
    dtype: Option<ScalarType>,
) -> Refinement {
    match ctx.get_bool(n, "keepdim") {
        Some(keepdim) => {
            reduce_first_input(ctx, n, if keepdim { 0 } else { num_reduced }, upcast, dtype)
        }
        None => Refinement::Declined,
    }
}

/// The literal `dtype` argument, treating a missing or non-literal one as `None`.
pub(crate) fn opt_dtype(ctx: &Ctx, n: NodeId) -> Option<ScalarType> {
    ctx.get_dtype(n, "dtype").and_then(|x| x)
}

/// The first input that is a tensor of known rank.
pub(crate) fn any_ranked_tensor(ctx: &Ctx, n: NodeId) -> Option<TensorType> {
    let node = ctx.graph.node(n);
    node.inputs
        .iter()
        .filter_map(|v| ctx.graph.ty(*v).as_tensor())
        .find(|t| t.rank().is_some())
        .cloned()
}

/// Input `i` with per-dimension sizes forgotten.
pub(crate) fn dimensioned_input(ctx: &Ctx, n: NodeId, i: usize) -> Option<TensorType> {
    ctx.input_tensor(n, i).map(|t| t.dimensioned_only())
}

/// The integer values of a literal list argument.
pub(crate) fn literal_sizes(v: &IValue) -> Option<Vec<i64>> {
    v.to_int_list()
}
