//! Indexing operators. Their rank rules are special cases each, so there is one formula per op.
use crate::common::{wrap_dim, Result};
use crate::graph::NodeId;
use crate::registry::{Ctx, Refinement, Registry};
use crate::types::{Dim, Dims};

pub(super) fn register(reg: &mut Registry) {
    reg.register(
        "index_select",
        &["aten::index_select(Tensor self, int dim, Tensor index) -> Tensor"],
        index_select,
    );
    reg.register(
        "gather",
        &["aten::gather(Tensor self, int dim, Tensor index, *, bool sparse_grad=False) -> Tensor"],
        gather,
    );
    reg.register(
        "embedding",
        &["aten::embedding(Tensor weight, Tensor indices, SymInt padding_idx=-1, bool scale_grad_by_freq=False, bool sparse=False) -> Tensor"],
        embedding,
    );
}

// A zero-dim `self` accepts zero- and one-dim indices and the result has the rank of the index.
fn index_select(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let (t, index) = match (ctx.input_tensor(n, 0), ctx.named_tensor(n, "index")) {
        (Some(t), Some(i)) => (t, i),
        _ => return Ok(Refinement::Declined),
    };
    let rank = match t.rank() {
        Some(r) => r,
        None => return Ok(Refinement::Declined),
    };
    if rank == 0 {
        return Ok(Refinement::one(t.with_rank(index.rank())));
    }
    // The selected dimension takes the length of a one-dim index.
    let exact = (|| {
        let dims = t.dims()?;
        let d = wrap_dim(ctx.get_int(n, "dim")?, rank)?;
        if index.rank()? != 1 {
            return None;
        }
        let mut dims: Dims = dims.to_vec();
        dims[d] = index.sym_dim(0);
        Some(t.with_dims(dims))
    })();
    Ok(Refinement::one(exact.unwrap_or_else(|| t.dimensioned_only())))
}

// The result has the shape of the index, except that a zero-dim index gives a zero-dim result.
fn gather(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let (t, index) = match (ctx.input_tensor(n, 0), ctx.named_tensor(n, "index")) {
        (Some(t), Some(i)) => (t, i),
        _ => return Ok(Refinement::Declined),
    };
    Ok(match index.rank() {
        None => Refinement::Declined,
        Some(0) => Refinement::one(t.with_rank(Some(0))),
        Some(r) => match index.dims() {
            Some(dims) if t.rank() == Some(r) => Refinement::one(t.with_dims(dims.to_vec())),
            _ => Refinement::one(t.dimensioned_only()),
        },
    })
}

// Every index is replaced by a row of the weight matrix.
fn embedding(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let (weight, indices) = match (ctx.input_tensor(n, 0), ctx.input_tensor(n, 1)) {
        (Some(w), Some(i)) => (w, i),
        _ => return Ok(Refinement::Declined),
    };
    let rank = match indices.rank() {
        Some(r) => r,
        None => return Ok(Refinement::Declined),
    };
    let mut dims: Dims = match indices.dims() {
        Some(d) => d.to_vec(),
        None => (0..rank).map(|_| Dim::fresh()).collect(),
    };
    dims.push(weight.sym_dim(1));
    Ok(Refinement::one(weight.with_dims(dims)))
}
