//! Products and other linear-algebra operators.
use super::{any_ranked_tensor, broadcast_dims, dimensioned_input, gather_tensor_types};
use crate::common::Result;
use crate::graph::NodeId;
use crate::registry::{Ctx, Refinement, Registry};
use crate::types::{Dim, Dims, TensorType};

pub(super) fn register(reg: &mut Registry) {
    reg.register(
        "scalar_product",
        &[
            "aten::dot(Tensor self, Tensor tensor) -> Tensor",
            "aten::dist(Tensor self, Tensor other, Scalar p=2) -> Tensor",
        ],
        scalar_product,
    );
    reg.register(
        "matrix_vector",
        &[
            "aten::mv(Tensor self, Tensor vec) -> Tensor",
            "aten::addmv(Tensor self, Tensor mat, Tensor vec, *, Scalar beta=1, Scalar alpha=1) -> Tensor",
        ],
        matrix_vector,
    );
    reg.register(
        "matrix_result",
        &[
            "aten::addmm(Tensor self, Tensor mat1, Tensor mat2, *, Scalar beta=1, Scalar alpha=1) -> Tensor",
            "aten::addbmm(Tensor self, Tensor batch1, Tensor batch2, *, Scalar beta=1, Scalar alpha=1) -> Tensor",
            "aten::addr(Tensor self, Tensor vec1, Tensor vec2, *, Scalar beta=1, Scalar alpha=1) -> Tensor",
        ],
        matrix_result,
    );
    reg.register(
        "batched_matrix_result",
        &["aten::baddbmm(Tensor self, Tensor batch1, Tensor batch2, *, Scalar beta=1, Scalar alpha=1) -> Tensor"],
        batched_matrix_result,
    );
    reg.register(
        "bilinear",
        &["aten::bilinear(Tensor input1, Tensor input2, Tensor weight, Tensor? bias=None) -> Tensor"],
        bilinear,
    );
    reg.register(
        "linear",
        &["aten::linear(Tensor input, Tensor weight, Tensor? bias=None) -> Tensor"],
        linear,
    );
    reg.register(
        "matmul",
        &["aten::matmul(Tensor self, Tensor other) -> Tensor"],
        matmul,
    );
    reg.register(
        "embedding_dense_backward",
        &["aten::embedding_dense_backward(Tensor grad_output, Tensor indices, SymInt num_weights, SymInt padding_idx, bool scale_grad_by_freq) -> Tensor"],
        embedding_dense_backward,
    );
}

fn any_with_rank(ctx: &Ctx, n: NodeId, rank: usize) -> Refinement {
    any_ranked_tensor(ctx, n)
        .map(|t| t.with_rank(Some(rank)))
        .into()
}

fn scalar_product(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(any_with_rank(ctx, n, 0))
}

fn matrix_vector(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(any_with_rank(ctx, n, 1))
}

fn matrix_result(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(any_with_rank(ctx, n, 2))
}

fn batched_matrix_result(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(any_with_rank(ctx, n, 3))
}

fn bilinear(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(dimensioned_input(ctx, n, 0)
        .or_else(|| dimensioned_input(ctx, n, 1))
        .into())
}

// Dimension `i` of `t`, keeping symbols; a fresh symbol when the dims are unknown.
fn dim_of(t: &TensorType, i: usize) -> Dim {
    t.dims()
        .and_then(|d| d.get(i).cloned())
        .unwrap_or_else(Dim::fresh)
}

fn ranked_pair(ctx: &Ctx, n: NodeId) -> Option<(TensorType, usize, TensorType, usize)> {
    let ts = gather_tensor_types(ctx, n, false)?;
    let (a, b) = (&ts[0].1, &ts[1].1);
    Some((a.clone(), a.rank()?, b.clone(), b.rank()?))
}

// `input @ weight.T`: the last dimension becomes the number of output features.
fn linear(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let (input, r_in, weight, r_w) = match ranked_pair(ctx, n) {
        Some(x) => x,
        None => return Ok(Refinement::Declined),
    };
    if r_w != 2 || r_in == 0 {
        return Ok(Refinement::Declined);
    }
    let mut dims: Dims = (0..r_in).map(|i| dim_of(&input, i)).collect();
    dims[r_in - 1] = dim_of(&weight, 0);
    Ok(Refinement::one(input.with_dims(dims)))
}

fn matmul(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let (a, ra, b, rb) = match ranked_pair(ctx, n) {
        Some(x) => x,
        None => return Ok(Refinement::Declined),
    };
    let res = match (ra, rb) {
        (1, 1) => a.with_rank(Some(0)),
        (2, 2) => a.with_dims(vec![dim_of(&a, 0), dim_of(&b, 1)]),
        (1, 2) => a.with_dims(vec![dim_of(&b, 1)]),
        (2, 1) => a.with_dims(vec![dim_of(&a, 0)]),
        _ => {
            shape_assert!(
                ra > 0 && rb > 0,
                "matmul of a rank-{} and a rank-{} tensor",
                ra,
                rb
            );
            batched_matmul(&a, ra, &b, rb)?
        }
    };
    Ok(Refinement::one(res))
}

// Vectors are unsqueezed into matrices, leading dimensions broadcast, and the unsqueezed
// dimension is dropped again.
fn batched_matmul(a: &TensorType, ra: usize, b: &TensorType, rb: usize) -> Result<TensorType> {
    let squeezed = if ra == 1 || rb == 1 { 1 } else { 0 };
    let (da, db) = match (a.dims(), b.dims()) {
        (Some(da), Some(db)) => (da, db),
        _ => return Ok(a.with_rank(Some(ra.max(rb) - squeezed))),
    };
    let batch_a = &da[..ra.saturating_sub(2)];
    let batch_b = &db[..rb.saturating_sub(2)];
    if ra > 1 && rb > 1 {
        let (k_a, k_b) = (da[ra - 1], db[rb - 2]);
        if let (Dim::Static(x), Dim::Static(y)) = (k_a, k_b) {
            shape_assert!(x == y, "matmul contracts a dimension of {} with {}", x, y);
        }
    }
    let mut dims = broadcast_dims(&[batch_a, batch_b])?;
    if ra > 1 {
        dims.push(da[ra - 2]);
    }
    if rb > 1 {
        dims.push(db[rb - 1]);
    }
    Ok(a.with_dims(dims))
}

fn embedding_dense_backward(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let grad = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let (rank, num_weights) = match (grad.rank(), ctx.get_int(n, "num_weights")) {
        (Some(r), Some(w)) => (r, w),
        _ => return Ok(Refinement::Declined),
    };
    shape_assert!(rank > 0, "embedding gradient must have an embedding dimension");
    shape_assert!(num_weights >= 0, "negative number of embeddings: {}", num_weights);
    let dims = vec![Dim::Static(num_weights as u64), dim_of(&grad, rank - 1)];
    Ok(Refinement::one(grad.with_dims(dims)))
}

#[cfg(test)]
mod tests {
    use crate::dtype::{Device, ScalarType};
    use crate::fallback::NoExecutor;
    use crate::graph::{Graph, NodeId, ValueId};
    use crate::propagate::propagate_shapes;
    use crate::types::{Dim, TensorType, Type};

    const MATMUL: &str = "aten::matmul(Tensor self, Tensor other) -> Tensor";

    fn input(g: &mut Graph, sizes: &[u64]) -> ValueId {
        g.add_input(Type::Tensor(TensorType::complete(
            ScalarType::Float,
            Device::CPU,
            sizes,
        )))
    }

    fn ranked(g: &mut Graph, rank: usize) -> ValueId {
        g.add_input(Type::Tensor(TensorType::new(
            Some(ScalarType::Float),
            Some(Device::CPU),
            Some(rank),
            None,
        )))
    }

    fn out(g: &Graph, n: NodeId) -> TensorType {
        g.ty(g.node(n).outputs[0]).as_tensor().cloned().unwrap()
    }

    fn matmul_sizes(a: &[u64], b: &[u64]) -> Option<Vec<u64>> {
        let mut g = Graph::new();
        let top = g.top();
        let x = input(&mut g, a);
        let y = input(&mut g, b);
        let n = g.append_op(top, MATMUL, &[x, y]).unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        out(&g, n).concrete_sizes()
    }

    #[test]
    fn matmul_rank_table() {
        assert_eq!(matmul_sizes(&[3], &[3]), Some(vec![]));
        assert_eq!(matmul_sizes(&[2, 3], &[3, 4]), Some(vec![2, 4]));
        assert_eq!(matmul_sizes(&[3], &[3, 4]), Some(vec![4]));
        assert_eq!(matmul_sizes(&[2, 3], &[3]), Some(vec![2]));
        assert_eq!(matmul_sizes(&[5, 2, 3], &[3, 4]), Some(vec![5, 2, 4]));
        assert_eq!(matmul_sizes(&[7, 1, 2, 3], &[5, 3, 4]), Some(vec![7, 5, 2, 4]));
        assert_eq!(matmul_sizes(&[5, 2, 3], &[3]), Some(vec![5, 2]));
    }

    #[test]
    fn batched_matmul_without_sizes() {
        let mut g = Graph::new();
        let top = g.top();
        let x = ranked(&mut g, 1);
        let y = ranked(&mut g, 4);
        let n = g.append_op(top, MATMUL, &[x, y]).unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        assert_eq!(out(&g, n).rank(), Some(3));
    }

    #[test]
    fn linear_replaces_features() {
        let mut g = Graph::new();
        let top = g.top();
        let x = ranked(&mut g, 3);
        let w = input(&mut g, &[16, 8]);
        let none = g.constant(top, crate::ivalue::IValue::None);
        let n = g
            .append_op(
                top,
                "aten::linear(Tensor input, Tensor weight, Tensor? bias=None) -> Tensor",
                &[x, w, none],
            )
            .unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let t = out(&g, n);
        assert_eq!(t.rank(), Some(3));
        assert_eq!(t.dims().unwrap()[2], Dim::Static(16));
        assert!(!t.dims().unwrap()[0].is_static());
    }

    #[test]
    fn addmm_is_a_matrix() {
        let mut g = Graph::new();
        let top = g.top();
        let bias = ranked(&mut g, 1);
        let a = ranked(&mut g, 2);
        let b = ranked(&mut g, 2);
        let one = g.constant(top, crate::ivalue::IValue::Int(1));
        let n = g
            .append_op(
                top,
                "aten::addmm(Tensor self, Tensor mat1, Tensor mat2, *, Scalar beta=1, \
                 Scalar alpha=1) -> Tensor",
                &[bias, a, b, one, one],
            )
            .unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        assert_eq!(out(&g, n).rank(), Some(2));
    }
}
