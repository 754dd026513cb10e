//! Reductions, scans and softmax.
use super::{opt_dtype, reduce_first_input, reduce_with_keepdim};
use crate::common::Result;
use crate::dtype::ScalarType;
use crate::graph::NodeId;
use crate::registry::{Ctx, Refinement, Registry};
use crate::types::Type;

pub(super) fn register(reg: &mut Registry) {
    reg.register(
        "all_reduce",
        &[
            "aten::det(Tensor self) -> Tensor",
            "aten::logdet(Tensor self) -> Tensor",
            "aten::max(Tensor self) -> Tensor",
            "aten::min(Tensor self) -> Tensor",
            "aten::median(Tensor self) -> Tensor",
            "aten::nanmedian(Tensor self) -> Tensor",
            "aten::norm.Scalar(Tensor self, Scalar p=2) -> Tensor",
            "aten::std(Tensor self, bool unbiased=True) -> Tensor",
            "aten::trace(Tensor self) -> Tensor",
            "aten::var(Tensor self, bool unbiased=True) -> Tensor",
            "aten::all(Tensor self) -> Tensor",
            "aten::any(Tensor self) -> Tensor",
        ],
        all_reduce,
    );
    reg.register(
        "all_reduce_with_dtype",
        &["aten::mean(Tensor self, *, ScalarType? dtype=None) -> Tensor"],
        all_reduce_with_dtype,
    );
    reg.register(
        "all_reduce_with_upcast",
        &[
            "aten::sum(Tensor self, *, ScalarType? dtype=None) -> Tensor",
            "aten::prod(Tensor self, *, ScalarType? dtype=None) -> Tensor",
        ],
        all_reduce_with_upcast,
    );
    reg.register(
        "multidim_reduce",
        &[
            "aten::sum.dim_IntList(Tensor self, int[1]? dim, bool keepdim=False, *, ScalarType? dtype=None) -> Tensor",
            "aten::mean.dim(Tensor self, int[1]? dim, bool keepdim=False, *, ScalarType? dtype=None) -> Tensor",
            "aten::var.correction(Tensor self, int[1]? dim=None, *, Scalar? correction=None, bool keepdim=False) -> Tensor",
            "aten::amax(Tensor self, int[1] dim=[], bool keepdim=False) -> Tensor",
        ],
        multidim_reduce,
    );
    reg.register(
        "argminmax",
        &[
            "aten::argmax(Tensor self, int? dim=None, bool keepdim=False) -> Tensor",
            "aten::argmin(Tensor self, int? dim=None, bool keepdim=False) -> Tensor",
        ],
        argminmax,
    );
    reg.register(
        "dim_reduce",
        &[
            "aten::all.dim(Tensor self, int dim, bool keepdim=False) -> Tensor",
            "aten::any.dim(Tensor self, int dim, bool keepdim=False) -> Tensor",
            "aten::kthvalue(Tensor self, int k, int dim=-1, bool keepdim=False) -> (Tensor values, Tensor indices)",
            "aten::max.dim(Tensor self, int dim, bool keepdim=False) -> (Tensor values, Tensor indices)",
            "aten::min.dim(Tensor self, int dim, bool keepdim=False) -> (Tensor values, Tensor indices)",
            "aten::median.dim(Tensor self, int dim, bool keepdim=False) -> (Tensor values, Tensor indices)",
            "aten::nanmedian.dim(Tensor self, int dim, bool keepdim=False) -> (Tensor values, Tensor indices)",
            "aten::mode(Tensor self, int dim=-1, bool keepdim=False) -> (Tensor values, Tensor indices)",
        ],
        dim_reduce,
    );
    reg.register(
        "dim_reduce_with_upcast",
        &["aten::prod.dim_int(Tensor self, int dim, bool keepdim=False, *, ScalarType? dtype=None) -> Tensor"],
        dim_reduce_with_upcast,
    );
    reg.register(
        "scan",
        &[
            "aten::cumprod(Tensor self, int dim, *, ScalarType? dtype=None) -> Tensor",
            "aten::cumsum(Tensor self, int dim, *, ScalarType? dtype=None) -> Tensor",
            "aten::log_softmax.int(Tensor self, int dim, ScalarType? dtype=None) -> Tensor",
        ],
        scan,
    );
    reg.register(
        "softmax_half_to_float",
        &[
            "aten::_softmax(Tensor self, int dim, bool half_to_float) -> Tensor",
            "aten::_log_softmax(Tensor self, int dim, bool half_to_float) -> Tensor",
        ],
        softmax_half_to_float,
    );
    reg.register(
        "softmax_backward",
        &[
            "aten::_softmax_backward_data(Tensor grad_output, Tensor output, int dim, ScalarType input_dtype) -> Tensor",
            "aten::_log_softmax_backward_data(Tensor grad_output, Tensor output, int dim, ScalarType input_dtype) -> Tensor",
        ],
        softmax_backward,
    );
    reg.register(
        "softmax",
        &["aten::softmax.int(Tensor self, int dim, ScalarType? dtype=None) -> Tensor"],
        softmax,
    );
}

fn all_reduce(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(ctx.input_tensor(n, 0).map(|t| t.with_rank(Some(0))).into())
}

fn all_reduce_with_dtype(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t.with_rank(Some(0)),
        None => return Ok(Refinement::Declined),
    };
    Ok(match opt_dtype(ctx, n) {
        Some(st) => Refinement::one(t.with_scalar_type(Some(st))),
        None => Refinement::one(t),
    })
}

fn all_reduce_with_upcast(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t.with_rank(Some(0)),
        None => return Ok(Refinement::Declined),
    };
    if let Some(st) = opt_dtype(ctx, n) {
        return Ok(Refinement::one(t.with_scalar_type(Some(st))));
    }
    Ok(match t.scalar_type() {
        Some(st) if !st.is_floating() => {
            Refinement::one(t.with_scalar_type(Some(ScalarType::Long)))
        }
        _ => Refinement::one(t),
    })
}

// A `None` or empty `dim` list reduces every dimension.
fn multidim_reduce(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let all = || ctx.input_tensor(n, 0).and_then(|t| t.rank());
    let reduced = match ctx.graph.named_input(n, "dim") {
        Some(v) => match ctx.graph.ty(v) {
            Type::NoneType => all(),
            _ => match ctx.graph.list_size(v) {
                Some(0) => all(),
                k => k,
            },
        },
        None => None,
    };
    match reduced {
        Some(k) => Ok(reduce_with_keepdim(ctx, n, k, true, opt_dtype(ctx, n))),
        None => Ok(Refinement::Declined),
    }
}

// Indices are always Long.
fn argminmax(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let long = Some(ScalarType::Long);
    if let Some(Type::NoneType) = ctx.input_type(n, 1) {
        return Ok(Refinement::one(t.with_rank(Some(0)).with_scalar_type(long)));
    }
    Ok(match reduce_with_keepdim(ctx, n, 1, false, None) {
        Refinement::Refined(mut ts) => {
            for t in ts.iter_mut() {
                if let Type::Tensor(tt) = t {
                    *tt = tt.with_scalar_type(long);
                }
            }
            Refinement::Refined(ts)
        }
        Refinement::Declined => Refinement::Declined,
    })
}

fn dim_reduce(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let mut res = reduce_with_keepdim(ctx, n, 1, false, None);
    if ctx.num_outputs(n) == 2 {
        if let Refinement::Refined(ts) = &mut res {
            let indices = match ts.last() {
                Some(Type::Tensor(t)) => t.with_scalar_type(Some(ScalarType::Long)),
                _ => return Ok(Refinement::Declined),
            };
            ts.push(Type::Tensor(indices));
        }
    }
    Ok(res)
}

fn dim_reduce_with_upcast(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(reduce_with_keepdim(ctx, n, 1, true, opt_dtype(ctx, n)))
}

fn scan(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(reduce_first_input(ctx, n, 0, true, opt_dtype(ctx, n)))
}

fn softmax(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(reduce_first_input(ctx, n, 0, false, opt_dtype(ctx, n)))
}

fn softmax_half_to_float(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let half_to_float = match ctx.get_bool(n, "half_to_float") {
        Some(b) => b,
        None => return Ok(Refinement::Declined),
    };
    Ok(ctx
        .input_tensor(n, 0)
        .map(|t| {
            if half_to_float {
                t.with_scalar_type(Some(ScalarType::Float))
            } else {
                t
            }
        })
        .into())
}

fn softmax_backward(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let input_dtype = match ctx.get_dtype(n, "input_dtype") {
        Some(Some(st)) => st,
        _ => return Ok(Refinement::Declined),
    };
    if t.scalar_type() == Some(ScalarType::Float) && input_dtype == ScalarType::Half {
        Ok(Refinement::one(t.with_scalar_type(Some(ScalarType::Half))))
    } else {
        Ok(Refinement::one(t))
    }
}
