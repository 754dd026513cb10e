mod common;

use common::*;
use shapeprop::{
    propagate_shapes, propagate_shapes_with, BlockId, Config, Graph, IValue, NoExecutor, NodeId,
    ScalarType, Type, ValueId,
};

const UNSQUEEZE: &str = "aten::unsqueeze(Tensor(a) self, int dim) -> Tensor(a)";

// A loop carrying `carried`, with a body built by `body`. The body receives the body block and
// its carried parameters and returns the new carried values.
fn build_loop(
    g: &mut Graph,
    carried: &[ValueId],
    body: impl FnOnce(&mut Graph, BlockId, &[ValueId]) -> Vec<ValueId>,
) -> NodeId {
    let top = g.top();
    let trips = g.add_input(Type::Int);
    let cond = g.constant(top, IValue::Bool(true));
    let l = g.create_loop(top, trips, cond, carried);
    let b = g.node(l).blocks[0];
    let params = g.block(b).params[1..].to_vec();
    let mut outs = vec![g.constant(b, IValue::Bool(true))];
    outs.extend(body(g, b, &params[..]));
    g.set_outputs(b, &outs[..]);
    l
}

#[test]
fn growing_rank_settles_to_unknown() {
    let mut g = Graph::new();
    let x = g.add_input(ranked(ScalarType::Float, 2));
    let l = build_loop(&mut g, &[x], |g, b, ps| {
        let zero = g.constant(b, IValue::Int(0));
        let n = g.append_op(b, UNSQUEEZE, &[ps[0], zero]).unwrap();
        vec![out(g, n)]
    });
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    let t = tensor_of(&g, out(&g, l));
    assert_eq!(t.rank(), None);
    assert_eq!(t.scalar_type(), Some(ScalarType::Float));
    let param = g.block(g.node(l).blocks[0]).params[1];
    assert_eq!(tensor_of(&g, param).rank(), None);
}

#[test]
fn stable_body_keeps_sizes() {
    let mut g = Graph::new();
    let x = g.add_input(complete(ScalarType::Float, &[4, 4]));
    let l = build_loop(&mut g, &[x], |g, b, ps| {
        let one = g.constant(b, IValue::Int(1));
        let n = g.append_op(b, ADD, &[ps[0], ps[0], one]).unwrap();
        vec![out(g, n)]
    });
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    assert_eq!(tensor_of(&g, out(&g, l)).concrete_sizes(), Some(vec![4, 4]));
}

#[test]
fn sizes_that_change_become_symbolic() {
    // x = zeros(2); for ...: x = cat([x, x])
    let mut g = Graph::new();
    let x = g.add_input(complete(ScalarType::Float, &[2]));
    let l = build_loop(&mut g, &[x], |g, b, ps| {
        let list = g.append_node(
            b,
            shapeprop::Kind::ListConstruct,
            &[ps[0], ps[0]],
            vec![Type::list(Type::unshaped())],
        );
        let zero = g.constant(b, IValue::Int(0));
        let n = g
            .append_op(
                b,
                "aten::cat(Tensor[] tensors, int dim=0) -> Tensor",
                &[out(g, list), zero],
            )
            .unwrap();
        vec![out(g, n)]
    });
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    let t = tensor_of(&g, out(&g, l));
    assert_eq!(t.rank(), Some(1));
    assert_eq!(t.concrete_sizes(), None);
}

#[test]
fn expands_are_inserted_once_types_settle() {
    let mut g = Graph::new();
    let x = g.add_input(complete(ScalarType::Float, &[2, 3]));
    let bias = g.add_input(complete(ScalarType::Float, &[3]));
    let l = build_loop(&mut g, &[x], |g, b, ps| {
        let one = g.constant(b, IValue::Int(1));
        let n = g.append_op(b, ADD, &[ps[0], bias, one]).unwrap();
        vec![out(g, n)]
    });
    let body = g.node(l).blocks[0];
    let before = g.block(body).nodes.len();
    let config = Config {
        expand_broadcasts: true,
        ..Config::default()
    };
    propagate_shapes_with(&mut g, &NoExecutor, &config).unwrap();
    // Two constants and the expand itself.
    assert_eq!(g.block(body).nodes.len(), before + 3);
    propagate_shapes_with(&mut g, &NoExecutor, &config).unwrap();
    assert_eq!(g.block(body).nodes.len(), before + 3);
    assert_eq!(tensor_of(&g, out(&g, l)).concrete_sizes(), Some(vec![2, 3]));
}

#[test]
fn branch_join_promotes() {
    let mut g = Graph::new();
    let top = g.top();
    let c = g.add_input(Type::Bool);
    let x = g.add_input(ranked(ScalarType::Float, 2));
    let y = g.add_input(ranked(ScalarType::Int, 2));
    let n = g.create_if(top, c, vec![Type::unshaped()]);
    let (t, e) = (g.node(n).blocks[0], g.node(n).blocks[1]);
    let relu = g.append_op(t, "aten::relu(Tensor self) -> Tensor", &[x]).unwrap();
    g.set_outputs(t, &[out(&g, relu)]);
    g.set_outputs(e, &[y]);
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    let joined = tensor_of(&g, out(&g, n));
    assert_eq!(joined.rank(), Some(2));
    assert_eq!(joined.scalar_type(), Some(ScalarType::Float));
}

#[test]
fn conditional_inside_loop() {
    let mut g = Graph::new();
    let c = g.add_input(Type::Bool);
    let x = g.add_input(ranked(ScalarType::Float, 1));
    let l = build_loop(&mut g, &[x], |g, b, ps| {
        let n = g.create_if(b, c, vec![Type::unshaped()]);
        let (t, e) = (g.node(n).blocks[0], g.node(n).blocks[1]);
        let zero = g.constant(t, IValue::Int(0));
        let u = g.append_op(t, UNSQUEEZE, &[ps[0], zero]).unwrap();
        g.set_outputs(t, &[out(g, u)]);
        g.set_outputs(e, &[ps[0]]);
        vec![out(g, n)]
    });
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    let t = tensor_of(&g, out(&g, l));
    assert_eq!(t.rank(), None);
    assert_eq!(t.device(), Some(shapeprop::Device::CPU));
}

#[test]
fn outputs_cover_loops_that_never_run() {
    // for ...: x = relu(y), with x of rank 2 and y of rank 1
    let mut g = Graph::new();
    let x = g.add_input(ranked(ScalarType::Float, 2));
    let y = g.add_input(ranked(ScalarType::Float, 1));
    let l = build_loop(&mut g, &[x], |g, b, _| {
        let n = g.append_op(b, "aten::relu(Tensor self) -> Tensor", &[y]).unwrap();
        vec![out(g, n)]
    });
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    let t = tensor_of(&g, out(&g, l));
    assert_eq!(t.rank(), None);
    assert_eq!(t.scalar_type(), Some(ScalarType::Float));
    let param = g.block(g.node(l).blocks[0]).params[1];
    assert!(g.ty(out(&g, l)).equivalent(g.ty(param)));
}
