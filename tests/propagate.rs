mod common;

use common::*;
use shapeprop::{
    erase_shapes, propagate_shapes, propagate_shapes_with, Config, Graph, IValue, Kind, NoExecutor,
    ScalarType, Type, ValueId,
};

const VIEW: &str = "aten::view(Tensor(a) self, SymInt[] size) -> Tensor(a)";
const RELU: &str = "aten::relu(Tensor self) -> Tensor";
const SUM_DIM: &str = "aten::sum.dim_IntList(Tensor self, int[1]? dim, bool keepdim=False, *, \
                       ScalarType? dtype=None) -> Tensor";
const CAT: &str = "aten::cat(Tensor[] tensors, int dim=0) -> Tensor";

// x: [2, 3], y: [2, 5], z: [3]
// a = relu(x) + z; b = cat([a, y], 1); c = b.view(-1); d = c.sum([0], keepdim=False)
fn straight_line() -> (Graph, Vec<ValueId>) {
    let mut g = Graph::new();
    let top = g.top();
    let x = g.add_input(complete(ScalarType::Float, &[2, 3]));
    let y = g.add_input(complete(ScalarType::Float, &[2, 5]));
    let z = g.add_input(complete(ScalarType::Float, &[3]));
    let r = g.append_op(top, RELU, &[x]).unwrap();
    let one = g.constant(top, IValue::Int(1));
    let a = g.append_op(top, ADD, &[out(&g, r), z, one]).unwrap();
    let l = g.append_node(
        top,
        Kind::ListConstruct,
        &[out(&g, a), y],
        vec![Type::list(Type::unshaped())],
    );
    let b = g.append_op(top, CAT, &[out(&g, l), one]).unwrap();
    let flat = g.constant(top, IValue::IntList(vec![-1]));
    let c = g.append_op(top, VIEW, &[out(&g, b), flat]).unwrap();
    let dims = g.constant(top, IValue::IntList(vec![0]));
    let keep = g.constant(top, IValue::Bool(false));
    let none = g.constant(top, IValue::None);
    let d = g.append_op(top, SUM_DIM, &[out(&g, c), dims, keep, none]).unwrap();
    let vs = vec![out(&g, r), out(&g, a), out(&g, b), out(&g, c), out(&g, d)];
    g.set_outputs(top, &[out(&g, d)]);
    (g, vs)
}

#[test]
fn straight_line_sizes() {
    let (mut g, vs) = straight_line();
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    let sizes: Vec<Option<Vec<u64>>> = vs.iter().map(|v| tensor_of(&g, *v).concrete_sizes()).collect();
    assert_eq!(
        sizes,
        vec![
            Some(vec![2, 3]),
            Some(vec![2, 3]),
            Some(vec![2, 8]),
            Some(vec![16]),
            Some(vec![]),
        ]
    );
}

#[test]
fn second_pass_changes_nothing() {
    let (mut g, vs) = straight_line();
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    let first = snapshot(&g, &vs[..]);
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    let second = snapshot(&g, &vs[..]);
    for (a, b) in first.iter().zip(second.iter()) {
        assert!(a.equivalent(b), "{} became {}", a, b);
    }
}

#[test]
fn propagation_only_refines() {
    let (mut g, vs) = straight_line();
    let before = snapshot(&g, &vs[..]);
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    for (v, old) in vs.iter().zip(before.iter()) {
        let new = g.ty(*v);
        assert!(new.is_subtype_of(old), "{} is not a refinement of {}", new, old);
    }
}

#[test]
fn erase_then_propagate_round_trips() {
    let (mut g, vs) = straight_line();
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    let direct = snapshot(&g, &vs[..]);
    erase_shapes(&mut g);
    for v in vs.iter() {
        assert_eq!(g.ty(*v), &Type::unshaped());
    }
    // Graph inputs are erased too; restore what the caller declared.
    let inputs = g.inputs().to_vec();
    g.set_type(inputs[0], complete(ScalarType::Float, &[2, 3]));
    g.set_type(inputs[1], complete(ScalarType::Float, &[2, 5]));
    g.set_type(inputs[2], complete(ScalarType::Float, &[3]));
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    let again = snapshot(&g, &vs[..]);
    for (a, b) in direct.iter().zip(again.iter()) {
        assert!(a.equivalent(b), "{} came back as {}", a, b);
    }
}

#[test]
fn broadcast_rank_rule() {
    let mut g = Graph::new();
    let top = g.top();
    let x = g.add_input(ranked(ScalarType::Float, 1));
    let y = g.add_input(ranked(ScalarType::Float, 3));
    let one = g.constant(top, IValue::Int(1));
    let n = g.append_op(top, ADD, &[x, y, one]).unwrap();
    propagate_shapes(&mut g, &NoExecutor).unwrap();
    let t = tensor_of(&g, out(&g, n));
    assert_eq!(t.rank(), Some(3));
    assert_eq!(t.scalar_type(), Some(ScalarType::Float));
}

#[test]
fn concatenation_mismatch_reports_context() {
    let mut g = Graph::new();
    let top = g.top();
    let x = g.add_input(complete(ScalarType::Float, &[2, 3]));
    let y = g.add_input(complete(ScalarType::Float, &[2, 5]));
    let l = g.append_node(top, Kind::ListConstruct, &[x, y], vec![Type::list(Type::unshaped())]);
    let zero = g.constant(top, IValue::Int(0));
    g.append_op(top, CAT, &[out(&g, l), zero]).unwrap();
    let e = propagate_shapes(&mut g, &NoExecutor).unwrap_err();
    let msg = e.to_string();
    assert!(msg.contains("aten::cat"), "{}", msg);
    assert!(msg.contains("The inputs are:"), "{}", msg);
    assert!(e.inputs[0].contains("Tensor[]"), "{:?}", e.inputs);
}

#[test]
fn fallback_runs_unknown_operators() {
    let mut g = Graph::new();
    let top = g.top();
    let x = g.add_input(complete(ScalarType::Float, &[2, 3]));
    let y = g.add_input(complete(ScalarType::Float, &[2, 3]));
    let h = g.append_op(top, HYPOT, &[x, y]).unwrap();
    let u = g.add_input(complete(ScalarType::Double, &[4]));
    let v = g.add_input(complete(ScalarType::Double, &[5]));
    let o = g.append_op(top, OUTER, &[u, v]).unwrap();
    propagate_shapes(&mut g, &NdExecutor).unwrap();
    let t = tensor_of(&g, out(&g, h));
    assert_eq!(t.concrete_sizes(), Some(vec![2, 3]));
    assert_eq!(t.scalar_type(), Some(ScalarType::Float));
    let t = tensor_of(&g, out(&g, o));
    assert_eq!(t.concrete_sizes(), Some(vec![4, 5]));
    assert_eq!(t.scalar_type(), Some(ScalarType::Double));
}

#[test]
fn fallback_can_be_disabled() {
    let mut g = Graph::new();
    let top = g.top();
    let x = g.add_input(complete(ScalarType::Float, &[2, 3]));
    let h = g.append_op(top, HYPOT, &[x, x]).unwrap();
    let config = Config {
        run_fallback: false,
        ..Config::default()
    };
    propagate_shapes_with(&mut g, &NdExecutor, &config).unwrap();
    assert_eq!(g.ty(out(&g, h)), &Type::unshaped());
}

#[test]
fn fallback_needs_complete_inputs() {
    let mut g = Graph::new();
    let top = g.top();
    let x = g.add_input(ranked(ScalarType::Float, 2));
    let h = g.append_op(top, HYPOT, &[x, x]).unwrap();
    propagate_shapes(&mut g, &NdExecutor).unwrap();
    assert_eq!(g.ty(out(&g, h)), &Type::unshaped());
}

#[test]
fn integer_division_uses_default_dtype() {
    let mut g = Graph::new();
    let top = g.top();
    let x = g.add_input(complete(ScalarType::Long, &[4]));
    let n = g
        .append_op(top, "aten::div.Tensor(Tensor self, Tensor other) -> Tensor", &[x, x])
        .unwrap();
    let config = Config {
        default_dtype: ScalarType::Double,
        ..Config::default()
    };
    propagate_shapes_with(&mut g, &NoExecutor, &config).unwrap();
    assert_eq!(tensor_of(&g, out(&g, n)).scalar_type(), Some(ScalarType::Double));
}
