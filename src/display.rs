//! Noisey `Display` impls.
use crate::graph::{Attr, BlockId, Graph, NodeId, ValueId};
use crate::types::{Dim, TensorType, Type};
use std::fmt::{self, Display, Formatter};

impl Display for Dim {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Dim::Static(s) => write!(f, "{}", s),
            Dim::Symbolic(_) => write!(f, "*"),
        }
    }
}

impl Display for TensorType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.scalar_type() {
            Some(st) => write!(f, "{}", st)?,
            None => write!(f, "Tensor")?,
        }
        let mut parts: Vec<String> = Vec::new();
        match (self.dims(), self.rank()) {
            (Some(dims), _) => parts.extend(dims.iter().map(|d| format!("{}", d))),
            (None, Some(rank)) => parts.extend((0..rank).map(|_| String::from("*"))),
            (None, None) => {}
        }
        if let Some(d) = self.device() {
            parts.push(format!("device={}", d));
        }
        if let Some(g) = self.requires_grad() {
            parts.push(format!("requires_grad={}", g as u8));
        }
        if parts.is_empty() {
            // Distinguish a known rank-0 tensor from one with unknown rank.
            if self.rank() == Some(0) {
                write!(f, "()")?;
            }
            return Ok(());
        }
        write!(f, "({})", parts.join(", "))
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        use Type::*;
        match self {
            Tensor(t) => write!(f, "{}", t),
            Int => write!(f, "int"),
            Float => write!(f, "float"),
            Bool => write!(f, "bool"),
            Number => write!(f, "Scalar"),
            Str => write!(f, "str"),
            NoneType => write!(f, "NoneType"),
            Device => write!(f, "Device"),
            List(t) => write!(f, "{}[]", t),
            Optional(t) => write!(f, "{}?", t),
            Tuple(ts) => {
                write!(f, "(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
            Class(c) => write!(f, "{}", c.name),
            Untyped => write!(f, "Any"),
        }
    }
}

pub(crate) struct Val(pub ValueId);

impl Display for Val {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "%{}", self.0.index())
    }
}

fn write_list(f: &mut Formatter, vs: &[ValueId]) -> fmt::Result {
    for (i, v) in vs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", Val(*v))?;
    }
    Ok(())
}

fn write_typed(f: &mut Formatter, g: &Graph, vs: &[ValueId]) -> fmt::Result {
    for (i, v) in vs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{} : {}", Val(*v), g.ty(*v))?;
    }
    Ok(())
}

/// A single node on one line, without its nested blocks.
pub struct NodeDisplay<'a>(pub &'a Graph, pub NodeId);

impl<'a> NodeDisplay<'a> {
    fn header(&self, f: &mut Formatter) -> fmt::Result {
        let NodeDisplay(g, n) = *self;
        let node = g.node(n);
        if !node.outputs.is_empty() {
            write_typed(f, g, &node.outputs[..])?;
            write!(f, " = ")?;
        }
        write!(f, "{}", node.name())?;
        if !node.attrs.is_empty() {
            write!(f, "[")?;
            for (i, (name, a)) in node.attrs.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                match a {
                    Attr::Value(v) => write!(f, "{}={}", name, v)?,
                    Attr::Str(s) => write!(f, "{}={:?}", name, s)?,
                    Attr::Graph(_) => write!(f, "{}=<Graph>", name)?,
                }
            }
            write!(f, "]")?;
        }
        write!(f, "(")?;
        write_list(f, &node.inputs[..])?;
        write!(f, ")")
    }
}

impl<'a> Display for NodeDisplay<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        self.header(f)
    }
}

fn write_block(f: &mut Formatter, g: &Graph, b: BlockId, indent: usize) -> fmt::Result {
    for n in g.block(b).nodes.iter() {
        write!(f, "{:width$}", "", width = indent)?;
        NodeDisplay(g, *n).header(f)?;
        writeln!(f)?;
        for (i, sub) in g.node(*n).blocks.iter().enumerate() {
            write!(f, "{:width$}block{}(", "", i, width = indent + 2)?;
            write_typed(f, g, &g.block(*sub).params[..])?;
            writeln!(f, "):")?;
            write_block(f, g, *sub, indent + 4)?;
            write!(f, "{:width$}-> (", "", width = indent + 4)?;
            write_list(f, &g.block(*sub).outputs[..])?;
            writeln!(f, ")")?;
        }
    }
    Ok(())
}

impl Display for Graph {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "graph(")?;
        write_typed(f, self, self.inputs())?;
        writeln!(f, "):")?;
        write_block(f, self, self.top(), 2)?;
        write!(f, "  return (")?;
        write_list(f, self.outputs())?;
        writeln!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::{Device, ScalarType};
    use crate::ivalue::IValue;

    #[test]
    fn tensor_types() {
        let t = TensorType::complete(ScalarType::Float, Device::CPU, &[2, 3]);
        assert_eq!(format!("{}", t), "Float(2, 3, device=cpu)");
        assert_eq!(format!("{}", TensorType::unshaped()), "Tensor");
        let r = TensorType::unshaped().with_rank(Some(2)).with_requires_grad(Some(true));
        assert_eq!(format!("{}", r), "Tensor(*, *, requires_grad=1)");
        let z = TensorType::unshaped()
            .with_scalar_type(Some(ScalarType::Long))
            .with_rank(Some(0));
        assert_eq!(format!("{}", z), "Long()");
        let l = Type::list(Type::optional(Type::Int));
        assert_eq!(format!("{}", l), "int?[]");
    }

    #[test]
    fn graph_dump() {
        let mut g = Graph::new();
        let top = g.top();
        let x = g.add_input(Type::Tensor(TensorType::complete(
            ScalarType::Float,
            Device::CPU,
            &[2, 3],
        )));
        let alpha = g.constant(top, IValue::Int(1));
        let n = g
            .append_op(
                top,
                "aten::add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor",
                &[x, x, alpha],
            )
            .unwrap();
        let out = g.node(n).outputs[0];
        g.set_outputs(top, &[out]);
        assert_eq!(
            format!("{}", NodeDisplay(&g, n)),
            "%2 : Tensor = aten::add(%0, %0, %1)"
        );
        let expected = "graph(%0 : Float(2, 3, device=cpu)):\n  \
                        %1 : int = prim::Constant[value=1]()\n  \
                        %2 : Tensor = aten::add(%0, %0, %1)\n  \
                        return (%2)\n";
        assert_eq!(format!("{}", g), expected);
    }
}
