//! Forgetting propagated shapes.
use crate::graph::{Attr, Graph};
use crate::types::{unshape, TypeCache};

/// Replace every tensor type in `g`, including those in subgraphs held by node attributes, with
/// the unshaped tensor. Non-tensor types are left alone.
pub fn erase_shapes(g: &mut Graph) {
    let mut cache = TypeCache::default();
    erase_with(g, &mut cache);
}

fn erase_with(g: &mut Graph, cache: &mut TypeCache) {
    for v in g.values_mut() {
        v.ty = unshape(&v.ty, cache);
    }
    for node in g.nodes_mut() {
        for (_, attr) in node.attrs.iter_mut() {
            if let Attr::Graph(sub) = attr {
                erase_with(sub, cache);
            }
        }
    }
}
