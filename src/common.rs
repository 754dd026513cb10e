//! This file contains common type definitions and utilities used in other parts of the project.
use std::fmt;

pub(crate) type NumTy = u32;
pub(crate) type Result<T> = std::result::Result<T, Failure>;

/// The two ways propagating types through a node can fail.
///
/// A `Shape` failure means a formula saw an input combination it cannot handle; the walk recovers
/// by forgetting everything it knew about the node's outputs. A `Fatal` failure aborts the whole
/// pass.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Failure {
    Shape(String),
    Fatal(String),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Failure::Shape(s) => write!(f, "shape propagation failed: {}", s),
            Failure::Fatal(s) => write!(f, "{}", s),
        }
    }
}

/// A hard failure surfaced by [crate::propagate_shapes], with the offending node and the types of
/// its inputs attached.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationError {
    pub message: String,
    pub node: String,
    pub inputs: Vec<String>,
}

impl fmt::Display for PropagationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.message)?;
        writeln!(f, "failed shape propagation in this context. The above operation:")?;
        writeln!(f, "{}", self.node)?;
        writeln!(f, "The inputs are:")?;
        for i in self.inputs.iter() {
            writeln!(f, "{}", i)?;
        }
        Ok(())
    }
}

impl std::error::Error for PropagationError {}

macro_rules! err {
    ($head:expr) => {
        Err($crate::common::Failure::Fatal(
                format!(concat!("[", file!(), ":", line!(), ":", column!(), "] ", $head))
        ))
    };
    ($head:expr, $($t:expr),+) => {
        Err($crate::common::Failure::Fatal(
                format!(concat!("[", file!(), ":", line!(), ":", column!(), "] ", $head), $($t),*)
        ))
    };
}

// Bail out of a formula with a recoverable failure.
macro_rules! shape_assert {
    ($cond:expr) => {
        if !$cond {
            return Err($crate::common::Failure::Shape(format!(
                concat!("[", file!(), ":", line!(), ":", column!(), "] ", "{}"),
                stringify!($cond)
            )));
        }
    };
    ($cond:expr, $head:expr $(, $t:expr)*) => {
        if !$cond {
            return Err($crate::common::Failure::Shape(format!(
                concat!("[", file!(), ":", line!(), ":", column!(), "] ", $head)
                $(, $t)*
            )));
        }
    };
}

macro_rules! static_map {
    ($name:ident<$kty:ty, $vty:ty>, $([$k:expr, $v:expr]),*) => {
        lazy_static::lazy_static! {
            pub(crate) static ref $name: hashbrown::HashMap<$kty,$vty> = {
                let mut m = hashbrown::HashMap::new();
                $(
                    m.insert($k, $v);
                )*
                m
            };
        }
    }
}

/// Wrap a (possibly negative) dimension index against a rank, as in `x.size(-1)`.
pub(crate) fn wrap_dim(dim: i64, rank: usize) -> Option<usize> {
    let rank = rank as i64;
    let wrapped = if dim < 0 { dim + rank } else { dim };
    if wrapped < 0 || wrapped >= rank {
        None
    } else {
        Some(wrapped as usize)
    }
}
