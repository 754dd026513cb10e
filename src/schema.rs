//! Operation schemas, and a small parser for their textual form.
//!
//! Schemas look like `aten::add(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor`. The
//! parser is hand-written: it only has to understand the declarations the formula catalog and
//! graph builders use, which is a small, regular language.
use crate::types::Type;

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArgType {
    Tensor,
    Int,
    Float,
    Bool,
    Str,
    Scalar,
    ScalarType,
    Layout,
    Device,
    MemoryFormat,
    Generator,
    /// Type variables (`t`, `t1`) and `Any`.
    Var(String),
    Optional(Box<ArgType>),
    List(Box<ArgType>),
    Tuple(Vec<ArgType>),
}

impl ArgType {
    fn from_name(name: &str) -> ArgType {
        match name {
            "Tensor" => ArgType::Tensor,
            "int" | "SymInt" => ArgType::Int,
            "float" => ArgType::Float,
            "bool" => ArgType::Bool,
            "str" => ArgType::Str,
            "Scalar" | "number" => ArgType::Scalar,
            "ScalarType" => ArgType::ScalarType,
            "Layout" => ArgType::Layout,
            "Device" => ArgType::Device,
            "MemoryFormat" => ArgType::MemoryFormat,
            "Generator" => ArgType::Generator,
            s => ArgType::Var(s.into()),
        }
    }

    /// The type a freshly created value of this schema type is declared with.
    pub fn to_type(&self) -> Type {
        match self {
            ArgType::Tensor => Type::unshaped(),
            ArgType::Int | ArgType::ScalarType | ArgType::Layout | ArgType::MemoryFormat => {
                Type::Int
            }
            ArgType::Float => Type::Float,
            ArgType::Bool => Type::Bool,
            ArgType::Str => Type::Str,
            ArgType::Scalar => Type::Number,
            ArgType::Device => Type::Device,
            ArgType::Generator | ArgType::Var(_) => Type::Untyped,
            ArgType::Optional(t) => Type::optional(t.to_type()),
            ArgType::List(t) => Type::list(t.to_type()),
            ArgType::Tuple(ts) => Type::tuple(ts.iter().map(ArgType::to_type).collect()),
        }
    }

    pub fn is_tensor(&self) -> bool {
        *self == ArgType::Tensor
    }

    /// Like `Display`, except that types that are integers at runtime print as `int`.
    fn write_key(&self, out: &mut String) {
        match self {
            ArgType::Int | ArgType::ScalarType | ArgType::Layout | ArgType::MemoryFormat => {
                out.push_str("int")
            }
            ArgType::Optional(t) => {
                t.write_key(out);
                out.push('?');
            }
            ArgType::List(t) => {
                t.write_key(out);
                out.push_str("[]");
            }
            ArgType::Tuple(ts) => {
                out.push('(');
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    t.write_key(out);
                }
                out.push(')');
            }
            t => out.push_str(&format!("{}", t)),
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArgType::Tensor => write!(f, "Tensor"),
            ArgType::Int => write!(f, "int"),
            ArgType::Float => write!(f, "float"),
            ArgType::Bool => write!(f, "bool"),
            ArgType::Str => write!(f, "str"),
            ArgType::Scalar => write!(f, "Scalar"),
            ArgType::ScalarType => write!(f, "ScalarType"),
            ArgType::Layout => write!(f, "Layout"),
            ArgType::Device => write!(f, "Device"),
            ArgType::MemoryFormat => write!(f, "MemoryFormat"),
            ArgType::Generator => write!(f, "Generator"),
            ArgType::Var(v) => write!(f, "{}", v),
            ArgType::Optional(t) => write!(f, "{}?", t),
            ArgType::List(t) => write!(f, "{}[]", t),
            ArgType::Tuple(ts) => {
                write!(f, "(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Argument {
    pub name: Option<String>,
    pub ty: ArgType,
    /// `N` in `int[N]`.
    pub len: Option<usize>,
    pub default: Option<String>,
    pub kwarg_only: bool,
    /// `a!` in `Tensor(a!)`.
    pub alias: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Schema {
    /// Qualified name, e.g. `aten::add`.
    pub name: String,
    pub overload: Option<String>,
    pub arguments: Vec<Argument>,
    pub returns: Vec<Argument>,
    pub is_vararg: bool,
}

impl Schema {
    /// The string a schema is matched on: its name and argument types. `SymInt`, `ScalarType`,
    /// `Layout` and `MemoryFormat` all match `int`.
    pub fn key(&self) -> String {
        let mut res = String::with_capacity(self.name.len() + 8 * self.arguments.len());
        res.push_str(&self.name);
        res.push('(');
        for (i, a) in self.arguments.iter().enumerate() {
            if i > 0 {
                res.push_str(", ");
            }
            a.ty.write_key(&mut res);
        }
        if self.is_vararg {
            res.push_str(if self.arguments.is_empty() { "..." } else { ", ..." });
        }
        res.push(')');
        res
    }

    pub fn argument_index(&self, name: &str) -> Option<usize> {
        self.arguments
            .iter()
            .position(|a| a.name.as_ref().map(|s| s.as_str()) == Some(name))
    }

    /// The namespace-free operator name.
    pub fn base_name(&self) -> &str {
        match self.name.rfind("::") {
            Some(ix) => &self.name[ix + 2..],
            None => &self.name[..],
        }
    }

    /// Does this operator mutate its first argument (`add_`, `mul_`, ...)?
    pub fn is_inplace(&self) -> bool {
        let base = self.base_name();
        base.ends_with('_') && !base.ends_with("__")
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn arg(f: &mut fmt::Formatter, a: &Argument) -> fmt::Result {
            match &a.ty {
                ArgType::List(t) => {
                    write!(f, "{}", t)?;
                    match a.len {
                        Some(n) => write!(f, "[{}]", n)?,
                        None => write!(f, "[]")?,
                    }
                }
                t => write!(f, "{}", t)?,
            }
            if let Some(alias) = &a.alias {
                write!(f, "({})", alias)?;
            }
            if let Some(n) = &a.name {
                write!(f, " {}", n)?;
            }
            if let Some(d) = &a.default {
                write!(f, "={}", d)?;
            }
            Ok(())
        }
        write!(f, "{}", self.name)?;
        if let Some(o) = &self.overload {
            write!(f, ".{}", o)?;
        }
        write!(f, "(")?;
        let mut saw_kwarg = false;
        for (i, a) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if a.kwarg_only && !saw_kwarg {
                saw_kwarg = true;
                write!(f, "*, ")?;
            }
            arg(f, a)?;
        }
        if self.is_vararg {
            write!(f, "{}...", if self.arguments.is_empty() { "" } else { ", " })?;
        }
        write!(f, ") -> ")?;
        if self.returns.len() == 1 {
            arg(f, &self.returns[0])
        } else {
            write!(f, "(")?;
            for (i, r) in self.returns.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                arg(f, r)?;
            }
            write!(f, ")")
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub location: usize,
    pub desc: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "schema parse error at byte {}: {}", self.location, self.desc)
    }
}

impl std::error::Error for ParseError {}

struct Parser<'a> {
    text: &'a str,
    cur: usize,
}

fn is_id_body(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

impl<'a> Parser<'a> {
    fn error<T>(&self, desc: impl Into<String>) -> Result<T, ParseError> {
        Err(ParseError {
            location: self.cur,
            desc: desc.into(),
        })
    }

    fn rest(&self) -> &'a str {
        &self.text[self.cur..]
    }

    fn consume_ws(&mut self) {
        let rest = self.rest();
        self.cur += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.consume_ws();
        self.rest().chars().next()
    }

    fn eat(&mut self, s: &str) -> bool {
        self.consume_ws();
        if self.rest().starts_with(s) {
            self.cur += s.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, s: &str) -> Result<(), ParseError> {
        if self.eat(s) {
            Ok(())
        } else {
            self.error(format!("expected {:?}", s))
        }
    }

    fn ident(&mut self) -> Result<&'a str, ParseError> {
        self.consume_ws();
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !is_id_body(*c))
            .map(|(ix, _)| ix)
            .unwrap_or(rest.len());
        if len == 0 {
            return self.error("expected identifier");
        }
        self.cur += len;
        Ok(&rest[..len])
    }

    fn qualified_name(&mut self) -> Result<(String, Option<String>), ParseError> {
        let ns = self.ident()?;
        self.expect("::")?;
        let name = self.ident()?;
        let overload = if self.rest().starts_with('.') {
            self.cur += 1;
            Some(self.ident()?.to_string())
        } else {
            None
        };
        Ok((format!("{}::{}", ns, name), overload))
    }

    // Parses a type along with any alias annotation and fixed list length.
    fn arg_type(&mut self) -> Result<(ArgType, Option<String>, Option<usize>), ParseError> {
        let mut ty = ArgType::from_name(self.ident()?);
        let mut alias = None;
        let mut len = None;
        loop {
            // Suffixes attach directly to the type; no whitespace allowed.
            match self.rest().chars().next() {
                Some('(') => {
                    let end = match self.rest().find(')') {
                        Some(e) => e,
                        None => return self.error("unterminated alias annotation"),
                    };
                    alias = Some(self.rest()[1..end].to_string());
                    self.cur += end + 1;
                }
                Some('?') => {
                    self.cur += 1;
                    ty = ArgType::Optional(Box::new(ty));
                }
                Some('[') => {
                    let end = match self.rest().find(']') {
                        Some(e) => e,
                        None => return self.error("unterminated list type"),
                    };
                    let n = self.rest()[1..end].trim();
                    if !n.is_empty() {
                        len = match n.parse::<usize>() {
                            Ok(n) => Some(n),
                            Err(_) => return self.error(format!("invalid list length {:?}", n)),
                        };
                    }
                    self.cur += end + 1;
                    ty = ArgType::List(Box::new(ty));
                }
                _ => break,
            }
        }
        Ok((ty, alias, len))
    }

    // A default value runs until the next top-level ',' or ')'.
    fn default_value(&mut self) -> Result<String, ParseError> {
        self.consume_ws();
        let mut depth = 0i32;
        let mut in_str = false;
        let start = self.cur;
        for (ix, c) in self.rest().char_indices() {
            match c {
                '"' | '\'' => in_str = !in_str,
                '[' | '(' if !in_str => depth += 1,
                ']' if !in_str => depth -= 1,
                ')' if !in_str && depth == 0 => {
                    self.cur = start + ix;
                    return Ok(self.text[start..self.cur].trim().to_string());
                }
                ')' if !in_str => depth -= 1,
                ',' if !in_str && depth == 0 => {
                    self.cur = start + ix;
                    return Ok(self.text[start..self.cur].trim().to_string());
                }
                _ => {}
            }
        }
        self.error("unterminated default value")
    }

    fn argument(&mut self, kwarg_only: bool) -> Result<Argument, ParseError> {
        let (ty, alias, len) = self.arg_type()?;
        let name = match self.peek() {
            Some(c) if is_id_body(c) => Some(self.ident()?.to_string()),
            _ => None,
        };
        let default = if self.eat("=") {
            Some(self.default_value()?)
        } else {
            None
        };
        Ok(Argument {
            name,
            ty,
            len,
            default,
            kwarg_only,
            alias,
        })
    }

    fn arguments(&mut self) -> Result<(Vec<Argument>, bool), ParseError> {
        self.expect("(")?;
        let mut args = Vec::new();
        let mut kwarg_only = false;
        let mut is_vararg = false;
        if self.eat(")") {
            return Ok((args, is_vararg));
        }
        loop {
            if self.eat("...") {
                is_vararg = true;
            } else if self.eat("*") {
                kwarg_only = true;
            } else {
                args.push(self.argument(kwarg_only)?);
            }
            if self.eat(")") {
                return Ok((args, is_vararg));
            }
            self.expect(",")?;
        }
    }

    fn returns(&mut self) -> Result<Vec<Argument>, ParseError> {
        if self.peek() == Some('(') {
            let (rets, vararg) = self.arguments()?;
            if vararg {
                return self.error("varargs are not allowed in return types");
            }
            Ok(rets)
        } else {
            Ok(vec![self.argument(false)?])
        }
    }

    fn schema(&mut self) -> Result<Schema, ParseError> {
        let (name, overload) = self.qualified_name()?;
        let (arguments, is_vararg) = self.arguments()?;
        self.expect("->")?;
        let returns = self.returns()?;
        self.consume_ws();
        if self.cur != self.text.len() {
            return self.error("trailing characters after schema");
        }
        Ok(Schema {
            name,
            overload,
            arguments,
            returns,
            is_vararg,
        })
    }
}

pub fn parse(text: &str) -> Result<Schema, ParseError> {
    Parser { text, cur: 0 }.schema()
}
