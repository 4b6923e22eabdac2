//! Filter expressions.

use serde_json::{json, Map, Value};
use weave_types::{Record, ID_FIELD, REF_ID};

use crate::error::{QueryError, QueryResult};

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Exists,
}

impl CmpOp {
    pub fn operator(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
            Self::NotIn => "$nin",
            Self::Exists => "$exists",
        }
    }
}

/// A dotted field path, optionally addressing a link's identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPath {
    path: String,
    link_id: bool,
}

/// Start a filter on `path`.
pub fn field(path: impl Into<String>) -> FieldPath {
    FieldPath {
        path: path.into(),
        link_id: false,
    }
}

impl FieldPath {
    /// Address the identifier of the link stored at this path.
    pub fn id(mut self) -> Self {
        self.link_id = true;
        self
    }

    /// The stored path; a link identifier moves from `$id` to `_id` once
    /// links are joined into the queried documents.
    pub fn render(&self, links_fetched: bool) -> String {
        if !self.link_id {
            return self.path.clone();
        }
        let key = if links_fetched { ID_FIELD } else { REF_ID };
        format!("{}.{key}", self.path)
    }

    fn cmp(self, op: CmpOp, value: Value) -> Expr {
        Expr::Cmp { field: self, op, value }
    }

    pub fn eq(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Eq, value.into())
    }

    pub fn ne(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Ne, value.into())
    }

    pub fn gt(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Gt, value.into())
    }

    pub fn gte(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Gte, value.into())
    }

    pub fn lt(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Lt, value.into())
    }

    pub fn lte(self, value: impl Into<Value>) -> Expr {
        self.cmp(CmpOp::Lte, value.into())
    }

    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Expr {
        let values = values.into_iter().map(Into::into).collect();
        self.cmp(CmpOp::In, Value::Array(values))
    }

    pub fn not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Expr {
        let values = values.into_iter().map(Into::into).collect();
        self.cmp(CmpOp::NotIn, Value::Array(values))
    }

    pub fn exists(self, exists: bool) -> Expr {
        self.cmp(CmpOp::Exists, Value::Bool(exists))
    }
}

/// A filter expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Cmp { field: FieldPath, op: CmpOp, value: Value },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Nor(Vec<Expr>),
    /// A filter document used as-is.
    Raw(Record),
}

/// All of `exprs` must hold.
pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::And(exprs.into_iter().collect())
}

/// Any of `exprs` must hold.
pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Or(exprs.into_iter().collect())
}

/// None of `exprs` may hold.
pub fn nor(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Nor(exprs.into_iter().collect())
}

impl Expr {
    /// A raw filter document.
    pub fn raw(value: Value) -> QueryResult<Self> {
        match value {
            Value::Object(map) => Ok(Self::Raw(map)),
            other => Err(QueryError::NotADocument(other.to_string())),
        }
    }

    pub fn and(self, other: Expr) -> Expr {
        match self {
            Self::And(mut exprs) => {
                exprs.push(other);
                Self::And(exprs)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Expr) -> Expr {
        match self {
            Self::Or(mut exprs) => {
                exprs.push(other);
                Self::Or(exprs)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Render to a filter document.
    pub fn render(&self, links_fetched: bool) -> Record {
        match self {
            Self::Cmp { field, op, value } => {
                let operand = match op {
                    CmpOp::Eq => value.clone(),
                    other => json!({ other.operator(): value }),
                };
                let mut out = Map::new();
                out.insert(field.render(links_fetched), operand);
                out
            }
            Self::And(exprs) if exprs.len() == 1 => exprs[0].render(links_fetched),
            Self::And(exprs) => combine("$and", exprs, links_fetched),
            Self::Or(exprs) => combine("$or", exprs, links_fetched),
            Self::Nor(exprs) => combine("$nor", exprs, links_fetched),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

fn combine(operator: &str, exprs: &[Expr], links_fetched: bool) -> Record {
    let rendered = exprs
        .iter()
        .map(|e| Value::Object(e.render(links_fetched)))
        .collect();
    let mut out = Map::new();
    out.insert(operator.into(), Value::Array(rendered));
    out
}

/// The conjunction of filter expressions accumulated by a query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    exprs: Vec<Expr>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter holding one raw filter document.
    pub fn raw(value: Value) -> QueryResult<Self> {
        Ok(Self::new().and(Expr::raw(value)?))
    }

    pub fn and(mut self, expr: Expr) -> Self {
        self.exprs.push(expr);
        self
    }

    pub fn push(&mut self, expr: Expr) {
        self.exprs.push(expr);
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Render to a filter document; empty when nothing was added.
    pub fn render(&self, links_fetched: bool) -> Record {
        match self.exprs.as_slice() {
            [] => Record::new(),
            [single] => single.render(links_fetched),
            many => combine("$and", many, links_fetched),
        }
    }
}

impl From<Expr> for Filter {
    fn from(expr: Expr) -> Self {
        Self::new().and(expr)
    }
}
