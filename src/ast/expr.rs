//! Expression nodes and their risk-evaluation contract.
//!
//! Every expression variant answers the same questions:
//!
//! - [`ExprRef::is_always_true_or_false`]: can the truth value be decided
//!   without a live database (every relevant operand is a literal)?
//! - [`ExprRef::is_always_true`]: the statically decided truth value.
//! - [`ExprRef::any_is_always_true`]: does this node, or any boolean
//!   constituent of it, resolve to always-true on its own? This is what
//!   catches `... OR 1=1` inside a condition that is otherwise undecidable.
//! - [`ExprRef::empty_password`]: is a password field compared against an
//!   empty or trivially satisfiable value?
//! - [`ExprRef::results_in_value`] / [`ExprRef::value`]: the literal the node
//!   reduces to. `value` panics when called on a node that has none.
//!
//! Evaluation is read-only; nodes are never collapsed in place. A comparison
//! of two constant operands is decided when it is queried.

use super::value::{
    as_number, compare, format_number, is_match_all_pattern, like_matches, truthy,
};
use super::{Ast, NodeId};
use crate::risk::EmptyPassword;
use crate::sensitive::SensitiveNameChecker;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    /// `<=>`
    NullSafeEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike,
    Regexp,
    NotRegexp,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NullSafeEq => "<=>",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::Regexp => "REGEXP",
            Self::NotRegexp => "NOT REGEXP",
        }
    }

    /// Operators that hold when both sides are the same column.
    fn is_reflexive(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NullSafeEq | Self::LtEq | Self::GtEq | Self::Like
        )
    }

    fn is_equality(&self) -> bool {
        matches!(self, Self::Eq | Self::NullSafeEq | Self::NotEq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
    Xor,
}

impl LogicOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
        }
    }

    fn apply(&self, left: bool, right: bool) -> bool {
        match self {
            Self::And => left && right,
            Self::Or => left || right,
            Self::Xor => left != right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Not => "NOT",
            Self::Minus => "-",
            Self::Plus => "+",
            Self::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::IntDiv => "DIV",
            Self::Mod => "%",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
        }
    }

    /// `None` stands for SQL NULL (division by zero, overflow).
    fn apply(&self, l: f64, r: f64) -> Option<f64> {
        let result = match self {
            Self::Add => l + r,
            Self::Sub => l - r,
            Self::Mul => l * r,
            Self::Div if r == 0.0 => return None,
            Self::Div => l / r,
            Self::IntDiv if r == 0.0 => return None,
            Self::IntDiv => (l / r).trunc(),
            Self::Mod if r == 0.0 => return None,
            Self::Mod => l % r,
            Self::BitAnd => ((l as i64) & (r as i64)) as f64,
            Self::BitOr => ((l as i64) | (r as i64)) as f64,
            Self::BitXor => ((l as i64) ^ (r as i64)) as f64,
            Self::ShiftLeft => (l as i64).checked_shl(r as u32).unwrap_or(0) as f64,
            Self::ShiftRight => (l as i64).checked_shr(r as u32).unwrap_or(0) as f64,
        };
        result.is_finite().then_some(result)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Number(String),
    String(String),
    /// `X'..'` / `0x..`; `text` is the decoded payload.
    Hex { raw: String, text: String },
    Null,
}

/// Expression variants. Operands live in the owning node's children unless
/// noted otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A boolean known at parse time (`TRUE`, `FALSE`).
    AlwaysSomething(bool),
    /// `expression IN (children...)`. The tested expression is owned through
    /// this handle, the list entries are the children.
    InValuesList { expression: NodeId },
    /// children: [left, right]
    Comparison(CompareOp),
    /// children: [left, right]
    Logic(LogicOp),
    /// children: [operand]
    Unary(UnaryOp),
    /// children: [left, right]
    Arithmetic(ArithmeticOp),
    Literal(Literal),
    Identifier {
        qualifier: Option<String>,
        name: String,
    },
    /// children: arguments. `star` is set for `COUNT(*)`.
    Function { name: String, star: bool },
    /// `?`, `:name`, `$1`
    Placeholder(String),
    /// children: [expression, low, high]
    Between { negated: bool },
    /// children: [operand]
    IsNull { negated: bool },
    /// children: [select statement]
    Subquery,
    /// `@name` or `@@name`
    Variable { name: String, global: bool },
}

/// String functions folded when all their arguments are literals.
const PURE_STRING_FUNCTIONS: &[&str] = &["CONCAT", "LOWER", "LCASE", "UPPER", "UCASE", "CHAR"];

impl Expr {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AlwaysSomething(_) => "AlwaysSomething",
            Self::InValuesList { .. } => "InValuesList",
            Self::Comparison(_) => "Comparison",
            Self::Logic(_) => "BooleanLogic",
            Self::Unary(_) => "Unary",
            Self::Arithmetic(_) => "Arithmetic",
            Self::Literal(_) => "Literal",
            Self::Identifier { .. } => "Identifier",
            Self::Function { .. } => "Function",
            Self::Placeholder(_) => "Placeholder",
            Self::Between { .. } => "Between",
            Self::IsNull { .. } => "IsNull",
            Self::Subquery => "Subquery",
            Self::Variable { .. } => "Variable",
        }
    }

    /// Extra text shown after the kind name when printing, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::AlwaysSomething(b) => Some(if *b { "true" } else { "false" }.to_string()),
            Self::Comparison(op) => Some(op.symbol().to_string()),
            Self::Logic(op) => Some(op.symbol().to_string()),
            Self::Unary(op) => Some(op.symbol().to_string()),
            Self::Arithmetic(op) => Some(op.symbol().to_string()),
            Self::Literal(Literal::Number(n)) => Some(n.clone()),
            Self::Literal(Literal::String(s)) => Some(format!("'{s}'")),
            Self::Literal(Literal::Hex { raw, .. }) => Some(format!("0x{raw}")),
            Self::Literal(Literal::Null) => Some("NULL".to_string()),
            Self::Identifier {
                qualifier: Some(q),
                name,
            } => Some(format!("{q}.{name}")),
            Self::Identifier {
                qualifier: None,
                name,
            } => Some(name.clone()),
            Self::Function { name, star: true } => Some(format!("{name}(*)")),
            Self::Function { name, .. } => Some(name.clone()),
            Self::Placeholder(p) => Some(p.clone()),
            Self::Between { negated: true } | Self::IsNull { negated: true } => {
                Some("NOT".to_string())
            }
            Self::Variable { name, global } => {
                Some(format!("{}{name}", if *global { "@@" } else { "@" }))
            }
            _ => None,
        }
    }

    /// Handles held outside the children list.
    pub(crate) fn operand_handles(&self) -> Vec<NodeId> {
        match self {
            Self::InValuesList { expression } => vec![*expression],
            _ => Vec::new(),
        }
    }

    pub(crate) fn remap(&self, f: impl Fn(NodeId) -> NodeId) -> Expr {
        match self {
            Self::InValuesList { expression } => Self::InValuesList {
                expression: f(*expression),
            },
            other => other.clone(),
        }
    }

    /// Variants that produce a truth value rather than a scalar.
    fn is_boolean_shaped(&self) -> bool {
        matches!(
            self,
            Self::AlwaysSomething(_)
                | Self::InValuesList { .. }
                | Self::Comparison(_)
                | Self::Logic(_)
                | Self::Unary(UnaryOp::Not)
                | Self::Between { .. }
                | Self::IsNull { .. }
        )
    }
}

/// A borrowed view of one expression node inside its tree.
#[derive(Debug, Clone, Copy)]
pub struct ExprRef<'a> {
    ast: &'a Ast,
    id: NodeId,
    expr: &'a Expr,
}

impl<'a> ExprRef<'a> {
    pub(crate) fn new(ast: &'a Ast, id: NodeId, expr: &'a Expr) -> Self {
        Self { ast, id, expr }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &'a Expr {
        self.expr
    }

    fn operand(&self, index: usize) -> ExprRef<'a> {
        self.ast.expr(self.ast.children(self.id)[index])
    }

    fn operands(&self) -> impl Iterator<Item = ExprRef<'a>> + 'a {
        let ast = self.ast;
        ast.children(self.id).iter().map(move |&child| ast.expr(child))
    }

    /// The column name an identifier refers to.
    pub fn field_name(&self) -> Option<&'a str> {
        match self.expr {
            Expr::Identifier { name, .. } => Some(name),
            _ => None,
        }
    }

    fn is_null_literal(&self) -> bool {
        matches!(self.expr, Expr::Literal(Literal::Null))
    }

    pub fn is_always_true_or_false(&self) -> bool {
        self.outcome().decided
    }

    /// Statically decided truth value. Meaningful when
    /// [`is_always_true_or_false`](Self::is_always_true_or_false) holds;
    /// undecidable nodes answer false.
    pub fn is_always_true(&self) -> bool {
        self.outcome().truth
    }

    pub fn any_is_always_true(&self) -> bool {
        self.outcome().any_true
    }

    pub fn empty_password(&self, names: &SensitiveNameChecker) -> EmptyPassword {
        match self.expr {
            Expr::InValuesList { expression } => {
                // Listing candidate values against a credential is treated
                // like comparing it to an empty string.
                match self.ast.expr(*expression).field_name() {
                    Some(field) if names.is_password_field(field) => EmptyPassword::PasswordEmpty,
                    _ => EmptyPassword::PasswordNotUsed,
                }
            }
            Expr::Comparison(op) => {
                let (l, r) = (self.operand(0), self.operand(1));
                let direct = if trivially_matches_password(*op, l, r, names)
                    || trivially_matches_password(*op, r, l, names)
                {
                    EmptyPassword::PasswordEmpty
                } else {
                    EmptyPassword::PasswordNotUsed
                };
                self.operands()
                    .filter(|e| e.expr.is_boolean_shaped())
                    .fold(direct, |acc, e| acc.max(e.empty_password(names)))
            }
            Expr::Logic(_) | Expr::Unary(_) | Expr::Function { .. } => self
                .operands()
                .fold(EmptyPassword::PasswordNotUsed, |acc, e| {
                    acc.max(e.empty_password(names))
                }),
            Expr::Subquery => self
                .subquery_conditions()
                .into_iter()
                .fold(EmptyPassword::PasswordNotUsed, |acc, c| {
                    acc.max(self.ast.expr(c).empty_password(names))
                }),
            _ => EmptyPassword::PasswordNotUsed,
        }
    }

    pub fn results_in_value(&self) -> bool {
        self.outcome().value.is_some()
    }

    pub fn results_in_string(&self) -> bool {
        self.outcome().string
    }

    /// The literal this node reduces to.
    ///
    /// # Panics
    ///
    /// When [`results_in_value`](Self::results_in_value) is false. That is a
    /// bug in the caller, not bad input.
    pub fn value(&self) -> String {
        match self.outcome().value {
            Some(value) => value,
            None => panic!(
                "value() called on {} node {:?}, which does not reduce to a value",
                self.expr.name(),
                self.id
            ),
        }
    }

    fn subquery_conditions(&self) -> Vec<NodeId> {
        self.ast
            .children(self.id)
            .first()
            .map(|&select| self.ast.conditions(select))
            .unwrap_or_default()
    }

    /// Evaluate this node. Each child is evaluated exactly once, so the
    /// cost is linear in the size of the subtree.
    fn outcome(&self) -> Outcome {
        match self.expr {
            Expr::AlwaysSomething(always) => Outcome {
                decided: true,
                truth: *always,
                any_true: *always,
                ..Outcome::default()
            },
            Expr::InValuesList { expression } => {
                let tested = self.ast.expr(*expression).outcome();
                let entries: Vec<Outcome> = self.operands().map(|e| e.outcome()).collect();
                // First entry with an equal value wins
                let truth = tested.value.as_ref().is_some_and(|first| {
                    entries.iter().any(|entry| entry.value.as_ref() == Some(first))
                });
                Outcome {
                    decided: tested.value.is_some() && entries.iter().all(|e| e.value.is_some()),
                    truth,
                    value: tested.value.is_some().then(|| bool_value(truth)),
                    string: false,
                    any_true: truth,
                }
            }
            Expr::Comparison(op) => {
                let (l, r) = (self.operand(0), self.operand(1));
                let (lo, ro) = (l.outcome(), r.outcome());
                let mut outcome = Outcome::boolean(compare_outcome(*op, l, &lo, r, &ro));
                outcome.any_true |= boolean_any_true(&[(l, &lo), (r, &ro)]);
                outcome
            }
            Expr::Logic(op) => {
                let (lo, ro) = (self.operand(0).outcome(), self.operand(1).outcome());
                let decided = lo.decided && ro.decided;
                let mut outcome =
                    Outcome::boolean(decided.then(|| op.apply(lo.truth, ro.truth)));
                outcome.any_true |= lo.any_true || ro.any_true;
                outcome
            }
            Expr::Unary(UnaryOp::Not) => {
                let operand = self.operand(0).outcome();
                let mut outcome = Outcome::boolean(operand.decided.then_some(!operand.truth));
                outcome.any_true |= operand.any_true;
                outcome
            }
            Expr::Unary(op) => {
                let operand = self.operand(0).outcome();
                let value = operand.value.as_deref().map(|v| {
                    let n = as_number(v, operand.string);
                    format_number(match op {
                        UnaryOp::Minus => -n,
                        UnaryOp::BitNot => !(n as i64) as f64,
                        _ => n,
                    })
                });
                Outcome::scalar(value, false)
            }
            Expr::Arithmetic(op) => {
                let (lo, ro) = (self.operand(0).outcome(), self.operand(1).outcome());
                let value = match (&lo.value, &ro.value) {
                    (Some(lv), Some(rv)) => op
                        .apply(as_number(lv, lo.string), as_number(rv, ro.string))
                        .map(format_number),
                    _ => None,
                };
                Outcome::scalar(value, false)
            }
            Expr::Literal(Literal::Null) => Outcome {
                decided: true,
                ..Outcome::default()
            },
            Expr::Literal(Literal::Number(n)) => Outcome::scalar(Some(n.clone()), false),
            Expr::Literal(Literal::String(s)) => Outcome::scalar(Some(s.clone()), true),
            Expr::Literal(Literal::Hex { text, .. }) => Outcome::scalar(Some(text.clone()), true),
            Expr::Function { name, star } => {
                let args: Vec<(ExprRef<'a>, Outcome)> =
                    self.operands().map(|e| (e, e.outcome())).collect();
                let value = if *star {
                    None
                } else {
                    function_value(name, args.iter().map(|(_, o)| o))
                };
                let mut outcome = Outcome::scalar(value, true);
                let refs: Vec<(ExprRef<'a>, &Outcome)> = args.iter().map(|(e, o)| (*e, o)).collect();
                outcome.any_true |= boolean_any_true(&refs);
                outcome
            }
            Expr::Between { negated } => {
                let (eo, lo, ho) = (
                    self.operand(0).outcome(),
                    self.operand(1).outcome(),
                    self.operand(2).outcome(),
                );
                let inside = match (&eo.value, &lo.value, &ho.value) {
                    (Some(ev), Some(lv), Some(hv)) => Some(
                        compare(lv, lo.string, ev, eo.string) != Ordering::Greater
                            && compare(ev, eo.string, hv, ho.string) != Ordering::Greater,
                    ),
                    _ => None,
                };
                Outcome::boolean(inside.map(|inside| inside != *negated))
            }
            Expr::IsNull { negated } => {
                let operand = self.operand(0);
                let decision = if operand.is_null_literal() {
                    Some(!negated)
                } else if operand.outcome().decided {
                    Some(*negated)
                } else {
                    None
                };
                Outcome::boolean(decision)
            }
            Expr::Subquery => Outcome {
                any_true: self
                    .subquery_conditions()
                    .into_iter()
                    .any(|c| self.ast.expr(c).outcome().any_true),
                ..Outcome::default()
            },
            Expr::Identifier { .. } | Expr::Placeholder(_) | Expr::Variable { .. } => {
                Outcome::default()
            }
        }
    }
}

/// What the contract can say about one node.
#[derive(Debug, Clone, Default)]
struct Outcome {
    /// Truth value known statically.
    decided: bool,
    /// The decided truth value. Undecided nodes answer false, except a
    /// membership list whose resolved entries already contain the tested value.
    truth: bool,
    /// The literal the node reduces to.
    value: Option<String>,
    /// `value` is a string rather than a number.
    string: bool,
    /// This node or one of its boolean constituents is always true on its own.
    any_true: bool,
}

impl Outcome {
    /// A truth-valued node, reducing to `1`/`0` once decided.
    fn boolean(decision: Option<bool>) -> Self {
        let truth = decision.unwrap_or(false);
        Self {
            decided: decision.is_some(),
            truth,
            value: decision.map(bool_value),
            string: false,
            any_true: truth,
        }
    }

    /// A scalar node, decided exactly when it reduces to a value.
    fn scalar(value: Option<String>, string: bool) -> Self {
        let string = string && value.is_some();
        let truth = value.as_deref().is_some_and(|v| truthy(v, string));
        Self {
            decided: value.is_some(),
            truth,
            value,
            string,
            any_true: truth,
        }
    }
}

fn boolean_any_true(operands: &[(ExprRef<'_>, &Outcome)]) -> bool {
    operands
        .iter()
        .any(|(e, o)| e.expr.is_boolean_shaped() && o.any_true)
}

fn compare_outcome(
    op: CompareOp,
    l: ExprRef<'_>,
    lo: &Outcome,
    r: ExprRef<'_>,
    ro: &Outcome,
) -> Option<bool> {
    if l.is_null_literal() || r.is_null_literal() {
        return match op {
            CompareOp::NullSafeEq => Some(l.is_null_literal() && r.is_null_literal()),
            _ if l.is_null_literal() && r.is_null_literal() => Some(false),
            _ if lo.decided && ro.decided => Some(false),
            _ => None,
        };
    }

    if let (Some(lv), Some(rv)) = (&lo.value, &ro.value) {
        let ordering = compare(lv, lo.string, rv, ro.string);
        return match op {
            CompareOp::Eq | CompareOp::NullSafeEq => Some(ordering == Ordering::Equal),
            CompareOp::NotEq => Some(ordering != Ordering::Equal),
            CompareOp::Lt => Some(ordering == Ordering::Less),
            CompareOp::LtEq => Some(ordering != Ordering::Greater),
            CompareOp::Gt => Some(ordering == Ordering::Greater),
            CompareOp::GtEq => Some(ordering != Ordering::Less),
            CompareOp::Like => Some(like_matches(lv, rv)),
            CompareOp::NotLike => Some(!like_matches(lv, rv)),
            CompareOp::Regexp | CompareOp::NotRegexp => None,
        };
    }

    if op.is_equality() && lo.decided && ro.decided {
        let same = lo.truth == ro.truth;
        return Some(if op == CompareOp::NotEq { !same } else { same });
    }

    if let (
        Expr::Identifier {
            qualifier: lq,
            name: ln,
        },
        Expr::Identifier {
            qualifier: rq,
            name: rn,
        },
    ) = (l.expr, r.expr)
    {
        let same_column = ln.eq_ignore_ascii_case(rn)
            && lq.as_deref().map(str::to_lowercase) == rq.as_deref().map(str::to_lowercase);
        if same_column {
            return match op {
                CompareOp::Regexp | CompareOp::NotRegexp => None,
                _ => Some(op.is_reflexive()),
            };
        }
    }

    None
}

fn function_value<'o>(name: &str, args: impl Iterator<Item = &'o Outcome>) -> Option<String> {
    let upper = name.to_ascii_uppercase();
    if !PURE_STRING_FUNCTIONS.contains(&upper.as_str()) {
        return None;
    }
    let args: Vec<(&str, bool)> = args
        .map(|o| o.value.as_deref().map(|v| (v, o.string)))
        .collect::<Option<_>>()?;
    if args.is_empty() {
        return None;
    }
    match upper.as_str() {
        "CONCAT" => Some(args.iter().map(|(v, _)| *v).collect()),
        "LOWER" | "LCASE" if args.len() == 1 => Some(args[0].0.to_lowercase()),
        "UPPER" | "UCASE" if args.len() == 1 => Some(args[0].0.to_uppercase()),
        "CHAR" => args
            .iter()
            .map(|(v, string)| char::from_u32(as_number(v, *string) as u32))
            .collect(),
        _ => None,
    }
}

fn bool_value(b: bool) -> String {
    if b { "1" } else { "0" }.to_string()
}

/// `password = ''` and `password LIKE '%'` style comparisons.
fn trivially_matches_password(
    op: CompareOp,
    field: ExprRef<'_>,
    other: ExprRef<'_>,
    names: &SensitiveNameChecker,
) -> bool {
    let Some(name) = field.field_name() else {
        return false;
    };
    if !names.is_password_field(name) || !other.results_in_value() {
        return false;
    }
    let value = other.value();
    match op {
        CompareOp::Eq | CompareOp::NullSafeEq | CompareOp::Like if value.is_empty() => true,
        CompareOp::Like => is_match_all_pattern(&value),
        _ => false,
    }
}
