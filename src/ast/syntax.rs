//! Statement and clause nodes.
//!
//! These carry no evaluation semantics; they give the tree its shape so the
//! conditions hanging under `Where`, `Having` and `On` can be found and the
//! whole statement can be printed for audit logs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
    Natural,
    Straight,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Cross => "CROSS",
            Self::Natural => "NATURAL",
            Self::Straight => "STRAIGHT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Syntax {
    // Statements
    Select { distinct: bool },
    Union { all: bool },
    Insert,
    Update,
    Delete,
    Show { words: Vec<String> },
    Describe,
    Use { database: String },
    Transaction { action: String },
    Set,

    // Clauses
    Fields,
    AllFields { qualifier: Option<String> },
    Field { alias: Option<String> },
    From,
    Table { name: String, alias: Option<String> },
    DerivedTable { alias: Option<String> },
    Join { kind: JoinKind },
    On,
    Using { columns: Vec<String> },
    Where,
    GroupBy,
    Having,
    OrderBy,
    OrderTerm { descending: bool },
    Limit,
    Columns { names: Vec<String> },
    Values,
    Row,
    Assignments,
    Assignment { target: String },
}

impl Syntax {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Select { .. } => "Select",
            Self::Union { .. } => "Union",
            Self::Insert => "Insert",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Show { .. } => "Show",
            Self::Describe => "Describe",
            Self::Use { .. } => "Use",
            Self::Transaction { .. } => "Transaction",
            Self::Set => "Set",
            Self::Fields => "Fields",
            Self::AllFields { .. } => "AllFields",
            Self::Field { .. } => "Field",
            Self::From => "From",
            Self::Table { .. } => "Table",
            Self::DerivedTable { .. } => "DerivedTable",
            Self::Join { .. } => "Join",
            Self::On => "On",
            Self::Using { .. } => "Using",
            Self::Where => "Where",
            Self::GroupBy => "GroupBy",
            Self::Having => "Having",
            Self::OrderBy => "OrderBy",
            Self::OrderTerm { .. } => "OrderTerm",
            Self::Limit => "Limit",
            Self::Columns { .. } => "Columns",
            Self::Values => "Values",
            Self::Row => "Row",
            Self::Assignments => "Assignments",
            Self::Assignment { .. } => "Assignment",
        }
    }

    /// Extra text shown after the kind name when printing, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Select { distinct: true } => Some("DISTINCT".to_string()),
            Self::Union { all: true } => Some("ALL".to_string()),
            Self::Show { words } => Some(words.join(" ")),
            Self::Use { database } => Some(database.clone()),
            Self::Transaction { action } => Some(action.clone()),
            Self::AllFields {
                qualifier: Some(q),
            } => Some(format!("{q}.*")),
            Self::AllFields { qualifier: None } => Some("*".to_string()),
            Self::Field { alias: Some(a) } => Some(format!("AS {a}")),
            Self::Table { name, alias } => Some(match alias {
                Some(a) => format!("{name} AS {a}"),
                None => name.clone(),
            }),
            Self::DerivedTable { alias: Some(a) } => Some(format!("AS {a}")),
            Self::Join { kind } => Some(kind.as_str().to_string()),
            Self::Using { columns } => Some(columns.join(", ")),
            Self::OrderTerm { descending } => {
                Some(if *descending { "DESC" } else { "ASC" }.to_string())
            }
            Self::Columns { names } => Some(names.join(", ")),
            Self::Assignment { target } => Some(target.clone()),
            _ => None,
        }
    }

    /// Clauses whose single child is a boolean condition.
    pub fn holds_condition(&self) -> bool {
        matches!(self, Self::Where | Self::Having | Self::On)
    }
}
