//! Recursive-descent grammar for the statements the firewall inspects.
//!
//! The grammar runs over a token slice that may be a prefix of the
//! statement. In prefix mode, needing a token past the end yields
//! [`GrammarError::Incomplete`]: the tokens seen so far can still be
//! continued into a valid statement. Any other mismatch yields
//! [`GrammarError::Unexpected`] with the index of the offending token.
//!
//! Grammar actions build the tree and record risk findings into a private
//! [`QueryRisk`]; the caller decides whether to keep them.
//!
//! Expression precedence (lowest to highest, MySQL):
//!   OR ||
//!   XOR
//!   AND &&
//!   NOT (prefix)
//!   = <=> <> != < <= > >= IS LIKE REGEXP IN BETWEEN
//!   |
//!   &
//!   << >>
//!   + -
//!   * / DIV % MOD
//!   ^
//!   - + ~ ! (unary prefix)

use crate::ast::value::decode_hex;
use crate::ast::{
    ArithmeticOp, Ast, CompareOp, Expr, JoinKind, Literal, LogicOp, NodeId, NodeKind, Syntax,
    UnaryOp,
};
use crate::risk::{QueryRisk, QueryType};
use crate::sensitive::SensitiveNameChecker;
use sqlparser::tokenizer::{Token, Word};

/// Nesting limit for parentheses and subqueries.
const MAX_DEPTH: usize = 128;

/// Height limit for operator chains and UNION arms, which build left-deep
/// trees without nesting.
const MAX_HEIGHT: usize = 256;

/// Words that cannot be used as bare identifiers or aliases.
const RESERVED: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "COLLATE", "CROSS", "DELETE", "DESC",
    "DISTINCT", "DISTINCTROW", "DIV", "ELSE", "END", "ESCAPE", "EXISTS", "FALSE", "FOR", "FROM",
    "GROUP", "HAVING", "IGNORE", "IN", "INNER", "INSERT", "INTERVAL", "INTO", "IS", "JOIN", "KEY",
    "LEFT", "LIKE", "LIMIT", "LOCK", "MOD", "NATURAL", "NOT", "NULL", "OFFSET", "ON", "OR",
    "ORDER", "OUTER", "REGEXP", "REPLACE", "RIGHT", "RLIKE", "SELECT", "SET", "STRAIGHT_JOIN",
    "THEN", "TRUE", "UNION", "UPDATE", "USING", "VALUES", "WHEN", "WHERE", "WITH", "XOR",
];

/// Reserved words that are still valid as function names: `LEFT(s, 3)`.
const RESERVED_FUNCTIONS: &[&str] = &["LEFT", "RIGHT", "REPLACE", "INSERT", "VALUES", "MOD"];

/// Functions callable without parentheses.
const NILADIC_FUNCTIONS: &[&str] = &[
    "CURRENT_USER",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "LOCALTIME",
    "LOCALTIMESTAMP",
];

/// Server settings whose value identifies the server build or host.
const FINGERPRINT_VARIABLES: &[&str] = &["hostname", "datadir", "basedir", "port", "tmpdir", "plugin_dir"];

// Binding powers: higher = tighter binding.
mod bp {
    pub const OR: (u8, u8) = (1, 2);
    pub const XOR: (u8, u8) = (3, 4);
    pub const AND: (u8, u8) = (5, 6);
    pub const NOT_PREFIX: u8 = 7;
    pub const COMPARISON: (u8, u8) = (9, 10);
    pub const BIT_OR: (u8, u8) = (11, 12);
    pub const BIT_AND: (u8, u8) = (13, 14);
    pub const SHIFT: (u8, u8) = (15, 16);
    pub const ADD: (u8, u8) = (17, 18);
    pub const MUL: (u8, u8) = (19, 20);
    pub const BIT_XOR: (u8, u8) = (21, 22);
    pub const UNARY: u8 = 23;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// The tokens ran out before the statement was complete.
    Incomplete,
    /// The token at `index` cannot continue the statement.
    Unexpected { index: usize, expected: &'static str },
}

/// A fully parsed statement and the findings of its grammar actions.
#[derive(Debug)]
pub struct Statement {
    pub ast: Ast,
    pub root: NodeId,
    pub risk: QueryRisk,
}

/// Parse `tokens` (whitespace already removed, no end-of-input marker).
///
/// With `complete` unset the tokens are treated as a prefix of a longer
/// statement, and `Ok` or `Err(Incomplete)` both mean "still viable".
pub fn parse(
    tokens: &[Token],
    complete: bool,
    names: &SensitiveNameChecker,
) -> Result<Statement, GrammarError> {
    let mut grammar = Grammar {
        tokens,
        pos: 0,
        complete,
        eof: Token::EOF,
        depth: 0,
        ast: Ast::new(),
        heights: Vec::new(),
        risk: QueryRisk::new(),
        names,
    };
    let root = grammar.statement()?;
    while grammar.eat_token(&Token::SemiColon)? {}
    if grammar.pos < tokens.len() {
        // Stacked queries are never accepted
        return Err(grammar.unexpected("end of statement"));
    }
    Ok(Statement {
        ast: grammar.ast,
        root,
        risk: grammar.risk,
    })
}

fn keyword(token: &Token) -> Option<String> {
    match token {
        Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_ascii_uppercase()),
        _ => None,
    }
}

fn is_keyword(token: &Token, kw: &str) -> bool {
    matches!(token, Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(kw))
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

fn is_identifier(token: &Token) -> bool {
    matches!(token, Token::Word(w) if w.quote_style.is_some() || !is_reserved(&w.value))
}

#[derive(Debug, Clone, Copy)]
enum Infix {
    Logic(LogicOp),
    Compare(CompareOp),
    Arithmetic(ArithmeticOp),
    Is,
    In { negated: bool },
    Between { negated: bool },
}

impl Infix {
    fn binding_power(&self) -> (u8, u8) {
        match self {
            Self::Logic(LogicOp::Or) => bp::OR,
            Self::Logic(LogicOp::Xor) => bp::XOR,
            Self::Logic(LogicOp::And) => bp::AND,
            Self::Compare(_) | Self::Is | Self::In { .. } | Self::Between { .. } => bp::COMPARISON,
            Self::Arithmetic(op) => match op {
                ArithmeticOp::BitOr => bp::BIT_OR,
                ArithmeticOp::BitAnd => bp::BIT_AND,
                ArithmeticOp::ShiftLeft | ArithmeticOp::ShiftRight => bp::SHIFT,
                ArithmeticOp::Add | ArithmeticOp::Sub => bp::ADD,
                ArithmeticOp::Mul | ArithmeticOp::Div | ArithmeticOp::IntDiv | ArithmeticOp::Mod => {
                    bp::MUL
                }
                ArithmeticOp::BitXor => bp::BIT_XOR,
            },
        }
    }
}

struct Grammar<'t, 'n> {
    tokens: &'t [Token],
    pos: usize,
    complete: bool,
    eof: Token,
    depth: usize,
    ast: Ast,
    /// Height of every node built so far, indexed by `NodeId::index`.
    heights: Vec<usize>,
    risk: QueryRisk,
    names: &'n SensitiveNameChecker,
}

impl Grammar<'_, '_> {
    // ── Token helpers ───────────────────────────────────────────────────

    fn peek_nth(&self, n: usize) -> Result<&Token, GrammarError> {
        match self.tokens.get(self.pos + n) {
            Some(token) => Ok(token),
            None if self.complete => Ok(&self.eof),
            None => Err(GrammarError::Incomplete),
        }
    }

    fn peek(&self) -> Result<&Token, GrammarError> {
        self.peek_nth(0)
    }

    fn at_token(&self, token: &Token) -> Result<bool, GrammarError> {
        Ok(self.peek()? == token)
    }

    fn eat_token(&mut self, token: &Token) -> Result<bool, GrammarError> {
        let found = self.at_token(token)?;
        if found {
            self.pos += 1;
        }
        Ok(found)
    }

    fn expect_token(&mut self, token: &Token, expected: &'static str) -> Result<(), GrammarError> {
        if self.eat_token(token)? {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn at_keyword(&self, kw: &str) -> Result<bool, GrammarError> {
        Ok(is_keyword(self.peek()?, kw))
    }

    fn eat_keyword(&mut self, kw: &str) -> Result<bool, GrammarError> {
        let found = self.at_keyword(kw)?;
        if found {
            self.pos += 1;
        }
        Ok(found)
    }

    fn expect_keyword(&mut self, kw: &'static str) -> Result<(), GrammarError> {
        if self.eat_keyword(kw)? {
            Ok(())
        } else {
            Err(self.unexpected(kw))
        }
    }

    fn unexpected(&self, expected: &'static str) -> GrammarError {
        GrammarError::Unexpected {
            index: self.pos,
            expected,
        }
    }

    fn identifier(&mut self) -> Result<String, GrammarError> {
        match self.peek()? {
            Token::Word(w) if w.quote_style.is_some() || !is_reserved(&w.value) => {
                let name = w.value.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// `a`, `a.b`, `a.b.c`
    fn dotted_name(&mut self) -> Result<Vec<String>, GrammarError> {
        let mut parts = vec![self.identifier()?];
        while self.eat_token(&Token::Period)? {
            parts.push(self.identifier()?);
        }
        Ok(parts)
    }

    fn column_list(&mut self) -> Result<Vec<String>, GrammarError> {
        self.expect_token(&Token::LParen, "'('")?;
        let mut names = vec![self.identifier()?];
        while self.eat_token(&Token::Comma)? {
            names.push(self.identifier()?);
        }
        self.expect_token(&Token::RParen, "')'")?;
        Ok(names)
    }

    /// Optional `[AS] alias`.
    fn alias(&mut self) -> Result<Option<String>, GrammarError> {
        let explicit = self.eat_keyword("AS")?;
        let alias = match self.peek()? {
            Token::Word(w) if w.quote_style.is_some() || !is_reserved(&w.value) => {
                Some(w.value.clone())
            }
            Token::SingleQuotedString(s) | Token::DoubleQuotedString(s) if explicit => {
                Some(s.clone())
            }
            _ if explicit => return Err(self.unexpected("alias")),
            _ => None,
        };
        if alias.is_some() {
            self.pos += 1;
        }
        Ok(alias)
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, GrammarError>,
    ) -> Result<T, GrammarError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.unexpected("shallower nesting"));
        }
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn node(&mut self, syntax: Syntax, children: impl IntoIterator<Item = NodeId>) -> NodeId {
        let id = self.ast.add_with_children(NodeKind::Syntax(syntax), children);
        self.track_height(id);
        id
    }

    fn expr_node(&mut self, expr: Expr, children: impl IntoIterator<Item = NodeId>) -> NodeId {
        let id = self.ast.add_with_children(NodeKind::Expr(expr), children);
        self.track_height(id);
        id
    }

    fn track_height(&mut self, id: NodeId) {
        let operands = match self.ast.kind(id) {
            NodeKind::Expr(expr) => expr.operand_handles(),
            _ => Vec::new(),
        };
        let below = self
            .ast
            .children(id)
            .iter()
            .chain(&operands)
            .map(|child| self.heights.get(child.index()).copied().unwrap_or(0))
            .max()
            .unwrap_or(0);
        self.heights.push(below + 1);
    }

    /// Reject trees too tall to evaluate and print recursively.
    fn within_height(&self, id: NodeId) -> Result<NodeId, GrammarError> {
        match self.heights.get(id.index()) {
            Some(&height) if height > MAX_HEIGHT => Err(self.unexpected("shorter expression")),
            _ => Ok(id),
        }
    }

    fn literal(&mut self, literal: Literal) -> NodeId {
        self.expr_node(Expr::Literal(literal), [])
    }

    // ── Risk recording ──────────────────────────────────────────────────

    fn record_condition(&mut self, cond: NodeId) {
        // Prefix parses are discarded, only the final parse reports findings
        if !self.complete {
            return;
        }
        let condition = self.ast.expr(cond);
        if condition.any_is_always_true() {
            self.risk.always_true = true;
        }
        if condition.is_always_true_or_false() && condition.is_always_true() {
            self.risk.always_true_conditional = true;
        }
        self.risk.empty_password = self
            .risk
            .empty_password
            .max(condition.empty_password(self.names));
    }

    fn record_table(&mut self, parts: &[String]) {
        let table = parts.last().map(String::as_str).unwrap_or_default();
        let schema = (parts.len() > 1).then(|| parts[parts.len() - 2].to_ascii_lowercase());
        let information_schema = schema.as_deref() == Some("information_schema");
        let system = matches!(
            schema.as_deref(),
            Some("mysql") | Some("performance_schema") | Some("sys")
        );
        let user = self.names.is_user_field(table);

        if information_schema {
            self.risk.information_schema = true;
        }
        if user {
            self.risk.user_table = true;
        }
        if information_schema || system || user || self.names.is_password_field(table) {
            self.risk.sensitive_tables += 1;
        }
    }

    fn record_function(&mut self, name: &str) {
        match name {
            "BENCHMARK" | "SLEEP" => self.risk.benchmark_statements += 1,
            "USER" | "CURRENT_USER" | "SYSTEM_USER" | "SESSION_USER" => {
                self.risk.user_statements += 1
            }
            "VERSION" | "DATABASE" | "SCHEMA" | "CONNECTION_ID" => {
                self.risk.fingerprinting_statements += 1
            }
            "CHAR" | "CONCAT" | "CONCAT_WS" | "SUBSTRING" | "SUBSTR" | "MID" | "ASCII" | "ORD"
            | "HEX" | "UNHEX" => self.risk.string_manipulation_statements += 1,
            "IF" => self.risk.if_statements += 1,
            _ => {}
        }
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn statement(&mut self) -> Result<NodeId, GrammarError> {
        let token = self.peek()?;
        let Some(word) = keyword(token) else {
            if *token == Token::LParen {
                self.risk.query_type = QueryType::Select;
                return self.query();
            }
            return Err(self.unexpected("statement"));
        };
        match word.as_str() {
            "SELECT" => {
                self.risk.query_type = QueryType::Select;
                self.query()
            }
            "INSERT" | "REPLACE" => self.insert(),
            "UPDATE" => self.update(),
            "DELETE" => self.delete(),
            "SHOW" => self.show(),
            "DESCRIBE" | "DESC" | "EXPLAIN" => self.describe(),
            "USE" => self.use_database(),
            "BEGIN" | "START" | "COMMIT" | "ROLLBACK" => self.transaction(),
            "SET" => self.set(),
            _ => Err(self.unexpected("statement")),
        }
    }

    /// SELECT with any number of UNION arms.
    fn query(&mut self) -> Result<NodeId, GrammarError> {
        let mut left = self.select_core()?;
        while self.eat_keyword("UNION")? {
            let all = self.eat_keyword("ALL")?;
            if !all {
                self.eat_keyword("DISTINCT")?;
            }
            self.risk.union_statements += 1;
            if all {
                self.risk.union_all_statements += 1;
            }
            let right = self.select_core()?;
            let union = self.node(Syntax::Union { all }, [left, right]);
            left = self.within_height(union)?;
        }
        Ok(left)
    }

    fn select_core(&mut self) -> Result<NodeId, GrammarError> {
        if self.eat_token(&Token::LParen)? {
            let inner = self.nested(Self::query)?;
            self.expect_token(&Token::RParen, "')'")?;
            return Ok(inner);
        }

        self.expect_keyword("SELECT")?;
        let mut distinct = false;
        while let Some(word) = keyword(self.peek()?) {
            match word.as_str() {
                "DISTINCT" | "DISTINCTROW" => distinct = true,
                "ALL" | "HIGH_PRIORITY" | "STRAIGHT_JOIN" | "SQL_SMALL_RESULT"
                | "SQL_BIG_RESULT" | "SQL_BUFFER_RESULT" | "SQL_NO_CACHE"
                | "SQL_CALC_FOUND_ROWS" => {}
                _ => break,
            }
            self.pos += 1;
        }

        let mut children = vec![self.fields()?];
        if self.eat_keyword("FROM")? {
            children.push(self.from()?);
        }
        children.extend(self.where_clause()?);
        if self.eat_keyword("GROUP")? {
            self.expect_keyword("BY")?;
            let items = self.expr_list()?;
            if self.eat_keyword("WITH")? {
                self.expect_keyword("ROLLUP")?;
            }
            children.push(self.node(Syntax::GroupBy, items));
        }
        if self.eat_keyword("HAVING")? {
            let cond = self.condition()?;
            children.push(self.node(Syntax::Having, [cond]));
        }
        children.extend(self.order_by()?);
        children.extend(self.limit()?);
        Ok(self.node(Syntax::Select { distinct }, children))
    }

    fn fields(&mut self) -> Result<NodeId, GrammarError> {
        let mut items = vec![self.field()?];
        while self.eat_token(&Token::Comma)? {
            items.push(self.field()?);
        }
        Ok(self.node(Syntax::Fields, items))
    }

    fn field(&mut self) -> Result<NodeId, GrammarError> {
        if self.eat_token(&Token::Mul)? {
            self.risk.select_all = true;
            return Ok(self.node(Syntax::AllFields { qualifier: None }, []));
        }
        if is_identifier(self.peek()?)
            && *self.peek_nth(1)? == Token::Period
            && *self.peek_nth(2)? == Token::Mul
        {
            let qualifier = self.identifier()?;
            self.pos += 2;
            self.risk.select_all = true;
            return Ok(self.node(
                Syntax::AllFields {
                    qualifier: Some(qualifier),
                },
                [],
            ));
        }
        let value = self.expr()?;
        let alias = self.alias()?;
        Ok(self.node(Syntax::Field { alias }, [value]))
    }

    fn from(&mut self) -> Result<NodeId, GrammarError> {
        let mut refs = vec![self.table_ref()?];
        while self.eat_token(&Token::Comma)? {
            self.risk.join_statements += 1;
            self.risk.cross_join_statements += 1;
            refs.push(self.table_ref()?);
        }
        Ok(self.node(Syntax::From, refs))
    }

    fn table_ref(&mut self) -> Result<NodeId, GrammarError> {
        let mut left = self.table_factor()?;
        while let Some(kind) = self.join_kind()? {
            self.risk.join_statements += 1;
            if kind == JoinKind::Cross {
                self.risk.cross_join_statements += 1;
            }
            let right = self.table_factor()?;
            let mut children = vec![left, right];
            if self.eat_keyword("ON")? {
                let cond = self.condition()?;
                children.push(self.node(Syntax::On, [cond]));
            } else if self.at_keyword("USING")? {
                self.pos += 1;
                let columns = self.column_list()?;
                children.push(self.node(Syntax::Using { columns }, []));
            }
            left = self.node(Syntax::Join { kind }, children);
        }
        Ok(left)
    }

    fn join_kind(&mut self) -> Result<Option<JoinKind>, GrammarError> {
        let Some(word) = keyword(self.peek()?) else {
            return Ok(None);
        };
        let kind = match word.as_str() {
            "JOIN" => {
                self.pos += 1;
                return Ok(Some(JoinKind::Inner));
            }
            "STRAIGHT_JOIN" => {
                self.pos += 1;
                return Ok(Some(JoinKind::Straight));
            }
            "INNER" => JoinKind::Inner,
            "CROSS" => JoinKind::Cross,
            "LEFT" => JoinKind::Left,
            "RIGHT" => JoinKind::Right,
            "NATURAL" => JoinKind::Natural,
            _ => return Ok(None),
        };
        self.pos += 1;
        if kind == JoinKind::Natural && !self.eat_keyword("LEFT")? {
            self.eat_keyword("RIGHT")?;
        }
        if matches!(kind, JoinKind::Left | JoinKind::Right | JoinKind::Natural) {
            self.eat_keyword("OUTER")?;
        }
        self.expect_keyword("JOIN")?;
        Ok(Some(kind))
    }

    fn table_factor(&mut self) -> Result<NodeId, GrammarError> {
        if self.eat_token(&Token::LParen)? {
            if self.at_keyword("SELECT")? {
                let query = self.nested(Self::query)?;
                self.expect_token(&Token::RParen, "')'")?;
                let alias = self.alias()?;
                return Ok(self.node(Syntax::DerivedTable { alias }, [query]));
            }
            let inner = self.nested(Self::table_ref)?;
            self.expect_token(&Token::RParen, "')'")?;
            return Ok(inner);
        }
        let parts = self.dotted_name()?;
        self.record_table(&parts);
        let alias = self.alias()?;
        Ok(self.node(
            Syntax::Table {
                name: parts.join("."),
                alias,
            },
            [],
        ))
    }

    fn where_clause(&mut self) -> Result<Option<NodeId>, GrammarError> {
        if !self.eat_keyword("WHERE")? {
            return Ok(None);
        }
        let cond = self.condition()?;
        Ok(Some(self.node(Syntax::Where, [cond])))
    }

    fn condition(&mut self) -> Result<NodeId, GrammarError> {
        let cond = self.expr()?;
        self.record_condition(cond);
        Ok(cond)
    }

    fn order_by(&mut self) -> Result<Option<NodeId>, GrammarError> {
        if !self.eat_keyword("ORDER")? {
            return Ok(None);
        }
        self.expect_keyword("BY")?;
        let mut terms = Vec::new();
        loop {
            let value = self.expr()?;
            if matches!(
                self.ast.kind(value),
                NodeKind::Expr(Expr::Literal(Literal::Number(_)))
            ) {
                // Column-count probing: ORDER BY 1, 2, ...
                self.risk.order_by_number = true;
            }
            let descending = self.eat_keyword("DESC")?;
            if !descending {
                self.eat_keyword("ASC")?;
            }
            terms.push(self.node(Syntax::OrderTerm { descending }, [value]));
            if !self.eat_token(&Token::Comma)? {
                break;
            }
        }
        Ok(Some(self.node(Syntax::OrderBy, terms)))
    }

    fn limit(&mut self) -> Result<Option<NodeId>, GrammarError> {
        if !self.eat_keyword("LIMIT")? {
            return Ok(None);
        }
        let mut values = vec![self.expr()?];
        if self.eat_token(&Token::Comma)? || self.eat_keyword("OFFSET")? {
            values.push(self.expr()?);
        }
        Ok(Some(self.node(Syntax::Limit, values)))
    }

    fn skip_modifiers(&mut self, modifiers: &[&str]) -> Result<(), GrammarError> {
        while let Some(word) = keyword(self.peek()?) {
            if !modifiers.contains(&word.as_str()) {
                break;
            }
            self.pos += 1;
        }
        Ok(())
    }

    fn insert(&mut self) -> Result<NodeId, GrammarError> {
        self.risk.query_type = QueryType::Insert;
        self.pos += 1;
        self.skip_modifiers(&["LOW_PRIORITY", "DELAYED", "HIGH_PRIORITY", "IGNORE"])?;
        self.eat_keyword("INTO")?;

        let parts = self.dotted_name()?;
        self.record_table(&parts);
        let mut children = vec![self.node(
            Syntax::Table {
                name: parts.join("."),
                alias: None,
            },
            [],
        )];

        if self.at_token(&Token::LParen)? && !is_keyword(self.peek_nth(1)?, "SELECT") {
            let names = self.column_list()?;
            children.push(self.node(Syntax::Columns { names }, []));
        }

        if self.eat_keyword("VALUES")? || self.eat_keyword("VALUE")? {
            let mut rows = Vec::new();
            loop {
                self.expect_token(&Token::LParen, "'('")?;
                let items = if self.at_token(&Token::RParen)? {
                    Vec::new()
                } else {
                    self.expr_list()?
                };
                self.expect_token(&Token::RParen, "')'")?;
                rows.push(self.node(Syntax::Row, items));
                if !self.eat_token(&Token::Comma)? {
                    break;
                }
            }
            children.push(self.node(Syntax::Values, rows));
        } else if self.eat_keyword("SET")? {
            children.push(self.assignments()?);
        } else if self.at_keyword("SELECT")? || self.at_token(&Token::LParen)? {
            children.push(self.query()?);
        } else {
            return Err(self.unexpected("VALUES, SET or SELECT"));
        }

        if self.eat_keyword("ON")? {
            self.expect_keyword("DUPLICATE")?;
            self.expect_keyword("KEY")?;
            self.expect_keyword("UPDATE")?;
            children.push(self.assignments()?);
        }
        Ok(self.node(Syntax::Insert, children))
    }

    fn assignments(&mut self) -> Result<NodeId, GrammarError> {
        let mut items = Vec::new();
        loop {
            let target = self.dotted_name()?.join(".");
            self.expect_token(&Token::Eq, "'='")?;
            let value = self.expr()?;
            items.push(self.node(Syntax::Assignment { target }, [value]));
            if !self.eat_token(&Token::Comma)? {
                break;
            }
        }
        Ok(self.node(Syntax::Assignments, items))
    }

    fn update(&mut self) -> Result<NodeId, GrammarError> {
        self.risk.query_type = QueryType::Update;
        self.pos += 1;
        self.skip_modifiers(&["LOW_PRIORITY", "IGNORE"])?;
        let mut children = vec![self.from()?];
        self.expect_keyword("SET")?;
        children.push(self.assignments()?);
        children.extend(self.where_clause()?);
        children.extend(self.order_by()?);
        children.extend(self.limit()?);
        Ok(self.node(Syntax::Update, children))
    }

    fn delete(&mut self) -> Result<NodeId, GrammarError> {
        self.risk.query_type = QueryType::Delete;
        self.pos += 1;
        self.skip_modifiers(&["LOW_PRIORITY", "QUICK", "IGNORE"])?;
        self.expect_keyword("FROM")?;
        let mut children = vec![self.from()?];
        children.extend(self.where_clause()?);
        children.extend(self.order_by()?);
        children.extend(self.limit()?);
        Ok(self.node(Syntax::Delete, children))
    }

    /// `SHOW ...`: the rest of the statement is kept verbatim.
    fn show(&mut self) -> Result<NodeId, GrammarError> {
        self.risk.query_type = QueryType::Show;
        self.pos += 1;
        let mut words = Vec::new();
        loop {
            let token = self.peek()?;
            if matches!(token, Token::SemiColon | Token::EOF) {
                break;
            }
            words.push(token.to_string());
            self.pos += 1;
        }
        if words.is_empty() {
            return Err(self.unexpected("SHOW target"));
        }
        Ok(self.node(Syntax::Show { words }, []))
    }

    fn describe(&mut self) -> Result<NodeId, GrammarError> {
        self.risk.query_type = QueryType::Describe;
        self.pos += 1;
        if self.at_keyword("SELECT")? {
            let query = self.query()?;
            return Ok(self.node(Syntax::Describe, [query]));
        }
        let parts = self.dotted_name()?;
        self.record_table(&parts);
        let mut children = vec![self.node(
            Syntax::Table {
                name: parts.join("."),
                alias: None,
            },
            [],
        )];
        if is_identifier(self.peek()?) {
            let name = self.identifier()?;
            children.push(self.expr_node(
                Expr::Identifier {
                    qualifier: None,
                    name,
                },
                [],
            ));
        }
        Ok(self.node(Syntax::Describe, children))
    }

    fn use_database(&mut self) -> Result<NodeId, GrammarError> {
        self.risk.query_type = QueryType::Use;
        self.pos += 1;
        let database = self.identifier()?;
        Ok(self.node(Syntax::Use { database }, []))
    }

    fn transaction(&mut self) -> Result<NodeId, GrammarError> {
        self.risk.query_type = QueryType::Transaction;
        let action = keyword(self.peek()?).unwrap_or_default();
        self.pos += 1;
        let action = if action == "START" {
            self.expect_keyword("TRANSACTION")?;
            "START TRANSACTION".to_string()
        } else {
            self.eat_keyword("WORK")?;
            action
        };
        Ok(self.node(Syntax::Transaction { action }, []))
    }

    fn set(&mut self) -> Result<NodeId, GrammarError> {
        self.risk.query_type = QueryType::Set;
        self.pos += 1;
        if self.eat_keyword("NAMES")? {
            let charset = self.expr()?;
            let mut items = vec![self.node(
                Syntax::Assignment {
                    target: "NAMES".to_string(),
                },
                [charset],
            )];
            if self.eat_keyword("COLLATE")? {
                let collation = self.expr()?;
                items.push(self.node(
                    Syntax::Assignment {
                        target: "COLLATE".to_string(),
                    },
                    [collation],
                ));
            }
            let assignments = self.node(Syntax::Assignments, items);
            return Ok(self.node(Syntax::Set, [assignments]));
        }
        self.skip_modifiers(&["GLOBAL", "SESSION", "LOCAL"])?;
        let assignments = self.assignments()?;
        Ok(self.node(Syntax::Set, [assignments]))
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn expr(&mut self) -> Result<NodeId, GrammarError> {
        self.expr_bp(0)
    }

    fn expr_list(&mut self) -> Result<Vec<NodeId>, GrammarError> {
        let mut items = vec![self.expr()?];
        while self.eat_token(&Token::Comma)? {
            items.push(self.expr()?);
        }
        Ok(items)
    }

    fn expr_bp(&mut self, min_bp: u8) -> Result<NodeId, GrammarError> {
        self.nested(|g| {
            let mut lhs = g.prefix()?;
            while let Some((op, width)) = g.infix_op()? {
                let (l_bp, r_bp) = op.binding_power();
                if l_bp < min_bp {
                    break;
                }
                g.pos += width;
                let combined = g.infix(lhs, op, r_bp)?;
                lhs = g.within_height(combined)?;
            }
            Ok(lhs)
        })
    }

    fn prefix(&mut self) -> Result<NodeId, GrammarError> {
        match self.peek()?.clone() {
            Token::Number(n, _) => {
                self.pos += 1;
                Ok(self.literal(Literal::Number(n)))
            }
            Token::SingleQuotedString(s)
            | Token::DoubleQuotedString(s)
            | Token::NationalStringLiteral(s)
            | Token::EscapedStringLiteral(s) => {
                self.pos += 1;
                Ok(self.literal(Literal::String(s)))
            }
            Token::HexStringLiteral(raw) => {
                self.pos += 1;
                self.risk.hex_strings += 1;
                let text = decode_hex(&raw).unwrap_or_else(|| raw.clone());
                Ok(self.literal(Literal::Hex { raw, text }))
            }
            Token::Placeholder(p) => {
                self.pos += 1;
                Ok(self.expr_node(Expr::Placeholder(p), []))
            }
            Token::LParen => {
                self.pos += 1;
                self.parenthesized()
            }
            Token::Minus => self.unary(UnaryOp::Minus, bp::UNARY),
            Token::Plus => self.unary(UnaryOp::Plus, bp::UNARY),
            Token::Tilde => self.unary(UnaryOp::BitNot, bp::UNARY),
            Token::ExclamationMark => self.unary(UnaryOp::Not, bp::UNARY),
            Token::AtSign => self.at_sign_variable(),
            Token::Word(word) => self.word_prefix(word),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn unary(&mut self, op: UnaryOp, bp: u8) -> Result<NodeId, GrammarError> {
        self.pos += 1;
        let operand = self.expr_bp(bp)?;
        Ok(self.expr_node(Expr::Unary(op), [operand]))
    }

    /// After `(`: a scalar subquery or a grouped expression.
    fn parenthesized(&mut self) -> Result<NodeId, GrammarError> {
        if self.at_keyword("SELECT")? {
            let query = self.nested(Self::query)?;
            self.expect_token(&Token::RParen, "')'")?;
            return Ok(self.expr_node(Expr::Subquery, [query]));
        }
        let inner = self.expr()?;
        self.expect_token(&Token::RParen, "')'")?;
        Ok(inner)
    }

    fn word_prefix(&mut self, word: Word) -> Result<NodeId, GrammarError> {
        let quoted = word.quote_style.is_some();
        if !quoted && word.value.starts_with('@') {
            self.pos += 1;
            return self.variable(word.value);
        }

        let upper = word.value.to_ascii_uppercase();
        if !quoted {
            match upper.as_str() {
                "NOT" => return self.unary(UnaryOp::Not, bp::NOT_PREFIX),
                "NULL" => {
                    self.pos += 1;
                    return Ok(self.literal(Literal::Null));
                }
                "TRUE" | "FALSE" => {
                    self.pos += 1;
                    return Ok(self.expr_node(Expr::AlwaysSomething(upper == "TRUE"), []));
                }
                "EXISTS" => {
                    self.pos += 1;
                    return self.exists();
                }
                "CASE" => {
                    self.pos += 1;
                    return self.case();
                }
                "INTERVAL" => {
                    self.pos += 1;
                    return self.interval();
                }
                "BINARY" => {
                    self.pos += 1;
                    return self.expr_bp(bp::UNARY);
                }
                _ => {}
            }
        }

        if !quoted && is_reserved(&word.value) && !RESERVED_FUNCTIONS.contains(&upper.as_str()) {
            return Err(self.unexpected("expression"));
        }
        if !quoted && self.peek_nth(1)? == &Token::LParen {
            self.pos += 2;
            return self.function(upper);
        }
        if !quoted && NILADIC_FUNCTIONS.contains(&upper.as_str()) {
            self.pos += 1;
            self.record_function(&upper);
            return Ok(self.expr_node(
                Expr::Function {
                    name: upper,
                    star: false,
                },
                [],
            ));
        }
        if !quoted && is_reserved(&word.value) {
            return Err(self.unexpected("expression"));
        }

        self.pos += 1;
        let mut parts = vec![word.value];
        while self.eat_token(&Token::Period)? {
            match self.peek()? {
                Token::Word(w) => {
                    parts.push(w.value.clone());
                    self.pos += 1;
                }
                _ => return Err(self.unexpected("column name")),
            }
        }
        let name = parts.pop().unwrap_or_default();
        let qualifier = (!parts.is_empty()).then(|| parts.join("."));
        Ok(self.expr_node(Expr::Identifier { qualifier, name }, []))
    }

    /// `@name`, `@@name`, `@@session.name`
    fn variable(&mut self, raw: String) -> Result<NodeId, GrammarError> {
        let mut name = raw;
        while self.at_token(&Token::Period)? {
            let Token::Word(part) = self.peek_nth(1)?.clone() else {
                break;
            };
            name.push('.');
            name.push_str(&part.value);
            self.pos += 2;
        }

        let global = name.starts_with("@@");
        let bare = name.trim_start_matches('@').to_string();
        if global {
            self.risk.global_variables += 1;
            let lower = bare.to_ascii_lowercase();
            let setting = lower.rsplit('.').next().unwrap_or(&lower);
            if setting.starts_with("version") || FINGERPRINT_VARIABLES.contains(&setting) {
                self.risk.fingerprinting_statements += 1;
            }
        }
        Ok(self.expr_node(Expr::Variable { name: bare, global }, []))
    }

    /// Variables in dialects that tokenize `@` on its own.
    fn at_sign_variable(&mut self) -> Result<NodeId, GrammarError> {
        self.pos += 1;
        let mut prefix = String::from("@");
        if self.eat_token(&Token::AtSign)? {
            prefix.push('@');
        }
        match self.peek()?.clone() {
            Token::Word(w) => {
                self.pos += 1;
                self.variable(format!("{prefix}{}", w.value))
            }
            _ => Err(self.unexpected("variable name")),
        }
    }

    /// After `name(`.
    fn function(&mut self, name: String) -> Result<NodeId, GrammarError> {
        self.record_function(&name);
        if self.eat_token(&Token::Mul)? {
            self.expect_token(&Token::RParen, "')'")?;
            return Ok(self.expr_node(Expr::Function { name, star: true }, []));
        }

        let mut args = Vec::new();
        if !self.eat_token(&Token::RParen)? {
            self.eat_keyword("DISTINCT")?;
            loop {
                args.push(self.expr()?);
                // SUBSTRING(s FROM a FOR b) separates arguments with keywords
                if self.eat_token(&Token::Comma)?
                    || self.eat_keyword("FROM")?
                    || self.eat_keyword("FOR")?
                {
                    continue;
                }
                // CAST(x AS type), CONVERT(x USING charset)
                if self.eat_keyword("AS")? || self.eat_keyword("USING")? {
                    self.type_name()?;
                }
                break;
            }
            self.expect_token(&Token::RParen, "')'")?;
        }
        Ok(self.expr_node(Expr::Function { name, star: false }, args))
    }

    /// Type names are skipped: `CHAR(10)`, `UNSIGNED INTEGER`, `DECIMAL(10, 2)`.
    fn type_name(&mut self) -> Result<(), GrammarError> {
        if !matches!(self.peek()?, Token::Word(_)) {
            return Err(self.unexpected("type name"));
        }
        while matches!(self.peek()?, Token::Word(_)) {
            self.pos += 1;
            if self.eat_token(&Token::LParen)? {
                loop {
                    match self.peek()? {
                        Token::RParen => break,
                        Token::EOF => return Err(self.unexpected("')'")),
                        _ => self.pos += 1,
                    }
                }
                self.pos += 1;
            }
        }
        Ok(())
    }

    fn exists(&mut self) -> Result<NodeId, GrammarError> {
        self.expect_token(&Token::LParen, "'('")?;
        if !self.at_keyword("SELECT")? {
            return Err(self.unexpected("SELECT"));
        }
        let query = self.nested(Self::query)?;
        self.expect_token(&Token::RParen, "')'")?;
        let subquery = self.expr_node(Expr::Subquery, [query]);
        Ok(self.expr_node(
            Expr::Function {
                name: "EXISTS".to_string(),
                star: false,
            },
            [subquery],
        ))
    }

    fn case(&mut self) -> Result<NodeId, GrammarError> {
        let mut children = Vec::new();
        if !self.at_keyword("WHEN")? {
            children.push(self.expr()?);
        }
        if !self.at_keyword("WHEN")? {
            return Err(self.unexpected("WHEN"));
        }
        while self.eat_keyword("WHEN")? {
            children.push(self.expr()?);
            self.expect_keyword("THEN")?;
            children.push(self.expr()?);
        }
        if self.eat_keyword("ELSE")? {
            children.push(self.expr()?);
        }
        self.expect_keyword("END")?;
        Ok(self.expr_node(
            Expr::Function {
                name: "CASE".to_string(),
                star: false,
            },
            children,
        ))
    }

    fn interval(&mut self) -> Result<NodeId, GrammarError> {
        let amount = self.expr_bp(bp::UNARY)?;
        if !matches!(self.peek()?, Token::Word(_)) {
            return Err(self.unexpected("interval unit"));
        }
        self.pos += 1;
        Ok(self.expr_node(
            Expr::Function {
                name: "INTERVAL".to_string(),
                star: false,
            },
            [amount],
        ))
    }

    /// The infix operator at the cursor and how many tokens it spans.
    fn infix_op(&self) -> Result<Option<(Infix, usize)>, GrammarError> {
        let op = match self.peek()? {
            Token::Eq | Token::DoubleEq => Infix::Compare(CompareOp::Eq),
            Token::Spaceship => Infix::Compare(CompareOp::NullSafeEq),
            Token::Neq => Infix::Compare(CompareOp::NotEq),
            Token::Lt => Infix::Compare(CompareOp::Lt),
            Token::LtEq => Infix::Compare(CompareOp::LtEq),
            Token::Gt => Infix::Compare(CompareOp::Gt),
            Token::GtEq => Infix::Compare(CompareOp::GtEq),
            Token::Plus => Infix::Arithmetic(ArithmeticOp::Add),
            Token::Minus => Infix::Arithmetic(ArithmeticOp::Sub),
            Token::Mul => Infix::Arithmetic(ArithmeticOp::Mul),
            Token::Div => Infix::Arithmetic(ArithmeticOp::Div),
            Token::Mod => Infix::Arithmetic(ArithmeticOp::Mod),
            Token::Pipe => Infix::Arithmetic(ArithmeticOp::BitOr),
            Token::Ampersand => Infix::Arithmetic(ArithmeticOp::BitAnd),
            Token::Caret => Infix::Arithmetic(ArithmeticOp::BitXor),
            Token::ShiftLeft => Infix::Arithmetic(ArithmeticOp::ShiftLeft),
            Token::ShiftRight => Infix::Arithmetic(ArithmeticOp::ShiftRight),
            // MySQL reads || and && as logical operators
            Token::StringConcat => Infix::Logic(LogicOp::Or),
            Token::Overlap => Infix::Logic(LogicOp::And),
            token => {
                let Some(word) = keyword(token) else {
                    return Ok(None);
                };
                match word.as_str() {
                    "OR" => Infix::Logic(LogicOp::Or),
                    "XOR" => Infix::Logic(LogicOp::Xor),
                    "AND" => Infix::Logic(LogicOp::And),
                    "DIV" => Infix::Arithmetic(ArithmeticOp::IntDiv),
                    "MOD" => Infix::Arithmetic(ArithmeticOp::Mod),
                    "IS" => Infix::Is,
                    "LIKE" => Infix::Compare(CompareOp::Like),
                    "REGEXP" | "RLIKE" => Infix::Compare(CompareOp::Regexp),
                    "IN" => Infix::In { negated: false },
                    "BETWEEN" => Infix::Between { negated: false },
                    "NOT" => {
                        let negated = match keyword(self.peek_nth(1)?).as_deref() {
                            Some("LIKE") => Infix::Compare(CompareOp::NotLike),
                            Some("REGEXP") | Some("RLIKE") => Infix::Compare(CompareOp::NotRegexp),
                            Some("IN") => Infix::In { negated: true },
                            Some("BETWEEN") => Infix::Between { negated: true },
                            _ => return Ok(None),
                        };
                        return Ok(Some((negated, 2)));
                    }
                    _ => return Ok(None),
                }
            }
        };
        Ok(Some((op, 1)))
    }

    fn infix(&mut self, lhs: NodeId, op: Infix, r_bp: u8) -> Result<NodeId, GrammarError> {
        match op {
            Infix::Logic(op) => {
                if matches!(op, LogicOp::Or | LogicOp::Xor) {
                    self.risk.or_statements += 1;
                }
                let rhs = self.expr_bp(r_bp)?;
                Ok(self.expr_node(Expr::Logic(op), [lhs, rhs]))
            }
            Infix::Compare(op) => {
                let rhs = self.expr_bp(r_bp)?;
                if matches!(op, CompareOp::Like | CompareOp::NotLike) && self.eat_keyword("ESCAPE")? {
                    if !matches!(self.peek()?, Token::SingleQuotedString(_)) {
                        return Err(self.unexpected("escape character"));
                    }
                    self.pos += 1;
                }
                Ok(self.expr_node(Expr::Comparison(op), [lhs, rhs]))
            }
            Infix::Arithmetic(op) => {
                let rhs = self.expr_bp(r_bp)?;
                Ok(self.expr_node(Expr::Arithmetic(op), [lhs, rhs]))
            }
            Infix::Is => {
                let negated = self.eat_keyword("NOT")?;
                let word = keyword(self.peek()?);
                match word.as_deref() {
                    Some("NULL") | Some("UNKNOWN") => {
                        self.pos += 1;
                        Ok(self.expr_node(Expr::IsNull { negated }, [lhs]))
                    }
                    Some(b @ ("TRUE" | "FALSE")) => {
                        let truth = b == "TRUE";
                        self.pos += 1;
                        let constant = self.expr_node(Expr::AlwaysSomething(truth), []);
                        let op = if negated {
                            CompareOp::NotEq
                        } else {
                            CompareOp::NullSafeEq
                        };
                        Ok(self.expr_node(Expr::Comparison(op), [lhs, constant]))
                    }
                    _ => Err(self.unexpected("NULL, TRUE or FALSE")),
                }
            }
            Infix::In { negated } => {
                self.expect_token(&Token::LParen, "'('")?;
                let entries = if self.at_keyword("SELECT")? {
                    let query = self.nested(Self::query)?;
                    vec![self.expr_node(Expr::Subquery, [query])]
                } else {
                    self.expr_list()?
                };
                self.expect_token(&Token::RParen, "')'")?;

                let tests_password = self
                    .ast
                    .expr(lhs)
                    .field_name()
                    .is_some_and(|field| self.names.is_password_field(field));
                if tests_password {
                    self.risk.password_in_list = true;
                }

                let list = self.expr_node(Expr::InValuesList { expression: lhs }, entries);
                Ok(if negated {
                    self.expr_node(Expr::Unary(UnaryOp::Not), [list])
                } else {
                    list
                })
            }
            Infix::Between { negated } => {
                let low = self.expr_bp(bp::BIT_OR.0)?;
                self.expect_keyword("AND")?;
                let high = self.expr_bp(bp::BIT_OR.0)?;
                Ok(self.expr_node(Expr::Between { negated }, [lhs, low, high]))
            }
        }
    }
}
