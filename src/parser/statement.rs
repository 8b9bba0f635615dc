use crate::core::DataType;
use std::fmt;

/// One parsed SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Box<SelectStatement>),
    Insert(InsertStatement),
    /// Same shape as INSERT; existing rows with the same key are replaced.
    Replace(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Create(CreateTableStatement),
    Alter(AlterTableStatement),
    Drop(DropTableStatement),
    Truncate(String),
    Show(ShowStatement),
    /// Session assignment; accepted and ignored.
    Set(String),
    /// Anything the grammar does not cover.
    Unknown(String),
}

impl Statement {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Select(_) => "SELECT",
            Self::Insert(_) => "INSERT",
            Self::Replace(_) => "REPLACE",
            Self::Update(_) => "UPDATE",
            Self::Delete(_) => "DELETE",
            Self::Create(_) => "CREATE",
            Self::Alter(_) => "ALTER",
            Self::Drop(_) => "DROP",
            Self::Truncate(_) => "TRUNCATE",
            Self::Show(_) => "SHOW",
            Self::Set(_) => "SET",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// A value expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Raw literal token as written (`'it\'s'`, `42`, `1.5`, `NULL`, `TRUE`, `X'0A'`).
    /// Decoded by the evaluator.
    Literal(String),
    Column {
        table: Option<String>,
        name: String,
    },
    /// `*` inside `COUNT(*)`.
    Wildcard,
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
        separator: Option<String>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    /// `@@name`, with any `session.`/`global.` scope stripped.
    Variable(String),
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        else_result: Option<Box<Expr>>,
    },
    /// A condition used as a value (`SELECT a > 1`, `IF(a = 1, ..)`).
    Condition(Box<Condition>),
}

impl Expr {
    /// True for the aggregate functions evaluated over a group of rows.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Function { name, .. } if is_aggregate_name(name))
    }

    /// Every aggregate call inside this expression, outermost first.
    pub fn collect_aggregates<'a>(&'a self, out: &mut Vec<&'a Self>) {
        match self {
            Self::Function { args, .. } => {
                if self.is_aggregate() {
                    out.push(self);
                } else {
                    args.iter().for_each(|a| a.collect_aggregates(out));
                }
            }
            Self::Binary { left, right, .. } => {
                left.collect_aggregates(out);
                right.collect_aggregates(out);
            }
            Self::Negate(inner) => inner.collect_aggregates(out),
            Self::Case {
                operand,
                branches,
                else_result,
            } => {
                if let Some(operand) = operand {
                    operand.collect_aggregates(out);
                }
                for (when, then) in branches {
                    when.collect_aggregates(out);
                    then.collect_aggregates(out);
                }
                if let Some(e) = else_result {
                    e.collect_aggregates(out);
                }
            }
            Self::Condition(condition) => condition.collect_aggregates(out),
            Self::Literal(_) | Self::Column { .. } | Self::Wildcard | Self::Variable(_) => {}
        }
    }
}

#[must_use]
pub fn is_aggregate_name(name: &str) -> bool {
    matches!(
        name.to_ascii_uppercase().as_str(),
        "COUNT" | "SUM" | "AVG" | "MIN" | "MAX" | "GROUP_CONCAT"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntDivide,
    Modulo,
}

impl BinaryOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::IntDivide => "DIV",
            Self::Modulo => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    /// `<=>`
    NullSafeEq,
}

impl CompareOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::LtEq => "<=",
            Self::GtEq => ">=",
            Self::NullSafeEq => "<=>",
        }
    }
}

/// One operand of a WHERE/HAVING/ON chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        left: Expr,
        op: CompareOp,
        right: Expr,
    },
    IsNull {
        expr: Expr,
        negated: bool,
    },
    Between {
        expr: Expr,
        low: Expr,
        high: Expr,
        negated: bool,
    },
    InList {
        expr: Expr,
        list: Vec<Expr>,
        negated: bool,
    },
    Like {
        expr: Expr,
        pattern: Expr,
        negated: bool,
    },
    /// A bare value tested for truthiness.
    Expr(Expr),
}

/// Flat operand/operator token list, resolved left to right.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionToken {
    Predicate(Predicate),
    Group(Condition),
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub tokens: Vec<ConditionToken>,
}

impl Condition {
    /// The only predicate of a condition made of exactly one predicate.
    #[must_use]
    pub fn as_single(&self) -> Option<&Predicate> {
        match self.tokens.as_slice() {
            [ConditionToken::Predicate(p)] => Some(p),
            _ => None,
        }
    }

    pub fn collect_aggregates<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        for token in &self.tokens {
            match token {
                ConditionToken::Predicate(p) => match p {
                    Predicate::Compare { left, right, .. } => {
                        left.collect_aggregates(out);
                        right.collect_aggregates(out);
                    }
                    Predicate::IsNull { expr, .. } | Predicate::Expr(expr) => expr.collect_aggregates(out),
                    Predicate::Between { expr, low, high, .. } => {
                        expr.collect_aggregates(out);
                        low.collect_aggregates(out);
                        high.collect_aggregates(out);
                    }
                    Predicate::InList { expr, list, .. } => {
                        expr.collect_aggregates(out);
                        list.iter().for_each(|e| e.collect_aggregates(out));
                    }
                    Predicate::Like { expr, pattern, .. } => {
                        expr.collect_aggregates(out);
                        pattern.collect_aggregates(out);
                    }
                },
                ConditionToken::Group(inner) => inner.collect_aggregates(out),
                ConditionToken::And | ConditionToken::Or | ConditionToken::Not => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub calc_found_rows: bool,
    pub columns: Vec<SelectItem>,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub filter: Option<Condition>,
    pub group_by: Vec<Expr>,
    pub having: Option<Condition>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    /// `alias.*`
    TableWildcard(String),
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// Name used to qualify this table's columns.
    #[must_use]
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    pub on: Option<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub count: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub ignore: bool,
    /// Empty when the statement lists no columns (positional values).
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: TableRef,
    pub assignments: Vec<(String, Expr)>,
    pub filter: Option<Condition>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: TableRef,
    pub filter: Option<Condition>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// Type name as written, lowercased (`bigint(20) unsigned`).
    pub type_name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub auto_increment: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    pub name: String,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDef>,
    /// From a `PRIMARY KEY (..)` table constraint.
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlterOperation {
    AddColumn(ColumnDef),
    DropColumn(String),
    ModifyColumn(ColumnDef),
    ChangeColumn { old_name: String, column: ColumnDef },
    AddIndex(IndexDef),
    AddPrimaryKey(Vec<String>),
    DropIndex(String),
    DropPrimaryKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterTableStatement {
    pub name: String,
    pub operations: Vec<AlterOperation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTableStatement {
    pub names: Vec<String>,
    pub if_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowStatement {
    Tables { like: Option<String> },
    Columns { table: String, full: bool },
    Index { table: String },
    CreateTable { table: String },
    Other(String),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(raw) => f.write_str(raw),
            Self::Column { table: Some(t), name } => write!(f, "{t}.{name}"),
            Self::Column { table: None, name } => f.write_str(name),
            Self::Wildcard => f.write_str("*"),
            Self::Function {
                name,
                args,
                distinct,
                separator,
            } => {
                write!(f, "{}(", name.to_ascii_uppercase())?;
                if *distinct {
                    f.write_str("DISTINCT ")?;
                }
                write_list(f, args)?;
                if let Some(sep) = separator {
                    write!(f, " SEPARATOR '{sep}'")?;
                }
                f.write_str(")")
            }
            Self::Binary { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Self::Negate(inner) => write!(f, "-{inner}"),
            Self::Variable(name) => write!(f, "@@{name}"),
            Self::Case {
                operand,
                branches,
                else_result,
            } => {
                f.write_str("CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {operand}")?;
                }
                for (when, then) in branches {
                    write!(f, " WHEN {when} THEN {then}")?;
                }
                if let Some(e) = else_result {
                    write!(f, " ELSE {e}")?;
                }
                f.write_str(" END")
            }
            Self::Condition(condition) => write!(f, "({condition})"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = |negated: &bool| if *negated { "NOT " } else { "" };
        match self {
            Self::Compare { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Self::IsNull { expr, negated } => write!(f, "{expr} IS {}NULL", not(negated)),
            Self::Between {
                expr,
                low,
                high,
                negated,
            } => write!(f, "{expr} {}BETWEEN {low} AND {high}", not(negated)),
            Self::InList { expr, list, negated } => {
                write!(f, "{expr} {}IN (", not(negated))?;
                write_list(f, list)?;
                f.write_str(")")
            }
            Self::Like {
                expr,
                pattern,
                negated,
            } => write!(f, "{expr} {}LIKE {pattern}", not(negated)),
            Self::Expr(expr) => write!(f, "{expr}"),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match token {
                ConditionToken::Predicate(p) => write!(f, "{p}")?,
                ConditionToken::Group(c) => write!(f, "({c})")?,
                ConditionToken::And => f.write_str("AND")?,
                ConditionToken::Or => f.write_str("OR")?,
                ConditionToken::Not => f.write_str("NOT")?,
            }
        }
        Ok(())
    }
}
