//! Lightweight reference checks for generated SQL.
//!
//! This is not a SQL parser. It catches the defects a generator most often
//! produces (unknown tables and qualifiers that are not bound in any FROM or
//! JOIN clause) well enough to drive a correction loop. Only the first issue
//! found is reported.

use crate::context::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

static STRING_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").expect("string literal regex should compile"));

static FROM_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)\bfrom\s+(.+?)(?:\bwhere\b|\bgroup\s+by\b|\border\s+by\b|\bhaving\b|\blimit\b|\b(?:inner|left|right|full|cross|outer|natural)\b|\bjoin\b|\bunion\b|\bon\b|\)|;|$)",
    )
    .expect("from clause regex should compile")
});

static JOIN_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bjoin\s+([a-z_][a-z0-9_.]*)(?:\s+(?:as\s+)?([a-z_][a-z0-9_]*))?")
        .expect("join clause regex should compile")
});

static DML_TARGET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|;|\))\s*(?:update|insert\s+into)\s+([a-z_][a-z0-9_.]*)(?:\s+(?:as\s+)?([a-z_][a-z0-9_]*))?")
        .expect("dml target regex should compile")
});

static CTE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\bwith(?:\s+recursive)?|,)\s+([a-z_][a-z0-9_]*)\s+as\s*\(")
        .expect("cte regex should compile")
});

static QUALIFIED_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([a-z_][a-z0-9_]*)\.(?:[a-z_][a-z0-9_]*|\*)")
        .expect("qualified reference regex should compile")
});

const STATEMENT_KEYWORDS: [&str; 5] = ["select", "with", "insert", "update", "delete"];

const NOT_AN_ALIAS: [&str; 20] = [
    "on", "using", "where", "group", "order", "having", "limit", "join", "inner", "left",
    "right", "full", "cross", "outer", "natural", "union", "set", "values", "select", "default",
];

/// How thoroughly a generated query is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Syntax plus table and alias references.
    #[default]
    Full,
    /// Statement shape, quotes and parentheses only.
    SyntaxOnly,
    /// Accept everything.
    None,
}

impl ValidationMode {
    /// Option values accepted in component configuration.
    pub const NAMES: [&'static str; 3] = ["full", "syntax_only", "none"];

    /// Parses a configuration value.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "full" => Some(Self::Full),
            "syntax_only" => Some(Self::SyntaxOnly),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// A defect found in a generated query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryIssue {
    /// Nothing was generated.
    #[error("Generated query is empty")]
    Empty,

    /// The text does not start like a statement.
    #[error("Query must start with one of SELECT, WITH, INSERT, UPDATE or DELETE")]
    NotAStatement,

    /// A string literal is never closed.
    #[error("Query contains an unterminated string literal")]
    UnterminatedString,

    /// Parentheses do not pair up.
    #[error("Query has unbalanced parentheses")]
    UnbalancedParentheses,

    /// A FROM or JOIN names a table missing from the schema.
    #[error("Table '{table}' does not exist in the database schema")]
    UnknownTable {
        /// The unknown table.
        table: String,
    },

    /// A column qualifier is not bound to any source.
    #[error("Query uses table alias '{alias}' which is not included in any FROM or JOIN clause")]
    UnboundAlias {
        /// The unbound qualifier.
        alias: String,
    },
}

/// Checks generated queries against an optional set of known tables.
#[derive(Debug, Clone, Default)]
pub struct QueryValidator {
    mode: ValidationMode,
    tables: Option<HashSet<String>>,
}

impl QueryValidator {
    /// Creates a validator that checks references without a schema.
    #[must_use]
    pub fn new(mode: ValidationMode) -> Self {
        Self { mode, tables: None }
    }

    /// Restricts table references to the given names (case-insensitive).
    #[must_use]
    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tables = Some(
            tables
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .collect(),
        );
        self
    }

    /// Restricts table references to those described by a context schema.
    ///
    /// Accepts a map keyed by table name, a map with a `tables` entry, or a
    /// list of names or `{name: ...}` maps. Other shapes leave the table set
    /// unrestricted.
    #[must_use]
    pub fn with_schema(self, schema: &Value) -> Self {
        match schema_tables(schema) {
            Some(tables) => self.with_tables(tables),
            None => self,
        }
    }

    /// Returns the configured mode.
    #[must_use]
    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Validates a query, returning the first issue found.
    pub fn validate(&self, query: &str) -> Result<(), QueryIssue> {
        if self.mode == ValidationMode::None {
            return Ok(());
        }

        let lowered = query.trim().to_lowercase();
        check_syntax(&lowered)?;

        if self.mode == ValidationMode::SyntaxOnly {
            return Ok(());
        }

        let stripped = STRING_LITERAL.replace_all(&lowered, "''");
        let refs = References::extract(&stripped);

        if let Some(known) = &self.tables {
            if let Some(table) = refs
                .tables
                .iter()
                .find(|t| !known.contains(base_name(t)) && !refs.ctes.contains(*t))
            {
                return Err(QueryIssue::UnknownTable {
                    table: table.clone(),
                });
            }
        }

        for caps in QUALIFIED_REF.captures_iter(&stripped) {
            let qualifier = &caps[1];
            if !refs.binds(qualifier) {
                return Err(QueryIssue::UnboundAlias {
                    alias: qualifier.to_string(),
                });
            }
        }

        Ok(())
    }
}

fn check_syntax(lowered: &str) -> Result<(), QueryIssue> {
    if lowered.is_empty() {
        return Err(QueryIssue::Empty);
    }

    let first_word = lowered
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default();
    if !STATEMENT_KEYWORDS.contains(&first_word) {
        return Err(QueryIssue::NotAStatement);
    }

    if lowered.matches('\'').count() % 2 != 0 {
        return Err(QueryIssue::UnterminatedString);
    }

    let stripped = STRING_LITERAL.replace_all(lowered, "''");
    let mut depth: i64 = 0;
    for c in stripped.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(QueryIssue::UnbalancedParentheses);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(QueryIssue::UnbalancedParentheses);
    }

    Ok(())
}

fn base_name(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}

/// Tables, aliases and CTE names a query binds, in order of appearance.
#[derive(Debug, Default)]
struct References {
    tables: Vec<String>,
    bound: HashSet<String>,
    ctes: HashSet<String>,
}

impl References {
    fn extract(query: &str) -> Self {
        let mut refs = Self::default();

        for caps in CTE_NAME.captures_iter(query) {
            let name = caps[1].to_string();
            refs.bound.insert(name.clone());
            refs.ctes.insert(name);
        }

        // Walk FROM and JOIN sources in textual order so the first unknown
        // table reported is the first one written.
        let mut sources: Vec<(usize, String, Option<String>)> = Vec::new();

        for caps in FROM_CLAUSE.captures_iter(query) {
            let (Some(keyword), Some(list)) = (caps.get(0), caps.get(1)) else { continue };
            if !introduces_sources(query, keyword.start()) {
                continue;
            }
            for item in list.as_str().split(',') {
                let mut words = item.split_whitespace();
                let Some(table) = words.next() else { continue };
                if table.starts_with('(') || table.starts_with("''") {
                    continue;
                }
                let alias = match words.next() {
                    Some("as") => words.next(),
                    other => other,
                };
                sources.push((list.start(), table.to_string(), alias.map(String::from)));
            }
        }

        for caps in DML_TARGET.captures_iter(query) {
            let start = caps.get(1).map_or(0, |m| m.start());
            sources.push((
                start,
                caps[1].to_string(),
                caps.get(2).map(|m| m.as_str().to_string()),
            ));
        }

        for caps in JOIN_CLAUSE.captures_iter(query) {
            let start = caps.get(0).map_or(0, |m| m.start());
            sources.push((
                start,
                caps[1].to_string(),
                caps.get(2).map(|m| m.as_str().to_string()),
            ));
        }

        sources.sort_by_key(|(start, _, _)| *start);

        for (_, table, alias) in sources {
            refs.bound.insert(table.clone());
            refs.bound.insert(base_name(&table).to_string());
            if let Some((schema, _)) = table.split_once('.') {
                refs.bound.insert(schema.to_string());
            }
            if let Some(alias) = alias.filter(|a| !NOT_AN_ALIAS.contains(&a.as_str())) {
                refs.bound.insert(alias);
            }
            refs.tables.push(table);
        }

        refs
    }

    fn binds(&self, qualifier: &str) -> bool {
        self.bound.contains(qualifier)
    }
}

/// Returns false for a FROM keyword at `pos` that does not start a source
/// list: inside a function call such as `extract(year from ts)`, or in
/// `is distinct from`.
fn introduces_sources(query: &str, pos: usize) -> bool {
    let before = &query[..pos];
    if before.split_whitespace().next_back() == Some("distinct") {
        return false;
    }

    let mut open = Vec::new();
    for (i, c) in before.char_indices() {
        match c {
            '(' => open.push(i),
            ')' => {
                open.pop();
            }
            _ => {}
        }
    }
    open.last().map_or(true, |&i| {
        let inner = query[i + 1..].trim_start();
        inner.starts_with("select") || inner.starts_with("with")
    })
}

fn schema_tables(schema: &Value) -> Option<Vec<String>> {
    match schema {
        Value::Map(map) => match map.get("tables") {
            Some(tables) => schema_tables(tables),
            None => Some(map.keys().cloned().collect()),
        },
        Value::List(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(name.clone()),
                    Value::Map(map) => map.get("name").and_then(Value::as_str).map(String::from),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}
