//! Statement graph - in-memory triple set for one entity
//!
//! A `StatementGraph` holds the (subject, predicate, object) statements that
//! describe a single repository resource. It is the encode/decode intermediate
//! for the repository's wire format and the substrate the mapper diffs
//! against. It performs no I/O.

use crate::{Error, Result};
use std::fmt;

/// Subject of a statement.
///
/// `This` is the placeholder for "this resource", used for statements about
/// an entity that has not yet been assigned a repository address (and for all
/// outgoing writes, where the repository resolves the placeholder itself).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    This,
    Uri(String),
}

impl Subject {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Subject::This)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::This => write!(f, "<>"),
            Subject::Uri(u) => write!(f, "<{}>", u),
        }
    }
}

/// Object of a statement: either a reference to another resource or a
/// literal value carried as its lexical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Object {
    Uri(String),
    Literal(String),
}

impl Object {
    /// Lexical form of the object, without any quoting.
    pub fn as_str(&self) -> &str {
        match self {
            Object::Uri(u) => u,
            Object::Literal(l) => l,
        }
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, Object::Uri(_))
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Uri(u) => write!(f, "<{}>", u),
            Object::Literal(l) => write!(f, "\"{}\"", escape_literal(l)),
        }
    }
}

/// One (subject, predicate, object) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Statement {
    pub subject: Subject,
    pub predicate: String,
    pub object: Object,
}

impl Statement {
    pub fn new(subject: Subject, predicate: impl Into<String>, object: Object) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }

    /// Statement about "this resource" with a literal object.
    pub fn literal(predicate: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Subject::This, predicate, Object::Literal(value.into()))
    }

    /// Statement about "this resource" with a resource-reference object.
    pub fn reference(predicate: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::new(Subject::This, predicate, Object::Uri(uri.into()))
    }
}

/// Unordered, mutable set of statements for one entity instance.
///
/// Insertion order is preserved for deterministic serialization, but no
/// ordering is part of the contract. The set may transiently hold stale
/// duplicates for a predicate until a remove/replace pass runs; `value_of`
/// always reports the first match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementGraph {
    statements: Vec<Statement>,
}

impl StatementGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Add a statement. Exact duplicates are dropped.
    pub fn add(&mut self, statement: Statement) {
        if !self.statements.contains(&statement) {
            self.statements.push(statement);
        }
    }

    /// Remove every statement matching the given pattern. `None` matches
    /// anything in that position.
    pub fn remove(
        &mut self,
        subject: Option<&Subject>,
        predicate: Option<&str>,
        object: Option<&Object>,
    ) {
        self.statements.retain(|st| {
            !(subject.map(|s| &st.subject == s).unwrap_or(true)
                && predicate.map(|p| st.predicate == p).unwrap_or(true)
                && object.map(|o| &st.object == o).unwrap_or(true))
        });
    }

    /// First object asserted for the given predicate, regardless of subject.
    pub fn value_of(&self, predicate: &str) -> Option<&Object> {
        self.statements
            .iter()
            .find(|st| st.predicate == predicate)
            .map(|st| &st.object)
    }

    /// Subgraph of every statement asserted for the given predicate.
    pub fn statements_with(&self, predicate: &str) -> StatementGraph {
        let statements = self
            .statements
            .iter()
            .filter(|st| st.predicate == predicate)
            .cloned()
            .collect();
        StatementGraph { statements }
    }

    /// Copy the other graph's statements into this one, re-anchored on the
    /// placeholder subject. Statements already present are left alone.
    pub fn merge_from(&mut self, other: &StatementGraph) {
        for st in &other.statements {
            self.add(Statement::new(
                Subject::This,
                st.predicate.clone(),
                st.object.clone(),
            ));
        }
    }

    pub fn contains(&self, statement: &Statement) -> bool {
        self.statements.contains(statement)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter()
    }

    /// Encode into the line-oriented wire form understood by the repository.
    ///
    /// One statement per line: `<subject> <predicate> <object-or-"literal"> .`
    /// The placeholder subject serializes as `<>`.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for st in &self.statements {
            out.push_str(&format!("{} <{}> {} .\n", st.subject, st.predicate, st.object));
        }
        out
    }

    /// Decode the repository's line-oriented wire form.
    ///
    /// Blank lines and `#` comment lines are skipped. Anything else that does
    /// not parse as a triple is a wire-format error.
    pub fn decode(body: &str) -> Result<StatementGraph> {
        let mut graph = StatementGraph::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            graph.add(parse_line(line)?);
        }
        Ok(graph)
    }
}

fn parse_line(line: &str) -> Result<Statement> {
    let line = line
        .strip_suffix('.')
        .map(str::trim_end)
        .unwrap_or(line)
        .trim_end();

    let (subject, rest) = parse_uri_token(line)
        .ok_or_else(|| Error::WireFormat(format!("bad subject in: {}", line)))?;
    let subject = if subject.is_empty() {
        Subject::This
    } else {
        Subject::Uri(subject)
    };

    let (predicate, rest) = parse_uri_token(rest)
        .ok_or_else(|| Error::WireFormat(format!("bad predicate in: {}", line)))?;

    let rest = rest.trim_start();
    let object = if rest.starts_with('<') {
        let (uri, _) = parse_uri_token(rest)
            .ok_or_else(|| Error::WireFormat(format!("bad object in: {}", line)))?;
        Object::Uri(uri)
    } else if let Some(stripped) = rest.strip_prefix('"') {
        // take up to the closing unescaped quote; trailing language/datatype
        // tags are ignored
        let mut value = String::new();
        let mut chars = stripped.chars();
        let mut closed = false;
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    match chars.next() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('"') => value.push('"'),
                        Some('\\') => value.push('\\'),
                        Some(other) => value.push(other),
                        None => break,
                    };
                }
                '"' => {
                    closed = true;
                    break;
                }
                _ => value.push(c),
            }
        }
        if !closed {
            return Err(Error::WireFormat(format!("unterminated literal in: {}", line)));
        }
        Object::Literal(value)
    } else {
        return Err(Error::WireFormat(format!("bad object in: {}", line)));
    };

    Ok(Statement::new(subject, predicate, object))
}

/// Parse a leading `<...>` token, returning its contents and the remainder.
fn parse_uri_token(input: &str) -> Option<(String, &str)> {
    let input = input.trim_start();
    let stripped = input.strip_prefix('<')?;
    let end = stripped.find('>')?;
    Some((stripped[..end].to_string(), &stripped[end + 1..]))
}

fn escape_literal(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
}
