//! Anki-style search expressions compiled to SQL.
//!
//! The filtered-deck rebuilder selects cards with the same search syntax the
//! desktop app uses. Expressions are parsed into a small tree and rendered as
//! a `WHERE` clause over `cards c JOIN notes n`, with every user-supplied
//! value bound as a parameter.
//!
//! Supported syntax:
//!
//! - whitespace-separated terms (implicit AND), `or`, parentheses, `-` negation
//! - `deck:NAME` (children included, `*` wildcard, `deck:filtered`)
//! - `tag:NAME` (`*` wildcard, `tag:none`)
//! - `is:new`, `is:learn`, `is:review`, `is:due`, `is:suspended`, `is:buried`
//! - `cid:1,2,3`, `nid:1,2,3`
//! - `prop:ivl>=10`, `prop:due<2`, `prop:lapses=3`, `prop:reps>5`, `prop:ease>2.5`
//! - bare text, matched against the note's fields
//!
//! # Example
//!
//! ```
//! use ankit_sched::SearchBuilder;
//!
//! let query = SearchBuilder::new()
//!     .deck("Spanish")
//!     .is_due()
//!     .not_suspended()
//!     .build();
//!
//! assert_eq!(query, "deck:Spanish is:due -is:suspended");
//! ```

use std::fmt::Write as _;

use rusqlite::types::Value;

use crate::card::DeckId;
use crate::decks::DeckManager;
use crate::error::{Error, Result};
use crate::storage::ids_sql;

/// A compiled search: a `WHERE` clause plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlSearch {
    /// Clause over `cards c JOIN notes n`, using `?` placeholders.
    pub clause: String,
    /// Values bound to the placeholders, in order.
    pub params: Vec<Value>,
}

/// What a search needs to know about the collection to resolve terms.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchContext<'a> {
    pub decks: &'a DeckManager,
    pub today: i64,
    pub cutoff: i64,
}

/// Parse and compile a search expression.
pub(crate) fn compile(query: &str, ctx: &SearchContext<'_>) -> Result<SqlSearch> {
    let node = parse(query)?;
    let mut out = SqlSearch { clause: String::new(), params: Vec::new() };
    node.write_sql(ctx, &mut out)?;
    Ok(out)
}

// ============================================================================
// Syntax tree
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Term(Term),
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Deck(String),
    Tag(String),
    State(StateKind),
    CardIds(Vec<i64>),
    NoteIds(Vec<i64>),
    Prop { prop: Prop, op: &'static str, value: f64 },
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StateKind {
    New,
    Learn,
    Review,
    Due,
    Suspended,
    Buried,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prop {
    Interval,
    Due,
    Lapses,
    Reps,
    Ease,
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Negate,
    Or,
    Word(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '-' => {
                chars.next();
                match chars.peek() {
                    Some(next) if !next.is_whitespace() && *next != ')' => {
                        tokens.push(Token::Negate)
                    }
                    _ => return Err(Error::Search("dangling '-'".into())),
                }
            }
            _ => {
                let mut word = String::new();
                let mut quoted = false;
                let mut had_quotes = false;
                while let Some(&c) = chars.peek() {
                    if !quoted && (c.is_whitespace() || c == '(' || c == ')') {
                        break;
                    }
                    chars.next();
                    match c {
                        '"' => {
                            quoted = !quoted;
                            had_quotes = true;
                        }
                        '\\' if quoted => match chars.next() {
                            Some(escaped) => word.push(escaped),
                            None => return Err(Error::Search("trailing escape".into())),
                        },
                        _ => word.push(c),
                    }
                }
                if quoted {
                    return Err(Error::Search("unterminated quote".into()));
                }
                if !had_quotes && word.eq_ignore_ascii_case("or") {
                    tokens.push(Token::Or);
                } else if !had_quotes && word.eq_ignore_ascii_case("and") {
                    // implicit
                } else {
                    tokens.push(Token::Word(word));
                }
            }
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

fn parse(input: &str) -> Result<Node> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.or_expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(Error::Search(format!("unexpected {:?}", parser.tokens[parser.pos])));
    }
    Ok(node)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn or_expr(&mut self) -> Result<Node> {
        let mut branches = vec![self.and_expr()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let branch = self.and_expr()?;
            if branch == Node::And(Vec::new()) || branches[0] == Node::And(Vec::new()) {
                return Err(Error::Search("'or' needs a term on both sides".into()));
            }
            branches.push(branch);
        }
        Ok(if branches.len() == 1 { branches.remove(0) } else { Node::Or(branches) })
    }

    fn and_expr(&mut self) -> Result<Node> {
        let mut items = Vec::new();
        while let Some(token) = self.peek() {
            if matches!(token, Token::Close | Token::Or) {
                break;
            }
            items.push(self.unary()?);
        }
        Ok(if items.len() == 1 { items.remove(0) } else { Node::And(items) })
    }

    fn unary(&mut self) -> Result<Node> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        match token {
            Some(Token::Negate) => Ok(Node::Not(Box::new(self.unary()?))),
            Some(Token::Open) => {
                let inner = self.or_expr()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(Error::Search("unbalanced parentheses".into()));
                }
                self.pos += 1;
                if inner == Node::And(Vec::new()) {
                    return Err(Error::Search("empty group".into()));
                }
                Ok(inner)
            }
            Some(Token::Word(word)) => Ok(Node::Term(parse_term(&word)?)),
            other => Err(Error::Search(format!("unexpected {other:?}"))),
        }
    }
}

fn parse_term(word: &str) -> Result<Term> {
    let Some((key, value)) = word.split_once(':') else {
        return Ok(Term::Text(word.to_string()));
    };
    match key.to_ascii_lowercase().as_str() {
        "deck" => Ok(Term::Deck(value.to_string())),
        "tag" => Ok(Term::Tag(value.to_string())),
        "is" => {
            let kind = match value.to_ascii_lowercase().as_str() {
                "new" => StateKind::New,
                "learn" => StateKind::Learn,
                "review" => StateKind::Review,
                "due" => StateKind::Due,
                "suspended" => StateKind::Suspended,
                "buried" => StateKind::Buried,
                other => return Err(Error::Search(format!("unknown state is:{other}"))),
            };
            Ok(Term::State(kind))
        }
        "cid" => Ok(Term::CardIds(parse_id_list(value)?)),
        "nid" => Ok(Term::NoteIds(parse_id_list(value)?)),
        "prop" => parse_prop(value),
        _ => Ok(Term::Text(word.to_string())),
    }
}

fn parse_id_list(value: &str) -> Result<Vec<i64>> {
    value
        .split(',')
        .map(|id| {
            id.trim()
                .parse()
                .map_err(|_| Error::Search(format!("invalid id '{id}'")))
        })
        .collect()
}

fn parse_prop(value: &str) -> Result<Term> {
    const OPS: [&str; 6] = [">=", "<=", "!=", "=", ">", "<"];
    let (name, op, rest) = OPS
        .iter()
        .find_map(|op| value.split_once(op).map(|(name, rest)| (name, *op, rest)))
        .ok_or_else(|| Error::Search(format!("missing comparison in prop:{value}")))?;
    let prop = match name.to_ascii_lowercase().as_str() {
        "ivl" => Prop::Interval,
        "due" => Prop::Due,
        "lapses" => Prop::Lapses,
        "reps" => Prop::Reps,
        "ease" => Prop::Ease,
        other => return Err(Error::Search(format!("unknown property '{other}'"))),
    };
    let value: f64 = rest
        .parse()
        .map_err(|_| Error::Search(format!("invalid number '{rest}'")))?;
    if prop != Prop::Ease && value.fract() != 0.0 {
        return Err(Error::Search(format!("prop:{name} needs a whole number")));
    }
    Ok(Term::Prop { prop, op, value })
}

// ============================================================================
// SQL rendering
// ============================================================================

impl Node {
    fn write_sql(&self, ctx: &SearchContext<'_>, out: &mut SqlSearch) -> Result<()> {
        match self {
            Node::And(items) | Node::Or(items) if items.is_empty() => out.clause.push_str("1"),
            Node::And(items) | Node::Or(items) => {
                let joiner = if matches!(self, Node::And(_)) { " AND " } else { " OR " };
                out.clause.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.clause.push_str(joiner);
                    }
                    item.write_sql(ctx, out)?;
                }
                out.clause.push(')');
            }
            Node::Not(inner) => {
                out.clause.push_str("NOT ");
                inner.write_sql(ctx, out)?;
            }
            Node::Term(term) => term.write_sql(ctx, out)?,
        }
        Ok(())
    }
}

impl Term {
    fn write_sql(&self, ctx: &SearchContext<'_>, out: &mut SqlSearch) -> Result<()> {
        let clause = &mut out.clause;
        match self {
            Term::Deck(name) if name.eq_ignore_ascii_case("filtered") => {
                clause.push_str("(c.odid != 0)");
            }
            Term::Deck(name) if name == "*" => clause.push_str("1"),
            Term::Deck(name) => {
                let ids = matching_deck_ids(ctx.decks, name)?;
                if ids.is_empty() {
                    clause.push_str("0");
                } else {
                    let list = ids_sql(&ids);
                    let _ = write!(clause, "(c.did IN {list} OR c.odid IN {list})");
                }
            }
            Term::Tag(tag) if tag.eq_ignore_ascii_case("none") => {
                clause.push_str("(n.tags = '')");
            }
            Term::Tag(tag) => {
                clause.push_str("(n.tags LIKE ? ESCAPE '\\')");
                out.params.push(Value::Text(format!("% {} %", like_pattern(tag))));
            }
            Term::State(kind) => {
                let today = ctx.today;
                let cutoff = ctx.cutoff;
                match kind {
                    StateKind::New => clause.push_str("(c.type = 0)"),
                    StateKind::Learn => clause.push_str("(c.queue IN (1,3))"),
                    StateKind::Review => clause.push_str("(c.type IN (2,3))"),
                    StateKind::Due => {
                        let _ = write!(
                            clause,
                            "((c.queue IN (2,3) AND c.due <= {today}) OR (c.queue = 1 AND c.due <= {cutoff}))"
                        );
                    }
                    StateKind::Suspended => clause.push_str("(c.queue = -1)"),
                    StateKind::Buried => clause.push_str("(c.queue IN (-2,-3))"),
                }
            }
            Term::CardIds(ids) => {
                let _ = write!(clause, "(c.id IN {})", ids_sql(ids));
            }
            Term::NoteIds(ids) => {
                let _ = write!(clause, "(c.nid IN {})", ids_sql(ids));
            }
            Term::Prop { prop, op, value } => {
                let n = *value as i64;
                match prop {
                    Prop::Interval => {
                        let _ = write!(clause, "(c.ivl {op} {n})");
                    }
                    Prop::Due => {
                        let _ = write!(
                            clause,
                            "(c.queue IN (2,3) AND c.due - {} {op} {n})",
                            ctx.today
                        );
                    }
                    Prop::Lapses => {
                        let _ = write!(clause, "(c.lapses {op} {n})");
                    }
                    Prop::Reps => {
                        let _ = write!(clause, "(c.reps {op} {n})");
                    }
                    Prop::Ease => {
                        let permille = (value * 1000.0).round() as i64;
                        let _ = write!(clause, "(c.factor {op} {permille})");
                    }
                }
            }
            Term::Text(text) => {
                clause.push_str("(n.flds LIKE ? ESCAPE '\\')");
                out.params.push(Value::Text(format!("%{}%", like_pattern(text))));
            }
        }
        Ok(())
    }
}

/// Decks whose name matches `pattern`, plus all their children.
fn matching_deck_ids(decks: &DeckManager, pattern: &str) -> Result<Vec<DeckId>> {
    let glob = regex_lite::Regex::new(&glob_regex(pattern))
        .map_err(|e| Error::Search(format!("invalid deck pattern '{pattern}': {e}")))?;
    let mut ids = Vec::new();
    for deck in decks.iter() {
        if glob.is_match(&deck.name) {
            ids.extend(decks.self_and_children_ids(deck.id));
        }
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

/// Case-insensitive anchored regex for a `*` glob.
fn glob_regex(pattern: &str) -> String {
    let pieces: Vec<String> = pattern.split('*').map(regex_lite::escape).collect();
    format!("(?i)^{}$", pieces.join(".*"))
}

/// Escape LIKE metacharacters and turn `*` into `%`.
fn like_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '*' => out.push('%'),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Builder
// ============================================================================

/// A builder for search expressions.
///
/// Produces the same text a user would type, so the result can be stored as
/// a filtered-deck term or passed to [`Collection::find_cards`](crate::Collection::find_cards).
#[derive(Debug, Clone, Default)]
#[must_use = "SearchBuilder does nothing until .build() is called"]
pub struct SearchBuilder {
    parts: Vec<String>,
}

impl SearchBuilder {
    /// Create an empty builder. An empty search matches every card.
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    // ========================================================================
    // Location
    // ========================================================================

    /// Cards in a deck or any of its children.
    ///
    /// ```
    /// use ankit_sched::SearchBuilder;
    ///
    /// let q = SearchBuilder::new().deck("My Deck").build();
    /// assert_eq!(q, "deck:\"My Deck\"");
    /// ```
    pub fn deck(mut self, name: &str) -> Self {
        self.parts.push(format!("deck:{}", quote_if_needed(name)));
        self
    }

    /// Exclude cards already sitting in a filtered deck.
    pub fn not_filtered(mut self) -> Self {
        self.parts.push("-deck:filtered".to_string());
        self
    }

    // ========================================================================
    // Card State
    // ========================================================================

    /// Cards due today.
    pub fn is_due(mut self) -> Self {
        self.parts.push("is:due".to_string());
        self
    }

    /// Cards never studied.
    pub fn is_new(mut self) -> Self {
        self.parts.push("is:new".to_string());
        self
    }

    /// Graduated or relearning cards.
    pub fn is_review(mut self) -> Self {
        self.parts.push("is:review".to_string());
        self
    }

    /// Cards in a learning queue.
    pub fn is_learn(mut self) -> Self {
        self.parts.push("is:learn".to_string());
        self
    }

    /// Exclude suspended cards.
    pub fn not_suspended(mut self) -> Self {
        self.parts.push("-is:suspended".to_string());
        self
    }

    /// Exclude buried cards.
    pub fn not_buried(mut self) -> Self {
        self.parts.push("-is:buried".to_string());
        self
    }

    /// Exclude cards in a learning queue.
    pub fn not_learn(mut self) -> Self {
        self.parts.push("-is:learn".to_string());
        self
    }

    // ========================================================================
    // Tags and properties
    // ========================================================================

    /// Notes carrying a tag.
    pub fn tag(mut self, tag: &str) -> Self {
        self.parts.push(format!("tag:{}", quote_if_needed(tag)));
        self
    }

    /// Cards with at least `n` lapses.
    pub fn lapses_gte(mut self, n: i64) -> Self {
        self.parts.push(format!("prop:lapses>={n}"));
        self
    }

    /// Cards with an interval above `days`.
    pub fn interval_gt(mut self, days: i64) -> Self {
        self.parts.push(format!("prop:ivl>{days}"));
        self
    }

    /// Notes whose fields contain `text`.
    pub fn contains(mut self, text: &str) -> Self {
        self.parts.push(format!("\"{}\"", escape_quotes(text)));
        self
    }

    // ========================================================================
    // Combinators
    // ========================================================================

    /// Add a user expression as one parenthesized unit.
    ///
    /// Blank expressions are skipped, so they keep matching everything.
    ///
    /// ```
    /// use ankit_sched::SearchBuilder;
    ///
    /// let q = SearchBuilder::new().group("tag:a or tag:b").not_suspended().build();
    /// assert_eq!(q, "(tag:a or tag:b) -is:suspended");
    /// ```
    pub fn group(mut self, expr: &str) -> Self {
        let expr = expr.trim();
        if !expr.is_empty() {
            self.parts.push(format!("({expr})"));
        }
        self
    }

    /// Combine the inner conditions with OR.
    pub fn or<F>(mut self, f: F) -> Self
    where
        F: FnOnce(SearchBuilder) -> SearchBuilder,
    {
        let inner = f(SearchBuilder::new());
        if !inner.parts.is_empty() {
            self.parts.push(format!("({})", inner.parts.join(" or ")));
        }
        self
    }

    /// Negate each inner condition.
    pub fn not<F>(mut self, f: F) -> Self
    where
        F: FnOnce(SearchBuilder) -> SearchBuilder,
    {
        let inner = f(SearchBuilder::new());
        for part in inner.parts {
            match part.strip_prefix('-') {
                Some(stripped) => self.parts.push(stripped.to_string()),
                None => self.parts.push(format!("-{part}")),
            }
        }
        self
    }

    /// Add raw search text.
    pub fn raw(mut self, query: &str) -> Self {
        self.parts.push(query.to_string());
        self
    }

    /// Build the final expression.
    pub fn build(self) -> String {
        self.parts.join(" ")
    }
}

impl std::fmt::Display for SearchBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.parts.join(" "))
    }
}

fn quote_if_needed(s: &str) -> String {
    if s.contains([' ', '"', '(', ')']) {
        format!("\"{}\"", escape_quotes(s))
    } else {
        s.to_string()
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::Deck;

    fn decks() -> DeckManager {
        let mut decks = DeckManager::default();
        decks.insert_deck(Deck::normal(1, "Default", 1));
        decks.insert_deck(Deck::normal(2, "Spanish", 1));
        decks.insert_deck(Deck::normal(3, "Spanish::Verbs", 1));
        decks.insert_deck(Deck::normal(4, "My Deck", 1));
        decks
    }

    fn sql(query: &str) -> Result<SqlSearch> {
        let decks = decks();
        let ctx = SearchContext { decks: &decks, today: 10, cutoff: 1_000 };
        compile(query, &ctx)
    }

    #[test]
    fn test_empty_matches_everything() {
        assert_eq!(sql("").unwrap().clause, "1");
        assert_eq!(sql("   ").unwrap().clause, "1");
    }

    #[test]
    fn test_deck_includes_children() {
        let search = sql("deck:spanish").unwrap();
        assert_eq!(search.clause, "(c.did IN (2,3) OR c.odid IN (2,3))");
    }

    #[test]
    fn test_deck_glob_and_quotes() {
        assert_eq!(sql("deck:Span*").unwrap().clause, "(c.did IN (2,3) OR c.odid IN (2,3))");
        assert_eq!(sql("deck:\"My Deck\"").unwrap().clause, "(c.did IN (4) OR c.odid IN (4))");
        assert_eq!(sql("deck:Missing").unwrap().clause, "0");
        assert_eq!(sql("-deck:filtered").unwrap().clause, "NOT (c.odid != 0)");
    }

    #[test]
    fn test_implicit_and_with_negation() {
        let search = sql("tag:verb -is:suspended").unwrap();
        assert_eq!(search.clause, "((n.tags LIKE ? ESCAPE '\\') AND NOT (c.queue = -1))");
        assert_eq!(search.params, vec![Value::Text("% verb %".into())]);
    }

    #[test]
    fn test_or_and_grouping() {
        let search = sql("(is:new or is:review) -is:buried").unwrap();
        assert_eq!(
            search.clause,
            "(((c.type = 0) OR (c.type IN (2,3))) AND NOT (c.queue IN (-2,-3)))"
        );
    }

    #[test]
    fn test_is_due_uses_today_and_cutoff() {
        let search = sql("is:due").unwrap();
        assert!(search.clause.contains("c.due <= 10"));
        assert!(search.clause.contains("c.due <= 1000"));
    }

    #[test]
    fn test_props_and_ids() {
        assert_eq!(sql("prop:ivl>=10").unwrap().clause, "(c.ivl >= 10)");
        assert_eq!(sql("prop:ease<2.5").unwrap().clause, "(c.factor < 2500)");
        assert_eq!(sql("prop:due=1").unwrap().clause, "(c.queue IN (2,3) AND c.due - 10 = 1)");
        assert_eq!(sql("cid:1,2").unwrap().clause, "(c.id IN (1,2))");
        assert_eq!(sql("nid:7").unwrap().clause, "(c.nid IN (7))");
    }

    #[test]
    fn test_text_escapes_like_metacharacters() {
        let search = sql("100%_*").unwrap();
        assert_eq!(search.params, vec![Value::Text("%100\\%\\_%%".into())]);
    }

    #[test]
    fn test_malformed_queries() {
        for query in ["(tag:a", "tag:a)", "()", "is:bogus", "prop:ivl", "prop:ivl>x", "cid:a", "-", "tag:a or", "\"open"] {
            assert!(matches!(sql(query), Err(Error::Search(_))), "{query} should fail");
        }
    }

    #[test]
    fn test_builder() {
        let q = SearchBuilder::new()
            .deck("Spanish")
            .or(|q| q.tag("verb").tag("noun"))
            .not(|q| q.is_learn().not_suspended())
            .build();
        assert_eq!(q, "deck:Spanish (tag:verb or tag:noun) -is:learn is:suspended");
        assert!(sql(&q).is_ok());
    }

    #[test]
    fn test_builder_group_skips_blank() {
        let q = SearchBuilder::new().group("  ").not_buried().build();
        assert_eq!(q, "-is:buried");
    }
}
