//! Table-body parser.
//!
//! Each declaration body is split into top-level clauses, and each clause is
//! classified by its leading keyword into a column definition or a
//! table-level constraint. Table-level constraints are applied after every
//! column of the table is known, so their position in the body does not
//! matter.
//!
//! Unsupported constructs are ignored, not fatal: a clause with no
//! recognized shape, or a constraint naming a column the table does not
//! have, is recorded as a [`SchemaWarning`] and the rest of the table is
//! still extracted.

use tracing::debug;

use crate::constraints::{Clause, ForeignKey};
use crate::lexer::{Spanned, Token, tokenize};
use crate::normalize::{
    Declaration, closing_paren, normalize_statements, split_declarations, split_top_level,
};
use crate::schema::{Column, Table};
use crate::types::SemanticType;
use crate::validation::SchemaWarning;

/// Words that end the type portion of a column definition.
const TYPE_STOP_WORDS: &[&str] = &[
    "not",
    "null",
    "unique",
    "primary",
    "check",
    "references",
    "default",
    "constraint",
    "generated",
    "collate",
    "auto_increment",
    "autoincrement",
    "identity",
    "on",
    "comment",
    "key",
];

const CLAUSE_PREVIEW_CHARS: usize = 60;

/// Tables and warnings extracted from one source text, before the schema
/// builder de-duplicates and orders them.
#[derive(Debug, Default)]
pub(crate) struct ParsedTables {
    pub tables: Vec<Table>,
    pub warnings: Vec<SchemaWarning>,
}

pub(crate) fn parse_tables(text: &str) -> ParsedTables {
    let normalized = normalize_statements(text);
    let mut parsed = ParsedTables::default();

    for declaration in split_declarations(&normalized) {
        let table = parse_declaration(&declaration, &mut parsed.warnings);
        debug!(
            event = "schema.table_parsed",
            table = %table.name,
            columns = table.columns.len()
        );
        parsed.tables.push(table);
    }

    resolve_implicit_targets(&mut parsed.tables);
    parsed
}

fn parse_declaration(declaration: &Declaration<'_>, warnings: &mut Vec<SchemaWarning>) -> Table {
    let table_name = declaration.name.as_str();
    if !declaration.terminated {
        warnings.push(SchemaWarning::UnterminatedBody {
            table: table_name.to_string(),
        });
    }

    let mut columns: Vec<Column> = Vec::new();
    let mut constraints = Vec::new();

    for raw in split_top_level(declaration.body) {
        let text = raw.trim();
        if text.is_empty() {
            continue;
        }
        for clause in parse_clause(text) {
            match clause {
                Clause::Column(column) => {
                    if columns
                        .iter()
                        .any(|existing| existing.name.eq_ignore_ascii_case(&column.name))
                    {
                        warnings.push(SchemaWarning::DuplicateColumn {
                            table: table_name.to_string(),
                            column: column.name,
                        });
                    } else {
                        columns.push(column);
                    }
                }
                Clause::Unsupported(clause) => {
                    debug!(
                        event = "schema.clause_skipped",
                        table = %table_name,
                        clause = %clause
                    );
                    warnings.push(SchemaWarning::UnsupportedClause {
                        table: table_name.to_string(),
                        clause: preview(&clause),
                    });
                }
                other => constraints.push(other),
            }
        }
    }

    let mut table = Table::new(table_name, columns);
    for constraint in constraints {
        apply_constraint(&mut table, constraint, warnings);
    }
    table
}

fn apply_constraint(table: &mut Table, clause: Clause, warnings: &mut Vec<SchemaWarning>) {
    let kind = clause.kind();
    match clause {
        Clause::PrimaryKey(columns) => {
            for name in columns {
                match table.column_mut(&name) {
                    Some(column) => column.primary_key = true,
                    None => warnings.push(unmatched(table, &name, kind)),
                }
            }
        }
        Clause::ForeignKey {
            columns,
            table: target,
            target_columns,
        } => {
            for (idx, name) in columns.iter().enumerate() {
                let target_column = target_columns.get(idx).cloned().unwrap_or_default();
                match table.column_mut(name) {
                    Some(column) => {
                        column.foreign_key = Some(ForeignKey::new(target.clone(), target_column));
                    }
                    None => warnings.push(unmatched(table, name, kind)),
                }
            }
        }
        Clause::Unique(columns) => match columns.as_slice() {
            [single] => match table.column_mut(single) {
                Some(column) => column.unique = true,
                None => warnings.push(unmatched(table, single, kind)),
            },
            _ => warnings.push(SchemaWarning::UnsupportedClause {
                table: table.name.clone(),
                clause: preview(&format!("UNIQUE ({})", columns.join(", "))),
            }),
        },
        Clause::CheckIn { column, values } => match table.column_mut(&column) {
            Some(target) => target.allowed_values = Some(values),
            None => warnings.push(unmatched(table, &column, kind)),
        },
        Clause::Column(_) | Clause::Unsupported(_) => {}
    }
}

fn unmatched(table: &Table, column: &str, constraint: &str) -> SchemaWarning {
    SchemaWarning::UnmatchedColumn {
        table: table.name.clone(),
        column: column.to_string(),
        constraint: constraint.to_string(),
    }
}

/// `REFERENCES t` without a column list points at the target's primary key.
fn resolve_implicit_targets(tables: &mut [Table]) {
    let mut resolved = Vec::new();
    for (table_idx, table) in tables.iter().enumerate() {
        for (column_idx, column) in table.columns.iter().enumerate() {
            let Some(fk) = &column.foreign_key else {
                continue;
            };
            if !fk.column.is_empty() {
                continue;
            }
            let target_column = tables
                .iter()
                .find(|candidate| candidate.name.eq_ignore_ascii_case(&fk.table))
                .and_then(|target| {
                    let mut keys = target.columns.iter().filter(|c| c.primary_key);
                    match (keys.next(), keys.next()) {
                        (Some(key), None) => Some(key.name.clone()),
                        _ => None,
                    }
                })
                .unwrap_or_else(|| "id".to_string());
            resolved.push((table_idx, column_idx, target_column));
        }
    }

    for (table_idx, column_idx, target_column) in resolved {
        if let Some(fk) = tables[table_idx].columns[column_idx].foreign_key.as_mut() {
            fk.column = target_column;
        }
    }
}

/// Classify one top-level clause. A column definition may also yield
/// constraints it carries for other columns.
fn parse_clause(text: &str) -> Vec<Clause> {
    let mut cursor = Cursor::new(text);

    if cursor.eat_keyword("constraint") {
        cursor.bump();
        let clause = table_constraint(&mut cursor)
            .unwrap_or_else(|| Clause::Unsupported(text.to_string()));
        return vec![clause];
    }
    if let Some(clause) = table_constraint(&mut cursor) {
        return vec![clause];
    }
    if is_index_clause(&cursor) {
        return vec![Clause::Unsupported(text.to_string())];
    }

    column_definition(&mut cursor).unwrap_or_else(|| vec![Clause::Unsupported(text.to_string())])
}

/// Table-level `PRIMARY KEY`, `FOREIGN KEY`, `UNIQUE` and `CHECK` clauses.
/// Returns `None` without consuming when the clause starts with none of them.
fn table_constraint(cursor: &mut Cursor<'_>) -> Option<Clause> {
    if cursor.eat_keywords(&["primary", "key"]) {
        return match cursor.group() {
            Some(body) => Some(Clause::PrimaryKey(name_list(body))),
            None => Some(cursor.unsupported()),
        };
    }
    if cursor.eat_keywords(&["foreign", "key"]) {
        let Some(body) = cursor.group() else {
            return Some(cursor.unsupported());
        };
        let columns = name_list(body);
        if !cursor.eat_keyword("references") {
            return Some(cursor.unsupported());
        }
        return match reference(cursor) {
            Some((table, target_columns)) => Some(Clause::ForeignKey {
                columns,
                table,
                target_columns,
            }),
            None => Some(cursor.unsupported()),
        };
    }
    if cursor.eat_keyword("unique") {
        if !cursor.eat_keyword("key") {
            cursor.eat_keyword("index");
        }
        if cursor.peek() != Some(&Token::LParen) {
            cursor.bump();
        }
        return match cursor.group() {
            Some(body) => Some(Clause::Unique(name_list(body))),
            None => Some(cursor.unsupported()),
        };
    }
    if cursor.eat_keyword("check") {
        return match cursor.group().and_then(check_in) {
            Some((column, values)) => Some(Clause::CheckIn { column, values }),
            None => Some(cursor.unsupported()),
        };
    }
    None
}

/// `INDEX name (cols)`, `KEY name (cols)` and other non-column clauses.
fn is_index_clause(cursor: &Cursor<'_>) -> bool {
    let Some(first) = cursor.peek() else {
        return false;
    };
    if ["fulltext", "spatial", "exclude"]
        .iter()
        .any(|kw| first.is_keyword(kw))
    {
        return true;
    }
    if !(first.is_keyword("index") || first.is_keyword("key")) {
        return false;
    }

    // The group of an index holds column names; a size group holds numbers.
    let group_at = match cursor.peek_at(1) {
        Some(Token::LParen) => 1,
        Some(token) if token.ident().is_some() => 2,
        _ => return false,
    };
    if cursor.peek_at(group_at) != Some(&Token::LParen) {
        return false;
    }
    matches!(cursor.peek_at(group_at + 1), Some(token) if token.ident().is_some())
}

fn column_definition(cursor: &mut Cursor<'_>) -> Option<Vec<Clause>> {
    let name = cursor.bump()?.ident()?.to_string();

    let mut raw_type = String::new();
    let mut size: Option<&str> = None;
    loop {
        match cursor.peek() {
            Some(Token::Word(word))
                if !TYPE_STOP_WORDS
                    .iter()
                    .any(|stop| word.eq_ignore_ascii_case(stop)) =>
            {
                if !raw_type.is_empty() {
                    raw_type.push(' ');
                }
                raw_type.push_str(word);
                cursor.bump();
            }
            Some(Token::LParen) if !raw_type.is_empty() && size.is_none() => {
                let body = cursor.group().unwrap_or_default();
                raw_type.push('(');
                raw_type.push_str(body.trim());
                raw_type.push(')');
                size = Some(body);
            }
            Some(Token::Quoted { quote: '[', text }) if text.is_empty() && !raw_type.is_empty() => {
                raw_type.push_str("[]");
                cursor.bump();
            }
            _ => break,
        }
    }
    if raw_type.is_empty() {
        return None;
    }

    let mut column = Column::new(name, raw_type);
    let mut extra = Vec::new();

    if let Some(body) = size {
        if column.semantic_type == SemanticType::Text {
            let first_word = column.raw_type.split(['(', ' ']).next().unwrap_or_default();
            if first_word.eq_ignore_ascii_case("enum") || first_word.eq_ignore_ascii_case("set") {
                column.allowed_values = Some(literal_list(body)).filter(|v| !v.is_empty());
            } else {
                column.max_length = split_top_level(body)
                    .first()
                    .and_then(|first| first.trim().parse::<u32>().ok());
            }
        }
    }

    while cursor.peek().is_some() {
        if cursor.eat_keywords(&["not", "null"]) {
            column.not_null = true;
        } else if cursor.eat_keywords(&["primary", "key"]) {
            column.primary_key = true;
        } else if cursor.eat_keyword("unique") {
            column.unique = true;
            cursor.eat_keyword("key");
        } else if cursor.eat_keyword("check") {
            let Some(body) = cursor.group() else {
                continue;
            };
            match check_in(body) {
                Some((target, values)) if target.eq_ignore_ascii_case(&column.name) => {
                    column.allowed_values = Some(values);
                }
                Some((target, values)) => extra.push(Clause::CheckIn {
                    column: target,
                    values,
                }),
                None => extra.push(Clause::Unsupported(format!("CHECK ({body})"))),
            }
        } else if cursor.eat_keyword("references") {
            if let Some((table, columns)) = reference(cursor) {
                let target_column = columns.into_iter().next().unwrap_or_default();
                column.foreign_key = Some(ForeignKey::new(table, target_column));
            }
        } else if cursor.peek() == Some(&Token::LParen) {
            cursor.group();
        } else {
            cursor.bump();
        }
    }

    let mut clauses = vec![Clause::Column(column)];
    clauses.extend(extra);
    Some(clauses)
}

/// `table[.table]* [(cols)]` after `REFERENCES`. The column list may be
/// empty; the caller resolves it against the target's primary key.
fn reference(cursor: &mut Cursor<'_>) -> Option<(String, Vec<String>)> {
    let mut table = cursor.bump()?.ident()?.to_string();
    while cursor.peek() == Some(&Token::Dot) {
        cursor.bump();
        table = cursor.bump()?.ident()?.to_string();
    }
    let columns = cursor.group().map(name_list).unwrap_or_default();
    Some((table, columns))
}

/// `<col> IN (<literals>)`, the only check shape the model represents.
fn check_in(body: &str) -> Option<(String, Vec<String>)> {
    let mut cursor = Cursor::new(body);
    let mut column = cursor.bump()?.ident()?.to_string();
    while cursor.peek() == Some(&Token::Dot) {
        cursor.bump();
        column = cursor.bump()?.ident()?.to_string();
    }
    if !cursor.eat_keyword("in") {
        return None;
    }
    let values = literal_list(cursor.group()?);
    if cursor.peek().is_some() || values.is_empty() {
        return None;
    }
    Some((column, values))
}

/// Column names from a parenthesized list; sort modifiers are ignored.
fn name_list(body: &str) -> Vec<String> {
    split_top_level(body)
        .into_iter()
        .filter_map(|item| {
            tokenize(item)
                .into_iter()
                .next()
                .and_then(|spanned| spanned.token.ident().map(str::to_string))
        })
        .collect()
}

/// Single- and double-quoted literals in order. Other items are skipped.
fn literal_list(body: &str) -> Vec<String> {
    split_top_level(body)
        .into_iter()
        .filter_map(|item| {
            tokenize(item)
                .into_iter()
                .next()
                .and_then(|spanned| spanned.token.literal().map(str::to_string))
        })
        .collect()
}

fn preview(clause: &str) -> String {
    match clause.char_indices().nth(CLAUSE_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &clause[..cut]),
        None => clause.to_string(),
    }
}

/// Token cursor that can hand balanced groups back as source slices.
struct Cursor<'a> {
    src: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            tokens: tokenize(src),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|spanned| &spanned.token)
    }

    fn bump(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos).map(|spanned| &spanned.token);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|token| token.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume a keyword sequence only when all of it matches.
    fn eat_keywords(&mut self, keywords: &[&str]) -> bool {
        let matched = keywords
            .iter()
            .enumerate()
            .all(|(ahead, keyword)| self.peek_at(ahead).is_some_and(|t| t.is_keyword(keyword)));
        if matched {
            self.pos += keywords.len();
        }
        matched
    }

    /// The whole clause, as skipped.
    fn unsupported(&self) -> Clause {
        Clause::Unsupported(self.src.to_string())
    }

    /// Content of the parenthesized group at the cursor, consuming it.
    /// An unclosed group runs to the end of the clause.
    fn group(&mut self) -> Option<&'a str> {
        let open = self.tokens.get(self.pos)?;
        if open.token != Token::LParen {
            return None;
        }
        let start = open.end;
        match closing_paren(&self.tokens[self.pos..]) {
            Some(close) => {
                let close = self.pos + close;
                self.pos = close + 1;
                Some(&self.src[start..self.tokens[close].start])
            }
            None => {
                self.pos = self.tokens.len();
                Some(&self.src[start..])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(body: &str) -> (Table, Vec<SchemaWarning>) {
        let declaration = Declaration {
            name: "t".to_string(),
            body,
            terminated: true,
        };
        let mut warnings = Vec::new();
        let table = parse_declaration(&declaration, &mut warnings);
        (table, warnings)
    }

    #[test]
    fn parses_column_flags() {
        let (table, warnings) = table(
            "id SERIAL PRIMARY KEY, email VARCHAR(255) NOT NULL UNIQUE, bio TEXT, score NUMERIC(10,2)",
        );
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(table.columns.len(), 4);

        let id = table.column("id").expect("id");
        assert!(id.primary_key);
        assert!(id.is_auto_generated());

        let email = table.column("email").expect("email");
        assert_eq!(email.raw_type, "VARCHAR(255)");
        assert_eq!(email.max_length, Some(255));
        assert!(email.not_null && email.unique);

        let bio = table.column("bio").expect("bio");
        assert!(!bio.not_null && !bio.unique && !bio.primary_key);

        let score = table.column("score").expect("score");
        assert_eq!(score.semantic_type, SemanticType::Decimal);
        assert_eq!(score.max_length, None);
    }

    #[test]
    fn multi_word_types_are_kept_whole() {
        let (table, _) = table(
            "created_at timestamp with time zone DEFAULT now() NOT NULL, name character varying(40), tags text[]",
        );
        let created = table.column("created_at").expect("created_at");
        assert_eq!(created.raw_type, "timestamp with time zone");
        assert_eq!(created.semantic_type, SemanticType::Timestamp);
        assert!(created.not_null);
        assert_eq!(table.column("name").expect("name").raw_type, "character varying(40)");
        assert_eq!(table.column("name").expect("name").max_length, Some(40));
        assert_eq!(table.column("tags").expect("tags").raw_type, "text[]");
    }

    #[test]
    fn quoted_defaults_do_not_set_flags() {
        let (table, _) = table("note TEXT DEFAULT 'NOT NULL', flag TEXT DEFAULT 'unique'");
        assert!(!table.column("note").expect("note").not_null);
        assert!(!table.column("flag").expect("flag").unique);
    }

    #[test]
    fn inline_check_sets_allowed_values_in_order() {
        let (table, _) = table(
            "status VARCHAR(20) NOT NULL CHECK (status IN ('pending', \"shipped\", 'it''s done'))",
        );
        let status = table.column("status").expect("status");
        assert_eq!(
            status.allowed_values.as_deref(),
            Some(&["pending".to_string(), "shipped".to_string(), "it's done".to_string()][..])
        );
    }

    #[test]
    fn inline_references_attach_foreign_key() {
        let (table, _) = table("user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE");
        let fk = table
            .column("user_id")
            .and_then(|c| c.foreign_key.as_ref())
            .expect("fk");
        assert_eq!(fk, &ForeignKey::new("users", "id"));
    }

    #[test]
    fn table_level_constraints_apply_regardless_of_position() {
        let (table, warnings) = table(
            "CONSTRAINT pk PRIMARY KEY (Order_Id), \
             FOREIGN KEY (customer_id) REFERENCES public.customers (id), \
             order_id INT, customer_id INT, \
             CONSTRAINT chk CHECK (kind IN ('a', 'b')), kind TEXT, \
             UNIQUE (customer_id)",
        );
        assert!(warnings.is_empty(), "{warnings:?}");
        assert!(table.column("order_id").expect("order_id").primary_key);
        let customer = table.column("customer_id").expect("customer_id");
        assert_eq!(customer.foreign_key, Some(ForeignKey::new("customers", "id")));
        assert!(customer.unique);
        assert_eq!(
            table.column("kind").expect("kind").allowed_values,
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn composite_foreign_keys_pair_columns() {
        let (table, _) = table(
            "a INT, b INT, FOREIGN KEY (a, b) REFERENCES parent (x, y)",
        );
        assert_eq!(
            table.column("a").and_then(|c| c.foreign_key.clone()),
            Some(ForeignKey::new("parent", "x"))
        );
        assert_eq!(
            table.column("b").and_then(|c| c.foreign_key.clone()),
            Some(ForeignKey::new("parent", "y"))
        );
    }

    #[test]
    fn unmatched_constraint_columns_are_reported() {
        let (table, warnings) = table("id INT, PRIMARY KEY (missing)");
        assert!(!table.column("id").expect("id").primary_key);
        assert_eq!(
            warnings,
            vec![SchemaWarning::UnmatchedColumn {
                table: "t".to_string(),
                column: "missing".to_string(),
                constraint: "primary key".to_string(),
            }]
        );
    }

    #[test]
    fn unsupported_clauses_are_skipped() {
        let (table, warnings) = table(
            "id INT, INDEX idx_id (id), KEY idx_name (name), name TEXT, \
             CHECK (id > 0), EXCLUDE USING gist (id WITH =), UNIQUE (id, name)",
        );
        let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(
            warnings
                .iter()
                .filter(|w| w.code() == "unsupported_clause")
                .count(),
            5
        );
    }

    #[test]
    fn column_called_key_is_not_an_index() {
        let (table, warnings) = table("key VARCHAR(50) NOT NULL, value TEXT");
        assert!(warnings.is_empty(), "{warnings:?}");
        let key = table.column("key").expect("key");
        assert_eq!(key.raw_type, "VARCHAR(50)");
        assert!(key.not_null);
    }

    #[test]
    fn duplicate_columns_keep_the_first() {
        let (table, warnings) = table("a INT, A TEXT");
        assert_eq!(table.columns.len(), 1);
        assert_eq!(table.columns[0].raw_type, "INT");
        assert_eq!(warnings[0].code(), "duplicate_column");
    }

    #[test]
    fn enum_types_become_allowed_values() {
        let (table, _) = table("mood ENUM('happy','sad') NOT NULL");
        let mood = table.column("mood").expect("mood");
        assert_eq!(
            mood.allowed_values,
            Some(vec!["happy".to_string(), "sad".to_string()])
        );
        assert_eq!(mood.max_length, None);
    }

    #[test]
    fn implicit_reference_targets_primary_key() {
        let parsed = parse_tables(
            "CREATE TABLE users (uid INT PRIMARY KEY); \
             CREATE TABLE posts (author INT REFERENCES users, editor INT REFERENCES ghosts);",
        );
        let posts = &parsed.tables[1];
        assert_eq!(
            posts.column("author").and_then(|c| c.foreign_key.clone()),
            Some(ForeignKey::new("users", "uid"))
        );
        assert_eq!(
            posts.column("editor").and_then(|c| c.foreign_key.clone()),
            Some(ForeignKey::new("ghosts", "id"))
        );
    }

    #[test]
    fn unterminated_body_keeps_leading_columns() {
        let parsed = parse_tables("CREATE TABLE t (id INT NOT NULL, name VARCHAR(30), price NUMERIC(10");
        let table = &parsed.tables[0];
        assert!(table.column("id").expect("id").not_null);
        assert!(table.column("name").is_some());
        assert!(
            parsed
                .warnings
                .iter()
                .any(|w| matches!(w, SchemaWarning::UnterminatedBody { .. }))
        );
    }

    #[test]
    fn long_clauses_are_previewed() {
        let long = "x".repeat(100);
        assert_eq!(preview(&long).chars().count(), CLAUSE_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
