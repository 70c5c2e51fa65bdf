//! Migration source loading.
//!
//! Migration files hold the text produced by
//! [`MigrationSet::render`](relschema_core::codegen::MigrationSet::render):
//! three named lists of operation calls. This module tokenizes that text and
//! parses it back into operations, and reads or writes whole migration
//! directories.

use std::fs;
use std::path::{Path, PathBuf};

use relschema_core::codegen::MigrationSet;
use relschema_core::column::ColumnDefinition;
use relschema_core::literal::quote;
use relschema_core::operations::{Column, Operation};
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::error::{LoadError, MigrateError, Result};

/// File extension of migration files.
pub const MIGRATION_EXTENSION: &str = "migration";

/// A loaded migration: its identifier (the file stem) and its operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    /// Migration identifier, recorded in the migration log.
    pub id: String,
    /// The migration operations.
    pub set: MigrationSet,
}

impl Migration {
    /// Creates a migration from an identifier and its operations.
    #[must_use]
    pub fn new(id: impl Into<String>, set: MigrationSet) -> Self {
        Self { id: id.into(), set }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Number(Number),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Equals,
    Eof,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("'{name}'"),
            Self::Str(s) => quote(s),
            Self::Number(n) => n.to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::LBrace => "'{'".to_string(),
            Self::RBrace => "'}'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Colon => "':'".to_string(),
            Self::Equals => "'='".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

/// Tokenizer over migration source text.
struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.advance();
            }
            if self.peek() == Some('/') && self.peek_next() == Some('/') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn tokenize(mut self) -> std::result::Result<Vec<Token>, LoadError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> std::result::Result<Token, LoadError> {
        self.skip_whitespace_and_comments();
        let offset = self.pos;
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset,
            });
        };

        let kind = match c {
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            ',' => self.single(TokenKind::Comma),
            ':' => self.single(TokenKind::Colon),
            '=' => self.single(TokenKind::Equals),
            '\'' => self.scan_string(offset)?,
            '-' | '0'..='9' => self.scan_number(offset)?,
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => self.scan_identifier(),
            found => return Err(LoadError::UnexpectedChar { found, offset }),
        };
        Ok(Token { kind, offset })
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            self.advance();
        }
        TokenKind::Ident(self.input[start..self.pos].to_string())
    }

    fn scan_string(&mut self, offset: usize) -> std::result::Result<TokenKind, LoadError> {
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('\'') => return Ok(TokenKind::Str(value)),
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some(escaped) => value.push(escaped),
                    None => return Err(LoadError::UnterminatedString { offset }),
                },
                Some(c) => value.push(c),
                None => return Err(LoadError::UnterminatedString { offset }),
            }
        }
    }

    fn scan_number(&mut self, offset: usize) -> std::result::Result<TokenKind, LoadError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        {
            self.advance();
        }
        let text = &self.input[start..self.pos];
        text.parse::<Number>()
            .map(TokenKind::Number)
            .map_err(|_| LoadError::UnexpectedToken {
                expected: "number".to_string(),
                found: format!("'{text}'"),
                offset,
            })
    }
}

/// Recursive-descent parser over a token stream.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = std::result::Result<T, LoadError>;

impl Parser {
    fn new(input: &str) -> ParseResult<Self> {
        Ok(Self {
            tokens: Lexer::new(input).tokenize()?,
            pos: 0,
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> LoadError {
        let token = self.peek();
        LoadError::UnexpectedToken {
            expected: expected.to_string(),
            found: token.kind.describe(),
            offset: token.offset,
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    /// Consumes a comma unless the list is closing with `close`.
    fn list_separator(&mut self, close: &TokenKind) -> ParseResult<()> {
        if self.peek_kind() == close {
            return Ok(());
        }
        self.expect(&TokenKind::Comma).map(|_| ())
    }

    fn parse_migration(&mut self) -> ParseResult<MigrationSet> {
        let mut set = MigrationSet::default();
        while self.peek_kind() != &TokenKind::Eof {
            let section = match self.peek_kind() {
                TokenKind::Ident(name) if matches!(name.as_str(), "up" | "down" | "change") => {
                    name.clone()
                }
                _ => return Err(self.unexpected("'up', 'down' or 'change'")),
            };
            self.advance();
            self.expect(&TokenKind::Equals)?;
            let operations = self.parse_operation_list()?;
            match section.as_str() {
                "up" => set.up.extend(operations),
                "down" => set.down.extend(operations),
                _ => set.change.extend(operations),
            }
        }
        Ok(set)
    }

    fn parse_operation_list(&mut self) -> ParseResult<Vec<Operation>> {
        self.expect(&TokenKind::LBracket)?;
        let mut operations = Vec::new();
        while self.peek_kind() != &TokenKind::RBracket {
            operations.push(self.parse_operation()?);
            self.list_separator(&TokenKind::RBracket)?;
        }
        self.advance();
        Ok(operations)
    }

    fn parse_operation(&mut self) -> ParseResult<Operation> {
        let offset = self.peek().offset;
        let TokenKind::Ident(name) = self.peek_kind().clone() else {
            return Err(self.unexpected("operation"));
        };
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        while self.peek_kind() != &TokenKind::RParen {
            args.push(self.parse_value()?);
            self.list_separator(&TokenKind::RParen)?;
        }
        self.advance();
        build_operation(&name, offset, args)
    }

    fn parse_value(&mut self) -> ParseResult<Value> {
        let value = match self.peek_kind().clone() {
            TokenKind::Str(s) => Value::String(s),
            TokenKind::Number(n) => Value::Number(n),
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while self.peek_kind() != &TokenKind::RBracket {
                    items.push(self.parse_value()?);
                    self.list_separator(&TokenKind::RBracket)?;
                }
                Value::Array(items)
            }
            TokenKind::LBrace => {
                self.advance();
                return self.parse_object().map(Value::Object);
            }
            TokenKind::Ident(word) => match word.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => {
                    self.advance();
                    return self.parse_symbol(word);
                }
            },
            _ => return Err(self.unexpected("value")),
        };
        self.advance();
        Ok(value)
    }

    /// A bare symbol, optionally called with literal arguments
    /// (`ENUM('a', 'b')`). Symbols are kept as their source text.
    fn parse_symbol(&mut self, name: String) -> ParseResult<Value> {
        if self.peek_kind() != &TokenKind::LParen {
            return Ok(Value::String(name));
        }
        self.advance();
        let mut args = Vec::new();
        while self.peek_kind() != &TokenKind::RParen {
            let arg = match self.parse_value()? {
                Value::String(s) => quote(&s),
                other => other.to_string(),
            };
            args.push(arg);
            self.list_separator(&TokenKind::RParen)?;
        }
        self.advance();
        Ok(Value::String(format!("{name}({})", args.join(", "))))
    }

    fn parse_object(&mut self) -> ParseResult<Map<String, Value>> {
        let mut map = Map::new();
        while self.peek_kind() != &TokenKind::RBrace {
            let key = match self.peek_kind() {
                TokenKind::Ident(key) | TokenKind::Str(key) => key.clone(),
                _ => return Err(self.unexpected("object key")),
            };
            self.advance();
            self.expect(&TokenKind::Colon)?;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.list_separator(&TokenKind::RBrace)?;
        }
        self.advance();
        Ok(map)
    }
}

/// Positional call arguments of one operation.
struct Args {
    operation: String,
    offset: usize,
    values: std::vec::IntoIter<Value>,
}

impl Args {
    fn invalid(&self, message: impl Into<String>) -> LoadError {
        LoadError::InvalidArguments {
            operation: self.operation.clone(),
            offset: self.offset,
            message: message.into(),
        }
    }

    fn string(&mut self, what: &str) -> ParseResult<String> {
        match self.values.next() {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(self.invalid(format!("{what} must be a string, got {other}"))),
            None => Err(self.invalid(format!("missing {what}"))),
        }
    }

    fn object(&mut self, what: &str) -> ParseResult<Map<String, Value>> {
        match self.values.next() {
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(self.invalid(format!("{what} must be an object, got {other}"))),
            None => Err(self.invalid(format!("missing {what}"))),
        }
    }

    fn options(&mut self) -> ParseResult<Map<String, Value>> {
        match self.values.next() {
            None => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(self.invalid(format!("options must be an object, got {other}"))),
        }
    }

    fn definition(&self, name: &str, map: &Map<String, Value>) -> ParseResult<ColumnDefinition> {
        ColumnDefinition::from_map(map).map_err(|e| self.invalid(format!("column '{name}': {e}")))
    }

    fn finish(mut self, operation: Operation) -> ParseResult<Operation> {
        if let Some(extra) = self.values.next() {
            return Err(self.invalid(format!("unexpected extra argument {extra}")));
        }
        Ok(operation)
    }
}

fn build_operation(name: &str, offset: usize, values: Vec<Value>) -> ParseResult<Operation> {
    let mut args = Args {
        operation: name.to_string(),
        offset,
        values: values.into_iter(),
    };
    let operation = match name {
        "createTable" => {
            let table = args.string("table name")?;
            let columns = args
                .object("columns")?
                .iter()
                .map(|(column, value)| match value {
                    Value::Object(map) => Ok(Column::new(column, args.definition(column, map)?)),
                    other => Err(args.invalid(format!(
                        "column '{column}' must be an object, got {other}"
                    ))),
                })
                .collect::<ParseResult<Vec<_>>>()?;
            Operation::create_table(table, columns).with_options(args.options()?)
        }
        "dropTable" => {
            let table = args.string("table name")?;
            Operation::drop_table(table).with_options(args.options()?)
        }
        "renameTable" => {
            let old_name = args.string("old table name")?;
            let new_name = args.string("new table name")?;
            Operation::rename_table(old_name, new_name).with_options(args.options()?)
        }
        "addColumn" | "changeColumn" => {
            let table = args.string("table name")?;
            let column = args.string("column name")?;
            let map = args.object("column definition")?;
            let definition = args.definition(&column, &map)?;
            if name == "addColumn" {
                Operation::add_column(table, column, definition)
            } else {
                Operation::change_column(table, column, definition)
            }
        }
        "removeColumn" => {
            let table = args.string("table name")?;
            Operation::remove_column(table, args.string("column name")?)
        }
        "renameColumn" => {
            let table = args.string("table name")?;
            let old_name = args.string("old column name")?;
            Operation::rename_column(table, old_name, args.string("new column name")?)
        }
        _ => {
            return Err(LoadError::UnknownOperation {
                name: name.to_string(),
                offset,
            })
        }
    };
    args.finish(operation)
}

/// Parses migration source text into its operation lists.
///
/// # Errors
///
/// Returns a [`LoadError`] with the byte offset of the first problem.
pub fn parse_migration(source: &str) -> std::result::Result<MigrationSet, LoadError> {
    Parser::new(source)?.parse_migration()
}

/// Reads one migration file. The identifier is the file stem.
pub fn load_migration(path: &Path) -> Result<Migration> {
    let source = fs::read_to_string(path)?;
    let set = parse_migration(&source).map_err(|source| MigrateError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    let id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| MigrateError::InvalidState(format!("bad file name {}", path.display())))?
        .to_string();
    Ok(Migration::new(id, set))
}

/// Reads every `*.migration` file in `dir`, sorted by file name.
///
/// A missing directory holds no migrations.
pub fn load_migrations(dir: &Path) -> Result<Vec<Migration>> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "Migrations directory not found");
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.retain(|p| p.extension().is_some_and(|ext| ext == MIGRATION_EXTENSION));
    paths.sort();

    paths.iter().map(|p| load_migration(p)).collect()
}

/// Writes `set` to `<dir>/<id>.migration`, creating `dir` if needed.
pub fn write_migration(dir: &Path, id: &str, set: &MigrationSet) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{id}.{MIGRATION_EXTENSION}"));
    if path.exists() {
        return Err(MigrateError::MigrationExists(path));
    }
    fs::write(&path, set.render())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relschema_core::column::ColumnType;

    fn example_set() -> MigrationSet {
        MigrationSet {
            up: vec![
                Operation::create_table(
                    "Example",
                    vec![
                        Column::new("id", ColumnDefinition::new(ColumnType::Integer).primary_key()),
                        Column::new(
                            "role",
                            ColumnDefinition::new(ColumnType::Enum(vec![
                                "guest".into(),
                                "it's".into(),
                            ])),
                        ),
                    ],
                ),
                Operation::rename_column("Example", "a", "b"),
            ],
            down: vec![
                Operation::rename_column("Example", "b", "a"),
                Operation::drop_table("Example"),
            ],
            change: vec![Operation::change_column(
                "Example",
                "id",
                ColumnDefinition::new(ColumnType::Integer).auto_increment(),
            )],
        }
    }

    #[test]
    fn test_parse_rendered_source() {
        let set = example_set();
        assert_eq!(parse_migration(&set.render()).unwrap(), set);
    }

    #[test]
    fn test_nested_type_keys_parse_back_as_strings() {
        let mut geometry = ColumnDefinition::new(ColumnType::Json);
        geometry.default_value = Some(serde_json::json!({ "type": "Feature Collection" }));
        let mut code = ColumnDefinition::new(ColumnType::String);
        code.default_value = Some(serde_json::json!({ "type": "1" }));
        let mut options = Map::new();
        options.insert("type".into(), Value::String("view".into()));

        let set = MigrationSet {
            up: vec![
                Operation::create_table("Shape", vec![Column::new("geometry", geometry)])
                    .with_options(options),
                Operation::add_column("Shape", "code", code),
            ],
            down: vec![],
            change: vec![],
        };
        let parsed = parse_migration(&set.render()).unwrap();
        assert_eq!(parsed, set);

        let Operation::AddColumn { definition, .. } = &parsed.up[1] else {
            panic!("expected addColumn, got {:?}", parsed.up[1]);
        };
        assert_eq!(
            definition.default_value,
            Some(serde_json::json!({ "type": "1" }))
        );
    }

    #[test]
    fn test_parse_empty_sections() {
        let set = parse_migration("up = [\n]\ndown = []\nchange = [\n]\n").unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_parse_comments_and_options() {
        let source = "// generated\nup = [\n  dropTable('Old', { cascade: true }), // gone\n]\n";
        let set = parse_migration(source).unwrap();
        let Operation::DropTable { name, options } = &set.up[0] else {
            panic!("expected dropTable, got {:?}", set.up[0]);
        };
        assert_eq!(name, "Old");
        assert_eq!(options.get("cascade"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_parse_validate_numbers() {
        let source = "up = [addColumn('T', 'n', { type: INTEGER, validate: { min: -1, max: 2.5 } })]";
        let set = parse_migration(source).unwrap();
        let Operation::AddColumn { definition, .. } = &set.up[0] else {
            panic!("expected addColumn");
        };
        let validate = definition.validate.as_ref().unwrap();
        assert_eq!(validate.min.as_ref().map(ToString::to_string), Some("-1".into()));
        assert_eq!(validate.max.as_ref().map(ToString::to_string), Some("2.5".into()));
    }

    #[test]
    fn test_unterminated_string_reports_offset() {
        let err = parse_migration("up = [dropTable('Old)]").unwrap_err();
        assert_eq!(err, LoadError::UnterminatedString { offset: 16 });
    }

    #[test]
    fn test_unknown_operation() {
        let err = parse_migration("up = [truncate('T')]").unwrap_err();
        assert_eq!(
            err,
            LoadError::UnknownOperation {
                name: "truncate".into(),
                offset: 6
            }
        );
    }

    #[test]
    fn test_invalid_arguments() {
        let err = parse_migration("up = [removeColumn('T')]").unwrap_err();
        assert!(matches!(err, LoadError::InvalidArguments { ref operation, .. } if operation == "removeColumn"));

        let err = parse_migration("up = [addColumn('T', 'c', { type: BLOB })]").unwrap_err();
        assert!(err.to_string().contains("column 'c'"));
    }

    #[test]
    fn test_unexpected_token() {
        let err = parse_migration("sideways = []").unwrap_err();
        assert!(matches!(err, LoadError::UnexpectedToken { offset: 0, .. }));
        let err = parse_migration("up = [dropTable('A') dropTable('B')]").unwrap_err();
        assert!(matches!(err, LoadError::UnexpectedToken { offset: 21, .. }));
    }

    #[test]
    fn test_unexpected_char() {
        let err = parse_migration("up = [#]").unwrap_err();
        assert_eq!(err, LoadError::UnexpectedChar { found: '#', offset: 6 });
    }

    #[test]
    fn test_load_and_write_directory() {
        let dir = tempfile::tempdir().unwrap();
        let set = example_set();
        write_migration(dir.path(), "20240102000000_second", &MigrationSet::default()).unwrap();
        write_migration(dir.path(), "20240101000000_first", &set).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let migrations = load_migrations(dir.path()).unwrap();
        let ids: Vec<&str> = migrations.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["20240101000000_first", "20240102000000_second"]);
        assert_eq!(migrations[0].set, set);

        let err = write_migration(dir.path(), "20240101000000_first", &set).unwrap_err();
        assert!(matches!(err, MigrateError::MigrationExists(_)));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_migrations(&dir.path().join("absent")).unwrap().is_empty());
    }
}
