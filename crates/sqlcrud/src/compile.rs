//! Flattening a [`Fragment`] tree into SQL text plus ordered parameters.

use crate::fragment::{Fragment, Part};
use crate::ident::Ident;
use crate::value::Value;

/// A fragment compiled for a specific dialect.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledQuery {
    /// SQL text with dialect placeholders.
    pub sql: String,
    /// Bound values, index-aligned with the placeholders in `sql`.
    pub params: Vec<Value>,
}

/// Placeholder and identifier rendering rules of a SQL dialect.
pub trait Dialect: Send + Sync {
    /// Placeholder token for the zero-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Append `ident` to `out` as a quoted identifier.
    fn quote_ident(&self, ident: &Ident, out: &mut String) {
        ident.write_quoted('"', out);
    }
}

/// PostgreSQL: `$1, $2, ...` and `"ident"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn placeholder(&self, index: usize) -> String {
        format!("${}", index + 1)
    }
}

/// SQLite: `?` and `"ident"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}

/// MySQL: `?` and `` `ident` ``.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn quote_ident(&self, ident: &Ident, out: &mut String) {
        ident.write_quoted('`', out);
    }
}

/// Adapter turning a bare placeholder function into a [`Dialect`] with ANSI quoting.
struct PlaceholderFn<F>(F);

impl<F> Dialect for PlaceholderFn<F>
where
    F: Fn(usize) -> String + Send + Sync,
{
    fn placeholder(&self, index: usize) -> String {
        (self.0)(index)
    }
}

/// Compile `fragment` depth-first, left to right.
///
/// Identifiers are rendered inline through [`Dialect::quote_ident`]; every bound value is
/// appended to `params` and replaced by the placeholder for its final position.
pub fn compile(fragment: &Fragment, dialect: &dyn Dialect) -> CompiledQuery {
    let mut out = CompiledQuery::default();
    write_fragment(fragment, dialect, &mut out);
    out
}

/// Compile with a plain placeholder function (zero-based index → token).
///
/// Identifiers use ANSI double-quote quoting.
pub fn compile_with<F>(fragment: &Fragment, placeholder: F) -> CompiledQuery
where
    F: Fn(usize) -> String + Send + Sync,
{
    compile(fragment, &PlaceholderFn(placeholder))
}

fn write_fragment(fragment: &Fragment, dialect: &dyn Dialect, out: &mut CompiledQuery) {
    for part in fragment.parts() {
        match part {
            Part::Literal(s) => out.sql.push_str(s),
            Part::Bound(value) => {
                let token = dialect.placeholder(out.params.len());
                out.sql.push_str(&token);
                out.params.push(value.clone());
            }
            Part::Identifier(ident) => dialect.quote_ident(ident, &mut out.sql),
            Part::Nested(inner) => write_fragment(inner, dialect, out),
        }
    }
}
