//! Composable, immutable SQL fragments.
//!
//! A [`Fragment`] is a tree: literal SQL text interleaved with bound values, identifiers
//! and other fragments. Nothing is rendered until the tree is compiled (see
//! [`compile`](crate::compile())), so fragments can be built independently and spliced
//! together without tracking placeholder indices.
//!
//! # Example
//!
//! ```ignore
//! use sqlcrud::{ident, join, sql, Fragment};
//!
//! let filter = sql!("status = {} AND age > {}", "active", 18);
//! let cols = join([ident("id"), ident("name")], Fragment::raw(", "));
//! let q = sql!("SELECT {} FROM {} WHERE {}", cols, ident("users"), filter);
//!
//! assert_eq!(
//!     q.to_sql(),
//!     r#"SELECT "id", "name" FROM "users" WHERE status = $1 AND age > $2"#
//! );
//! ```

use crate::compile::{CompiledQuery, Dialect, Postgres};
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// One element of a [`Fragment`].
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// SQL text emitted verbatim.
    Literal(String),
    /// A value sent to the driver as a bound parameter.
    Bound(Value),
    /// An identifier rendered inline, quoted by the dialect.
    Identifier(Ident),
    /// Another fragment spliced in place.
    Nested(Fragment),
}

/// An immutable SQL fragment.
///
/// Cloning is cheap: parts are shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    parts: Arc<[Part]>,
}

impl Default for Fragment {
    fn default() -> Self {
        Self::empty()
    }
}

/// Number of `{}` holes in a template, scanning left to right without overlap.
///
/// `{{}}` is an escaped literal `{}` and is not a hole. Used by [`sql!`](crate::sql!) to
/// check the argument count at compile time.
pub const fn count_holes(template: &str) -> usize {
    let bytes = template.as_bytes();
    let mut i = 0;
    let mut n = 0;
    while i + 1 < bytes.len() {
        if is_escaped_braces(bytes, i) {
            i += 4;
        } else if bytes[i] == b'{' && bytes[i + 1] == b'}' {
            n += 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    n
}

const fn is_escaped_braces(bytes: &[u8], i: usize) -> bool {
    i + 3 < bytes.len()
        && bytes[i] == b'{'
        && bytes[i + 1] == b'{'
        && bytes[i + 2] == b'}'
        && bytes[i + 3] == b'}'
}

impl Fragment {
    fn from_parts(parts: Vec<Part>) -> Self {
        Self {
            parts: parts.into(),
        }
    }

    /// A fragment with no text and no parameters.
    pub fn empty() -> Self {
        Self::from_parts(Vec::new())
    }

    /// Literal SQL text, emitted verbatim.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::from_parts(vec![Part::Literal(sql.into())])
    }

    /// A single bound value.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::from_parts(vec![Part::Bound(value.into())])
    }

    /// Build a fragment from a template whose `{}` holes are filled by `args` in order.
    ///
    /// Returns a validation error when the hole count differs from `args.len()`.
    /// Prefer [`sql!`](crate::sql!), which performs this check at compile time.
    pub fn from_template(template: &str, args: Vec<Part>) -> OrmResult<Self> {
        let holes = count_holes(template);
        if holes != args.len() {
            return Err(OrmError::validation(format!(
                "template has {holes} placeholders but {} arguments were given",
                args.len()
            )));
        }
        Ok(Self::interleave(template, args))
    }

    #[doc(hidden)]
    pub fn __from_checked_template(template: &'static str, args: Vec<Part>) -> Self {
        Self::interleave(template, args)
    }

    fn interleave(template: &str, args: Vec<Part>) -> Self {
        let bytes = template.as_bytes();
        let mut parts = Vec::with_capacity(args.len() * 2 + 1);
        let mut args = args.into_iter();
        let mut literal = String::new();
        let (mut start, mut i) = (0, 0);
        while i + 1 < bytes.len() {
            if is_escaped_braces(bytes, i) {
                literal.push_str(&template[start..i]);
                literal.push_str("{}");
                i += 4;
                start = i;
            } else if bytes[i] == b'{' && bytes[i + 1] == b'}' {
                literal.push_str(&template[start..i]);
                parts.push(Part::Literal(std::mem::take(&mut literal)));
                parts.extend(args.next());
                i += 2;
                start = i;
            } else {
                i += 1;
            }
        }
        literal.push_str(&template[start..]);
        parts.push(Part::Literal(literal));
        parts.extend(args);
        Self::from_parts(parts)
    }

    /// The parts of this fragment, in order.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// True when compiling this fragment would produce no text and no parameters.
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|part| match part {
            Part::Literal(s) => s.is_empty(),
            Part::Nested(inner) => inner.is_empty(),
            Part::Bound(_) | Part::Identifier(_) => false,
        })
    }

    /// Number of bound values in the whole tree.
    pub fn param_count(&self) -> usize {
        self.parts
            .iter()
            .map(|part| match part {
                Part::Bound(_) => 1,
                Part::Nested(inner) => inner.param_count(),
                Part::Literal(_) | Part::Identifier(_) => 0,
            })
            .sum()
    }

    /// `(self) AND (other)`. An empty side yields the other one unchanged.
    pub fn and(self, other: Fragment) -> Fragment {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }
        Self::interleave("({}) AND ({})", vec![Part::Nested(self), Part::Nested(other)])
    }

    /// Compile against a dialect.
    pub fn compile(&self, dialect: &dyn Dialect) -> CompiledQuery {
        crate::compile::compile(self, dialect)
    }

    /// Render SQL with Postgres `$1, $2, ...` placeholders.
    pub fn to_sql(&self) -> String {
        self.compile(&Postgres).sql
    }
}

impl From<Ident> for Fragment {
    fn from(ident: Ident) -> Self {
        Self::from_parts(vec![Part::Identifier(ident)])
    }
}

/// A fragment holding a single identifier, rendered quoted (never bound).
pub fn ident(name: impl Into<String>) -> Fragment {
    Fragment::from(Ident::new(name))
}

/// Concatenate `fragments`, placing `separator` between each.
///
/// Each element is kept as a nested fragment. An empty input yields an empty fragment.
pub fn join<I>(fragments: I, separator: Fragment) -> Fragment
where
    I: IntoIterator<Item = Fragment>,
{
    let mut parts = Vec::new();
    for (i, fragment) in fragments.into_iter().enumerate() {
        if i > 0 {
            parts.push(Part::Nested(separator.clone()));
        }
        parts.push(Part::Nested(fragment));
    }
    Fragment::from_parts(parts)
}

/// Conversion into a template argument.
///
/// Scalars become [`Part::Bound`], fragments are spliced as [`Part::Nested`] and
/// identifiers stay [`Part::Identifier`].
pub trait IntoPart {
    fn into_part(self) -> Part;
}

impl IntoPart for Part {
    fn into_part(self) -> Part {
        self
    }
}

impl IntoPart for Fragment {
    fn into_part(self) -> Part {
        Part::Nested(self)
    }
}

impl IntoPart for &Fragment {
    fn into_part(self) -> Part {
        Part::Nested(self.clone())
    }
}

impl IntoPart for Ident {
    fn into_part(self) -> Part {
        Part::Identifier(self)
    }
}

impl IntoPart for &Ident {
    fn into_part(self) -> Part {
        Part::Identifier(self.clone())
    }
}

impl<T: Into<Value>> IntoPart for Option<T> {
    fn into_part(self) -> Part {
        Part::Bound(self.into())
    }
}

macro_rules! impl_into_part_bound {
    ($($t:ty),* $(,)?) => {
        $(
            impl IntoPart for $t {
                fn into_part(self) -> Part {
                    Part::Bound(self.into())
                }
            }
        )*
    };
}

impl_into_part_bound!(
    Value,
    bool,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    f32,
    f64,
    String,
    &str,
    &String,
    Vec<u8>,
    &[u8],
    serde_json::Value,
    Uuid,
    DateTime<Utc>,
    NaiveDateTime,
    NaiveDate,
);

#[cfg(feature = "rust_decimal")]
impl_into_part_bound!(rust_decimal::Decimal);

/// Build a [`Fragment`] from a template literal and arguments.
///
/// Each `{}` in the template is replaced, in order, by one argument (anything implementing
/// [`IntoPart`]). Values are bound as parameters, fragments are nested, identifiers are
/// quoted inline. A mismatch between holes and arguments fails to compile.
///
/// Write `{{}}` for a literal `{}` (an empty JSON object or array literal, say):
///
/// ```ignore
/// let q = sql!("SELECT '{{}}'::jsonb || {}", payload);
/// ```
///
/// ```ignore
/// let by_id = sql!("SELECT * FROM {} WHERE id = {}", ident("users"), 42_i64);
/// ```
#[macro_export]
macro_rules! sql {
    ($template:literal $(, $arg:expr)* $(,)?) => {{
        const _: () = ::core::assert!(
            $crate::fragment::count_holes($template) == 0usize $(+ $crate::__one!($arg))*,
            "sql!: placeholder count does not match argument count"
        );
        $crate::Fragment::__from_checked_template(
            $template,
            ::std::vec![$($crate::IntoPart::into_part($arg)),*],
        )
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __one {
    ($e:expr) => {
        1usize
    };
}
