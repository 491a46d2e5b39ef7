//! SQL identifiers (schema/table/column names).
//!
//! Identifiers are never sent as bound parameters: engines reject placeholders in
//! identifier position. Instead an [`Ident`] is rendered inline by the compiler.
//!
//! - [`Ident::new`] wraps a single name verbatim and always renders it quoted, with the
//!   dialect's quote character doubled inside the name.
//! - [`Ident::parse`] accepts dotted paths such as `public.users` or `public."UserTable"`.
//!   Unquoted segments are validated against `[A-Za-z_][A-Za-z0-9_$]*` and rendered bare.
//!
//! # Example
//! ```ignore
//! use sqlcrud::Ident;
//!
//! let t = Ident::parse("public.users")?;
//! let c = Ident::new("Display Name");
//! # Ok::<(), sqlcrud::OrmError>(())
//! ```

use crate::error::{OrmError, OrmResult};

/// One dot-separated segment of an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentPart {
    /// Bare identifier, already validated as safe to emit unquoted.
    Unquoted(String),
    /// Arbitrary name, emitted between quote characters.
    Quoted(String),
}

/// A SQL identifier, possibly schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    parts: Vec<IdentPart>,
}

impl Ident {
    /// Wrap a single name. The name may contain any character except NUL; it is always
    /// quoted.
    ///
    /// Use [`Ident::try_new`] for names that are not known to be valid.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug_assert!(!name.contains('\0'), "identifier {name:?} contains NUL");
        Self {
            parts: vec![IdentPart::Quoted(name)],
        }
    }

    /// Fallible [`Ident::new`]: rejects empty names and NUL characters.
    pub fn try_new(name: impl Into<String>) -> OrmResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(OrmError::validation("Identifier cannot be empty"));
        }
        if name.contains('\0') {
            return Err(OrmError::validation(
                "Identifier cannot contain NUL character",
            ));
        }
        Ok(Self {
            parts: vec![IdentPart::Quoted(name)],
        })
    }

    /// Parse an identifier string, supporting dotted and quoted forms.
    ///
    /// - Dotted: `schema.table.column`
    /// - Quoted: `"CamelCase"."UserTable"` (`""` escapes a quote)
    /// - Mixed: `public."UserTable".id`
    pub fn parse(s: &str) -> OrmResult<Self> {
        if s.is_empty() {
            return Err(OrmError::validation("Identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(OrmError::validation(
                "Identifier cannot contain NUL character",
            ));
        }

        let mut parts = Vec::new();
        let mut chars = s.chars().peekable();

        while chars.peek().is_some() {
            if !parts.is_empty() {
                match chars.next() {
                    Some('.') => {
                        if chars.peek().is_none() {
                            return Err(OrmError::validation("Trailing '.' in identifier"));
                        }
                    }
                    Some(c) => {
                        return Err(OrmError::validation(format!(
                            "Expected '.' between identifier parts, got '{c}'"
                        )));
                    }
                    None => break,
                }
            }

            if chars.peek() == Some(&'"') {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            name.push('"');
                        }
                        Some('"') => break,
                        Some(c) => name.push(c),
                        None => return Err(OrmError::validation("Unclosed quoted identifier")),
                    }
                }
                if name.is_empty() {
                    return Err(OrmError::validation("Empty quoted identifier"));
                }
                parts.push(IdentPart::Quoted(name));
                continue;
            }

            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                let ok = if name.is_empty() {
                    c == '_' || c.is_ascii_alphabetic()
                } else {
                    c == '_' || c == '$' || c.is_ascii_alphanumeric()
                };
                if !ok {
                    return Err(OrmError::validation(format!(
                        "Invalid character in identifier '{s}': '{c}'"
                    )));
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(OrmError::validation("Empty identifier segment"));
            }
            parts.push(IdentPart::Unquoted(name));
        }

        Ok(Self { parts })
    }

    /// Segments of this identifier, outermost first.
    pub fn parts(&self) -> &[IdentPart] {
        &self.parts
    }

    /// The last segment's name (the column or table name without schema).
    pub fn name(&self) -> &str {
        match self.parts.last() {
            Some(IdentPart::Unquoted(s) | IdentPart::Quoted(s)) => s,
            None => "",
        }
    }

    /// Render with `quote` as the quote character, doubling it inside quoted names.
    pub fn write_quoted(&self, quote: char, out: &mut String) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match part {
                IdentPart::Unquoted(s) => out.push_str(s),
                IdentPart::Quoted(s) => {
                    out.push(quote);
                    for ch in s.chars() {
                        if ch == quote {
                            out.push(quote);
                        }
                        out.push(ch);
                    }
                    out.push(quote);
                }
            }
        }
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        self.write_quoted('"', &mut out);
        f.write_str(&out)
    }
}

/// Convert an input into an [`Ident`].
///
/// String inputs go through [`Ident::parse`].
pub trait IntoIdent {
    fn into_ident(self) -> OrmResult<Ident>;
}

impl IntoIdent for Ident {
    fn into_ident(self) -> OrmResult<Ident> {
        Ok(self)
    }
}

impl IntoIdent for &Ident {
    fn into_ident(self) -> OrmResult<Ident> {
        Ok(self.clone())
    }
}

impl IntoIdent for &str {
    fn into_ident(self) -> OrmResult<Ident> {
        Ident::parse(self)
    }
}

impl IntoIdent for String {
    fn into_ident(self) -> OrmResult<Ident> {
        Ident::parse(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg(ident: &Ident) -> String {
        let mut out = String::new();
        ident.write_quoted('"', &mut out);
        out
    }

    #[test]
    fn new_always_quotes() {
        assert_eq!(pg(&Ident::new("users")), r#""users""#);
        assert_eq!(pg(&Ident::new(r#"we"ird"#)), r#""we""ird""#);
    }

    #[test]
    fn new_escapes_backtick_for_mysql() {
        let mut out = String::new();
        Ident::new("a`b").write_quoted('`', &mut out);
        assert_eq!(out, "`a``b`");
    }

    #[test]
    fn try_new_rejects_nul_and_empty() {
        assert!(Ident::try_new("a\0b").is_err());
        assert!(Ident::try_new("").is_err());
        assert_eq!(pg(&Ident::try_new("my col").unwrap()), r#""my col""#);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "contains NUL")]
    fn new_with_nul_panics_in_debug() {
        let _ = Ident::new("a\0b");
    }

    #[test]
    fn parse_dotted() {
        let ident = Ident::parse("public.users").unwrap();
        assert_eq!(pg(&ident), "public.users");
        assert_eq!(ident.name(), "users");
    }

    #[test]
    fn parse_mixed_quoted_unquoted() {
        let ident = Ident::parse(r#"public."User.Table".id"#).unwrap();
        assert_eq!(pg(&ident), r#"public."User.Table".id"#);
        assert_eq!(ident.parts().len(), 3);
    }

    #[test]
    fn parse_quoted_with_escape() {
        let ident = Ident::parse(r#""has""quote""#).unwrap();
        assert_eq!(ident.name(), r#"has"quote"#);
        assert_eq!(pg(&ident), r#""has""quote""#);
    }

    #[test]
    fn parse_rejects_unsafe() {
        assert!(Ident::parse("").is_err());
        assert!(Ident::parse("1table").is_err());
        assert!(Ident::parse("my table").is_err());
        assert!(Ident::parse("schema..table").is_err());
        assert!(Ident::parse("schema.").is_err());
        assert!(Ident::parse(r#""unclosed"#).is_err());
        assert!(Ident::parse("users; drop table users; --").is_err());
    }
}
