//! Rows, attribute maps and model hydration.

use crate::error::{OrmError, OrmResult};
use crate::value::{FromValue, Value};

/// An ordered mapping from column name to [`Value`].
///
/// Used both for rows returned by an executor and for attribute maps passed to
/// `create`/`update`. Column names are unique: inserting an existing column replaces its
/// value in place and keeps its position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

/// Column/value pairs submitted to `create` or `update`.
pub type Attributes = Row;

impl Row {
    /// An empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Row::insert`].
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Set `column`, returning the previous value if there was one.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.columns.push((column, value));
                None
            }
        }
    }

    /// Raw value of `column`, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Typed value of `column`.
    ///
    /// A missing column is a decode error unless `T` is an `Option`.
    pub fn try_get<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        match self.get(column) {
            Some(value) => {
                T::from_value(value).map_err(|e| OrmError::decode(column, e.to_string()))
            }
            None => T::from_missing().ok_or_else(|| OrmError::decode(column, "missing column")),
        }
    }

    /// Whether `column` is present (even if `NULL`).
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Overlay `other` onto this row: shared columns take `other`'s value, new columns are
    /// appended.
    pub fn merge(&mut self, other: Row) {
        for (column, value) in other.columns {
            self.insert(column, value);
        }
    }

    /// Column names, in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Column/value pairs, in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// Trait for hydrating a model from a [`Row`].
///
/// Implementations read the columns they need with [`Row::try_get`], which reports a
/// [`OrmError::Decode`] when a required column is missing or has the wrong type.
///
/// # Example
///
/// ```ignore
/// use sqlcrud::{FromRow, OrmResult, Row};
///
/// struct User {
///     id: i64,
///     username: String,
///     email: Option<String>,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &Row) -> OrmResult<Self> {
///         Ok(Self {
///             id: row.try_get("id")?,
///             username: row.try_get("username")?,
///             email: row.try_get("email")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Convert a row into Self
    fn from_row(row: &Row) -> OrmResult<Self>;
}

/// A persisted model managed by a [`CrudRepository`](crate::CrudRepository).
///
/// `to_row` projects the model back into columns. The repository reads the primary key
/// from it and overlays fresh column values onto it after an update.
pub trait Model: FromRow + Send + Sync {
    fn to_row(&self) -> Row;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(row.clone())
    }
}

impl Model for Row {
    fn to_row(&self) -> Row {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_in_place() {
        let mut row = Row::new().set("id", 1).set("name", "a");
        assert_eq!(row.insert("id", 2), Some(Value::Int(1)));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(row.try_get::<i64>("id").unwrap(), 2);
    }

    #[test]
    fn merge_overlays_and_appends() {
        let mut base = Row::new().set("id", 1).set("name", "old");
        base.merge(Row::new().set("name", "new").set("updated", true));
        assert_eq!(base.try_get::<String>("name").unwrap(), "new");
        assert!(base.try_get::<bool>("updated").unwrap());
        assert_eq!(base.len(), 3);
    }

    #[test]
    fn missing_column_is_decode_error_unless_optional() {
        let row = Row::new().set("id", 1);
        let err = row.try_get::<String>("name").unwrap_err();
        assert!(matches!(err, OrmError::Decode { ref column, .. } if column == "name"));
        assert_eq!(row.try_get::<Option<String>>("name").unwrap(), None);
    }

    #[test]
    fn type_mismatch_names_column() {
        let row = Row::new().set("age", "ten");
        let err = row.try_get::<i64>("age").unwrap_err();
        assert!(err.to_string().contains("'age'"));
    }

    #[test]
    fn collects_from_pairs() {
        let row: Row = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(row.get("b"), Some(&Value::Int(2)));
    }
}
