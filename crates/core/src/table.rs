//! Schema-qualified table references and the names derived from them.

use std::fmt;

/// Quote an identifier for inclusion in generated SQL.
///
/// Identifiers are always double-quoted so mixed-case and reserved names
/// survive; embedded quotes are doubled.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string as a SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A table identified by schema and name.
///
/// Intermediate, retired, partition and trigger names are all computed from
/// this value; nothing about them is stored separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    /// Schema the table lives in
    pub schema: String,
    /// Unqualified table name
    pub name: String,
}

impl TableRef {
    /// Create a reference from its parts.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        TableRef {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parse `schema.name` or bare `name`, filling in `default_schema` for the latter.
    pub fn parse(input: &str, default_schema: &str) -> Self {
        match input.split_once('.') {
            Some((schema, name)) => TableRef::new(schema, name),
            None => TableRef::new(default_schema, input),
        }
    }

    /// The staging table built alongside the live one.
    pub fn intermediate(&self) -> TableRef {
        self.sibling(format!("{}_intermediate", self.name))
    }

    /// The original table after it has been swapped out.
    pub fn retired(&self) -> TableRef {
        self.sibling(format!("{}_retired", self.name))
    }

    /// Name of the insert routing trigger and its function.
    pub fn trigger_name(&self) -> String {
        format!("{}_insert_trigger", self.name)
    }

    /// Partition of this table whose name carries `suffix`.
    pub fn partition(&self, suffix: &str) -> TableRef {
        self.sibling(format!("{}_{}", self.name, suffix))
    }

    /// Fully quoted `"schema"."name"`.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }

    /// Quoted name without the schema, as required by `RENAME TO`.
    pub fn quoted_name(&self) -> String {
        quote_ident(&self.name)
    }

    fn sibling(&self, name: String) -> TableRef {
        TableRef {
            schema: self.schema.clone(),
            name,
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_schema() {
        let table = TableRef::parse("events", "public");
        assert_eq!(table, TableRef::new("public", "events"));

        let qualified = TableRef::parse("audit.events", "public");
        assert_eq!(qualified.schema, "audit");
        assert_eq!(qualified.name, "events");
    }

    #[test]
    fn test_derived_names() {
        let table = TableRef::new("public", "events");
        assert_eq!(table.intermediate().name, "events_intermediate");
        assert_eq!(table.retired().name, "events_retired");
        assert_eq!(table.trigger_name(), "events_insert_trigger");
        assert_eq!(table.partition("202403").to_string(), "public.events_202403");
        assert_eq!(table.intermediate().schema, "public");
    }

    #[test]
    fn test_quoting() {
        let table = TableRef::new("public", "we\"ird");
        assert_eq!(table.quoted(), "\"public\".\"we\"\"ird\"");
        assert_eq!(quote_literal("5s"), "'5s'");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }
}
