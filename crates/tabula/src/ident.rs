//! Identifier quoting.
//!
//! Object names can't be bound as query parameters, so they are spliced into
//! statement text. Everything spliced goes through [`Ident`].

use std::fmt;

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use tabula::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes, so reserved words like `user` or `order` and mixed-case
/// names survive as-is.
pub fn quote_ident(name: &str) -> String {
    Ident(name).to_string()
}

/// Quote a schema-qualified name, e.g. `"public"."user"`.
pub fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", Ident(schema), Ident(name))
}
