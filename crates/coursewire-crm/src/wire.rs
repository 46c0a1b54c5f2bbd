//! Helpers for building remote field names and query strings.

/// Apply the remote namespace prefix to a custom field name.
///
/// Standard fields (`Id`, `Name`) are never prefixed; callers pass those
/// through untouched.
pub fn prefixed(namespace: &str, field: &str) -> String {
    format!("{}{}", namespace, field)
}

/// Escape a string literal for embedding in a remote query.
///
/// Backslashes and single quotes are the only characters the remote query
/// language treats specially inside a quoted literal.
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// Render a list of string values as a parenthesized IN list.
pub fn in_list(values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
    format!("({})", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed() {
        assert_eq!(prefixed("KMTMMP__", "MM_Id__c"), "KMTMMP__MM_Id__c");
        assert_eq!(prefixed("", "MM_Id__c"), "MM_Id__c");
    }

    #[test]
    fn test_quote_literal_escapes_quotes_and_backslashes() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("O'Brien"), "'O\\'Brien'");
        assert_eq!(quote_literal("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn test_in_list() {
        assert_eq!(
            in_list(&["a".to_string(), "b'c".to_string()]),
            "('a', 'b\\'c')"
        );
        assert_eq!(in_list(&[]), "()");
    }
}
