//! Structural fingerprint of a statement.
//!
//! Literals are replaced by `?` and keywords are upper-cased before hashing,
//! so `WHERE id = 1` and `where id = 2` share a fingerprint while a change to
//! the statement's shape does not.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlparser::tokenizer::Token;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryHash(String);

impl QueryHash {
    /// Fingerprint a token sequence. Whitespace and end-of-input are ignored.
    pub fn of_tokens<'a>(tokens: impl IntoIterator<Item = &'a Token>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"sql-firewall-v1:");
        for token in tokens {
            if matches!(token, Token::Whitespace(_) | Token::EOF) {
                continue;
            }
            hasher.update(normalized(token).as_bytes());
            hasher.update(b" ");
        }
        let digest = hasher.finalize();
        Self(digest.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalized(token: &Token) -> Cow<'_, str> {
    match token {
        Token::Number(..)
        | Token::SingleQuotedString(_)
        | Token::DoubleQuotedString(_)
        | Token::NationalStringLiteral(_)
        | Token::EscapedStringLiteral(_)
        | Token::HexStringLiteral(_) => Cow::Borrowed("?"),
        Token::Word(w) if w.quote_style.is_none() => Cow::Owned(w.value.to_uppercase()),
        other => Cow::Owned(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::MySqlDialect;
    use sqlparser::tokenizer::Tokenizer;

    fn hash(sql: &str) -> QueryHash {
        let tokens = Tokenizer::new(&MySqlDialect {}, sql).tokenize().unwrap();
        QueryHash::of_tokens(&tokens)
    }

    #[test]
    fn test_literals_do_not_change_hash() {
        assert_eq!(hash("SELECT * FROM t WHERE id = 1"), hash("select * from t where id = 2"));
        assert_eq!(hash("SELECT 'a'"), hash("SELECT  'b'"));
    }

    #[test]
    fn test_shape_changes_hash() {
        assert_ne!(hash("SELECT * FROM t WHERE id = 1"), hash("SELECT * FROM t WHERE name = 1"));
        assert_ne!(hash("SELECT 1"), hash("SELECT 1 OR 1"));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let h = hash("SELECT 1");
        assert_eq!(h.as_str().len(), 64);
        assert!(h.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(h.to_string(), h.as_str());
    }
}
