//! Whitespace tokenization shared by request and response framing.

use thiserror::Error;

/// Errors raised while picking tokens out of a control line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A token that must be numeric is not
    #[error("{token} is not a valid integer")]
    Format { token: String },
    /// A token was requested past the end of the line
    #[error("token {index} is out of range ({len} tokens)")]
    Index { index: usize, len: usize },
}

/// A control line split on whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenLine {
    tokens: Vec<String>,
}

impl TokenLine {
    /// Split `line` on any run of whitespace.
    pub fn parse(line: &str) -> Self {
        Self {
            tokens: line.split_whitespace().map(str::to_owned).collect(),
        }
    }

    pub fn from_tokens<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&str, CodecError> {
        self.tokens
            .get(index)
            .map(String::as_str)
            .ok_or(CodecError::Index {
                index,
                len: self.tokens.len(),
            })
    }

    pub fn get_int(&self, index: usize) -> Result<i64, CodecError> {
        let token = self.get(index)?;
        token.parse().map_err(|_| CodecError::Format {
            token: token.to_owned(),
        })
    }

    /// Tokens from `start` to the end, joined by single spaces.
    ///
    /// `start == len()` yields an empty string.
    pub fn join_from(&self, start: usize) -> Result<String, CodecError> {
        if start > self.tokens.len() {
            return Err(CodecError::Index {
                index: start,
                len: self.tokens.len(),
            });
        }
        Ok(self.tokens[start..].join(" "))
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn encode(&self) -> String {
        self.tokens.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collapses_whitespace() {
        let line = TokenLine::parse("  0 10\t60   2 ");
        assert_eq!(line.tokens(), &["0", "10", "60", "2"]);
        assert_eq!(line.encode(), "0 10 60 2");
    }

    #[test]
    fn test_get_out_of_range_is_index_error() {
        let line = TokenLine::parse("1");
        assert_eq!(line.get(0).unwrap(), "1");
        assert_eq!(line.get(1), Err(CodecError::Index { index: 1, len: 1 }));
    }

    #[test]
    fn test_get_int_distinguishes_format_from_index() {
        let line = TokenLine::parse("abc");
        assert_eq!(
            line.get_int(0),
            Err(CodecError::Format {
                token: "abc".to_string()
            })
        );
        assert!(matches!(line.get_int(3), Err(CodecError::Index { .. })));
    }

    #[test]
    fn test_join_from() {
        let line = TokenLine::parse("1 recording already started");
        assert_eq!(line.join_from(1).unwrap(), "recording already started");
        assert_eq!(line.join_from(4).unwrap(), "");
        assert!(line.join_from(5).is_err());
    }
}
