use anyhow::{anyhow, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Number(f64),
    /// Integer literal as written, kept for `avg_max`/`count_max` windows.
    Integer(u64),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset in the source expression.
    pub offset: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;

        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let text = &source[start..i];
            let kind = if text.contains('.') {
                let value = text
                    .parse::<f64>()
                    .map_err(|_| anyhow!("invalid number {:?} at offset {}", text, start))?;
                TokenKind::Number(value)
            } else {
                let value = text
                    .parse::<u64>()
                    .map_err(|_| anyhow!("integer {:?} at offset {} is too large", text, start))?;
                TokenKind::Integer(value)
            };
            tokens.push(Token { kind, offset: start });
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let kind = match &source[start..i] {
                "true" | "True" => TokenKind::True,
                "false" | "False" => TokenKind::False,
                "and" => TokenKind::And,
                "or" => TokenKind::Or,
                "not" => TokenKind::Not,
                word => TokenKind::Ident(word.to_string()),
            };
            tokens.push(Token { kind, offset: start });
            continue;
        }

        let next = bytes.get(i + 1).copied();
        let (kind, len) = match (c, next) {
            (b'&', Some(b'&')) => (TokenKind::And, 2),
            (b'|', Some(b'|')) => (TokenKind::Or, 2),
            (b'=', Some(b'=')) => (TokenKind::Eq, 2),
            (b'!', Some(b'=')) => (TokenKind::Ne, 2),
            (b'<', Some(b'=')) => (TokenKind::Le, 2),
            (b'>', Some(b'=')) => (TokenKind::Ge, 2),
            (b'!', _) => (TokenKind::Not, 1),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b',', _) => (TokenKind::Comma, 1),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', _) => (TokenKind::Percent, 1),
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                return Err(anyhow!("unexpected character {:?} at offset {}", ch, start));
            }
        };
        tokens.push(Token { kind, offset: start });
        i += len;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_calls_and_operators() {
        assert_eq!(
            kinds("avg(g1) > 0.5 && count(g2) >= 1"),
            vec![
                TokenKind::Ident("avg".into()),
                TokenKind::LParen,
                TokenKind::Ident("g1".into()),
                TokenKind::RParen,
                TokenKind::Gt,
                TokenKind::Number(0.5),
                TokenKind::And,
                TokenKind::Ident("count".into()),
                TokenKind::LParen,
                TokenKind::Ident("g2".into()),
                TokenKind::RParen,
                TokenKind::Ge,
                TokenKind::Integer(1),
            ]
        );
    }

    #[test]
    fn keyword_operators() {
        assert_eq!(
            kinds("not True or False and .5"),
            vec![
                TokenKind::Not,
                TokenKind::True,
                TokenKind::Or,
                TokenKind::False,
                TokenKind::And,
                TokenKind::Number(0.5),
            ]
        );
    }

    #[test]
    fn records_offsets() {
        let tokens = tokenize("a  != 3").unwrap();
        assert_eq!(tokens[1].offset, 3);
        assert_eq!(tokens[2].offset, 6);
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = tokenize("avg(g1) ^ 2").unwrap_err();
        assert!(err.to_string().contains("offset 8"));
        assert!(tokenize("a = b").is_err());
        assert!(tokenize("1.2.3").is_err());
    }
}
