use thiserror::Error;

use crate::token::{Literal, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at line {line}")]
    UnexpectedCharacter { character: char, line: usize },
    #[error("Unterminated string at line {line}")]
    UnterminatedString { line: usize },
    #[error("Invalid number literal '{literal}' at line {line}")]
    InvalidNumberLiteral { literal: String, line: usize },
}

pub type LexResult<T> = Result<T, LexError>;

pub struct Lexer<'a> {
    input: &'a str,
    start: usize,
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            start: 0,
            pos: 0,
            line: 1,
        }
    }

    pub fn next_token(&mut self) -> LexResult<Token> {
        self.skip_trivia();
        self.start = self.pos;

        let Some(ch) = self.consume_char() else {
            return Ok(Token::new(TokenKind::Eof, "", self.line));
        };

        match ch {
            '(' => Ok(self.simple(TokenKind::LeftParen)),
            ')' => Ok(self.simple(TokenKind::RightParen)),
            '{' => Ok(self.simple(TokenKind::LeftBrace)),
            '}' => Ok(self.simple(TokenKind::RightBrace)),
            ',' => Ok(self.simple(TokenKind::Comma)),
            '.' => Ok(self.simple(TokenKind::Dot)),
            ':' => Ok(self.simple(TokenKind::Colon)),
            ';' => Ok(self.simple(TokenKind::Semicolon)),
            '%' => Ok(self.simple(TokenKind::Percent)),
            '/' => Ok(self.simple(TokenKind::Slash)),
            '+' => {
                if self.consume_if('+') {
                    Ok(self.simple(TokenKind::PlusPlus))
                } else {
                    Ok(self.simple(TokenKind::Plus))
                }
            }
            '-' => {
                if self.consume_if('-') {
                    Ok(self.simple(TokenKind::MinusMinus))
                } else {
                    Ok(self.simple(TokenKind::Minus))
                }
            }
            '*' => {
                if self.consume_if('*') {
                    Ok(self.simple(TokenKind::StarStar))
                } else {
                    Ok(self.simple(TokenKind::Star))
                }
            }
            '!' => {
                if self.consume_if('=') {
                    Ok(self.simple(TokenKind::BangEqual))
                } else {
                    Ok(self.simple(TokenKind::Bang))
                }
            }
            '=' => {
                if self.consume_if('=') {
                    Ok(self.simple(TokenKind::EqualEqual))
                } else {
                    Ok(self.simple(TokenKind::Equal))
                }
            }
            '>' => {
                if self.consume_if('=') {
                    Ok(self.simple(TokenKind::GreaterEqual))
                } else {
                    Ok(self.simple(TokenKind::Greater))
                }
            }
            '<' => {
                if self.consume_if('=') {
                    Ok(self.simple(TokenKind::LessEqual))
                } else {
                    Ok(self.simple(TokenKind::Less))
                }
            }
            '"' => self.read_string(),
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_alphabetic() || c == '_' => Ok(self.read_identifier()),
            other => Err(LexError::UnexpectedCharacter {
                character: other,
                line: self.line,
            }),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(' ') | Some('\r') | Some('\t') => {
                    self.consume_char();
                }
                Some('\n') => {
                    self.line += 1;
                    self.consume_char();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    // Line comment runs to end of line.
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.consume_char();
                    }
                }
                _ => break,
            }
        }
    }

    fn simple(&self, kind: TokenKind) -> Token {
        Token::new(kind, &self.input[self.start..self.pos], self.line)
    }

    fn read_string(&mut self) -> LexResult<Token> {
        while let Some(c) = self.peek_char() {
            if c == '"' {
                break;
            }
            if c == '\n' {
                self.line += 1;
            }
            self.consume_char();
        }
        if self.peek_char().is_none() {
            return Err(LexError::UnterminatedString { line: self.line });
        }
        self.consume_char(); // closing quote

        let content = &self.input[self.start + 1..self.pos - 1];
        Ok(Token::with_literal(
            TokenKind::String,
            &self.input[self.start..self.pos],
            Literal::Str(content.to_string()),
            self.line,
        ))
    }

    fn read_number(&mut self) -> LexResult<Token> {
        self.consume_while(|c| c.is_ascii_digit());

        let mut is_float = false;
        if self.peek_char() == Some('.')
            && self
                .peek_next()
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
        {
            is_float = true;
            self.consume_char(); // '.'
            self.consume_while(|c| c.is_ascii_digit());
        }

        let lexeme = &self.input[self.start..self.pos];
        let literal = if is_float {
            let value =
                lexeme
                    .parse::<f64>()
                    .map_err(|_| LexError::InvalidNumberLiteral {
                        literal: lexeme.to_string(),
                        line: self.line,
                    })?;
            Literal::Float(value)
        } else {
            let value =
                lexeme
                    .parse::<i64>()
                    .map_err(|_| LexError::InvalidNumberLiteral {
                        literal: lexeme.to_string(),
                        line: self.line,
                    })?;
            Literal::Int(value)
        };

        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Integer
        };
        Ok(Token::with_literal(kind, lexeme, literal, self.line))
    }

    fn read_identifier(&mut self) -> Token {
        self.consume_while(|c| c.is_alphanumeric() || c == '_');
        let lexeme = &self.input[self.start..self.pos];
        match lexeme {
            "and" => self.simple(TokenKind::And),
            "class" => self.simple(TokenKind::Class),
            "else" => self.simple(TokenKind::Else),
            "fun" => self.simple(TokenKind::Fun),
            "if" => self.simple(TokenKind::If),
            "null" => self.simple(TokenKind::Null),
            "or" => self.simple(TokenKind::Or),
            "print" => self.simple(TokenKind::Print),
            "return" => self.simple(TokenKind::Return),
            "var" => self.simple(TokenKind::Var),
            "while" => self.simple(TokenKind::While),
            "true" => Token::with_literal(TokenKind::True, lexeme, Literal::Bool(true), self.line),
            "false" => {
                Token::with_literal(TokenKind::False, lexeme, Literal::Bool(false), self.line)
            }
            _ => self.simple(TokenKind::Identifier),
        }
    }

    fn consume_while<P>(&mut self, keep_predicate: P)
    where
        P: Fn(char) -> bool,
    {
        while let Some(c) = self.peek_char() {
            if !keep_predicate(c) {
                break;
            }
            self.consume_char();
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn consume_if(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.consume_char();
            true
        } else {
            false
        }
    }
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::Eof);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn scans_declaration_with_annotation() {
        let input = "var total: int = 4 + 2;";
        let expected = vec![
            TokenKind::Var,
            TokenKind::Identifier,
            TokenKind::Colon,
            TokenKind::Identifier,
            TokenKind::Equal,
            TokenKind::Integer,
            TokenKind::Plus,
            TokenKind::Integer,
            TokenKind::Semicolon,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn scans_two_char_operators() {
        let input = "i++ j-- 2 ** 8 a != b a == b a >= b a <= b";
        let expected = vec![
            TokenKind::Identifier,
            TokenKind::PlusPlus,
            TokenKind::Identifier,
            TokenKind::MinusMinus,
            TokenKind::Integer,
            TokenKind::StarStar,
            TokenKind::Integer,
            TokenKind::Identifier,
            TokenKind::BangEqual,
            TokenKind::Identifier,
            TokenKind::Identifier,
            TokenKind::EqualEqual,
            TokenKind::Identifier,
            TokenKind::Identifier,
            TokenKind::GreaterEqual,
            TokenKind::Identifier,
            TokenKind::Identifier,
            TokenKind::LessEqual,
            TokenKind::Identifier,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn scans_function_declaration() {
        let input = indoc! {r#"
            fun greet(name: string): void {
                print "hej " + name;
            }
        "#};
        let expected = vec![
            TokenKind::Fun,
            TokenKind::Identifier,
            TokenKind::LeftParen,
            TokenKind::Identifier,
            TokenKind::Colon,
            TokenKind::Identifier,
            TokenKind::RightParen,
            TokenKind::Colon,
            TokenKind::Identifier,
            TokenKind::LeftBrace,
            TokenKind::Print,
            TokenKind::String,
            TokenKind::Plus,
            TokenKind::Identifier,
            TokenKind::Semicolon,
            TokenKind::RightBrace,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn keeps_literal_values() {
        let tokens = tokenize(r#"42 3.25 "hej" true"#).expect("tokenize should succeed");
        assert_eq!(tokens[0].literal, Some(Literal::Int(42)));
        assert_eq!(tokens[1].literal, Some(Literal::Float(3.25)));
        assert_eq!(tokens[2].literal, Some(Literal::Str("hej".to_string())));
        assert_eq!(tokens[3].literal, Some(Literal::Bool(true)));
    }

    #[test]
    fn skips_line_comments_and_tracks_lines() {
        let input = indoc! {"
            // leading comment
            var a = 1; // trailing
            print a;
        "};
        let tokens = tokenize(input).expect("tokenize should succeed");
        assert_eq!(tokens[0].kind, TokenKind::Var);
        assert_eq!(tokens[0].line, 2);
        let print = tokens
            .iter()
            .find(|token| token.kind == TokenKind::Print)
            .expect("print token");
        assert_eq!(print.line, 3);
    }

    #[test]
    fn dot_without_digits_is_member_access() {
        let expected = vec![
            TokenKind::Identifier,
            TokenKind::Dot,
            TokenKind::Identifier,
            TokenKind::LeftParen,
            TokenKind::RightParen,
            TokenKind::Eof,
        ];
        assert_eq!(kinds("ARGV.pop()"), expected);
    }

    #[test]
    fn errors_on_unexpected_character() {
        let err = tokenize("var a = 1 @ 2;").expect_err("expected lexing failure");
        assert_eq!(
            err,
            LexError::UnexpectedCharacter {
                character: '@',
                line: 1
            }
        );
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("var s = \"abc").expect_err("expected unterminated string");
        assert_eq!(err, LexError::UnterminatedString { line: 1 });
    }

    #[test]
    fn errors_on_integer_overflow() {
        let err = tokenize("var n = 99999999999999999999;").expect_err("expected overflow");
        assert!(err.to_string().contains("Invalid number literal"));
    }
}
