//! Lexical analysis for PTL markup
//!
//! Splits raw template source into tag-structure tokens and text runs. Text
//! runs keep their `{expression}` spans intact; the parser splits those into
//! interpolation segments.

use crate::error::{Result, TemplateError};
use regex::Regex;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    /// `<Name` — start of an opening tag.
    TagOpen(String),
    /// `</Name>` — a complete closing tag.
    TagClose(String),
    /// `>` terminating an opening tag.
    TagEnd,
    /// `/>` terminating a self-closing tag.
    TagSelfClose,
    /// Attribute name inside a tag.
    AttrName(String),
    Equals,
    /// Quoted attribute value (quotes stripped).
    AttrValue(String),
    /// Raw text run between tags.
    Text(String),
    Eof,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::TagOpen(name) => write!(f, "<{}", name),
            TokenType::TagClose(name) => write!(f, "</{}>", name),
            TokenType::TagEnd => write!(f, ">"),
            TokenType::TagSelfClose => write!(f, "/>"),
            TokenType::AttrName(name) => write!(f, "attribute '{}'", name),
            TokenType::Equals => write!(f, "="),
            TokenType::AttrValue(v) => write!(f, "\"{}\"", v),
            TokenType::Text(_) => write!(f, "text"),
            TokenType::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub line: usize,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    in_tag: bool,
    tag_name_regex: Regex,
    attr_name_regex: Regex,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            in_tag: false,
            tag_name_regex: Regex::new(r"^[a-zA-Z][a-zA-Z0-9]*$").unwrap(),
            attr_name_regex: Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*$").unwrap(),
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while !self.is_at_end() {
            if self.in_tag {
                self.next_tag_token(&mut tokens)?;
            } else {
                self.next_content_token(&mut tokens)?;
            }
        }
        tokens.push(Token {
            token_type: TokenType::Eof,
            line: self.line,
        });
        Ok(tokens)
    }

    fn next_content_token(&mut self, tokens: &mut Vec<Token>) -> Result<()> {
        if self.peek() == Some('<') {
            if self.lookahead_is("<!--") {
                self.skip_comment()?;
                return Ok(());
            }
            let start_line = self.line;
            self.advance(); // '<'
            if self.peek() == Some('/') {
                self.advance();
                let name = self.read_name(start_line, "closing tag name")?;
                self.skip_spaces();
                if self.peek() != Some('>') {
                    return Err(self.err(start_line, format!("malformed closing tag </{}", name)));
                }
                self.advance();
                tokens.push(Token {
                    token_type: TokenType::TagClose(name),
                    line: start_line,
                });
            } else {
                let name = self.read_name(start_line, "tag name")?;
                tokens.push(Token {
                    token_type: TokenType::TagOpen(name),
                    line: start_line,
                });
                self.in_tag = true;
            }
            return Ok(());
        }

        let start_line = self.line;
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '<' {
                break;
            }
            if c == '\n' {
                self.line += 1;
            }
            text.push(c);
            self.advance();
        }
        if !text.is_empty() {
            tokens.push(Token {
                token_type: TokenType::Text(text),
                line: start_line,
            });
        }
        Ok(())
    }

    fn next_tag_token(&mut self, tokens: &mut Vec<Token>) -> Result<()> {
        self.skip_spaces();
        let line = self.line;
        match self.peek() {
            None => Err(self.err(line, "unexpected end of input inside a tag")),
            Some('>') => {
                self.advance();
                self.in_tag = false;
                tokens.push(Token {
                    token_type: TokenType::TagEnd,
                    line,
                });
                Ok(())
            }
            Some('/') => {
                self.advance();
                if self.peek() != Some('>') {
                    return Err(self.err(line, "expected '>' after '/'"));
                }
                self.advance();
                self.in_tag = false;
                tokens.push(Token {
                    token_type: TokenType::TagSelfClose,
                    line,
                });
                Ok(())
            }
            Some('=') => {
                self.advance();
                tokens.push(Token {
                    token_type: TokenType::Equals,
                    line,
                });
                Ok(())
            }
            Some('"') | Some('\'') => {
                let quote = self.advance().unwrap();
                let mut value = String::new();
                loop {
                    match self.advance() {
                        Some(c) if c == quote => break,
                        Some('\n') => {
                            return Err(self.err(line, "unterminated attribute value"))
                        }
                        Some(c) => value.push(c),
                        None => return Err(self.err(line, "unterminated attribute value")),
                    }
                }
                tokens.push(Token {
                    token_type: TokenType::AttrValue(value),
                    line,
                });
                Ok(())
            }
            Some(c) if c.is_ascii_alphabetic() => {
                let start = self.position;
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                        self.advance();
                    } else {
                        break;
                    }
                }
                let name: String = self.input[start..self.position].iter().collect();
                if !self.attr_name_regex.is_match(&name) {
                    return Err(self.err(line, format!("invalid attribute name '{}'", name)));
                }
                tokens.push(Token {
                    token_type: TokenType::AttrName(name),
                    line,
                });
                Ok(())
            }
            Some(other) => Err(self.err(
                line,
                format!("unexpected character '{}' inside a tag", other),
            )),
        }
    }

    fn read_name(&mut self, line: usize, what: &str) -> Result<String> {
        let start = self.position;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() {
                self.advance();
            } else {
                break;
            }
        }
        let name: String = self.input[start..self.position].iter().collect();
        if !self.tag_name_regex.is_match(&name) {
            return Err(self.err(line, format!("expected {}", what)));
        }
        Ok(name)
    }

    fn skip_comment(&mut self) -> Result<()> {
        let start_line = self.line;
        self.position += 4; // '<!--'
        loop {
            if self.is_at_end() {
                return Err(self.err(start_line, "unterminated comment"));
            }
            if self.lookahead_is("-->") {
                self.position += 3;
                return Ok(());
            }
            if self.peek() == Some('\n') {
                self.line += 1;
            }
            self.advance();
        }
    }

    fn skip_spaces(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                self.line += 1;
                self.advance();
            } else if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn lookahead_is(&self, s: &str) -> bool {
        let chars: Vec<char> = s.chars().collect();
        self.input[self.position..]
            .iter()
            .take(chars.len())
            .copied()
            .eq(chars)
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn err(&self, line: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::parse("source", line, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<TokenType> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn test_simple_tag() {
        let tokens = lex(r#"<ProfilePhoto size="lg" />"#);
        assert_eq!(
            tokens,
            vec![
                TokenType::TagOpen("ProfilePhoto".into()),
                TokenType::AttrName("size".into()),
                TokenType::Equals,
                TokenType::AttrValue("lg".into()),
                TokenType::TagSelfClose,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_paired_tag_with_text() {
        let tokens = lex("<Bio>Hello {owner.handle}!</Bio>");
        assert_eq!(
            tokens,
            vec![
                TokenType::TagOpen("Bio".into()),
                TokenType::TagEnd,
                TokenType::Text("Hello {owner.handle}!".into()),
                TokenType::TagClose("Bio".into()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_line_tracking() {
        let tokens = Lexer::new("<div>\n\n<span>").tokenize().unwrap();
        assert_eq!(tokens[0].line, 1);
        // third token is <span
        assert_eq!(tokens[2].line, 3);
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = lex("<div><!-- hidden --></div>");
        assert_eq!(
            tokens,
            vec![
                TokenType::TagOpen("div".into()),
                TokenType::TagEnd,
                TokenType::TagClose("div".into()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_single_quoted_attr() {
        let tokens = lex(r#"<Show when='$vars.open == true'>"#);
        assert!(tokens.contains(&TokenType::AttrValue("$vars.open == true".into())));
    }

    #[test]
    fn test_malformed_input() {
        assert!(Lexer::new("<").tokenize().is_err());
        assert!(Lexer::new("<Bio attr=\"unterminated>").tokenize().is_err());
        assert!(Lexer::new("</3>").tokenize().is_err());
        assert!(Lexer::new("<!-- never closed").tokenize().is_err());
        assert!(Lexer::new("<Tag @bad />").tokenize().is_err());
    }
}
