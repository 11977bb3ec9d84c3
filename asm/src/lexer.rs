//! Converts source text into a flat token stream.
//!
//! A single forward pass with whitespace/comment skipping. Register aliases
//! are resolved before falling back to a generic identifier, and `r`+digits is only
//! treated as a register when the whole run of word characters matches
//! `r[0-9]+` with no trailing letters (so a label named `result` or `ret`
//! lexes as an identifier rather than aborting mid-word).

use crate::error::LexError;
use crate::token::Token;

const REGISTER_ALIASES: [(&str, u8); 5] =
    [("fp", 11), ("ip", 12), ("sp", 13), ("lr", 14), ("pc", 15)];

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Lexer {
        Lexer { chars: source.chars().collect(), pos: 0, line: 1 }
    }

    fn check(&self) -> bool {
        self.pos < self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn eat_char(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        let expected: Vec<char> = s.chars().collect();
        if self.chars[self.pos..].starts_with(&expected[..]) {
            for _ in 0..expected.len() {
                self.advance();
            }
            true
        } else {
            false
        }
    }

    fn pass_space_and_comments(&mut self) {
        loop {
            while self.peek().map_or(false, |c| c.is_whitespace()) {
                self.advance();
            }
            if self.peek() == Some('@') {
                while self.check() && self.peek() != Some('\n') {
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn eat_digits(&mut self, base: u32) -> String {
        let start = self.pos;
        while self.peek().map_or(false, |c| c.is_digit(base)) {
            self.advance();
        }
        self.source_slice(start, self.pos)
    }

    fn eat_word(&mut self) -> String {
        let start = self.pos;
        while self.peek().map_or(false, |c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        self.source_slice(start, self.pos)
    }

    fn source_slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    /// Runs the full pass, producing the complete token stream.
    pub fn lex(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        self.pass_space_and_comments();

        while self.check() {
            let line = self.line;
            let c = self.peek().unwrap();

            if c.is_alphanumeric() || c == '_' {
                let word = self.eat_word();

                if let Some(reg) = register_from_word(&word) {
                    tokens.push(Token::register(reg, word, line));
                } else if word.starts_with('r') && word.len() > 1 {
                    // Looked like `r<digits>` but failed validation (out of
                    // range, or not all-digits) -- only an error if it really
                    // was all digits after the `r`.
                    if word[1..].chars().all(|c| c.is_ascii_digit()) {
                        return Err(LexError::InvalidRegisterIndex { text: word, line });
                    }
                    tokens.push(Token::identifier(word, line));
                } else {
                    tokens.push(Token::identifier(word, line));
                }
            } else if c == '#' {
                self.advance();
                tokens.push(self.lex_immediate(line)?);
            } else if c == '"' {
                self.advance();
                tokens.push(self.lex_string(line)?);
            } else {
                self.advance();
                tokens.push(Token::punctuation(c.to_string(), line));
            }

            self.pass_space_and_comments();
        }

        Ok(tokens)
    }

    fn lex_immediate(&mut self, line: u32) -> Result<Token, LexError> {
        if self.eat_char('\'') {
            let value = self.advance().ok_or(LexError::UnterminatedCharLiteral { line })?;
            if !self.eat_char('\'') {
                return Err(LexError::UnterminatedCharLiteral { line });
            }
            return Ok(Token::value(value as u64, format!("#'{}'", value), line));
        }

        let base = if self.eat_str("0x") { 16 } else { 10 };
        let digits = self.eat_digits(base);
        if digits.is_empty() {
            return Err(LexError::ExpectedDigitsAfterHash { line });
        }
        let value = u64::from_str_radix(&digits, base).expect("digits already validated");
        Ok(Token::value(value, format!("#{}", digits), line))
    }

    fn lex_string(&mut self, line: u32) -> Result<Token, LexError> {
        let start = self.pos;
        while self.check() && self.peek() != Some('"') {
            self.advance();
        }
        if !self.check() {
            return Err(LexError::UnterminatedString { line });
        }
        let body = self.source_slice(start, self.pos);
        self.advance(); // closing quote
        Ok(Token::string(body, line))
    }
}

fn register_from_word(word: &str) -> Option<u8> {
    if let Some(rest) = word.strip_prefix('r') {
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = rest.parse::<u32>() {
                if index < 16 {
                    return Some(index as u8);
                }
            }
            return None;
        }
    }

    REGISTER_ALIASES.iter().find(|(name, _)| *name == word).map(|(_, index)| *index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::new(src).lex().unwrap()
    }

    #[test]
    fn registers_and_aliases() {
        let tokens = lex("r0 r15 sp lr fp ip pc");
        let regs: Vec<u8> = tokens.iter().map(|t| t.reg_index).collect();
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Register));
        assert_eq!(regs, vec![0, 15, 13, 14, 11, 12, 15]);
    }

    #[test]
    fn out_of_range_register_is_fatal() {
        let err = Lexer::new("r16").lex().unwrap_err();
        assert_eq!(err, LexError::InvalidRegisterIndex { text: "r16".into(), line: 1 });
    }

    #[test]
    fn identifier_starting_with_r_is_not_a_register() {
        let tokens = lex("result");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "result");
    }

    #[test]
    fn decimal_and_hex_immediates() {
        let tokens = lex("#10 #0x10");
        assert_eq!(tokens[0].value, 10);
        assert_eq!(tokens[1].value, 16);
    }

    #[test]
    fn char_literal_immediate() {
        let tokens = lex("#'A'");
        assert_eq!(tokens[0].value, b'A' as u64);
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = Lexer::new("\"abc").lex().unwrap_err();
        assert_eq!(err, LexError::UnterminatedString { line: 1 });
    }

    #[test]
    fn line_comment_is_skipped() {
        let tokens = lex("mov r0, #1 @ comment\nmov r1, #2");
        assert_eq!(tokens[tokens.len() - 1].line, 2);
    }

    #[test]
    fn bare_hex_digits_without_prefix_are_decimal() {
        let tokens = lex("#10");
        assert_eq!(tokens[0].value, 10);
    }
}
