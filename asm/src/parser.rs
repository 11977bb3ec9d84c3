//! Turns a token stream into [`Instruction`]s.
//!
//! The parser is a small backtracking matcher: `try_*` methods attempt a
//! production and restore the cursor on failure instead of validating ahead
//! of time, trying each instruction shape in turn until one sticks.

use metro_vcpu::{DataValue, Instruction, Operand, Width};

use crate::error::ParseError;
use crate::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn line(&self) -> u32 {
        self.peek().or_else(|| self.tokens.last()).map(|t| t.line).unwrap_or(0)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_kind_text(&mut self, kind: TokenKind, text: &str) -> bool {
        if self.peek().map_or(false, |t| t.is(kind, text)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_punct(&mut self, text: &str) -> bool {
        self.eat_kind_text(TokenKind::Punctuation, text)
    }

    fn try_register(&mut self) -> Option<u8> {
        if self.peek().map_or(false, |t| t.kind == TokenKind::Register) {
            let t = self.advance().unwrap();
            Some(t.reg_index)
        } else {
            None
        }
    }

    fn try_identifier(&mut self) -> Option<String> {
        if self.peek().map_or(false, |t| t.kind == TokenKind::Identifier) {
            Some(self.advance().unwrap().text)
        } else {
            None
        }
    }

    fn try_value(&mut self) -> Option<u64> {
        if self.peek().map_or(false, |t| t.kind == TokenKind::Value) {
            Some(self.advance().unwrap().value)
        } else {
            None
        }
    }

    fn require_punct(&mut self, text: &str) -> Result<(), ParseError> {
        if self.eat_punct(text) {
            Ok(())
        } else {
            Err(self.invalid_syntax())
        }
    }

    fn require_register(&mut self) -> Result<u8, ParseError> {
        self.try_register().ok_or_else(|| self.invalid_syntax())
    }

    fn invalid_syntax(&self) -> ParseError {
        let near = self.peek().map(|t| t.text.clone()).unwrap_or_else(|| "<eof>".into());
        ParseError::InvalidSyntax { near, line: self.line() }
    }

    /// Parses the whole token stream into a program.
    pub fn parse(mut self) -> Result<Vec<Instruction>, ParseError> {
        let mut instructions = Vec::new();
        while self.peek().is_some() {
            instructions.push(self.parse_line()?);
        }
        Ok(instructions)
    }

    fn parse_line(&mut self) -> Result<Instruction, ParseError> {
        if let Some(label) = self.try_label_def()? {
            return Ok(label);
        }
        if let Some(data) = self.try_data()? {
            return Ok(data);
        }

        let mnemonic = self.try_identifier().ok_or_else(|| self.invalid_syntax())?;

        if mnemonic.len() >= 3 && (mnemonic.starts_with("ldr") || mnemonic.starts_with("str")) {
            let is_load = mnemonic.starts_with("ldr");
            let width = self.width_from_suffix(&mnemonic)?;
            return self.parse_mem(is_load, width);
        }

        match mnemonic.as_str() {
            "mov" => self.parse_mov(),
            "cmp" => self.parse_cmp(),
            "add" => self.parse_alu(Instruction::Add),
            "sub" => self.parse_alu(Instruction::Sub),
            "mul" => self.parse_alu(Instruction::Mul),
            "div" => self.parse_alu(Instruction::Div),
            "mod" => self.parse_alu(Instruction::Mod),
            "lst" => self.parse_alu(Instruction::Lst),
            "rst" => self.parse_alu(Instruction::Rst),
            "push" => self.parse_reglist(true),
            "pop" => self.parse_reglist(false),
            "call" => self.parse_call(),
            "jmp" => self.parse_jump(),
            "jx" => self.parse_jumpx(),
            "sys" => self.parse_syscall(),
            _ => Err(ParseError::InvalidSyntax { near: mnemonic, line: self.line() }),
        }
    }

    fn width_from_suffix(&self, mnemonic: &str) -> Result<Width, ParseError> {
        if mnemonic.len() == 3 {
            return Ok(Width::Long);
        }
        match mnemonic.as_bytes()[3] {
            b'u' => Ok(Width::Long),
            b'w' => Ok(Width::Word),
            b'h' => Ok(Width::Half),
            b'b' => Ok(Width::Byte),
            _ => Err(ParseError::InvalidSyntax { near: mnemonic.to_string(), line: self.line() }),
        }
    }

    fn try_label_def(&mut self) -> Result<Option<Instruction>, ParseError> {
        let start = self.pos;
        if let Some(name) = self.try_identifier() {
            if self.eat_punct(":") {
                return Ok(Some(Instruction::Label { name }));
            }
        }
        self.pos = start;
        Ok(None)
    }

    fn try_data(&mut self) -> Result<Option<Instruction>, ParseError> {
        let start = self.pos;
        if !self.eat_punct(".") {
            self.pos = start;
            return Ok(None);
        }

        let type_name = self.try_identifier().ok_or_else(|| self.invalid_syntax())?;
        let line = self.line();

        let value = match type_name.as_str() {
            "byte" => {
                let v = self.require_immediate()?;
                if v > u8::MAX as u64 {
                    return Err(ParseError::ImmediateOverflow { value: v, line });
                }
                DataValue::Byte(v as u8)
            }
            "half" => {
                let v = self.require_immediate()?;
                if v > u16::MAX as u64 {
                    return Err(ParseError::ImmediateOverflow { value: v, line });
                }
                DataValue::Half(v as u16)
            }
            "word" => {
                let v = self.require_immediate()?;
                if v > u32::MAX as u64 {
                    return Err(ParseError::ImmediateOverflow { value: v, line });
                }
                DataValue::Word(v as u32)
            }
            "long" => {
                let v = self.require_immediate()?;
                DataValue::Long(v)
            }
            "string" => {
                if self.peek().map_or(false, |t| t.kind == TokenKind::String) {
                    let text = self.advance().unwrap().text;
                    let encoded: Vec<u16> =
                        text.encode_utf16().chain(std::iter::once(0)).collect();
                    DataValue::String(encoded)
                } else {
                    return Err(self.invalid_syntax());
                }
            }
            other => {
                return Err(ParseError::UnknownDataType { name: other.to_string(), line });
            }
        };

        Ok(Some(Instruction::Data { value }))
    }

    fn require_immediate(&mut self) -> Result<u64, ParseError> {
        self.try_value().ok_or_else(|| self.invalid_syntax())
    }

    fn parse_mov(&mut self) -> Result<Instruction, ParseError> {
        let rd = self.require_register()?;
        let (ra, operand) = self.parse_alu_operands(rd)?;
        // Mov only ever reads one source: an immediate, or `ra`. Unlike the
        // binary ALU mnemonics it never combines two registers, so a
        // register-operand match (which defaults to `rb`/`rd` in the shared
        // grammar) collapses back down to `ra` here.
        let src = match operand {
            Operand::Immediate(v) => Operand::Immediate(v),
            Operand::Register(_) => Operand::Register(ra),
        };
        Ok(Instruction::Mov { rd, src })
    }

    fn parse_cmp(&mut self) -> Result<Instruction, ParseError> {
        // The first register plays the role of `rd` in the shared grammar
        // below even though `Cmp` has no destination; it's what `ra` (and,
        // for the value-less register form, the implicit second operand)
        // default to when the production omits them.
        let first = self.require_register()?;
        let (ra, operand) = self.parse_alu_operands(first)?;
        Ok(Instruction::Cmp { ra, operand })
    }

    fn parse_alu(
        &mut self,
        build: fn(rd: u8, ra: u8, operand: Operand) -> Instruction,
    ) -> Result<Instruction, ParseError> {
        let rd = self.require_register()?;
        let (ra, operand) = self.parse_alu_operands(rd)?;
        Ok(build(rd, ra, operand))
    }

    /// Shared grammar for every ALU-family mnemonic (`mov, cmp, add, sub,
    /// mul, div, mod, lst, rst`), tried in this order against the tokens
    /// following `rd,`:
    ///
    /// 1. `rA, rB` -- three-register form.
    /// 2. `rA, #imm` -- two-register-plus-immediate form.
    /// 3. `#imm` -- immediate only; `ra` defaults to `rd`.
    /// 4. `rA` -- two-register form; the second operand defaults to `rd`.
    fn parse_alu_operands(&mut self, rd: u8) -> Result<(u8, Operand), ParseError> {
        self.require_punct(",")?;
        let checkpoint = self.pos;

        if let Some(ra) = self.try_register() {
            if self.eat_punct(",") {
                if let Some(rb) = self.try_register() {
                    return Ok((ra, Operand::Register(rb)));
                }
            }
        }
        self.pos = checkpoint;

        if let Some(ra) = self.try_register() {
            if self.eat_punct(",") {
                if let Some(v) = self.try_value() {
                    return Ok((ra, Operand::Immediate(v)));
                }
            }
        }
        self.pos = checkpoint;

        if let Some(v) = self.try_value() {
            return Ok((rd, Operand::Immediate(v)));
        }
        self.pos = checkpoint;

        if let Some(ra) = self.try_register() {
            return Ok((ra, Operand::Register(rd)));
        }

        Err(self.invalid_syntax())
    }

    /// `ldr`/`str` syntax is `<mnemonic> ra, [rb, #off], #postinc` -- both
    /// the offset and the post-increment are optional trailing `, #value`
    /// clauses, with no `!` marker.
    fn parse_mem(&mut self, is_load: bool, width: Width) -> Result<Instruction, ParseError> {
        let ra = self.require_register()?;
        self.require_punct(",")?;
        self.require_punct("[")?;
        let rb = self.require_register()?;

        let mut offset: u64 = 0;
        if self.eat_punct(",") {
            offset = self.require_immediate()?;
        }
        self.require_punct("]")?;

        let post_increment = if self.eat_punct(",") {
            self.require_immediate()?
        } else {
            0
        };

        if is_load {
            Ok(Instruction::Load { ra, rb, offset, post_increment, width })
        } else {
            Ok(Instruction::Store { ra, rb, offset, post_increment, width })
        }
    }

    fn parse_reglist(&mut self, is_push: bool) -> Result<Instruction, ParseError> {
        let line = self.line();
        self.require_punct("{")?;
        let mut reglist: u16 = 0;

        loop {
            let first = self.require_register()?;
            if self.eat_punct("-") {
                let last = self.require_register()?;
                if last < first {
                    return Err(ParseError::MalformedRange { line });
                }
                for r in first..=last {
                    reglist |= 1 << r;
                }
            } else {
                reglist |= 1 << first;
            }

            if self.eat_punct(",") {
                continue;
            }
            break;
        }

        self.require_punct("}")?;

        if reglist == 0 {
            return Err(ParseError::EmptyRegisterList { line });
        }

        if is_push {
            Ok(Instruction::Push { reglist })
        } else {
            Ok(Instruction::Pop { reglist })
        }
    }

    fn parse_call(&mut self) -> Result<Instruction, ParseError> {
        let label = self.try_identifier().ok_or_else(|| self.invalid_syntax())?;
        Ok(Instruction::Call { label })
    }

    fn parse_jump(&mut self) -> Result<Instruction, ParseError> {
        let label = self.try_identifier().ok_or_else(|| self.invalid_syntax())?;
        Ok(Instruction::Jump { label })
    }

    fn parse_jumpx(&mut self) -> Result<Instruction, ParseError> {
        let ra = self.require_register()?;
        Ok(Instruction::Jumpx { ra })
    }

    fn parse_syscall(&mut self) -> Result<Instruction, ParseError> {
        let number = self.require_immediate()?;
        Ok(Instruction::SysCall { number })
    }
}

/// Parses a whole program from a pre-lexed token stream.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Instruction>, ParseError> {
    Parser::new(tokens).parse()
}
