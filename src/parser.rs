//! Parser for path source text.
//!
//! A small hand-rolled lexer feeds a recursive-descent parser that follows
//! the SQL/JSON path grammar: an optional `lax`/`strict` mode prefix, then
//! either an expression or a predicate. Context checks that the grammar
//! cannot express structurally are enforced here: `@` outside filters and
//! `last` outside array subscripts are rejected, as are unknown
//! `like_regex` flags.

use rust_decimal::Decimal;

use crate::ast::{AnyBounds, ArithOp, CmpOp, JsonPath, PathMode, PathOp, PathStep, Subscript};
use crate::engine::runtime::{Error, ErrorCode};

/// Compile path source text into a [`JsonPath`].
pub fn parse_path(text: &str) -> Result<JsonPath, Error> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        filter_depth: 0,
        subscript_depth: 0,
    };
    let mode = parser.parse_mode();
    let root = parser.parse_expr_or_pred()?;
    if !parser.at_end() {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(JsonPath { mode, root })
}

fn syntax(message: impl Into<String>) -> Error {
    Error::new(ErrorCode::Syntax, message)
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dollar,
    Variable(String),
    At,
    Dot,
    Star,
    StarStar,
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Question,
    Plus,
    Minus,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Ident(String),
    Str(String),
    Number(Decimal),
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_ident_cont(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

fn tokenize(text: &str) -> Result<Vec<Token>, Error> {
    let mut out = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '$' => {
                chars.next();
                match chars.peek() {
                    Some('"') => {
                        chars.next();
                        out.push(Token::Variable(lex_string(&mut chars)?));
                    }
                    Some(&c2) if is_ident_start(c2) => {
                        out.push(Token::Variable(lex_ident(&mut chars)));
                    }
                    _ => out.push(Token::Dollar),
                }
            }
            '@' => {
                chars.next();
                out.push(Token::At);
            }
            '.' => {
                chars.next();
                out.push(Token::Dot);
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push(Token::StarStar);
                } else {
                    out.push(Token::Star);
                }
            }
            '[' => {
                chars.next();
                out.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                out.push(Token::RBracket);
            }
            '(' => {
                chars.next();
                out.push(Token::LParen);
            }
            ')' => {
                chars.next();
                out.push(Token::RParen);
            }
            '{' => {
                chars.next();
                out.push(Token::LBrace);
            }
            '}' => {
                chars.next();
                out.push(Token::RBrace);
            }
            ',' => {
                chars.next();
                out.push(Token::Comma);
            }
            '?' => {
                chars.next();
                out.push(Token::Question);
            }
            '+' => {
                chars.next();
                out.push(Token::Plus);
            }
            '-' => {
                chars.next();
                out.push(Token::Minus);
            }
            '/' => {
                chars.next();
                out.push(Token::Slash);
            }
            '%' => {
                chars.next();
                out.push(Token::Percent);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    out.push(Token::Eq);
                } else {
                    return Err(syntax("unexpected \"=\"; comparison is spelled \"==\""));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    out.push(Token::Ne);
                } else {
                    out.push(Token::Bang);
                }
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        out.push(Token::Le);
                    }
                    Some('>') => {
                        chars.next();
                        out.push(Token::Ne);
                    }
                    _ => out.push(Token::Lt),
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    out.push(Token::Ge);
                } else {
                    out.push(Token::Gt);
                }
            }
            '&' => {
                chars.next();
                if chars.next() == Some('&') {
                    out.push(Token::AndAnd);
                } else {
                    return Err(syntax("unexpected \"&\"; conjunction is spelled \"&&\""));
                }
            }
            '|' => {
                chars.next();
                if chars.next() == Some('|') {
                    out.push(Token::OrOr);
                } else {
                    return Err(syntax("unexpected \"|\"; disjunction is spelled \"||\""));
                }
            }
            '"' => {
                chars.next();
                out.push(Token::Str(lex_string(&mut chars)?));
            }
            c if c.is_ascii_digit() => {
                out.push(Token::Number(lex_number(&mut chars)?));
            }
            c if is_ident_start(c) => {
                out.push(Token::Ident(lex_ident(&mut chars)));
            }
            other => return Err(syntax(format!("unexpected character \"{other}\""))),
        }
    }
    Ok(out)
}

fn lex_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut s = String::new();
    while let Some(&c) = chars.peek() {
        if is_ident_cont(c) {
            s.push(c);
            chars.next();
        } else {
            break;
        }
    }
    s
}

fn lex_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Decimal, Error> {
    let mut s = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            s.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if chars.peek() == Some(&'.') {
        // Consume the dot only when a fraction follows; otherwise it is a
        // method or member accessor on the literal.
        let mut probe = chars.clone();
        probe.next();
        if probe.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            chars.next();
            s.push('.');
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    s.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
        }
    }
    if matches!(chars.peek(), Some('e') | Some('E')) {
        let mut probe = chars.clone();
        probe.next();
        let mut exp = String::from("e");
        if matches!(probe.peek(), Some('+') | Some('-')) {
            exp.push(*probe.peek().unwrap());
            probe.next();
        }
        if probe.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            *chars = probe;
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    exp.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            s.push_str(&exp);
        }
    }
    s.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&s))
        .map_err(|_| syntax(format!("invalid numeric literal \"{s}\"")))
}

fn lex_string(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String, Error> {
    let mut s = String::new();
    loop {
        let c = chars
            .next()
            .ok_or_else(|| syntax("unterminated string literal"))?;
        match c {
            '"' => return Ok(s),
            '\\' => {
                let esc = chars
                    .next()
                    .ok_or_else(|| syntax("unterminated escape sequence"))?;
                match esc {
                    '"' => s.push('"'),
                    '\\' => s.push('\\'),
                    '/' => s.push('/'),
                    'b' => s.push('\u{8}'),
                    'f' => s.push('\u{c}'),
                    'n' => s.push('\n'),
                    'r' => s.push('\r'),
                    't' => s.push('\t'),
                    'v' => s.push('\u{b}'),
                    'u' => {
                        let cp = lex_unicode_escape(chars)?;
                        if (0xD800..0xDC00).contains(&cp) {
                            // High surrogate: a low surrogate escape must
                            // follow.
                            if chars.next() != Some('\\') || chars.next() != Some('u') {
                                return Err(syntax("unmatched UTF-16 surrogate pair"));
                            }
                            let low = lex_unicode_escape(chars)?;
                            if !(0xDC00..0xE000).contains(&low) {
                                return Err(syntax("unmatched UTF-16 surrogate pair"));
                            }
                            let combined =
                                0x10000 + ((cp - 0xD800) << 10) + (low - 0xDC00);
                            s.push(
                                char::from_u32(combined)
                                    .ok_or_else(|| syntax("invalid unicode escape"))?,
                            );
                        } else {
                            s.push(
                                char::from_u32(cp)
                                    .ok_or_else(|| syntax("invalid unicode escape"))?,
                            );
                        }
                    }
                    other => {
                        return Err(syntax(format!("unrecognized escape \"\\{other}\"")));
                    }
                }
            }
            other => s.push(other),
        }
    }
}

fn lex_unicode_escape(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<u32, Error> {
    let mut v = 0u32;
    for _ in 0..4 {
        let c = chars
            .next()
            .ok_or_else(|| syntax("truncated unicode escape"))?;
        let d = c
            .to_digit(16)
            .ok_or_else(|| syntax("invalid unicode escape"))?;
        v = v * 16 + d;
    }
    Ok(v)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    filter_depth: u32,
    subscript_depth: u32,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek2(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), Error> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(s)) if s == word => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn unexpected(&self, what: &str) -> Error {
        match self.peek() {
            Some(t) => syntax(format!("expected {what}, found {t:?}")),
            None => syntax(format!("expected {what} at end of input")),
        }
    }

    fn parse_mode(&mut self) -> PathMode {
        if self.eat_keyword("strict") {
            PathMode::Strict
        } else {
            self.eat_keyword("lax");
            PathMode::Lax
        }
    }

    // predicate / expression levels --------------------------------------

    fn parse_expr_or_pred(&mut self) -> Result<PathStep, Error> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<PathStep, Error> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            self.require_predicate(&left)?;
            self.require_predicate(&right)?;
            left = PathStep::new(PathOp::Or(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<PathStep, Error> {
        let mut left = self.parse_comparison()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_comparison()?;
            self.require_predicate(&left)?;
            self.require_predicate(&right)?;
            left = PathStep::new(PathOp::And(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn require_predicate(&self, step: &PathStep) -> Result<(), Error> {
        if step.is_predicate() && !step.has_next() {
            Ok(())
        } else {
            Err(syntax("expected a predicate"))
        }
    }

    fn parse_comparison(&mut self) -> Result<PathStep, Error> {
        if self.peek() == Some(&Token::Bang) {
            self.advance();
            let inner = self.parse_delimited_pred()?;
            return Ok(PathStep::new(PathOp::Not(Box::new(inner))));
        }
        if matches!(self.peek(), Some(Token::Ident(s)) if s == "exists")
            && self.peek2() == Some(&Token::LParen)
        {
            return self.parse_exists();
        }

        let left = self.parse_additive()?;

        let cmp = match self.peek() {
            Some(Token::Eq) => Some(CmpOp::Eq),
            Some(Token::Ne) => Some(CmpOp::Ne),
            Some(Token::Lt) => Some(CmpOp::Lt),
            Some(Token::Le) => Some(CmpOp::Le),
            Some(Token::Gt) => Some(CmpOp::Gt),
            Some(Token::Ge) => Some(CmpOp::Ge),
            _ => None,
        };
        if let Some(op) = cmp {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(PathStep::new(PathOp::Comparison(
                op,
                Box::new(left),
                Box::new(right),
            )));
        }

        if self.eat_keyword("like_regex") {
            let pattern = match self.advance() {
                Some(Token::Str(s)) => s.clone(),
                _ => return Err(syntax("expected a string pattern after like_regex")),
            };
            let flags = if self.eat_keyword("flag") {
                match self.advance() {
                    Some(Token::Str(s)) => s.clone(),
                    _ => return Err(syntax("expected a string after flag")),
                }
            } else {
                String::new()
            };
            for c in flags.chars() {
                if !matches!(c, 'i' | 's' | 'm' | 'x' | 'q') {
                    return Err(syntax(format!(
                        "unrecognized flag character \"{c}\" in like_regex predicate"
                    )));
                }
            }
            return Ok(PathStep::new(PathOp::LikeRegex {
                expr: Box::new(left),
                pattern,
                flags,
            }));
        }

        if self.eat_keyword("starts") {
            if !self.eat_keyword("with") {
                return Err(self.unexpected("\"with\" after \"starts\""));
            }
            let initial = match self.advance() {
                Some(Token::Str(s)) => PathStep::new(PathOp::String(s.clone())),
                Some(Token::Variable(v)) => PathStep::new(PathOp::Variable(v.clone())),
                _ => {
                    return Err(syntax(
                        "expected a string literal or variable after starts with",
                    ));
                }
            };
            return Ok(PathStep::new(PathOp::StartsWith(
                Box::new(left),
                Box::new(initial),
            )));
        }

        Ok(left)
    }

    fn parse_delimited_pred(&mut self) -> Result<PathStep, Error> {
        if matches!(self.peek(), Some(Token::Ident(s)) if s == "exists")
            && self.peek2() == Some(&Token::LParen)
        {
            return self.parse_exists();
        }
        self.expect(Token::LParen, "a parenthesized predicate")?;
        let inner = self.parse_expr_or_pred()?;
        self.expect(Token::RParen, "\")\"")?;
        self.require_predicate(&inner)?;
        Ok(self.maybe_is_unknown(inner))
    }

    fn parse_exists(&mut self) -> Result<PathStep, Error> {
        self.advance(); // exists
        self.expect(Token::LParen, "\"(\"")?;
        let arg = self.parse_expr_or_pred()?;
        self.expect(Token::RParen, "\")\"")?;
        let node = PathStep::new(PathOp::Exists(Box::new(arg)));
        Ok(self.maybe_is_unknown(node))
    }

    fn maybe_is_unknown(&mut self, node: PathStep) -> PathStep {
        if matches!(self.peek(), Some(Token::Ident(s)) if s == "is")
            && matches!(self.peek2(), Some(Token::Ident(s)) if s == "unknown")
            && node.is_predicate()
            && !node.has_next()
        {
            self.pos += 2;
            return PathStep::new(PathOp::IsUnknown(Box::new(node)));
        }
        node
    }

    // arithmetic levels ---------------------------------------------------

    fn parse_additive(&mut self) -> Result<PathStep, Error> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = PathStep::new(PathOp::Arith(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<PathStep, Error> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                Some(Token::Percent) => ArithOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = PathStep::new(PathOp::Arith(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<PathStep, Error> {
        match self.peek() {
            Some(Token::Plus) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(PathStep::new(PathOp::Plus(Box::new(operand))))
            }
            Some(Token::Minus) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(PathStep::new(PathOp::Minus(Box::new(operand))))
            }
            _ => self.parse_accessor_expr(),
        }
    }

    // accessor chains -----------------------------------------------------

    fn parse_accessor_expr(&mut self) -> Result<PathStep, Error> {
        let mut chain = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let step = self.parse_dot_accessor()?;
                    append_step(&mut chain, step);
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let step = self.parse_bracket_accessor()?;
                    append_step(&mut chain, step);
                }
                Some(Token::Question) => {
                    self.advance();
                    self.expect(Token::LParen, "\"(\"")?;
                    self.filter_depth += 1;
                    let pred = self.parse_expr_or_pred();
                    self.filter_depth -= 1;
                    let pred = pred?;
                    self.expect(Token::RParen, "\")\"")?;
                    self.require_predicate(&pred)?;
                    append_step(&mut chain, PathStep::new(PathOp::Filter(Box::new(pred))));
                }
                _ => break,
            }
        }
        Ok(chain)
    }

    fn parse_primary(&mut self) -> Result<PathStep, Error> {
        match self.advance().cloned() {
            Some(Token::Dollar) => Ok(PathStep::new(PathOp::Root)),
            Some(Token::Variable(name)) => Ok(PathStep::new(PathOp::Variable(name))),
            Some(Token::At) => {
                if self.filter_depth == 0 {
                    return Err(syntax("@ is not allowed in root expressions"));
                }
                Ok(PathStep::new(PathOp::Current))
            }
            Some(Token::Number(n)) => Ok(PathStep::new(PathOp::Numeric(n))),
            Some(Token::Str(s)) => Ok(PathStep::new(PathOp::String(s))),
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(PathStep::new(PathOp::Bool(true))),
                "false" => Ok(PathStep::new(PathOp::Bool(false))),
                "null" => Ok(PathStep::new(PathOp::Null)),
                "last" => {
                    if self.subscript_depth == 0 {
                        return Err(syntax("LAST is allowed only in array subscripts"));
                    }
                    Ok(PathStep::new(PathOp::Last))
                }
                other => Err(syntax(format!("unexpected identifier \"{other}\""))),
            },
            Some(Token::LParen) => {
                let inner = self.parse_expr_or_pred()?;
                self.expect(Token::RParen, "\")\"")?;
                Ok(self.maybe_is_unknown(inner))
            }
            Some(other) => Err(syntax(format!("unexpected token {other:?}"))),
            None => Err(syntax("unexpected end of input")),
        }
    }

    fn parse_dot_accessor(&mut self) -> Result<PathStep, Error> {
        match self.advance().cloned() {
            Some(Token::Star) => Ok(PathStep::new(PathOp::AnyKey)),
            Some(Token::StarStar) => {
                let bounds = self.parse_any_bounds()?;
                Ok(PathStep::new(PathOp::Any(bounds)))
            }
            Some(Token::Str(key)) => Ok(PathStep::new(PathOp::Key(key))),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.parse_method(&name)
                } else {
                    Ok(PathStep::new(PathOp::Key(name)))
                }
            }
            _ => Err(self.unexpected("a member accessor")),
        }
    }

    fn parse_any_bounds(&mut self) -> Result<AnyBounds, Error> {
        if !self.eat(&Token::LBrace) {
            return Ok(AnyBounds {
                first: Some(0),
                last: None,
            });
        }
        let first = self.parse_any_level()?;
        let last = if self.eat_keyword("to") {
            self.parse_any_level()?
        } else {
            first
        };
        self.expect(Token::RBrace, "\"}\"")?;
        Ok(AnyBounds { first, last })
    }

    fn parse_any_level(&mut self) -> Result<Option<u32>, Error> {
        if self.eat_keyword("last") {
            return Ok(None);
        }
        match self.advance() {
            Some(Token::Number(n)) => {
                let level = crate::engine::numeric::to_i32_truncated(*n)
                    .filter(|v| *v >= 0)
                    .ok_or_else(|| syntax("invalid .** level"))?;
                Ok(Some(level as u32))
            }
            _ => Err(syntax("expected an unsigned integer or last in .** bounds")),
        }
    }

    fn parse_bracket_accessor(&mut self) -> Result<PathStep, Error> {
        if self.eat(&Token::Star) {
            self.expect(Token::RBracket, "\"]\"")?;
            return Ok(PathStep::new(PathOp::AnyArray));
        }
        let mut subscripts = Vec::new();
        self.subscript_depth += 1;
        let result = (|| -> Result<(), Error> {
            loop {
                let from = self.parse_expr_or_pred()?;
                let to = if self.eat_keyword("to") {
                    Some(self.parse_expr_or_pred()?)
                } else {
                    None
                };
                subscripts.push(Subscript { from, to });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            Ok(())
        })();
        self.subscript_depth -= 1;
        result?;
        self.expect(Token::RBracket, "\"]\"")?;
        Ok(PathStep::new(PathOp::IndexArray(subscripts)))
    }

    fn parse_method(&mut self, name: &str) -> Result<PathStep, Error> {
        self.expect(Token::LParen, "\"(\"")?;
        let op = match name {
            "type" => self.no_args(PathOp::Type)?,
            "size" => self.no_args(PathOp::Size)?,
            "abs" => self.no_args(PathOp::Abs)?,
            "floor" => self.no_args(PathOp::Floor)?,
            "ceiling" => self.no_args(PathOp::Ceiling)?,
            "double" => self.no_args(PathOp::Double)?,
            "keyvalue" => self.no_args(PathOp::KeyValue)?,
            "bigint" => self.no_args(PathOp::Bigint)?,
            "integer" => self.no_args(PathOp::Integer)?,
            "boolean" => self.no_args(PathOp::Boolean)?,
            "number" => self.no_args(PathOp::Number)?,
            "string" => self.no_args(PathOp::StringFunc)?,
            "date" => self.no_args(PathOp::Date)?,
            "datetime" => {
                let template = if matches!(self.peek(), Some(Token::Str(_))) {
                    match self.advance().cloned() {
                        Some(Token::Str(s)) => Some(s),
                        _ => None,
                    }
                } else {
                    None
                };
                self.expect(Token::RParen, "\")\"")?;
                PathOp::Datetime(template)
            }
            "decimal" => {
                let mut precision = None;
                let mut scale = None;
                if self.peek() != Some(&Token::RParen) {
                    precision = Some(self.parse_signed_number()?);
                    if self.eat(&Token::Comma) {
                        scale = Some(self.parse_signed_number()?);
                    }
                }
                self.expect(Token::RParen, "\")\"")?;
                PathOp::Decimal { precision, scale }
            }
            "time" | "time_tz" | "timestamp" | "timestamp_tz" => {
                let precision = if self.peek() != Some(&Token::RParen) {
                    Some(self.parse_signed_number()?)
                } else {
                    None
                };
                self.expect(Token::RParen, "\")\"")?;
                match name {
                    "time" => PathOp::Time { precision },
                    "time_tz" => PathOp::TimeTz { precision },
                    "timestamp" => PathOp::Timestamp { precision },
                    _ => PathOp::TimestampTz { precision },
                }
            }
            other => {
                return Err(syntax(format!("unknown item method .{other}()")));
            }
        };
        Ok(PathStep::new(op))
    }

    fn no_args(&mut self, op: PathOp) -> Result<PathOp, Error> {
        self.expect(Token::RParen, "\")\"")?;
        Ok(op)
    }

    fn parse_signed_number(&mut self) -> Result<Decimal, Error> {
        let negative = if self.eat(&Token::Minus) {
            true
        } else {
            self.eat(&Token::Plus);
            false
        };
        match self.advance() {
            Some(Token::Number(n)) => Ok(if negative { -*n } else { *n }),
            _ => Err(syntax("expected a numeric method argument")),
        }
    }
}

/// Append `step` at the tail of an accessor chain.
fn append_step(chain: &mut PathStep, step: PathStep) {
    let mut tail = chain;
    while tail.next.is_some() {
        tail = tail.next.as_mut().expect("tail checked above");
    }
    tail.next = Some(Box::new(step));
}
