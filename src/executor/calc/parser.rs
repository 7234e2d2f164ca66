//! Line lexer and recursive-descent parser for the calc language
//!
//! One statement per line. Grammar, lowest precedence first:
//!
//! ```text
//! statement  := targets "=" exprs | exprs
//! targets    := IDENT ("," IDENT)*
//! exprs      := expr ("," expr)*
//! expr       := and ("or" and)*
//! and        := not ("and" not)*
//! not        := "not" not | comparison
//! comparison := additive (("==" | "!=" | "<" | "<=" | ">" | ">=") additive)?
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "//" | "%") unary)*
//! unary      := "-" unary | postfix
//! postfix    := primary ("[" expr "]")*
//! primary    := literal | IDENT | IDENT "(" args ")" | "(" exprs ")" | "[" args "]"
//! ```

use crate::executor::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Sym(Sym),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sym {
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign { targets: Vec<String>, value: Expr },
    Expr(Expr),
}

/// Split one line into tokens. Everything after `#` outside a string is a comment.
pub fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            break;
        }

        if c.is_ascii_digit() {
            let start = i;
            let mut is_float = false;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                is_float = true;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    is_float = true;
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            if is_float {
                let f = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", text))?;
                if !f.is_finite() {
                    return Err(format!("float literal out of range '{}'", text));
                }
                tokens.push(Token::Float(f));
            } else {
                let n = text
                    .parse::<i64>()
                    .map_err(|_| format!("integer literal out of range '{}'", text))?;
                tokens.push(Token::Int(n));
            }
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let mut s = String::new();
            i += 1;
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err("unterminated string literal".to_string());
                };
                i += 1;
                if ch == quote {
                    break;
                }
                if ch == '\\' {
                    let Some(&esc) = chars.get(i) else {
                        return Err("unterminated string literal".to_string());
                    };
                    i += 1;
                    s.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                } else {
                    s.push(ch);
                }
            }
            tokens.push(Token::Str(s));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (sym, width) = match (c, next) {
            ('/', Some('/')) => (Sym::SlashSlash, 2),
            ('=', Some('=')) => (Sym::EqEq, 2),
            ('!', Some('=')) => (Sym::NotEq, 2),
            ('<', Some('=')) => (Sym::Le, 2),
            ('>', Some('=')) => (Sym::Ge, 2),
            ('+', _) => (Sym::Plus, 1),
            ('-', _) => (Sym::Minus, 1),
            ('*', _) => (Sym::Star, 1),
            ('/', _) => (Sym::Slash, 1),
            ('%', _) => (Sym::Percent, 1),
            ('<', _) => (Sym::Lt, 1),
            ('>', _) => (Sym::Gt, 1),
            ('=', _) => (Sym::Assign, 1),
            (',', _) => (Sym::Comma, 1),
            ('(', _) => (Sym::LParen, 1),
            (')', _) => (Sym::RParen, 1),
            ('[', _) => (Sym::LBracket, 1),
            (']', _) => (Sym::RBracket, 1),
            _ => return Err(format!("unexpected character '{}'", c)),
        };
        tokens.push(Token::Sym(sym));
        i += width;
    }

    Ok(tokens)
}

/// Parse a tokenized, non-empty line into a statement
pub fn parse_statement(tokens: &[Token]) -> Result<Statement, String> {
    let mut depth = 0i32;
    let mut assign_at = None;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Sym(Sym::LParen | Sym::LBracket) => depth += 1,
            Token::Sym(Sym::RParen | Sym::RBracket) => depth -= 1,
            Token::Sym(Sym::Assign) if depth == 0 => {
                assign_at = Some(i);
                break;
            }
            _ => {}
        }
    }

    match assign_at {
        Some(at) => {
            let targets = parse_targets(&tokens[..at])?;
            let mut parser = Parser::new(&tokens[at + 1..]);
            let value = parser.exprs()?;
            parser.finish()?;
            Ok(Statement::Assign { targets, value })
        }
        None => {
            let mut parser = Parser::new(tokens);
            let expr = parser.exprs()?;
            parser.finish()?;
            Ok(Statement::Expr(expr))
        }
    }
}

fn parse_targets(tokens: &[Token]) -> Result<Vec<String>, String> {
    let mut targets = Vec::new();
    let mut expect_name = true;

    for token in tokens {
        match (token, expect_name) {
            (Token::Ident(name), true) if !is_keyword(name) => {
                targets.push(name.clone());
                expect_name = false;
            }
            (Token::Sym(Sym::Comma), false) => expect_name = true,
            _ => return Err("invalid assignment target".to_string()),
        }
    }

    if targets.is_empty() || expect_name {
        return Err("invalid assignment target".to_string());
    }
    Ok(targets)
}

fn is_keyword(name: &str) -> bool {
    matches!(name, "true" | "false" | "none" | "and" | "or" | "not")
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn eat_sym(&mut self, sym: Sym) -> bool {
        if self.peek() == Some(&Token::Sym(sym)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(name)) if name == keyword => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_sym(&mut self, sym: Sym, what: &str) -> Result<(), String> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(format!("expected {}", what))
        }
    }

    fn finish(&self) -> Result<(), String> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(format!("unexpected token {:?}", token)),
        }
    }

    fn exprs(&mut self) -> Result<Expr, String> {
        let first = self.expr()?;
        if !self.eat_sym(Sym::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        loop {
            items.push(self.expr()?);
            if !self.eat_sym(Sym::Comma) {
                break;
            }
        }
        Ok(Expr::List(items))
    }

    fn args(&mut self, close: Sym) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        if self.eat_sym(close) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat_sym(close) {
                return Ok(args);
            }
            self.expect_sym(Sym::Comma, "',' between arguments")?;
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            let right = self.and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            let right = self.not()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, String> {
        if self.eat_keyword("not") {
            let operand = self.not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::Sym(Sym::EqEq)) => BinOp::Eq,
            Some(Token::Sym(Sym::NotEq)) => BinOp::Ne,
            Some(Token::Sym(Sym::Lt)) => BinOp::Lt,
            Some(Token::Sym(Sym::Le)) => BinOp::Le,
            Some(Token::Sym(Sym::Gt)) => BinOp::Gt,
            Some(Token::Sym(Sym::Ge)) => BinOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expr, String> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym(Sym::Plus)) => BinOp::Add,
                Some(Token::Sym(Sym::Minus)) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym(Sym::Star)) => BinOp::Mul,
                Some(Token::Sym(Sym::Slash)) => BinOp::Div,
                Some(Token::Sym(Sym::SlashSlash)) => BinOp::FloorDiv,
                Some(Token::Sym(Sym::Percent)) => BinOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.eat_sym(Sym::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        while self.eat_sym(Sym::LBracket) {
            let index = self.expr()?;
            self.expect_sym(Sym::RBracket, "']'")?;
            expr = Expr::Index(Box::new(expr), Box::new(index));
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, String> {
        let token = self
            .peek()
            .ok_or_else(|| "unexpected end of line".to_string())?;
        self.pos += 1;

        match token {
            Token::Int(n) => Ok(Expr::Literal(Value::Int(*n))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(*f))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s.clone()))),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "none" => Ok(Expr::Literal(Value::None)),
                "and" | "or" | "not" => Err(format!("unexpected keyword '{}'", name)),
                _ => {
                    if self.eat_sym(Sym::LParen) {
                        let args = self.args(Sym::RParen)?;
                        Ok(Expr::Call(name.clone(), args))
                    } else {
                        Ok(Expr::Name(name.clone()))
                    }
                }
            },
            Token::Sym(Sym::LParen) => {
                let inner = self.exprs()?;
                self.expect_sym(Sym::RParen, "')'")?;
                Ok(inner)
            }
            Token::Sym(Sym::LBracket) => Ok(Expr::List(self.args(Sym::RBracket)?)),
            Token::Sym(sym) => Err(format!("unexpected symbol {:?}", sym)),
        }
    }
}
