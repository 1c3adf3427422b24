//! Expression lexer and parser.
//!
//! The lexer is a single master regex over the expression text, with
//! leftmost-first alternation deciding the token class. Identifier-shaped
//! matches are classified afterwards so the boolean literals (case
//! insensitive, normalized to lowercase here), `None`, and the reserved
//! words win over plain identifiers.
//!
//! The parser is a recursive descent over the token list, one method per
//! precedence level, producing [`Expr`] trees. Filter chains and test
//! clauses attach at the `power` level, so they bind to the innermost
//! operand unless parentheses force otherwise — note the grammar has no
//! parenthesized-expression atom, matching the surface language.

use std::sync::OnceLock;

use regex::Regex;

use crate::ast::{Arg, BinOp, CmpOp, Expr, FilterCall, ForHeader, TestClause, UnaryOp};
use crate::error::{TemplateError, TemplateResult};
use crate::value::Value;

/// The class of an expression token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Str,
    Int,
    Float,
    Bool,
    NoneKw,
    Reserved,
    Op,
    Delim,
}

/// A classified expression token. String tokens carry their content with the
/// quotes stripped; boolean tokens carry lowercase `true`/`false`.
#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
}

/// Words that are never plain identifiers.
const RESERVED: [&str; 8] = ["or", "and", "is", "in", "not", "if", "elif", "else"];

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:",
            r"(?P<ws>\s+)",
            r"|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)",
            r#"|(?P<str>'[^']*'|"[^"]*")"#,
            r"|(?P<op>\*\*|//|<>|==|!=|<=|>=|[-+*/%,.=<>|~])",
            r"|(?P<delim>[()\[\]{}:])",
            r"|(?P<float>\d*\.\d+(?:[eE][-+]?\d+)?)",
            r"|(?P<int>\d+)",
            r")",
        ))
        .expect("expression token pattern is valid")
    })
}

/// Splits expression source text into classified tokens.
fn tokenize_expr(src: &str) -> TemplateResult<Vec<Token>> {
    let re = token_regex();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < src.len() {
        let rest = &src[pos..];
        let Some(caps) = re.captures(rest) else {
            return Err(lex_error(rest));
        };
        let matched = caps.get(0).expect("regex match has a whole-match group");
        pos += matched.end();

        if caps.name("ws").is_some() {
            continue;
        }
        let token = if let Some(m) = caps.name("ident") {
            classify_word(m.as_str())
        } else if let Some(m) = caps.name("str") {
            let text = m.as_str();
            Token {
                kind: TokenKind::Str,
                text: text[1..text.len() - 1].to_string(),
            }
        } else if let Some(m) = caps.name("op") {
            Token {
                kind: TokenKind::Op,
                text: m.as_str().to_string(),
            }
        } else if let Some(m) = caps.name("delim") {
            Token {
                kind: TokenKind::Delim,
                text: m.as_str().to_string(),
            }
        } else if let Some(m) = caps.name("float") {
            Token {
                kind: TokenKind::Float,
                text: m.as_str().to_string(),
            }
        } else {
            let m = caps.name("int").expect("one alternation group matched");
            Token {
                kind: TokenKind::Int,
                text: m.as_str().to_string(),
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

/// Classifies an identifier-shaped word into Bool, None, Reserved, or Ident.
fn classify_word(word: &str) -> Token {
    if word.eq_ignore_ascii_case("true") || word.eq_ignore_ascii_case("false") {
        Token {
            kind: TokenKind::Bool,
            text: word.to_ascii_lowercase(),
        }
    } else if word == "None" {
        Token {
            kind: TokenKind::NoneKw,
            text: word.to_string(),
        }
    } else if RESERVED.contains(&word) {
        Token {
            kind: TokenKind::Reserved,
            text: word.to_string(),
        }
    } else {
        Token {
            kind: TokenKind::Ident,
            text: word.to_string(),
        }
    }
}

fn lex_error(rest: &str) -> TemplateError {
    let snippet: String = rest.chars().take(12).collect();
    if rest.starts_with('\'') || rest.starts_with('"') {
        TemplateError::Lexical(format!("unterminated string literal at '{snippet}'"))
    } else {
        TemplateError::Lexical(format!("invalid character in expression at '{snippet}'"))
    }
}

/// Parses a complete expression (the `test` nonterminal).
///
/// # Errors
///
/// Returns a `Lexical` error for invalid expression text and a `Syntax`
/// error when the grammar is violated or tokens remain after the expression.
pub fn parse_expression(src: &str) -> TemplateResult<Expr> {
    let mut parser = ExprParser::new(tokenize_expr(src)?);
    let expr = parser.parse_test()?;
    parser.expect_end("expression")?;
    Ok(expr)
}

/// Parses the header of a `{% for %}` tag: targets, `in`, the expression
/// list, an optional `if` filter, and an optional `recursive` modifier.
///
/// # Errors
///
/// Returns a `Lexical` or `Syntax` error as for [`parse_expression`].
pub fn parse_for_header(src: &str) -> TemplateResult<ForHeader> {
    let mut parser = ExprParser::new(tokenize_expr(src)?);

    let mut targets = vec![parser.expect_ident("an assignment target")?];
    while parser.eat_op(",") {
        if parser.check_reserved("in") {
            break;
        }
        targets.push(parser.expect_ident("an assignment target")?);
    }

    if !parser.eat_reserved("in") {
        return Err(parser.unexpected("'in'"));
    }

    let mut iterable = vec![parser.parse_test()?];
    while parser.eat_op(",") {
        if parser.at_end() || parser.check_reserved("if") || parser.check_word("recursive") {
            break;
        }
        iterable.push(parser.parse_test()?);
    }

    let condition = if parser.eat_reserved("if") {
        Some(parser.parse_test()?)
    } else {
        None
    };
    let recursive = parser.eat_word("recursive");

    parser.expect_end("for header")?;
    Ok(ForHeader {
        targets,
        iterable,
        condition,
        recursive,
    })
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ── Cursor helpers ───────────────────────────────────────────────

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn check(&self, kind: TokenKind, text: &str) -> bool {
        matches!(self.peek(), Some(t) if t.kind == kind && t.text == text)
    }

    fn check_op(&self, op: &str) -> bool {
        self.check(TokenKind::Op, op)
    }

    fn check_delim(&self, delim: &str) -> bool {
        self.check(TokenKind::Delim, delim)
    }

    fn check_reserved(&self, word: &str) -> bool {
        self.check(TokenKind::Reserved, word)
    }

    fn check_word(&self, word: &str) -> bool {
        self.check(TokenKind::Ident, word)
    }

    fn eat(&mut self, kind: TokenKind, text: &str) -> bool {
        if self.check(kind, text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, op: &str) -> bool {
        self.eat(TokenKind::Op, op)
    }

    fn eat_delim(&mut self, delim: &str) -> bool {
        self.eat(TokenKind::Delim, delim)
    }

    fn eat_reserved(&mut self, word: &str) -> bool {
        self.eat(TokenKind::Reserved, word)
    }

    fn eat_word(&mut self, word: &str) -> bool {
        self.eat(TokenKind::Ident, word)
    }

    fn expect_ident(&mut self, what: &str) -> TemplateResult<String> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Ident => {
                let text = t.text.clone();
                self.pos += 1;
                Ok(text)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_delim(&mut self, delim: &str) -> TemplateResult<()> {
        if self.eat_delim(delim) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{delim}'")))
        }
    }

    fn expect_end(&self, what: &str) -> TemplateResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(TemplateError::Syntax(format!(
                "unexpected token '{}' after {what}",
                t.text
            ))),
        }
    }

    fn unexpected(&self, expected: &str) -> TemplateError {
        match self.peek() {
            Some(t) => TemplateError::Syntax(format!(
                "expected {expected}, found '{}'",
                t.text
            )),
            None => TemplateError::Syntax(format!(
                "expected {expected}, found end of expression"
            )),
        }
    }

    // ── Grammar, lowest precedence first ─────────────────────────────

    fn parse_test(&mut self) -> TemplateResult<Expr> {
        self.parse_or_test()
    }

    fn parse_or_test(&mut self) -> TemplateResult<Expr> {
        let first = self.parse_and_test()?;
        if !self.check_reserved("or") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat_reserved("or") {
            operands.push(self.parse_and_test()?);
        }
        Ok(Expr::Or(operands))
    }

    fn parse_and_test(&mut self) -> TemplateResult<Expr> {
        let first = self.parse_not_test()?;
        if !self.check_reserved("and") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat_reserved("and") {
            operands.push(self.parse_not_test()?);
        }
        Ok(Expr::And(operands))
    }

    fn parse_not_test(&mut self) -> TemplateResult<Expr> {
        if self.eat_reserved("not") {
            Ok(Expr::Not(Box::new(self.parse_not_test()?)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> TemplateResult<Expr> {
        let first = self.parse_expr()?;
        let mut rest = Vec::new();
        while let Some(op) = self.peek_cmp_op() {
            if op == CmpOp::NotIn {
                self.pos += 1; // the 'not'
            }
            self.pos += 1;
            rest.push((op, self.parse_expr()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    /// The comparison operator at the cursor, if any. `is` never appears
    /// here: the `power` level consumes it as a test clause first.
    fn peek_cmp_op(&self) -> Option<CmpOp> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Op => match t.text.as_str() {
                "<" => Some(CmpOp::Lt),
                ">" => Some(CmpOp::Gt),
                "==" => Some(CmpOp::Eq),
                "!=" | "<>" => Some(CmpOp::Ne),
                "<=" => Some(CmpOp::Le),
                ">=" => Some(CmpOp::Ge),
                _ => None,
            },
            Some(t) if t.kind == TokenKind::Reserved && t.text == "in" => Some(CmpOp::In),
            Some(t) if t.kind == TokenKind::Reserved && t.text == "not" => {
                match self.peek_at(1) {
                    Some(t2) if t2.kind == TokenKind::Reserved && t2.text == "in" => {
                        Some(CmpOp::NotIn)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn parse_expr(&mut self) -> TemplateResult<Expr> {
        let mut node = self.parse_arith_expr()?;
        loop {
            let op = if self.check_op("+") {
                BinOp::Add
            } else if self.check_op("-") {
                BinOp::Sub
            } else {
                break;
            };
            self.pos += 1;
            let rhs = self.parse_arith_expr()?;
            node = Expr::Binary {
                op,
                lhs: Box::new(node),
                rhs: Box::new(rhs),
            };
        }
        Ok(node)
    }

    fn parse_arith_expr(&mut self) -> TemplateResult<Expr> {
        let mut node = self.parse_factor()?;
        loop {
            let op = if self.check_op("*") {
                BinOp::Mul
            } else if self.check_op("/") {
                BinOp::Div
            } else if self.check_op("%") {
                BinOp::Mod
            } else if self.check_op("//") {
                BinOp::FloorDiv
            } else {
                break;
            };
            self.pos += 1;
            let rhs = self.parse_factor()?;
            node = Expr::Binary {
                op,
                lhs: Box::new(node),
                rhs: Box::new(rhs),
            };
        }
        Ok(node)
    }

    fn parse_factor(&mut self) -> TemplateResult<Expr> {
        let op = if self.check_op("+") {
            Some(UnaryOp::Plus)
        } else if self.check_op("-") {
            Some(UnaryOp::Minus)
        } else if self.check_op("~") {
            Some(UnaryOp::Invert)
        } else {
            None
        };
        match op {
            Some(op) => {
                self.pos += 1;
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(self.parse_factor()?),
                })
            }
            None => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> TemplateResult<Expr> {
        let mut node = self.parse_atom_expr()?;

        if self.eat_op("**") {
            let exponent = self.parse_factor()?;
            node = Expr::Binary {
                op: BinOp::Pow,
                lhs: Box::new(node),
                rhs: Box::new(exponent),
            };
        }

        let mut filters = Vec::new();
        while self.eat_op("|") {
            let name = self.expect_ident("a filter name")?;
            let args = if self.check_delim("(") {
                self.parse_arg_list()?
            } else {
                Vec::new()
            };
            filters.push(FilterCall { name, args });
        }

        let test = if self.eat_reserved("is") {
            let negated = self.eat_reserved("not");
            let name = self.expect_ident("a test name")?;
            let args = if self.check_delim("(") {
                self.parse_arg_list()?
            } else {
                Vec::new()
            };
            Some(TestClause {
                name,
                negated,
                args,
            })
        } else {
            None
        };

        if filters.is_empty() && test.is_none() {
            Ok(node)
        } else {
            Ok(Expr::Pipeline {
                input: Box::new(node),
                filters,
                test,
            })
        }
    }

    fn parse_atom_expr(&mut self) -> TemplateResult<Expr> {
        let mut node = self.parse_atom()?;
        loop {
            if self.check_delim("(") {
                let args = self.parse_arg_list()?;
                node = Expr::Call {
                    base: Box::new(node),
                    args,
                };
            } else if self.eat_op(".") {
                let name = self.expect_ident("an attribute name")?;
                node = Expr::Attr {
                    base: Box::new(node),
                    name,
                };
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_atom(&mut self) -> TemplateResult<Expr> {
        let Some(token) = self.peek() else {
            return Err(self.unexpected("an expression"));
        };
        match token.kind {
            TokenKind::Ident => {
                let name = token.text.clone();
                self.pos += 1;
                Ok(Expr::Name(name))
            }
            TokenKind::Str => {
                let text = token.text.clone();
                self.pos += 1;
                Ok(Expr::Literal(Value::Str(text)))
            }
            TokenKind::Int => {
                let text = token.text.clone();
                self.pos += 1;
                let parsed = text.parse::<i64>().map_err(|_| {
                    TemplateError::Lexical(format!("integer literal '{text}' is out of range"))
                })?;
                Ok(Expr::Literal(Value::Int(parsed)))
            }
            TokenKind::Float => {
                let text = token.text.clone();
                self.pos += 1;
                let parsed = text
                    .parse::<f64>()
                    .expect("the float token pattern only admits valid floats");
                Ok(Expr::Literal(Value::Float(parsed)))
            }
            TokenKind::Bool => {
                let truthy = token.text == "true";
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(truthy)))
            }
            TokenKind::NoneKw => {
                self.pos += 1;
                Ok(Expr::Literal(Value::None))
            }
            TokenKind::Delim if token.text == "[" => self.parse_list_display(),
            TokenKind::Delim if token.text == "{" => self.parse_dict_display(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_list_display(&mut self) -> TemplateResult<Expr> {
        self.expect_delim("[")?;
        let mut items = Vec::new();
        if self.eat_delim("]") {
            return Ok(Expr::List(items));
        }
        loop {
            items.push(self.parse_test()?);
            if self.eat_op(",") {
                if self.check_delim("]") {
                    break;
                }
                continue;
            }
            break;
        }
        self.expect_delim("]")?;
        Ok(Expr::List(items))
    }

    fn parse_dict_display(&mut self) -> TemplateResult<Expr> {
        self.expect_delim("{")?;
        let mut entries = Vec::new();
        if self.eat_delim("}") {
            return Ok(Expr::Dict(entries));
        }
        loop {
            let key = self.parse_test()?;
            self.expect_delim(":")?;
            let value = self.parse_test()?;
            entries.push((key, value));
            if self.eat_op(",") {
                if self.check_delim("}") {
                    break;
                }
                continue;
            }
            break;
        }
        self.expect_delim("}")?;
        Ok(Expr::Dict(entries))
    }

    fn parse_arg_list(&mut self) -> TemplateResult<Vec<Arg>> {
        self.expect_delim("(")?;
        let mut args = Vec::new();
        if self.eat_delim(")") {
            return Ok(args);
        }
        loop {
            args.push(self.parse_argument()?);
            if self.eat_op(",") {
                if self.check_delim(")") {
                    break;
                }
                continue;
            }
            break;
        }
        self.expect_delim(")")?;
        Ok(args)
    }

    fn parse_argument(&mut self) -> TemplateResult<Arg> {
        let named = matches!(self.peek(), Some(t) if t.kind == TokenKind::Ident)
            && matches!(self.peek_at(1), Some(t) if t.kind == TokenKind::Op && t.text == "=");
        if named {
            let name = self.expect_ident("a parameter name")?;
            self.pos += 1; // the '='
            let value = self.parse_test()?;
            Ok(Arg {
                name: Some(name),
                value,
            })
        } else {
            Ok(Arg {
                name: None,
                value: self.parse_test()?,
            })
        }
    }
}
