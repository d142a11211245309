//! Parse shader text into a `TranslationUnit`.
//!
//! Covers the language subset produced and consumed by the fuzzer and the
//! reducer. Interface blocks, local struct definitions and non-literal array
//! sizes are rejected with a parse error.

use std::collections::HashSet;

use super::*;
use crate::GlFuzzError;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(String),
    UInt(String),
    Float(String),
    Punct(&'static str),
    Directive(String),
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
    column: usize,
}

const PUNCTS: &[&str] = &[
    "<<=", ">>=", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "^^", "+=", "-=",
    "*=", "/=", "%=", "&=", "^=", "|=", "+", "-", "*", "/", "%", "<", ">", "=", "!", "~", "&",
    "|", "^", "?", ":", ";", ",", ".", "(", ")", "{", "}", "[", "]",
];

const WEBGL_HINT: &str = "//WebGL";

struct Lexer<'s> {
    src: &'s str,
    pos: usize,
    line: usize,
    column: usize,
    webgl: bool,
}

impl<'s> Lexer<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
            webgl: false,
        }
    }

    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self, n: usize) {
        for c in self.src[self.pos..self.pos + n].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos += n;
    }

    fn error(&self, message: String) -> GlFuzzError {
        GlFuzzError::Parse {
            line: self.line,
            column: self.column,
            message,
        }
    }

    /// Whether only blanks precede the current position on its line.
    fn at_line_start(&self) -> bool {
        self.src[..self.pos]
            .rsplit('\n')
            .next()
            .map(|l| l.trim().is_empty())
            .unwrap_or(true)
    }

    fn tokenize(mut self) -> Result<(Vec<Token>, bool), GlFuzzError> {
        let mut tokens = vec![];
        loop {
            self.skip_blanks_and_comments()?;
            let (line, column) = (self.line, self.column);
            let c = match self.peek_char() {
                Some(c) => c,
                None => {
                    tokens.push(Token {
                        tok: Tok::Eof,
                        line,
                        column,
                    });
                    return Ok((tokens, self.webgl));
                }
            };
            let tok = if c == '#' && self.at_line_start() {
                self.directive()
            } else if c.is_ascii_alphabetic() || c == '_' {
                let len = self
                    .rest()
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(self.rest().len());
                let word = self.rest()[..len].to_string();
                self.advance(len);
                Tok::Ident(word)
            } else if c.is_ascii_digit()
                || (c == '.' && self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()))
            {
                self.number()?
            } else if let Some(p) = PUNCTS.iter().find(|p| self.rest().starts_with(**p)) {
                self.advance(p.len());
                Tok::Punct(p)
            } else {
                return Err(self.error(format!("unexpected character `{c}`")));
            };
            tokens.push(Token { tok, line, column });
        }
    }

    fn skip_blanks_and_comments(&mut self) -> Result<(), GlFuzzError> {
        loop {
            let rest = self.rest();
            if let Some(c) = rest.chars().next().filter(|c| c.is_whitespace()) {
                self.advance(c.len_utf8());
            } else if rest.starts_with("//") {
                let len = rest.find('\n').unwrap_or(rest.len());
                if rest[..len].trim_end() == WEBGL_HINT {
                    self.webgl = true;
                }
                self.advance(len);
            } else if rest.starts_with("/*") {
                let len = rest
                    .find("*/")
                    .ok_or_else(|| self.error("unterminated comment".to_string()))?;
                self.advance(len + 2);
            } else {
                return Ok(());
            }
        }
    }

    /// A preprocessor line, joined across `\` continuations.
    fn directive(&mut self) -> Tok {
        let mut text = String::new();
        loop {
            let rest = self.rest();
            let len = rest.find('\n').unwrap_or(rest.len());
            let line = rest[..len].trim_end();
            self.advance(len);
            match line.strip_suffix('\\') {
                Some(head) => {
                    text.push_str(head);
                    text.push('\n');
                    if self.peek_char() == Some('\n') {
                        self.advance(1);
                    }
                }
                None => {
                    text.push_str(line);
                    return Tok::Directive(text);
                }
            }
        }
    }

    fn number(&mut self) -> Result<Tok, GlFuzzError> {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let mut len = 0;
        if rest.starts_with("0x") || rest.starts_with("0X") {
            len = 2;
            while len < bytes.len() && bytes[len].is_ascii_hexdigit() {
                len += 1;
            }
        } else {
            let mut is_float = false;
            while len < bytes.len() && bytes[len].is_ascii_digit() {
                len += 1;
            }
            if len < bytes.len() && bytes[len] == b'.' {
                is_float = true;
                len += 1;
                while len < bytes.len() && bytes[len].is_ascii_digit() {
                    len += 1;
                }
            }
            if len < bytes.len() && (bytes[len] == b'e' || bytes[len] == b'E') {
                let mut end = len + 1;
                if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
                    end += 1;
                }
                if end < bytes.len() && bytes[end].is_ascii_digit() {
                    is_float = true;
                    len = end;
                    while len < bytes.len() && bytes[len].is_ascii_digit() {
                        len += 1;
                    }
                }
            }
            if len < bytes.len() && (bytes[len] == b'f' || bytes[len] == b'F') {
                len += 1;
                let text = rest[..len].to_string();
                self.advance(len);
                return Ok(Tok::Float(text));
            }
            if is_float {
                let text = rest[..len].to_string();
                self.advance(len);
                return Ok(Tok::Float(text));
            }
        }
        if len < bytes.len() && (bytes[len] == b'u' || bytes[len] == b'U') {
            len += 1;
            let text = rest[..len].to_string();
            self.advance(len);
            return Ok(Tok::UInt(text));
        }
        if len < bytes.len() && (bytes[len].is_ascii_alphabetic() || bytes[len] == b'_') {
            return Err(self.error(format!("malformed number `{}`", &rest[..=len])));
        }
        let text = rest[..len].to_string();
        self.advance(len);
        Ok(Tok::Int(text))
    }
}

/// Parse a shader of the given stage.
pub fn parse(source: &str, kind: ShaderKind) -> Result<TranslationUnit, GlFuzzError> {
    let (tokens, webgl) = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        toks: tokens,
        pos: 0,
        structs: HashSet::new(),
    };
    let mut tu = TranslationUnit::new(kind, None);
    if let Tok::Directive(text) = parser.peek() {
        if let Some(v) = text.trim().strip_prefix("#version") {
            tu.version = Some(ShadingLanguageVersion::from_version_string(v.trim(), webgl)?);
            parser.bump();
        }
    }
    parser.translation_unit(&mut tu)?;
    Ok(tu)
}

/// Parse a single expression, e.g. a condition or an initializer.
pub fn parse_expr(source: &str) -> Result<Expr, GlFuzzError> {
    let (tokens, _) = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        toks: tokens,
        pos: 0,
        structs: HashSet::new(),
    };
    let e = parser.expr()?;
    parser.expect_eof()?;
    Ok(e)
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
    structs: HashSet<String>,
}

type PResult<T> = Result<T, GlFuzzError>;

impl Parser {
    fn peek(&self) -> &Tok {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Tok {
        let i = (self.pos + n).min(self.toks.len() - 1);
        &self.toks[i].tok
    }

    fn bump(&mut self) -> Tok {
        let t = self.toks[self.pos].tok.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn error(&self, message: impl Into<String>) -> GlFuzzError {
        let t = &self.toks[self.pos];
        GlFuzzError::Parse {
            line: t.line,
            column: t.column,
            message: message.into(),
        }
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Tok::Punct(q) if *q == p)
    }

    fn is_punct_at(&self, n: usize, p: &str) -> bool {
        matches!(self.peek_at(n), Tok::Punct(q) if *q == p)
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(self.peek(), Tok::Ident(x) if x == w)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.bump();
            return true;
        }
        false
    }

    fn expect_punct(&mut self, p: &str) -> PResult<()> {
        if self.eat_punct(p) {
            return Ok(());
        }
        Err(self.error(format!("expected `{p}`, found {}", self.describe())))
    }

    fn expect_word(&mut self, w: &str) -> PResult<()> {
        if self.is_word(w) {
            self.bump();
            return Ok(());
        }
        Err(self.error(format!("expected `{w}`, found {}", self.describe())))
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.bump();
                Ok(name)
            }
            _ => Err(self.error(format!("expected identifier, found {}", self.describe()))),
        }
    }

    fn expect_eof(&self) -> PResult<()> {
        match self.peek() {
            Tok::Eof => Ok(()),
            _ => Err(self.error(format!("unexpected {}", self.describe()))),
        }
    }

    fn describe(&self) -> String {
        match self.peek() {
            Tok::Ident(s) | Tok::Int(s) | Tok::UInt(s) | Tok::Float(s) => format!("`{s}`"),
            Tok::Punct(p) => format!("`{p}`"),
            Tok::Directive(d) => format!("directive `{d}`"),
            Tok::Eof => "end of input".to_string(),
        }
    }

    fn type_name_at(&self, n: usize) -> Option<TypeRef> {
        let name = match self.peek_at(n) {
            Tok::Ident(name) => name,
            _ => return None,
        };
        if name == "void" {
            return Some(TypeRef::void());
        }
        if let Some(b) = BasicType::from_name(name) {
            return Some(TypeRef::basic(b));
        }
        if let Some(o) = opaque_type_name(name) {
            return Some(TypeRef::opaque(o));
        }
        if self.structs.contains(name) {
            return Some(TypeRef::struct_named(name));
        }
        None
    }

    fn is_qualifier_at(&self, n: usize) -> bool {
        match self.peek_at(n) {
            Tok::Ident(w) => w == "layout" || TypeQualifier::from_keyword(w).is_some(),
            _ => false,
        }
    }

    fn qualifiers(&mut self) -> PResult<Vec<TypeQualifier>> {
        let mut qualifiers = vec![];
        loop {
            if self.is_word("layout") {
                self.bump();
                self.expect_punct("(")?;
                let mut text = String::new();
                loop {
                    match self.bump() {
                        Tok::Punct(")") => break,
                        Tok::Punct(",") => text.push_str(", "),
                        Tok::Eof => return Err(self.error("unterminated layout qualifier")),
                        Tok::Ident(s) | Tok::Int(s) | Tok::UInt(s) | Tok::Float(s) => {
                            push_word(&mut text, &s)
                        }
                        Tok::Punct(p) => push_word(&mut text, p),
                        Tok::Directive(_) => {
                            return Err(self.error("directive inside layout qualifier"))
                        }
                    }
                }
                qualifiers.push(TypeQualifier::Layout(text));
                continue;
            }
            let q = match self.peek() {
                Tok::Ident(w) => TypeQualifier::from_keyword(w),
                _ => None,
            };
            match q {
                Some(q) => {
                    self.bump();
                    qualifiers.push(q);
                }
                None => return Ok(qualifiers),
            }
        }
    }

    fn type_specifier(&mut self) -> PResult<TypeRef> {
        if let Some(t) = self.type_name_at(0) {
            self.bump();
            return Ok(t);
        }
        if matches!(self.peek(), Tok::Ident(_)) && self.is_punct_at(1, "{") {
            return Err(self.error("interface blocks are not supported"));
        }
        Err(self.error(format!("expected type, found {}", self.describe())))
    }

    fn array_info(&mut self) -> PResult<Option<ArrayInfo>> {
        if !self.eat_punct("[") {
            return Ok(None);
        }
        if self.eat_punct("]") {
            return Ok(Some(ArrayInfo::Unsized));
        }
        let size = match self.peek().clone() {
            Tok::Int(text) | Tok::UInt(text) => parse_int_literal(&text)
                .ok_or_else(|| self.error(format!("bad array size `{text}`")))?,
            _ => return Err(self.error("array sizes must be integer literals")),
        };
        self.bump();
        self.expect_punct("]")?;
        Ok(Some(ArrayInfo::Sized(size)))
    }

    fn translation_unit(&mut self, tu: &mut TranslationUnit) -> PResult<()> {
        loop {
            match self.peek().clone() {
                Tok::Eof => return Ok(()),
                Tok::Directive(text) => {
                    if text.trim_start().starts_with("#version") {
                        return Err(self.error("`#version` must come first"));
                    }
                    self.bump();
                    tu.decls.push(Decl::Directive(text));
                }
                Tok::Punct(";") => {
                    self.bump();
                }
                Tok::Ident(w) if w == "precision" => {
                    self.bump();
                    let precision = match self.qualifiers()?.as_slice() {
                        [q] if q.is_precision() => q.clone(),
                        _ => return Err(self.error("expected precision qualifier")),
                    };
                    let ty = self.type_specifier()?;
                    self.expect_punct(";")?;
                    tu.decls.push(Decl::Precision { precision, ty });
                }
                _ => self.external_declaration(tu)?,
            }
        }
    }

    fn external_declaration(&mut self, tu: &mut TranslationUnit) -> PResult<()> {
        let qualifiers = self.qualifiers()?;
        if self.is_word("struct") {
            let def = self.struct_definition()?;
            let ty = TypeRef::qualified(qualifiers, TypeRef::struct_named(&def.name));
            tu.decls.push(Decl::Struct(def));
            if self.eat_punct(";") {
                return Ok(());
            }
            let decl = self.declarators(ty)?;
            self.expect_punct(";")?;
            tu.decls.push(Decl::Variables(decl));
            return Ok(());
        }
        let ty = TypeRef::qualified(qualifiers, self.type_specifier()?);
        if matches!(self.peek(), Tok::Ident(_)) && self.is_punct_at(1, "(") {
            let name = self.expect_ident()?;
            let params = self.parameters()?;
            let prototype = FunctionPrototype::new(&name, ty, params);
            if self.eat_punct(";") {
                tu.decls.push(Decl::Prototype(prototype));
                return Ok(());
            }
            let body = self.compound(false)?;
            tu.decls
                .push(Decl::Function(FunctionDefinition::new(prototype, body)));
            return Ok(());
        }
        if self.eat_punct(";") {
            // A bare qualified type, e.g. `layout(local_size_x = 1) in;`.
            tu.decls.push(Decl::Variables(VariablesDeclaration::new(ty, vec![])));
            return Ok(());
        }
        let decl = self.declarators(ty)?;
        self.expect_punct(";")?;
        tu.decls.push(Decl::Variables(decl));
        Ok(())
    }

    fn struct_definition(&mut self) -> PResult<StructDefinition> {
        self.expect_word("struct")?;
        let name = match self.peek() {
            Tok::Ident(_) => self.expect_ident()?,
            _ => return Err(self.error("anonymous structs are not supported")),
        };
        self.expect_punct("{")?;
        let mut fields = vec![];
        while !self.eat_punct("}") {
            let qualifiers = self.qualifiers()?;
            let base = TypeRef::qualified(qualifiers, self.type_specifier()?);
            loop {
                let field = self.expect_ident()?;
                let ty = match self.array_info()? {
                    Some(a) => TypeRef::array(base, a.size()),
                    None => base,
                };
                fields.push(StructField { name: field, ty });
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct(";")?;
        }
        self.structs.insert(name.clone());
        Ok(StructDefinition { name, fields })
    }

    fn parameters(&mut self) -> PResult<Vec<ParameterDecl>> {
        self.expect_punct("(")?;
        let mut params = vec![];
        if self.eat_punct(")") {
            return Ok(params);
        }
        if self.is_word("void") && self.is_punct_at(1, ")") {
            self.bump();
            self.bump();
            return Ok(params);
        }
        loop {
            let qualifiers = self.qualifiers()?;
            let ty = TypeRef::qualified(qualifiers, self.type_specifier()?);
            let name = match self.peek() {
                Tok::Ident(_) => Some(self.expect_ident()?),
                _ => None,
            };
            let array = self.array_info()?;
            params.push(ParameterDecl { name, ty, array });
            if self.eat_punct(")") {
                return Ok(params);
            }
            self.expect_punct(",")?;
        }
    }

    fn declarators(&mut self, base_type: TypeRef) -> PResult<VariablesDeclaration> {
        let mut decls = vec![];
        loop {
            let name = self.expect_ident()?;
            let array = self.array_info()?;
            let initializer = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            let mut info = VariableDeclInfo::new(&name, initializer);
            info.array = array;
            decls.push(info);
            if !self.eat_punct(",") {
                return Ok(VariablesDeclaration::new(base_type, decls));
            }
        }
    }

    fn compound(&mut self, new_scope: bool) -> PResult<Block> {
        self.expect_punct("{")?;
        let mut stmts = vec![];
        while !self.eat_punct("}") {
            if matches!(self.peek(), Tok::Eof) {
                return Err(self.error("unexpected end of input inside block"));
            }
            stmts.push(self.statement()?);
        }
        Ok(Block { stmts, new_scope })
    }

    fn is_declaration_start(&self) -> bool {
        if self.is_word("struct") {
            return true;
        }
        if self.is_qualifier_at(0) {
            return true;
        }
        self.type_name_at(0).is_some() && matches!(self.peek_at(1), Tok::Ident(_))
    }

    fn declaration_statement(&mut self) -> PResult<Stmt> {
        if self.is_word("struct") {
            return Err(self.error("struct definitions inside functions are not supported"));
        }
        let qualifiers = self.qualifiers()?;
        let ty = TypeRef::qualified(qualifiers, self.type_specifier()?);
        let decl = self.declarators(ty)?;
        self.expect_punct(";")?;
        Ok(Stmt::decl(decl))
    }

    /// Body of a `for` or `while`; its scope is opened by the loop itself.
    fn loop_body(&mut self) -> PResult<Stmt> {
        if self.is_punct("{") {
            return Ok(Stmt::new(StmtKind::Block(self.compound(false)?)));
        }
        self.statement()
    }

    fn statement(&mut self) -> PResult<Stmt> {
        if self.is_punct("{") {
            return Ok(Stmt::new(StmtKind::Block(self.compound(true)?)));
        }
        if self.eat_punct(";") {
            return Ok(Stmt::new(StmtKind::Null));
        }
        if let Tok::Directive(_) = self.peek() {
            return Err(self.error("preprocessor directives inside functions are not supported"));
        }
        let word = match self.peek() {
            Tok::Ident(w) => w.clone(),
            _ => return self.expression_statement(),
        };
        let kind = match word.as_str() {
            "if" => {
                self.bump();
                self.expect_punct("(")?;
                let cond = self.expr()?;
                self.expect_punct(")")?;
                let then_stmt = Box::new(self.statement()?);
                let else_stmt = if self.is_word("else") {
                    self.bump();
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                StmtKind::If {
                    cond,
                    then_stmt,
                    else_stmt,
                }
            }
            "for" => {
                self.bump();
                self.expect_punct("(")?;
                let init = if self.eat_punct(";") {
                    Stmt::new(StmtKind::Null)
                } else if self.is_declaration_start() {
                    self.declaration_statement()?
                } else {
                    self.expression_statement()?
                };
                let cond = if self.is_punct(";") {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect_punct(";")?;
                let inc = if self.is_punct(")") {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect_punct(")")?;
                StmtKind::For {
                    init: Box::new(init),
                    cond,
                    inc,
                    body: Box::new(self.loop_body()?),
                }
            }
            "while" => {
                self.bump();
                self.expect_punct("(")?;
                let cond = self.expr()?;
                self.expect_punct(")")?;
                StmtKind::While {
                    cond,
                    body: Box::new(self.loop_body()?),
                }
            }
            "do" => {
                self.bump();
                let body = Box::new(self.statement()?);
                self.expect_word("while")?;
                self.expect_punct("(")?;
                let cond = self.expr()?;
                self.expect_punct(")")?;
                self.expect_punct(";")?;
                StmtKind::Do { body, cond }
            }
            "switch" => {
                self.bump();
                self.expect_punct("(")?;
                let expr = self.expr()?;
                self.expect_punct(")")?;
                StmtKind::Switch {
                    expr,
                    body: self.compound(true)?,
                }
            }
            "case" => {
                self.bump();
                let e = self.expr()?;
                self.expect_punct(":")?;
                StmtKind::Case(Some(e))
            }
            "default" => {
                self.bump();
                self.expect_punct(":")?;
                StmtKind::Case(None)
            }
            "break" | "continue" | "discard" => {
                self.bump();
                self.expect_punct(";")?;
                match word.as_str() {
                    "break" => StmtKind::Break,
                    "continue" => StmtKind::Continue,
                    _ => StmtKind::Discard,
                }
            }
            "return" => {
                self.bump();
                if self.eat_punct(";") {
                    StmtKind::Return(None)
                } else {
                    let e = self.expr()?;
                    self.expect_punct(";")?;
                    StmtKind::Return(Some(e))
                }
            }
            _ if self.is_declaration_start() => return self.declaration_statement(),
            _ => return self.expression_statement(),
        };
        Ok(Stmt::new(kind))
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let e = self.expr()?;
        self.expect_punct(";")?;
        Ok(Stmt::expr(e))
    }

    fn expr(&mut self) -> PResult<Expr> {
        let mut e = self.assignment()?;
        while self.eat_punct(",") {
            let rhs = self.assignment()?;
            e = Expr::binary(BinOp::Comma, e, rhs);
        }
        Ok(e)
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let lhs = self.conditional()?;
        let op = match self.peek() {
            Tok::Punct(p) => BinOp::from_text(p).filter(|op| op.is_assignment()),
            _ => None,
        };
        match op {
            Some(op) => {
                self.bump();
                let rhs = self.assignment()?;
                Ok(Expr::binary(op, lhs, rhs))
            }
            None => Ok(lhs),
        }
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let cond = self.binary(BinOp::LOr.precedence())?;
        if !self.eat_punct("?") {
            return Ok(cond);
        }
        let then_expr = self.expr()?;
        self.expect_punct(":")?;
        let else_expr = self.assignment()?;
        Ok(Expr::new(ExprKind::Ternary {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        }))
    }

    fn binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Punct(p) => BinOp::from_text(p)
                    .filter(|op| !op.is_assignment() && *op != BinOp::Comma),
                _ => None,
            };
            let op = match op {
                Some(op) if op.precedence() >= min_prec => op,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.binary(op.precedence() + 1)?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            Tok::Punct("++") => Some(UnOp::PreInc),
            Tok::Punct("--") => Some(UnOp::PreDec),
            Tok::Punct("+") => Some(UnOp::Plus),
            Tok::Punct("-") => Some(UnOp::Minus),
            Tok::Punct("!") => Some(UnOp::LNot),
            Tok::Punct("~") => Some(UnOp::BitNot),
            _ => None,
        };
        match op {
            Some(op) => {
                self.bump();
                let e = self.unary()?;
                Ok(Expr::unary(op, e))
            }
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut e = self.primary()?;
        loop {
            if self.eat_punct("[") {
                let index = self.expr()?;
                self.expect_punct("]")?;
                e = Expr::index(e, index);
            } else if self.eat_punct(".") {
                let field = self.expect_ident()?;
                if self.is_punct("(") {
                    return Err(self.error("method calls are not supported"));
                }
                e = Expr::member(e, &field);
            } else if self.eat_punct("++") {
                e = Expr::unary(UnOp::PostInc, e);
            } else if self.eat_punct("--") {
                e = Expr::unary(UnOp::PostDec, e);
            } else {
                return Ok(e);
            }
        }
    }

    fn arguments(&mut self) -> PResult<Vec<Expr>> {
        self.expect_punct("(")?;
        let mut args = vec![];
        if self.eat_punct(")") {
            return Ok(args);
        }
        if self.is_word("void") && self.is_punct_at(1, ")") {
            self.bump();
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.assignment()?);
            if self.eat_punct(")") {
                return Ok(args);
            }
            self.expect_punct(",")?;
        }
    }

    fn primary(&mut self) -> PResult<Expr> {
        match self.peek().clone() {
            Tok::Int(text) => {
                self.bump();
                Ok(Expr::new(ExprKind::Int(text)))
            }
            Tok::UInt(text) => {
                self.bump();
                Ok(Expr::new(ExprKind::UInt(text)))
            }
            Tok::Float(text) => {
                self.bump();
                Ok(Expr::new(ExprKind::Float(text)))
            }
            Tok::Punct("(") => {
                self.bump();
                let e = self.expr()?;
                self.expect_punct(")")?;
                Ok(Expr::paren(e))
            }
            Tok::Ident(word) => {
                if word == "true" || word == "false" {
                    self.bump();
                    return Ok(Expr::boolean(word == "true"));
                }
                if let Some(ty) = self.type_name_at(0) {
                    self.bump();
                    let ty = match self.array_info()? {
                        Some(a) => TypeRef::array(ty, a.size()),
                        None => ty,
                    };
                    let args = self.arguments()?;
                    return Ok(Expr::constructor(ty, args));
                }
                self.bump();
                if self.is_punct("(") {
                    let args = self.arguments()?;
                    return Ok(Expr::call(&word, args));
                }
                Ok(Expr::var(&word))
            }
            _ => Err(self.error(format!("expected expression, found {}", self.describe()))),
        }
    }
}

fn push_word(text: &mut String, word: &str) {
    if !text.is_empty() && !text.ends_with(' ') {
        text.push(' ');
    }
    text.push_str(word);
}

/// Value of an integer literal such as `12`, `0x1F`, `017` or `3u`.
pub fn parse_int_literal(text: &str) -> Option<u32> {
    let t = text.trim_end_matches(|c| c == 'u' || c == 'U');
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).ok();
    }
    if t.len() > 1 && t.starts_with('0') {
        return u32::from_str_radix(&t[1..], 8).ok();
    }
    t.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr_shape(src: &str) -> String {
        fn shape(e: &Expr) -> String {
            match &e.kind {
                ExprKind::Binary { op, lhs, rhs } => format!("[{} {op} {}]", shape(lhs), shape(rhs)),
                ExprKind::Unary { op, expr } if op.is_postfix() => format!("[{}{op}]", shape(expr)),
                ExprKind::Unary { op, expr } => format!("[{op}{}]", shape(expr)),
                ExprKind::Ternary {
                    cond,
                    then_expr,
                    else_expr,
                } => format!("[{} ? {} : {}]", shape(cond), shape(then_expr), shape(else_expr)),
                _ => render_expr(e),
            }
        }
        shape(&parse_expr(src).unwrap())
    }

    #[test]
    fn test_precedence() {
        assert_eq!(expr_shape("a + b * c"), "[a + [b * c]]");
        assert_eq!(expr_shape("a = b = c"), "[a = [b = c]]");
        assert_eq!(expr_shape("a || b && c"), "[a || [b && c]]");
        assert_eq!(expr_shape("a - b - c"), "[[a - b] - c]");
        assert_eq!(expr_shape("-a++"), "[-[a++]]");
        assert_eq!(expr_shape("a ? b : c = d"), "[a ? b : [c = d]]");
        assert_eq!(expr_shape("a < b == c > d"), "[[a < b] == [c > d]]");
        assert_eq!(expr_shape("a, b = 1"), "[a , [b = 1]]");
    }

    #[test]
    fn test_parse_declarations() {
        let tu = parse(
            "#version 310 es
            #define FOO 1
            precision mediump float;
            struct S { int a, b; vec2 c[2]; } s1, s2;
            uniform vec2 injectionSwitch;
            int f(int x);
            int f(int x) { return x; }
            void main() { S t = S(1, 2, vec2[2](vec2(1.0), vec2(2.0))); float q = .5e1; uint u = 0x1Fu; }",
            ShaderKind::Fragment,
        )
        .unwrap();
        assert_eq!(tu.version, Some(ShadingLanguageVersion::Essl310));
        assert_eq!(tu.decls.len(), 8);
        assert!(matches!(&tu.decls[0], Decl::Directive(d) if d == "#define FOO 1"));
        let s = tu.struct_definition("S").unwrap();
        assert_eq!(s.fields.len(), 3);
        assert_eq!(s.fields[2].ty, TypeRef::array(TypeRef::basic(BasicType::Vec2), Some(2)));
        let globals: Vec<_> = tu.global_variables().collect();
        assert_eq!(globals[0].decls.len(), 2);
        assert!(matches!(tu.decls[5], Decl::Prototype(_)));
    }

    #[test]
    fn test_parse_errors_have_locations() {
        let err = parse("void main() {\n  int x = ;\n}", ShaderKind::Fragment).unwrap_err();
        match err {
            GlFuzzError::Parse { line, column, .. } => {
                assert_eq!(line, 2);
                assert_eq!(column, 11);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(parse("uniform Buf { int x; } b;", ShaderKind::Fragment).is_err());
        assert!(parse("void main() { struct T { int a; } t; }", ShaderKind::Fragment).is_err());
    }

    #[test]
    fn test_parse_int_literal() {
        assert_eq!(parse_int_literal("10"), Some(10));
        assert_eq!(parse_int_literal("0x10"), Some(16));
        assert_eq!(parse_int_literal("010"), Some(8));
        assert_eq!(parse_int_literal("7u"), Some(7));
        assert_eq!(parse_int_literal("0"), Some(0));
    }
}
