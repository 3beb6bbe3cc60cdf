//! Recursive-descent parser with precedence climbing.
//!
//! Expressions follow the ladder (lowest to highest): comma, yield,
//! assignment, conditional, nullish/logical-or, logical-and, bitwise or/xor/
//! and, equality, relational, shift, additive, multiplicative,
//! exponentiation, unary, postfix, left-hand-side, primary.
//!
//! Arrow functions are disambiguated by checkpointing the lexer, attempting a
//! parameter-list parse, and rewinding on failure — the same trick the lexer's
//! checkpoint machinery exists for. Semicolons are optional terminators; the
//! parser never requires one where a statement boundary is otherwise clear.

use crate::{
    ast::{
        Argument, BinaryOp, CatchClause, ClassLiteral, ClassMember, ClassMemberKind, Expr, ExprKind, ExportSpecifier,
        FunctionLiteral, ImportDeclaration, ImportSpecifier, LogicalOp, MemberKey, ObjectProperty, Param,
        PropertyKind, PropertyName, Span, Stat, StatKind, SwitchCase, UnaryOp, UpdateOp, ValueCategory, VarDeclarator,
        VarKind,
    },
    error::SyntaxError,
    lexer::Lexer,
    token::{Token, TokenKind, TokenValue},
};

/// Result alias for parser operations.
pub(crate) type ParseResult<T> = Result<T, SyntaxError>;

/// A parsed module body with import declarations bucketed for
/// ahead-of-execution resolution.
#[derive(Debug)]
pub(crate) struct Program {
    pub body: Vec<Stat>,
    /// All import declarations, in source order. The statements also remain
    /// in `body` so binding code is emitted in place.
    pub imports: Vec<ImportDeclaration>,
}

pub(crate) struct Parser<'src> {
    lexer: Lexer<'src>,
    /// End position of the most recently consumed token.
    last_end: u32,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            lexer: Lexer::new(source),
            last_end: 0,
        }
    }

    /// Parses a whole module: statements until EOF.
    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut body = Vec::new();
        let mut imports = Vec::new();
        while self.peek_kind()? != TokenKind::Eof {
            let stat = self.parse_statement()?;
            if let StatKind::Import(decl) = &stat.kind {
                imports.push(decl.clone());
            }
            body.push(stat);
        }
        Ok(Program { body, imports })
    }

    // --- token plumbing ---

    fn peek_kind(&mut self) -> ParseResult<TokenKind> {
        self.lexer.peek_kind()
    }

    fn peek_is_ident(&mut self, text: &str) -> ParseResult<bool> {
        Ok(self.lexer.peek()?.is_ident(text))
    }

    fn next(&mut self) -> ParseResult<Token> {
        let token = self.lexer.next()?;
        self.last_end = token.end;
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        let token = self.lexer.expect(kind)?;
        self.last_end = token.end;
        Ok(token)
    }

    fn eat(&mut self, kind: TokenKind) -> ParseResult<bool> {
        if self.peek_kind()? == kind {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn pos(&mut self) -> ParseResult<u32> {
        self.lexer.token_pos()
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.last_end)
    }

    fn unexpected(&mut self, context: &str) -> ParseResult<SyntaxError> {
        let token = self.lexer.peek()?;
        let kind: &'static str = token.kind.into();
        Ok(SyntaxError::new(format!("unexpected {kind} {context}"), token.pos))
    }

    /// Consumes an identifier token and returns its text.
    fn expect_ident(&mut self) -> ParseResult<(String, Span)> {
        let token = self.expect(TokenKind::Identifier)?;
        let span = Span::new(token.pos, token.end);
        match token.value {
            TokenValue::Str(name) => Ok((name, span)),
            _ => Err(SyntaxError::new("identifier has no text", token.pos)),
        }
    }

    /// Eats a statement-terminating semicolon if present. Terminators are
    /// optional; block ends and EOF delimit statements on their own.
    fn eat_semicolon(&mut self) -> ParseResult<()> {
        self.eat(TokenKind::Semicolon)?;
        Ok(())
    }

    /// Skips an optional `: Type` annotation. Types have no runtime
    /// semantics; nested brackets are balanced and discarded.
    fn skip_type_annotation(&mut self) -> ParseResult<()> {
        if !self.eat(TokenKind::Colon)? {
            return Ok(());
        }
        self.skip_type_expression()
    }

    /// Discards tokens forming one type expression: stops at `,`, `;`, `)`,
    /// `}`, `=`, `=>`, or EOF at bracket depth zero.
    fn skip_type_expression(&mut self) -> ParseResult<()> {
        let mut depth = 0u32;
        loop {
            let kind = self.peek_kind()?;
            match kind {
                TokenKind::LParen | TokenKind::LBrace | TokenKind::LBrack | TokenKind::Lt => depth += 1,
                TokenKind::RParen | TokenKind::RBrace | TokenKind::RBrack | TokenKind::Gt => {
                    if depth == 0 {
                        return Ok(());
                    }
                    depth -= 1;
                }
                TokenKind::Comma | TokenKind::Semicolon | TokenKind::Assign | TokenKind::Arrow | TokenKind::Eof => {
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
            self.next()?;
        }
    }

    // --- statements ---

    fn parse_statement(&mut self) -> ParseResult<Stat> {
        let start = self.pos()?;
        match self.peek_kind()? {
            TokenKind::Let => self.parse_var_decl(VarKind::Let, false),
            TokenKind::Const => self.parse_var_decl(VarKind::Const, false),
            TokenKind::Var => self.parse_var_decl(VarKind::Var, false),
            TokenKind::Function => self.parse_function_decl(false, false),
            TokenKind::Class => self.parse_class_decl(false),
            TokenKind::LBrace => {
                self.next()?;
                let body = self.parse_statement_list(TokenKind::RBrace)?;
                self.expect(TokenKind::RBrace)?;
                Ok(Stat::new(self.span_from(start), StatKind::Block(body)))
            }
            TokenKind::Semicolon => {
                self.next()?;
                Ok(Stat::new(self.span_from(start), StatKind::Empty))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Throw => {
                self.next()?;
                let expr = self.parse_expression()?;
                self.eat_semicolon()?;
                Ok(Stat::new(self.span_from(start), StatKind::Throw(expr)))
            }
            TokenKind::Return => {
                self.next()?;
                let value = if matches!(
                    self.peek_kind()?,
                    TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
                ) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.eat_semicolon()?;
                Ok(Stat::new(self.span_from(start), StatKind::Return(value)))
            }
            TokenKind::Break => {
                self.next()?;
                let label = self.parse_optional_label()?;
                self.eat_semicolon()?;
                Ok(Stat::new(self.span_from(start), StatKind::Break { label }))
            }
            TokenKind::Continue => {
                self.next()?;
                let label = self.parse_optional_label()?;
                self.eat_semicolon()?;
                Ok(Stat::new(self.span_from(start), StatKind::Continue { label }))
            }
            TokenKind::Import => {
                // `import(expr)` is a dynamic-import expression statement.
                if self.lexer.peek_n(2)?.kind == TokenKind::LParen {
                    self.parse_expression_statement()
                } else {
                    self.parse_import_decl()
                }
            }
            TokenKind::Export => self.parse_export_decl(),
            TokenKind::Identifier => {
                // `async function` declaration.
                if self.peek_is_ident("async")? && self.lexer.peek_n(2)?.kind == TokenKind::Function {
                    self.next()?;
                    return self.parse_function_decl(false, true);
                }
                // Labelled statement: `name: stat`.
                if self.lexer.peek_n(2)?.kind == TokenKind::Colon {
                    let (label, _) = self.expect_ident()?;
                    self.expect(TokenKind::Colon)?;
                    let body = Box::new(self.parse_statement()?);
                    return Ok(Stat::new(self.span_from(start), StatKind::Labeled { label, body }));
                }
                // Type alias: `type Name = ...;` — parsed, non-semantic.
                if self.peek_is_ident("type")?
                    && self.lexer.peek_n(2)?.kind == TokenKind::Identifier
                    && self.lexer.peek_n(3)?.kind == TokenKind::Assign
                {
                    self.next()?;
                    let (name, _) = self.expect_ident()?;
                    self.expect(TokenKind::Assign)?;
                    self.skip_type_expression()?;
                    self.eat_semicolon()?;
                    return Ok(Stat::new(self.span_from(start), StatKind::TypeAlias { name }));
                }
                self.parse_expression_statement()
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_statement_list(&mut self, end: TokenKind) -> ParseResult<Vec<Stat>> {
        let mut body = Vec::new();
        while self.peek_kind()? != end && self.peek_kind()? != TokenKind::Eof {
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Stat> {
        let start = self.pos()?;
        let expr = self.parse_expression()?;
        self.eat_semicolon()?;
        Ok(Stat::new(self.span_from(start), StatKind::Expression(expr)))
    }

    fn parse_optional_label(&mut self) -> ParseResult<Option<String>> {
        if self.peek_kind()? == TokenKind::Identifier {
            let (name, _) = self.expect_ident()?;
            Ok(Some(name))
        } else {
            Ok(None)
        }
    }

    fn parse_var_decl(&mut self, kind: VarKind, exported: bool) -> ParseResult<Stat> {
        let start = self.pos()?;
        self.next()?;
        let mut declarations = Vec::new();
        loop {
            let (name, name_span) = self.expect_ident()?;
            self.skip_type_annotation()?;
            let init = if self.eat(TokenKind::Assign)? {
                Some(self.parse_assignment()?)
            } else {
                if kind == VarKind::Const {
                    return Err(SyntaxError::new(
                        "missing initialiser in const declaration",
                        name_span.start,
                    ));
                }
                None
            };
            declarations.push(VarDeclarator {
                name,
                init,
                span: self.span_from(name_span.start),
            });
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.eat_semicolon()?;
        Ok(Stat::new(
            self.span_from(start),
            StatKind::VarDecl {
                kind,
                declarations,
                exported,
            },
        ))
    }

    fn parse_function_decl(&mut self, exported: bool, is_async: bool) -> ParseResult<Stat> {
        let start = self.pos()?;
        self.expect(TokenKind::Function)?;
        let is_generator = self.eat(TokenKind::Star)?;
        let (name, _) = self.expect_ident()?;
        let function = self.parse_function_rest(Some(name.clone()), is_generator, is_async, start)?;
        Ok(Stat::new(
            self.span_from(start),
            StatKind::FunctionDecl {
                name,
                function: Box::new(function),
                exported,
            },
        ))
    }

    /// Parses `(params) { body }` after the name position.
    fn parse_function_rest(
        &mut self,
        name: Option<String>,
        is_generator: bool,
        is_async: bool,
        start: u32,
    ) -> ParseResult<FunctionLiteral> {
        let params = self.parse_param_list()?;
        self.skip_type_annotation()?;
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_statement_list(TokenKind::RBrace)?;
        self.expect(TokenKind::RBrace)?;
        Ok(FunctionLiteral {
            name,
            params,
            body,
            is_arrow: false,
            is_generator,
            is_async,
            span: self.span_from(start),
        })
    }

    fn parse_param_list(&mut self) -> ParseResult<Vec<Param>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while self.peek_kind()? != TokenKind::RParen {
            let (name, span) = self.expect_ident()?;
            self.skip_type_annotation()?;
            params.push(Param { name, span });
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_class_decl(&mut self, exported: bool) -> ParseResult<Stat> {
        let start = self.pos()?;
        let class = self.parse_class_literal()?;
        let Some(name) = class.name.clone() else {
            return Err(SyntaxError::new("class declaration requires a name", start));
        };
        Ok(Stat::new(
            self.span_from(start),
            StatKind::ClassDecl {
                name,
                class: Box::new(class),
                exported,
            },
        ))
    }

    fn parse_class_literal(&mut self) -> ParseResult<ClassLiteral> {
        let start = self.pos()?;
        self.expect(TokenKind::Class)?;
        let name = if self.peek_kind()? == TokenKind::Identifier {
            Some(self.expect_ident()?.0)
        } else {
            None
        };
        let super_class = if self.eat(TokenKind::Extends)? {
            Some(Box::new(self.parse_lhs_expression()?))
        } else {
            None
        };
        self.expect(TokenKind::LBrace)?;
        let mut members = Vec::new();
        while self.peek_kind()? != TokenKind::RBrace {
            if self.eat(TokenKind::Semicolon)? {
                continue;
            }
            members.push(self.parse_class_member()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(ClassLiteral {
            name,
            super_class,
            members,
            span: self.span_from(start),
        })
    }

    fn parse_class_member(&mut self) -> ParseResult<ClassMember> {
        let start = self.pos()?;

        let is_static = self.peek_is_ident("static")?
            && !matches!(self.lexer.peek_n(2)?.kind, TokenKind::LParen | TokenKind::Assign);
        if is_static {
            self.next()?;
        }

        let is_async = self.peek_is_ident("async")?
            && !matches!(self.lexer.peek_n(2)?.kind, TokenKind::LParen | TokenKind::Assign);
        if is_async {
            self.next()?;
        }
        let is_generator = self.eat(TokenKind::Star)?;

        // Accessors: `get name() {}` / `set name(v) {}`.
        let accessor = if !is_generator
            && (self.peek_is_ident("get")? || self.peek_is_ident("set")?)
            && !matches!(self.lexer.peek_n(2)?.kind, TokenKind::LParen | TokenKind::Assign)
        {
            let (word, _) = self.expect_ident()?;
            Some(word)
        } else {
            None
        };

        let key = self.parse_property_name()?;

        if let Some(accessor) = accessor {
            let function = self.parse_function_rest(None, false, false, start)?;
            let kind = if accessor == "get" {
                ClassMemberKind::Getter(function)
            } else {
                ClassMemberKind::Setter(function)
            };
            return Ok(ClassMember {
                key,
                kind,
                is_static,
                span: self.span_from(start),
            });
        }

        match self.peek_kind()? {
            TokenKind::LParen => {
                let function = self.parse_function_rest(None, is_generator, is_async, start)?;
                let kind = if !is_static && matches!(&key, PropertyName::Static(name) if name == "constructor") {
                    ClassMemberKind::Constructor(function)
                } else {
                    ClassMemberKind::Method(function)
                };
                Ok(ClassMember {
                    key,
                    kind,
                    is_static,
                    span: self.span_from(start),
                })
            }
            TokenKind::Assign => {
                self.next()?;
                let init = self.parse_assignment()?;
                self.eat_semicolon()?;
                Ok(ClassMember {
                    key,
                    kind: ClassMemberKind::Field(Some(init)),
                    is_static,
                    span: self.span_from(start),
                })
            }
            _ => {
                self.skip_type_annotation()?;
                self.eat_semicolon()?;
                Ok(ClassMember {
                    key,
                    kind: ClassMemberKind::Field(None),
                    is_static,
                    span: self.span_from(start),
                })
            }
        }
    }

    fn parse_property_name(&mut self) -> ParseResult<PropertyName> {
        match self.peek_kind()? {
            TokenKind::Identifier => Ok(PropertyName::Static(self.expect_ident()?.0)),
            TokenKind::StringLiteral => {
                let token = self.next()?;
                Ok(PropertyName::Static(token.value.expect_str().to_owned()))
            }
            TokenKind::IntLiteral => {
                let token = self.next()?;
                match token.value {
                    TokenValue::Int(v) => Ok(PropertyName::Static(v.to_string())),
                    _ => Err(SyntaxError::new("malformed numeric property name", token.pos)),
                }
            }
            TokenKind::LBrack => {
                self.next()?;
                let expr = self.parse_assignment()?;
                self.expect(TokenKind::RBrack)?;
                Ok(PropertyName::Computed(Box::new(expr)))
            }
            _ => Err(self.unexpected("in property name")?),
        }
    }

    fn parse_if(&mut self) -> ParseResult<Stat> {
        let start = self.pos()?;
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat(TokenKind::Else)? {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stat::new(
            self.span_from(start),
            StatKind::If {
                test,
                consequent,
                alternate,
            },
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Stat> {
        let start = self.pos()?;
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stat::new(self.span_from(start), StatKind::While { test, body }))
    }

    fn parse_do_while(&mut self) -> ParseResult<Stat> {
        let start = self.pos()?;
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.parse_statement()?);
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.eat_semicolon()?;
        Ok(Stat::new(self.span_from(start), StatKind::DoWhile { body, test }))
    }

    /// Parses `for (...)`: C-style, for-in, or for-of, detected after the
    /// init clause.
    fn parse_for(&mut self) -> ParseResult<Stat> {
        let start = self.pos()?;
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::LParen)?;

        // for-in / for-of with a declaration: `for (let x in/of e)`.
        let decl_kind = match self.peek_kind()? {
            TokenKind::Let => Some(VarKind::Let),
            TokenKind::Const => Some(VarKind::Const),
            TokenKind::Var => Some(VarKind::Var),
            _ => None,
        };
        if let Some(kind) = decl_kind
            && self.lexer.peek_n(2)?.kind == TokenKind::Identifier
        {
            let after_name = self.lexer.peek_n(3)?;
            if after_name.kind == TokenKind::In || after_name.is_ident("of") {
                self.next()?;
                let (binding, _) = self.expect_ident()?;
                let is_in = self.next()?.kind == TokenKind::In;
                return self.parse_for_in_of(start, Some(kind), binding, is_in);
            }
        }
        // for-in / for-of over an existing binding: `for (x in/of e)`.
        if decl_kind.is_none() && self.peek_kind()? == TokenKind::Identifier {
            let after_name = self.lexer.peek_n(2)?;
            if after_name.kind == TokenKind::In || after_name.is_ident("of") {
                let (binding, _) = self.expect_ident()?;
                let is_in = self.next()?.kind == TokenKind::In;
                return self.parse_for_in_of(start, None, binding, is_in);
            }
        }

        // C-style for.
        let init = match self.peek_kind()? {
            TokenKind::Semicolon => {
                self.next()?;
                None
            }
            TokenKind::Let => Some(Box::new(self.parse_var_decl(VarKind::Let, false)?)),
            TokenKind::Const => Some(Box::new(self.parse_var_decl(VarKind::Const, false)?)),
            TokenKind::Var => Some(Box::new(self.parse_var_decl(VarKind::Var, false)?)),
            _ => {
                let stat = self.parse_expression_statement()?;
                Some(Box::new(stat))
            }
        };
        // `parse_var_decl`/`parse_expression_statement` already consumed the
        // separating semicolon when present.
        let test = if self.peek_kind()? == TokenKind::Semicolon {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon)?;
        let update = if self.peek_kind()? == TokenKind::RParen {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stat::new(
            self.span_from(start),
            StatKind::For {
                init,
                test,
                update,
                body,
            },
        ))
    }

    fn parse_for_in_of(
        &mut self,
        start: u32,
        decl_kind: Option<VarKind>,
        binding: String,
        is_in: bool,
    ) -> ParseResult<Stat> {
        let expr = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        let kind = if is_in {
            StatKind::ForIn {
                decl_kind,
                binding,
                object: expr,
                body,
            }
        } else {
            StatKind::ForOf {
                decl_kind,
                binding,
                iterable: expr,
                body,
            }
        };
        Ok(Stat::new(self.span_from(start), kind))
    }

    fn parse_switch(&mut self) -> ParseResult<Stat> {
        let start = self.pos()?;
        self.expect(TokenKind::Switch)?;
        self.expect(TokenKind::LParen)?;
        let discriminant = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while self.peek_kind()? != TokenKind::RBrace {
            let test = if self.eat(TokenKind::Case)? {
                let test = self.parse_expression()?;
                Some(test)
            } else {
                let token = self.expect(TokenKind::Default)?;
                if seen_default {
                    return Err(SyntaxError::new("duplicate default clause in switch", token.pos));
                }
                seen_default = true;
                None
            };
            self.expect(TokenKind::Colon)?;
            let mut body = Vec::new();
            while !matches!(
                self.peek_kind()?,
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
            ) {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Stat::new(
            self.span_from(start),
            StatKind::Switch { discriminant, cases },
        ))
    }

    fn parse_try(&mut self) -> ParseResult<Stat> {
        let start = self.pos()?;
        self.expect(TokenKind::Try)?;
        self.expect(TokenKind::LBrace)?;
        let block = self.parse_statement_list(TokenKind::RBrace)?;
        self.expect(TokenKind::RBrace)?;

        let catch = if self.eat(TokenKind::Catch)? {
            let param = if self.eat(TokenKind::LParen)? {
                let (name, _) = self.expect_ident()?;
                self.expect(TokenKind::RParen)?;
                Some(name)
            } else {
                None
            };
            self.expect(TokenKind::LBrace)?;
            let body = self.parse_statement_list(TokenKind::RBrace)?;
            self.expect(TokenKind::RBrace)?;
            Some(CatchClause { param, body })
        } else {
            None
        };

        let finally = if self.eat(TokenKind::Finally)? {
            self.expect(TokenKind::LBrace)?;
            let body = self.parse_statement_list(TokenKind::RBrace)?;
            self.expect(TokenKind::RBrace)?;
            Some(body)
        } else {
            None
        };

        if catch.is_none() && finally.is_none() {
            return Err(SyntaxError::new("try statement requires catch or finally", start));
        }
        Ok(Stat::new(
            self.span_from(start),
            StatKind::Try { block, catch, finally },
        ))
    }

    fn parse_import_decl(&mut self) -> ParseResult<Stat> {
        let start = self.pos()?;
        self.expect(TokenKind::Import)?;

        let mut default_binding = None;
        let mut namespace_binding = None;
        let mut named = Vec::new();

        if self.peek_kind()? == TokenKind::StringLiteral {
            // Side-effect import: `import "m";`
            let token = self.next()?;
            let specifier = token.value.expect_str().to_owned();
            self.eat_semicolon()?;
            let span = self.span_from(start);
            return Ok(Stat::new(
                span,
                StatKind::Import(ImportDeclaration {
                    specifier,
                    default_binding: None,
                    namespace_binding: None,
                    named: Vec::new(),
                    span,
                }),
            ));
        }

        if self.peek_kind()? == TokenKind::Identifier && !self.peek_is_ident("from")? {
            default_binding = Some(self.expect_ident()?.0);
            if self.eat(TokenKind::Comma)? {
                self.parse_import_clause_rest(&mut namespace_binding, &mut named)?;
            }
        } else {
            self.parse_import_clause_rest(&mut namespace_binding, &mut named)?;
        }

        let from = self.next()?;
        if !from.is_ident("from") {
            return Err(SyntaxError::new("expected 'from' in import declaration", from.pos));
        }
        let spec_token = self.expect(TokenKind::StringLiteral)?;
        let specifier = spec_token.value.expect_str().to_owned();
        self.eat_semicolon()?;
        let span = self.span_from(start);
        Ok(Stat::new(
            span,
            StatKind::Import(ImportDeclaration {
                specifier,
                default_binding,
                namespace_binding,
                named,
                span,
            }),
        ))
    }

    fn parse_import_clause_rest(
        &mut self,
        namespace_binding: &mut Option<String>,
        named: &mut Vec<ImportSpecifier>,
    ) -> ParseResult<()> {
        if self.eat(TokenKind::Star)? {
            let as_token = self.next()?;
            if !as_token.is_ident("as") {
                return Err(SyntaxError::new("expected 'as' after '*'", as_token.pos));
            }
            *namespace_binding = Some(self.expect_ident()?.0);
            return Ok(());
        }
        self.expect(TokenKind::LBrace)?;
        while self.peek_kind()? != TokenKind::RBrace {
            let (imported, _) = self.expect_ident()?;
            let local = if self.peek_is_ident("as")? {
                self.next()?;
                self.expect_ident()?.0
            } else {
                imported.clone()
            };
            named.push(ImportSpecifier { imported, local });
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(())
    }

    fn parse_export_decl(&mut self) -> ParseResult<Stat> {
        let start = self.pos()?;
        self.expect(TokenKind::Export)?;
        match self.peek_kind()? {
            TokenKind::Let => self.parse_var_decl(VarKind::Let, true),
            TokenKind::Const => self.parse_var_decl(VarKind::Const, true),
            TokenKind::Var => self.parse_var_decl(VarKind::Var, true),
            TokenKind::Function => self.parse_function_decl(true, false),
            TokenKind::Class => self.parse_class_decl(true),
            TokenKind::Default => {
                self.next()?;
                let expr = self.parse_assignment()?;
                self.eat_semicolon()?;
                Ok(Stat::new(self.span_from(start), StatKind::ExportDefault(expr)))
            }
            TokenKind::LBrace => {
                self.next()?;
                let mut specifiers = Vec::new();
                while self.peek_kind()? != TokenKind::RBrace {
                    let (local, _) = self.expect_ident()?;
                    let exported = if self.peek_is_ident("as")? {
                        self.next()?;
                        self.expect_ident()?.0
                    } else {
                        local.clone()
                    };
                    specifiers.push(ExportSpecifier { local, exported });
                    if !self.eat(TokenKind::Comma)? {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace)?;
                self.eat_semicolon()?;
                Ok(Stat::new(self.span_from(start), StatKind::ExportNamed(specifiers)))
            }
            TokenKind::Identifier if self.peek_is_ident("async")? => {
                self.next()?;
                self.parse_function_decl(true, true)
            }
            _ => Err(self.unexpected("after export")?),
        }
    }

    // --- expressions ---

    /// Comma / sequence level.
    pub(crate) fn parse_expression(&mut self) -> ParseResult<Expr> {
        let start = self.pos()?;
        let first = self.parse_assignment()?;
        if self.peek_kind()? != TokenKind::Comma {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat(TokenKind::Comma)? {
            exprs.push(self.parse_assignment()?);
        }
        Ok(Expr::new(self.span_from(start), ExprKind::Sequence(exprs)))
    }

    /// Assignment level; also handles `yield` and arrow functions.
    fn parse_assignment(&mut self) -> ParseResult<Expr> {
        let start = self.pos()?;

        if self.peek_kind()? == TokenKind::Yield {
            return self.parse_yield();
        }
        if let Some(arrow) = self.try_parse_arrow_function()? {
            return Ok(arrow);
        }

        let target = self.parse_conditional()?;

        let kind = self.peek_kind()?;
        let op = if kind == TokenKind::Assign {
            None
        } else if kind.is_compound_assign() {
            Some(compound_assign_op(kind))
        } else {
            return Ok(target);
        };

        if target.value_category() != ValueCategory::LValue {
            let token_pos = target.span.start;
            return Err(SyntaxError::new("invalid assignment target", token_pos));
        }
        self.next()?;
        let value = self.parse_assignment()?;
        Ok(Expr::new(
            self.span_from(start),
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
        ))
    }

    fn parse_yield(&mut self) -> ParseResult<Expr> {
        let start = self.pos()?;
        self.expect(TokenKind::Yield)?;
        let delegate = self.eat(TokenKind::Star)?;
        let argument = if matches!(
            self.peek_kind()?,
            TokenKind::Semicolon
                | TokenKind::RParen
                | TokenKind::RBrace
                | TokenKind::RBrack
                | TokenKind::Comma
                | TokenKind::Colon
                | TokenKind::Eof
                | TokenKind::TemplateInterpEnd
        ) {
            None
        } else {
            Some(Box::new(self.parse_assignment()?))
        };
        Ok(Expr::new(self.span_from(start), ExprKind::Yield { argument, delegate }))
    }

    /// Attempts an arrow-function parse, rewinding the lexer on failure.
    ///
    /// Returns `Ok(None)` when the tokens are not an arrow function; the
    /// lexer is back at the start position in that case.
    fn try_parse_arrow_function(&mut self) -> ParseResult<Option<Expr>> {
        let start = self.pos()?;

        // `async` prefix for arrows: `async x => ...` / `async (x) => ...`.
        let is_async = self.peek_is_ident("async")?
            && matches!(self.lexer.peek_n(2)?.kind, TokenKind::Identifier | TokenKind::LParen);

        let first = if is_async {
            self.lexer.peek_n(2)?.kind
        } else {
            self.peek_kind()?
        };

        match first {
            // Single identifier arrow: `x => body` needs no backtracking.
            TokenKind::Identifier => {
                let arrow_at = if is_async { 3 } else { 2 };
                if self.lexer.peek_n(arrow_at)?.kind != TokenKind::Arrow {
                    return Ok(None);
                }
                if is_async {
                    self.next()?;
                }
                let (name, span) = self.expect_ident()?;
                self.expect(TokenKind::Arrow)?;
                let params = vec![Param { name, span }];
                let arrow = self.parse_arrow_body(params, is_async, start)?;
                Ok(Some(arrow))
            }
            // Parenthesised parameter list: checkpoint, attempt, rewind.
            TokenKind::LParen => {
                let checkpoint = self.lexer.checkpoint();
                let saved_end = self.last_end;
                match self.parse_arrow_params(is_async) {
                    Ok(Some(params)) => {
                        let arrow = self.parse_arrow_body(params, is_async, start)?;
                        Ok(Some(arrow))
                    }
                    Ok(None) | Err(_) => {
                        self.lexer.rewind(checkpoint);
                        self.last_end = saved_end;
                        Ok(None)
                    }
                }
            }
            _ => Ok(None),
        }
    }

    /// Parses `(a, b) =>`, returning `None` when the `=>` is missing.
    fn parse_arrow_params(&mut self, is_async: bool) -> ParseResult<Option<Vec<Param>>> {
        if is_async {
            self.next()?;
        }
        let params = self.parse_param_list()?;
        if self.peek_kind()? != TokenKind::Arrow {
            return Ok(None);
        }
        self.expect(TokenKind::Arrow)?;
        Ok(Some(params))
    }

    fn parse_arrow_body(&mut self, params: Vec<Param>, is_async: bool, start: u32) -> ParseResult<Expr> {
        let body = if self.peek_kind()? == TokenKind::LBrace {
            self.next()?;
            let body = self.parse_statement_list(TokenKind::RBrace)?;
            self.expect(TokenKind::RBrace)?;
            body
        } else {
            // Expression body desugars to a single return.
            let expr = self.parse_assignment()?;
            let span = expr.span;
            vec![Stat::new(span, StatKind::Return(Some(expr)))]
        };
        let span = self.span_from(start);
        Ok(Expr::new(
            span,
            ExprKind::Arrow(Box::new(FunctionLiteral {
                name: None,
                params,
                body,
                is_arrow: true,
                is_generator: false,
                is_async,
                span,
            })),
        ))
    }

    fn parse_conditional(&mut self) -> ParseResult<Expr> {
        let start = self.pos()?;
        let test = self.parse_nullish_or()?;
        if !self.eat(TokenKind::Question)? {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect(TokenKind::Colon)?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::new(
            self.span_from(start),
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
        ))
    }

    fn parse_nullish_or(&mut self) -> ParseResult<Expr> {
        let start = self.pos()?;
        let mut left = self.parse_logical_and()?;
        loop {
            let op = match self.peek_kind()? {
                TokenKind::OrOr => LogicalOp::Or,
                TokenKind::QuestionQuestion => LogicalOp::Nullish,
                _ => return Ok(left),
            };
            self.next()?;
            let right = self.parse_logical_and()?;
            left = Expr::new(
                self.span_from(start),
                ExprKind::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expr> {
        let start = self.pos()?;
        let mut left = self.parse_bit_or()?;
        while self.peek_kind()? == TokenKind::AndAnd {
            self.next()?;
            let right = self.parse_bit_or()?;
            left = Expr::new(
                self.span_from(start),
                ExprKind::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn parse_bit_or(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(0)
    }

    /// Left-associative binary levels, table-driven from loosest to tightest.
    fn parse_binary_level(&mut self, level: usize) -> ParseResult<Expr> {
        const LEVELS: &[&[(TokenKind, BinaryOp)]] = &[
            &[(TokenKind::BitOr, BinaryOp::BitOr)],
            &[(TokenKind::BitXor, BinaryOp::BitXor)],
            &[(TokenKind::BitAnd, BinaryOp::BitAnd)],
            &[
                (TokenKind::Eq, BinaryOp::Eq),
                (TokenKind::Ne, BinaryOp::Ne),
                (TokenKind::EqStrict, BinaryOp::StrictEq),
                (TokenKind::NeStrict, BinaryOp::StrictNe),
            ],
            &[
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::Le, BinaryOp::Le),
                (TokenKind::Gt, BinaryOp::Gt),
                (TokenKind::Ge, BinaryOp::Ge),
                (TokenKind::In, BinaryOp::In),
                (TokenKind::Instanceof, BinaryOp::Instanceof),
            ],
            &[
                (TokenKind::Shl, BinaryOp::Shl),
                (TokenKind::Shr, BinaryOp::Shr),
                (TokenKind::UShr, BinaryOp::UShr),
            ],
            &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)],
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Rem),
            ],
        ];

        if level == LEVELS.len() {
            return self.parse_exponentiation();
        }
        let start = self.pos()?;
        let mut left = self.parse_binary_level(level + 1)?;
        'outer: loop {
            let kind = self.peek_kind()?;
            for &(token, op) in LEVELS[level] {
                if token == kind {
                    self.next()?;
                    let right = self.parse_binary_level(level + 1)?;
                    left = Expr::new(
                        self.span_from(start),
                        ExprKind::Binary {
                            op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                    );
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    /// `**` is right-associative.
    fn parse_exponentiation(&mut self) -> ParseResult<Expr> {
        let start = self.pos()?;
        let base = self.parse_unary()?;
        if self.peek_kind()? != TokenKind::StarStar {
            return Ok(base);
        }
        self.next()?;
        let exponent = self.parse_exponentiation()?;
        Ok(Expr::new(
            self.span_from(start),
            ExprKind::Binary {
                op: BinaryOp::Exp,
                left: Box::new(base),
                right: Box::new(exponent),
            },
        ))
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let start = self.pos()?;
        let op = match self.peek_kind()? {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::BitNot => Some(UnaryOp::BitNot),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            TokenKind::Await => {
                self.next()?;
                let operand = self.parse_unary()?;
                return Ok(Expr::new(self.span_from(start), ExprKind::Await(Box::new(operand))));
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if self.next()?.kind == TokenKind::PlusPlus {
                    UpdateOp::Inc
                } else {
                    UpdateOp::Dec
                };
                let operand = self.parse_unary()?;
                if operand.value_category() != ValueCategory::LValue {
                    return Err(SyntaxError::new("invalid increment/decrement target", start));
                }
                return Ok(Expr::new(
                    self.span_from(start),
                    ExprKind::Update {
                        op,
                        prefix: true,
                        operand: Box::new(operand),
                    },
                ));
            }
            _ => None,
        };
        if let Some(op) = op {
            self.next()?;
            let operand = self.parse_unary()?;
            return Ok(Expr::new(
                self.span_from(start),
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let start = self.pos()?;
        let operand = self.parse_lhs_expression()?;
        match self.peek_kind()? {
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                if operand.value_category() != ValueCategory::LValue {
                    return Ok(operand);
                }
                let op = if self.next()?.kind == TokenKind::PlusPlus {
                    UpdateOp::Inc
                } else {
                    UpdateOp::Dec
                };
                Ok(Expr::new(
                    self.span_from(start),
                    ExprKind::Update {
                        op,
                        prefix: false,
                        operand: Box::new(operand),
                    },
                ))
            }
            _ => Ok(operand),
        }
    }

    /// Left-hand-side: member access, calls, `new`, optional chaining.
    fn parse_lhs_expression(&mut self) -> ParseResult<Expr> {
        let start = self.pos()?;
        let mut expr = if self.peek_kind()? == TokenKind::New {
            self.parse_new(start)?
        } else {
            self.parse_primary()?
        };

        loop {
            match self.peek_kind()? {
                TokenKind::Dot => {
                    self.next()?;
                    let name = self.parse_member_name()?;
                    expr = Expr::new(
                        self.span_from(start),
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberKey::Dot(name),
                            optional: false,
                        },
                    );
                }
                TokenKind::QuestionDot => {
                    self.next()?;
                    expr = match self.peek_kind()? {
                        TokenKind::LParen => {
                            let args = self.parse_arguments()?;
                            Expr::new(
                                self.span_from(start),
                                ExprKind::Call {
                                    callee: Box::new(expr),
                                    args,
                                    optional: true,
                                },
                            )
                        }
                        TokenKind::LBrack => {
                            self.next()?;
                            let index = self.parse_expression()?;
                            self.expect(TokenKind::RBrack)?;
                            Expr::new(
                                self.span_from(start),
                                ExprKind::Member {
                                    object: Box::new(expr),
                                    property: MemberKey::Computed(Box::new(index)),
                                    optional: true,
                                },
                            )
                        }
                        _ => {
                            let name = self.parse_member_name()?;
                            Expr::new(
                                self.span_from(start),
                                ExprKind::Member {
                                    object: Box::new(expr),
                                    property: MemberKey::Dot(name),
                                    optional: true,
                                },
                            )
                        }
                    };
                }
                TokenKind::LBrack => {
                    self.next()?;
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBrack)?;
                    expr = Expr::new(
                        self.span_from(start),
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberKey::Computed(Box::new(index)),
                            optional: false,
                        },
                    );
                }
                TokenKind::LParen => {
                    let args = self.parse_arguments()?;
                    expr = Expr::new(
                        self.span_from(start),
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                            optional: false,
                        },
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    /// A member name after `.`: identifiers, but also keywords used as
    /// property names (`obj.delete`).
    fn parse_member_name(&mut self) -> ParseResult<String> {
        let token = self.next()?;
        match (&token.kind, &token.value) {
            (TokenKind::Identifier, TokenValue::Str(name)) => Ok(name.clone()),
            (kind, _) if *kind != TokenKind::Eof => {
                let text: &'static str = (*kind).into();
                // Keyword tokens reuse their lexeme as the property name.
                let lowered = text.to_lowercase();
                if keyword_like(*kind) {
                    Ok(lowered)
                } else {
                    Err(SyntaxError::new("expected property name", token.pos))
                }
            }
            _ => Err(SyntaxError::new("expected property name", token.pos)),
        }
    }

    fn parse_new(&mut self, start: u32) -> ParseResult<Expr> {
        self.expect(TokenKind::New)?;
        // The callee binds tighter than the argument list: parse member
        // chains but stop at the first `(`.
        let mut callee = self.parse_primary()?;
        loop {
            match self.peek_kind()? {
                TokenKind::Dot => {
                    self.next()?;
                    let name = self.parse_member_name()?;
                    callee = Expr::new(
                        self.span_from(start),
                        ExprKind::Member {
                            object: Box::new(callee),
                            property: MemberKey::Dot(name),
                            optional: false,
                        },
                    );
                }
                TokenKind::LBrack => {
                    self.next()?;
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBrack)?;
                    callee = Expr::new(
                        self.span_from(start),
                        ExprKind::Member {
                            object: Box::new(callee),
                            property: MemberKey::Computed(Box::new(index)),
                            optional: false,
                        },
                    );
                }
                _ => break,
            }
        }
        let args = if self.peek_kind()? == TokenKind::LParen {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::new(
            self.span_from(start),
            ExprKind::New {
                callee: Box::new(callee),
                args,
            },
        ))
    }

    fn parse_arguments(&mut self) -> ParseResult<Vec<Argument>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        while self.peek_kind()? != TokenKind::RParen {
            let spread = self.eat(TokenKind::Ellipsis)?;
            let expr = self.parse_assignment()?;
            args.push(Argument { spread, expr });
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let start = self.pos()?;
        if self.peek_kind()? == TokenKind::Class {
            let class = self.parse_class_literal()?;
            return Ok(Expr::new(self.span_from(start), ExprKind::Class(Box::new(class))));
        }
        let token = self.next()?;
        let kind = match token.kind {
            TokenKind::Undefined => ExprKind::Undefined,
            TokenKind::Null => ExprKind::Null,
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::IntLiteral => match token.value {
                TokenValue::Int(v) => ExprKind::Int(v),
                _ => return Err(SyntaxError::new("malformed integer literal", token.pos)),
            },
            TokenKind::FloatLiteral => match token.value {
                TokenValue::Float(v) => ExprKind::Float(v),
                _ => return Err(SyntaxError::new("malformed float literal", token.pos)),
            },
            TokenKind::BigIntLiteral => match token.value {
                TokenValue::BigInt(v) => ExprKind::BigInt(v),
                _ => return Err(SyntaxError::new("malformed BigInt literal", token.pos)),
            },
            TokenKind::StringLiteral => match token.value {
                TokenValue::Str(s) => ExprKind::String(s),
                _ => return Err(SyntaxError::new("malformed string literal", token.pos)),
            },
            TokenKind::RegexLiteral => match token.value {
                TokenValue::Regex { pattern, flags } => ExprKind::Regex { pattern, flags },
                _ => return Err(SyntaxError::new("malformed regex literal", token.pos)),
            },
            TokenKind::Identifier => match token.value {
                TokenValue::Str(name) => ExprKind::Identifier(name),
                _ => return Err(SyntaxError::new("malformed identifier", token.pos)),
            },
            TokenKind::This => ExprKind::This,
            TokenKind::Super => ExprKind::Super,
            TokenKind::Backtick => return self.parse_template_literal(start),
            TokenKind::LBrack => return self.parse_array_literal(start),
            TokenKind::LBrace => return self.parse_object_literal(start),
            TokenKind::LParen => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                return Ok(expr);
            }
            TokenKind::Function => {
                let is_generator = self.eat(TokenKind::Star)?;
                let name = if self.peek_kind()? == TokenKind::Identifier {
                    Some(self.expect_ident()?.0)
                } else {
                    None
                };
                let function = self.parse_function_rest(name, is_generator, false, start)?;
                return Ok(Expr::new(self.span_from(start), ExprKind::Function(Box::new(function))));
            }
            TokenKind::Import => {
                self.expect(TokenKind::LParen)?;
                let specifier = self.parse_assignment()?;
                self.expect(TokenKind::RParen)?;
                return Ok(Expr::new(
                    self.span_from(start),
                    ExprKind::ImportCall(Box::new(specifier)),
                ));
            }
            other => {
                let text: &'static str = other.into();
                return Err(SyntaxError::new(format!("unexpected {text} in expression"), token.pos));
            }
        };
        Ok(Expr::new(self.span_from(start), kind))
    }

    fn parse_template_literal(&mut self, start: u32) -> ParseResult<Expr> {
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::TemplateElement => match token.value {
                    TokenValue::Str(chunk) => quasis.push(chunk),
                    _ => return Err(SyntaxError::new("malformed template chunk", token.pos)),
                },
                TokenKind::TemplateInterpStart => {
                    let expr = self.parse_expression()?;
                    self.expect(TokenKind::TemplateInterpEnd)?;
                    exprs.push(expr);
                }
                TokenKind::Backtick => break,
                _ => return Err(SyntaxError::new("malformed template literal", token.pos)),
            }
        }
        // The lexer produces chunks and interpolations strictly interleaved.
        debug_assert_eq!(quasis.len(), exprs.len() + 1);
        Ok(Expr::new(
            self.span_from(start),
            ExprKind::TemplateLiteral { quasis, exprs },
        ))
    }

    fn parse_array_literal(&mut self, start: u32) -> ParseResult<Expr> {
        let mut elements = Vec::new();
        while self.peek_kind()? != TokenKind::RBrack {
            let spread = self.eat(TokenKind::Ellipsis)?;
            let expr = self.parse_assignment()?;
            elements.push(Argument { spread, expr });
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBrack)?;
        Ok(Expr::new(self.span_from(start), ExprKind::Array(elements)))
    }

    fn parse_object_literal(&mut self, start: u32) -> ParseResult<Expr> {
        let mut properties = Vec::new();
        while self.peek_kind()? != TokenKind::RBrace {
            properties.push(self.parse_object_property()?);
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expr::new(self.span_from(start), ExprKind::Object(properties)))
    }

    fn parse_object_property(&mut self) -> ParseResult<ObjectProperty> {
        let start = self.pos()?;

        // Accessors: `get name() {}` / `set name(v) {}`.
        if (self.peek_is_ident("get")? || self.peek_is_ident("set")?)
            && !matches!(
                self.lexer.peek_n(2)?.kind,
                TokenKind::Colon | TokenKind::Comma | TokenKind::RBrace | TokenKind::LParen
            )
        {
            let (word, _) = self.expect_ident()?;
            let key = self.parse_property_name()?;
            let function = self.parse_function_rest(None, false, false, start)?;
            let span = self.span_from(start);
            let kind = if word == "get" {
                PropertyKind::Get
            } else {
                PropertyKind::Set
            };
            return Ok(ObjectProperty {
                key,
                value: Expr::new(span, ExprKind::Function(Box::new(function))),
                kind,
                shorthand: false,
            });
        }

        let is_generator = self.eat(TokenKind::Star)?;
        let key = self.parse_property_name()?;

        match self.peek_kind()? {
            // Method shorthand: `m() {}` / `*g() {}`.
            TokenKind::LParen => {
                let function = self.parse_function_rest(None, is_generator, false, start)?;
                let span = self.span_from(start);
                Ok(ObjectProperty {
                    key,
                    value: Expr::new(span, ExprKind::Function(Box::new(function))),
                    kind: PropertyKind::Method,
                    shorthand: false,
                })
            }
            TokenKind::Colon => {
                self.next()?;
                let value = self.parse_assignment()?;
                Ok(ObjectProperty {
                    key,
                    value,
                    kind: PropertyKind::Init,
                    shorthand: false,
                })
            }
            // Shorthand: `{ x }` — the key doubles as an identifier load.
            _ => match key {
                PropertyName::Static(name) => {
                    let span = self.span_from(start);
                    Ok(ObjectProperty {
                        key: PropertyName::Static(name.clone()),
                        value: Expr::new(span, ExprKind::Identifier(name)),
                        kind: PropertyKind::Init,
                        shorthand: true,
                    })
                }
                PropertyName::Computed(_) => Err(SyntaxError::new("computed property requires a value", start)),
            },
        }
    }
}

/// Maps a compound-assignment token to its underlying binary operator.
fn compound_assign_op(kind: TokenKind) -> BinaryOp {
    match kind {
        TokenKind::PlusAssign => BinaryOp::Add,
        TokenKind::MinusAssign => BinaryOp::Sub,
        TokenKind::StarAssign => BinaryOp::Mul,
        TokenKind::SlashAssign => BinaryOp::Div,
        TokenKind::PercentAssign => BinaryOp::Rem,
        TokenKind::StarStarAssign => BinaryOp::Exp,
        TokenKind::ShlAssign => BinaryOp::Shl,
        TokenKind::ShrAssign => BinaryOp::Shr,
        TokenKind::UShrAssign => BinaryOp::UShr,
        TokenKind::BitAndAssign => BinaryOp::BitAnd,
        TokenKind::BitOrAssign => BinaryOp::BitOr,
        TokenKind::BitXorAssign => BinaryOp::BitXor,
        other => unreachable!("not a compound assignment token: {other:?}"),
    }
}

/// Keyword tokens that are legal after `.` as plain property names.
fn keyword_like(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Delete
            | TokenKind::New
            | TokenKind::Typeof
            | TokenKind::In
            | TokenKind::Return
            | TokenKind::Throw
            | TokenKind::Catch
            | TokenKind::Default
            | TokenKind::Class
            | TokenKind::Import
            | TokenKind::Export
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(source: &str) -> Program {
        Parser::new(source).parse_program().expect("parse failure")
    }

    fn parse_expr(source: &str) -> Expr {
        let mut program = parse(source);
        assert_eq!(program.body.len(), 1, "expected a single statement");
        match program.body.pop().expect("one statement").kind {
            StatKind::Expression(expr) => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn precedence_mul_over_add() {
        let expr = parse_expr("1 + 2 * 3");
        let ExprKind::Binary { op: BinaryOp::Add, right, .. } = expr.kind else {
            panic!("expected top-level add, got {:?}", expr.kind);
        };
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn assignment_right_associative() {
        let expr = parse_expr("a = b = c");
        let ExprKind::Assign { value, .. } = expr.kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn conditional_right_associative() {
        let expr = parse_expr("a ? b : c ? d : e");
        let ExprKind::Conditional { alternate, .. } = expr.kind else {
            panic!("expected conditional");
        };
        assert!(matches!(alternate.kind, ExprKind::Conditional { .. }));
    }

    #[test]
    fn exponentiation_right_associative() {
        let expr = parse_expr("2 ** 3 ** 2");
        let ExprKind::Binary { op: BinaryOp::Exp, right, .. } = expr.kind else {
            panic!("expected exponentiation");
        };
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Exp, .. }));
    }

    #[test]
    fn arrow_vs_sequence() {
        let arrow = parse_expr("(x, y) => x + y");
        let ExprKind::Arrow(function) = arrow.kind else {
            panic!("expected arrow function");
        };
        assert_eq!(function.params.len(), 2);
        assert!(function.is_arrow);

        // Same prefix, no arrow: falls back to a parenthesised sequence.
        let seq = parse_expr("(x, y)");
        assert!(matches!(seq.kind, ExprKind::Sequence(ref exprs) if exprs.len() == 2));
    }

    #[test]
    fn single_param_arrow() {
        let expr = parse_expr("x => x * 2");
        let ExprKind::Arrow(function) = expr.kind else {
            panic!("expected arrow function");
        };
        assert_eq!(function.params[0].name, "x");
        // Expression body desugars to a return statement.
        assert!(matches!(function.body[0].kind, StatKind::Return(Some(_))));
    }

    #[test]
    fn async_arrow() {
        let expr = parse_expr("async x => x");
        let ExprKind::Arrow(function) = expr.kind else {
            panic!("expected arrow function");
        };
        assert!(function.is_async);
    }

    #[test]
    fn optional_chaining_forms() {
        let expr = parse_expr("a?.b?.[0]?.()");
        // Outermost is the optional call.
        let ExprKind::Call { optional: true, callee, .. } = expr.kind else {
            panic!("expected optional call");
        };
        let ExprKind::Member {
            optional: true,
            property: MemberKey::Computed(_),
            object,
        } = callee.kind
        else {
            panic!("expected optional computed member");
        };
        assert!(matches!(
            object.kind,
            ExprKind::Member {
                optional: true,
                property: MemberKey::Dot(_),
                ..
            }
        ));
    }

    #[test]
    fn new_expression_binds_member_not_call() {
        let expr = parse_expr("new a.b(1)");
        let ExprKind::New { callee, args } = expr.kind else {
            panic!("expected new expression");
        };
        assert!(matches!(callee.kind, ExprKind::Member { .. }));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn template_literal_structure() {
        let expr = parse_expr("`a${b}c`");
        let ExprKind::TemplateLiteral { quasis, exprs } = expr.kind else {
            panic!("expected template literal");
        };
        assert_eq!(quasis, vec!["a".to_owned(), "c".to_owned()]);
        assert_eq!(exprs.len(), 1);
    }

    #[test]
    fn nested_template_literal() {
        let expr = parse_expr("`a${`b${c}`}d`");
        let ExprKind::TemplateLiteral { exprs, .. } = expr.kind else {
            panic!("expected template literal");
        };
        assert!(matches!(exprs[0].kind, ExprKind::TemplateLiteral { .. }));
    }

    #[test]
    fn statements_roundtrip() {
        let program = parse(
            "let x = 1;\n\
             const y = 2;\n\
             function f(a, b) { return a + b; }\n\
             if (x) { x = 2; } else x = 3;\n\
             for (let i = 0; i < 3; i++) x += i;\n\
             for (k in obj) {}\n\
             for (v of list) {}\n\
             while (x) break;\n\
             do { x--; } while (x)\n\
             outer: for (;;) { continue outer; }\n\
             switch (x) { case 1: break; default: x = 0; }\n\
             try { throw 1; } catch (e) { x = e; } finally { x = 0; }",
        );
        assert_eq!(program.body.len(), 12);
    }

    #[test]
    fn const_requires_initialiser() {
        let err = Parser::new("const x;").parse_program().expect_err("const without init");
        assert!(err.message.contains("const"));
    }

    #[test]
    fn try_requires_catch_or_finally() {
        let err = Parser::new("try { }").parse_program().expect_err("bare try");
        assert!(err.message.contains("catch or finally"));
    }

    #[test]
    fn catch_parameter_optional() {
        let program = parse("try { } catch { }");
        let StatKind::Try { catch, .. } = &program.body[0].kind else {
            panic!("expected try statement");
        };
        assert!(catch.as_ref().expect("catch clause").param.is_none());
    }

    #[test]
    fn import_forms() {
        let program = parse(
            "import \"side\";\n\
             import d from \"a\";\n\
             import * as ns from \"b\";\n\
             import { x, y as z } from \"c\";\n\
             import d2, { w } from \"e\";",
        );
        assert_eq!(program.imports.len(), 5);
        assert_eq!(program.imports[1].default_binding.as_deref(), Some("d"));
        assert_eq!(program.imports[2].namespace_binding.as_deref(), Some("ns"));
        assert_eq!(program.imports[3].named[1].local, "z");
        assert_eq!(program.imports[4].default_binding.as_deref(), Some("d2"));
        assert_eq!(program.imports[4].named[0].imported, "w");
    }

    #[test]
    fn export_forms() {
        let program = parse(
            "export let a = 1;\n\
             export function f() {}\n\
             export class C {}\n\
             export { a, f as g };\n\
             export default 42;",
        );
        assert_eq!(program.body.len(), 5);
        assert!(matches!(
            program.body[0].kind,
            StatKind::VarDecl { exported: true, .. }
        ));
        assert!(matches!(program.body[4].kind, StatKind::ExportDefault(_)));
    }

    #[test]
    fn class_body_members() {
        let program = parse(
            "class A extends B {\n\
               constructor(x) { this.x = x; }\n\
               m() { return 1; }\n\
               static s() { return 2; }\n\
               get v() { return this.x; }\n\
               set v(nv) { this.x = nv; }\n\
               f = 1;\n\
               static sf = 2;\n\
               [computed]() { return 3; }\n\
             }",
        );
        let StatKind::ClassDecl { class, .. } = &program.body[0].kind else {
            panic!("expected class declaration");
        };
        assert!(class.super_class.is_some());
        assert_eq!(class.members.len(), 8);
        assert!(matches!(class.members[0].kind, ClassMemberKind::Constructor(_)));
        assert!(class.members[2].is_static);
        assert!(matches!(class.members[3].kind, ClassMemberKind::Getter(_)));
        assert!(matches!(class.members[5].kind, ClassMemberKind::Field(Some(_))));
        assert!(matches!(class.members[7].key, PropertyName::Computed(_)));
    }

    #[test]
    fn generators_and_async() {
        let program = parse(
            "function* g() { yield 1; yield* inner(); }\n\
             async function f() { return await 42; }",
        );
        let StatKind::FunctionDecl { function, .. } = &program.body[0].kind else {
            panic!("expected function declaration");
        };
        assert!(function.is_generator);
        let StatKind::FunctionDecl { function, .. } = &program.body[1].kind else {
            panic!("expected function declaration");
        };
        assert!(function.is_async);
    }

    #[test]
    fn object_literal_kinds() {
        let expr = parse_expr("({ a: 1, b, m() {}, get g() { return 1; }, set g(v) {}, [k]: 2 })");
        let ExprKind::Object(props) = expr.kind else {
            panic!("expected object literal");
        };
        assert_eq!(props.len(), 6);
        assert!(props[1].shorthand);
        assert_eq!(props[2].kind, PropertyKind::Method);
        assert_eq!(props[3].kind, PropertyKind::Get);
        assert_eq!(props[4].kind, PropertyKind::Set);
        assert!(matches!(props[5].key, PropertyName::Computed(_)));
    }

    #[test]
    fn spans_cover_source() {
        let source = "let x = 1 + 2;";
        let program = parse(source);
        let span = program.body[0].span;
        assert_eq!(span.start, 0);
        assert_eq!(span.end as usize, source.len());
    }

    #[test]
    fn lvalue_checks() {
        assert!(Parser::new("1 = 2").parse_program().is_err());
        assert!(Parser::new("f() = 2").parse_program().is_err());
        assert!(Parser::new("a.b = 2").parse_program().is_ok());
        assert!(Parser::new("a[0] = 2").parse_program().is_ok());
        assert!(Parser::new("++1").parse_program().is_err());
    }

    #[test]
    fn type_annotations_are_skipped() {
        let program = parse("let x: number = 1; function f(a: string): void {} type Alias = number;");
        assert_eq!(program.body.len(), 3);
        assert!(matches!(program.body[2].kind, StatKind::TypeAlias { .. }));
    }
}
