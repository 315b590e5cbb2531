//! Recursive descent parser for C

use crate::common::{CompileError, CompileResult, Span};
use crate::frontend::c::ast::*;
use crate::frontend::c::lexer::{Lexer, Token, TokenKind};

/// Deepest syntactic nesting (expressions, statements, struct bodies)
/// accepted before giving up
pub const MAX_NESTING: usize = 128;

/// Recursive descent parser for C
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    /// Span of the most recently consumed token
    previous: Span,
    next_struct_id: u32,
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given source
    pub fn new(source: &'a str) -> CompileResult<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            previous: Span::default(),
            next_struct_id: 0,
            depth: 0,
        })
    }

    /// Parse a complete translation unit
    pub fn parse(&mut self) -> CompileResult<TranslationUnit> {
        let mut declarations = Vec::new();

        while !self.at_end() {
            declarations.push(self.parse_declaration(true)?);
        }

        Ok(TranslationUnit::new(declarations))
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    fn at_end(&self) -> bool {
        matches!(self.current.kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> CompileResult<Token> {
        let next = self.lexer.next_token()?;
        let prev = std::mem::replace(&mut self.current, next);
        self.previous = prev.span;
        Ok(prev)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> CompileResult<bool> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
        if self.check(&kind) {
            self.advance()
        } else {
            Err(CompileError::parser(
                format!("expected {}, found {}", kind, self.current.kind),
                self.current.span,
            ))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> CompileResult<(String, Span)> {
        if let TokenKind::Identifier(name) = &self.current.kind {
            let name = name.clone();
            let token = self.advance()?;
            Ok((name, token.span))
        } else {
            Err(CompileError::parser(
                format!("expected {}, found {}", what, self.current.kind),
                self.current.span,
            ))
        }
    }

    /// Kind of the token after `current`
    fn peek_kind(&mut self) -> CompileResult<&TokenKind> {
        Ok(&self.lexer.peek()?.kind)
    }

    /// Span from `start` through the last consumed token
    fn span_from(&self, start: Span) -> Span {
        start.merge(self.previous)
    }

    fn unsupported(&self, what: &str) -> CompileError {
        CompileError::parser(format!("{} is not supported", what), self.current.span)
    }

    /// Run `f` one nesting level deeper
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> CompileResult<T>) -> CompileResult<T> {
        self.chain(|p| {
            p.link()?;
            f(p)
        })
    }

    /// Run `f`, which may add [`link`](Self::link)s, then return to the current depth
    fn chain<T>(&mut self, f: impl FnOnce(&mut Self) -> CompileResult<T>) -> CompileResult<T> {
        let depth = self.depth;
        let result = f(self);
        self.depth = depth;
        result
    }

    /// Count one level of a chain built in a loop (`**p`, `a[1][2]`, `a.b.c`, `a + b + c`)
    fn link(&mut self) -> CompileResult<()> {
        if self.depth >= MAX_NESTING {
            return Err(CompileError::parser(
                format!("nesting exceeds {} levels", MAX_NESTING),
                self.current.span,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// Parse a declaration; function definitions only at file scope
    fn parse_declaration(&mut self, file_scope: bool) -> CompileResult<Declaration> {
        let start_span = self.current.span;
        let base_type = self.parse_declaration_specifiers()?;

        // `struct s { ... };` without declarators
        if self.match_token(&TokenKind::Semi)? {
            let span = self.span_from(start_span);
            return match base_type.kind {
                TypeKind::Struct(spec) => Ok(Declaration::new(DeclKind::Struct(*spec), span)),
                _ => Err(CompileError::parser("declaration does not declare anything", span)),
            };
        }

        let (name, name_span, ty) = self.parse_declarator(base_type.clone())?;

        if self.check(&TokenKind::LParen) {
            if !file_scope {
                return Err(self.unsupported("a function declaration inside a block"));
            }
            return self.parse_function_rest(name, ty, start_span);
        }

        self.parse_init_declarators((name, name_span, ty), &base_type, start_span)
    }

    fn parse_function_rest(
        &mut self,
        name: String,
        return_type: CType,
        start_span: Span,
    ) -> CompileResult<Declaration> {
        self.expect(TokenKind::LParen)?;
        let (params, variadic) = self.parse_parameter_list()?;
        self.expect(TokenKind::RParen)?;

        let mut func = FuncDecl::new(name, return_type, params, start_span).with_variadic(variadic);
        if self.check(&TokenKind::LBrace) {
            func = func.with_body(self.parse_block()?);
        } else {
            self.expect(TokenKind::Semi)?;
        }

        let span = self.span_from(start_span);
        func.span = span;
        Ok(Declaration::new(DeclKind::Function(func), span))
    }

    fn parse_init_declarators(
        &mut self,
        first: (String, Span, CType),
        base_type: &CType,
        start_span: Span,
    ) -> CompileResult<Declaration> {
        let mut declarations = Vec::new();
        let (mut name, mut span, mut ty) = first;

        loop {
            let mut var = VarDecl::new(name, ty, span);
            if self.match_token(&TokenKind::Eq)? {
                var = var.with_init(self.parse_initializer()?);
            }
            declarations.push(var);

            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
            (name, span, ty) = self.parse_declarator(base_type.clone())?;
        }

        self.expect(TokenKind::Semi)?;
        let span = self.span_from(start_span);

        if declarations.len() == 1 {
            let var = declarations.remove(0);
            return Ok(Declaration::new(DeclKind::Variable(var), span));
        }
        Ok(Declaration::new(DeclKind::MultipleVariables(declarations), span))
    }

    // =========================================================================
    // Declaration specifiers
    // =========================================================================

    fn parse_declaration_specifiers(&mut self) -> CompileResult<CType> {
        let start_span = self.current.span;
        let mut type_specs: Vec<&'static str> = Vec::new();
        let mut qualifiers = TypeQualifiers::default();
        let mut signed: Option<bool> = None;
        let mut struct_spec = None;

        loop {
            let spec = match &self.current.kind {
                TokenKind::Const => {
                    qualifiers.is_const = true;
                    None
                }
                TokenKind::Volatile => {
                    qualifiers.is_volatile = true;
                    None
                }
                TokenKind::Signed => {
                    signed = Some(true);
                    None
                }
                TokenKind::Unsigned => {
                    signed = Some(false);
                    None
                }
                TokenKind::Void => Some("void"),
                TokenKind::Char => Some("char"),
                TokenKind::Short => Some("short"),
                TokenKind::Int => Some("int"),
                TokenKind::Long => Some("long"),
                TokenKind::Struct => {
                    if struct_spec.is_some() || !type_specs.is_empty() || signed.is_some() {
                        return Err(CompileError::parser(
                            "struct cannot be combined with other type specifiers",
                            self.current.span,
                        ));
                    }
                    struct_spec = Some(self.parse_struct_specifier()?);
                    continue;
                }
                TokenKind::Reserved(word) => {
                    return Err(self.unsupported(&format!("'{}'", word)));
                }
                _ => break,
            };
            if let Some(spec) = spec {
                if struct_spec.is_some() {
                    return Err(CompileError::parser(
                        "struct cannot be combined with other type specifiers",
                        self.current.span,
                    ));
                }
                type_specs.push(spec);
            }
            self.advance()?;
        }

        let kind = match struct_spec {
            Some(spec) => TypeKind::Struct(Box::new(spec)),
            None => self.type_from_specifiers(&type_specs, signed, start_span)?,
        };
        let span = self.span_from(start_span);

        Ok(CType::new(kind, span).with_qualifiers(qualifiers))
    }

    fn type_from_specifiers(
        &self,
        specs: &[&str],
        signed: Option<bool>,
        span: Span,
    ) -> CompileResult<TypeKind> {
        let explicit_sign = signed.is_some();
        let signed = signed.unwrap_or(true);

        match specs {
            [] | ["int"] => Ok(TypeKind::Int { signed }),
            ["void"] if !explicit_sign => Ok(TypeKind::Void),
            ["char"] => Ok(TypeKind::Char { signed }),
            ["short"] | ["short", "int"] => Ok(TypeKind::Short { signed }),
            ["long"] | ["long", "int"] => Ok(TypeKind::Long { signed }),
            ["long", "long"] | ["long", "long", "int"] => Ok(TypeKind::LongLong { signed }),
            _ => Err(CompileError::parser(
                format!("invalid type specifier combination: {}", specs.join(" ")),
                self.span_from(span),
            )),
        }
    }

    fn parse_struct_specifier(&mut self) -> CompileResult<StructSpec> {
        let start_span = self.expect(TokenKind::Struct)?.span;

        let name = if matches!(self.current.kind, TokenKind::Identifier(_)) {
            Some(self.expect_identifier("struct name")?.0)
        } else {
            None
        };

        let members = if self.check(&TokenKind::LBrace) {
            Some(self.nested(Self::parse_struct_body)?)
        } else if name.is_none() {
            return Err(CompileError::parser(
                format!("expected struct name or '{{', found {}", self.current.kind),
                self.current.span,
            ));
        } else {
            None
        };

        let id = StructSpecId(self.next_struct_id);
        self.next_struct_id += 1;
        Ok(StructSpec::new(id, name, members, self.span_from(start_span)))
    }

    fn parse_struct_body(&mut self) -> CompileResult<Vec<StructMember>> {
        self.expect(TokenKind::LBrace)?;
        let mut members = Vec::new();

        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let base_type = self.parse_declaration_specifiers()?;
            loop {
                let (name, span, ty) = self.parse_declarator(base_type.clone())?;
                if self.check(&TokenKind::Colon) {
                    return Err(self.unsupported("a bit-field"));
                }
                members.push(StructMember::new(name, ty, span));
                if !self.match_token(&TokenKind::Comma)? {
                    break;
                }
            }
            self.expect(TokenKind::Semi)?;
        }

        self.expect(TokenKind::RBrace)?;
        Ok(members)
    }

    // =========================================================================
    // Declarators
    // =========================================================================

    /// `*`s, a name and array suffixes
    fn parse_declarator(&mut self, base_type: CType) -> CompileResult<(String, Span, CType)> {
        self.chain(|p| {
            let ty = p.parse_pointers(base_type)?;
            if p.check(&TokenKind::LParen) {
                return Err(p.unsupported("a parenthesized declarator"));
            }
            let (name, span) = p.expect_identifier("identifier in declarator")?;
            let ty = p.parse_array_suffix(ty)?;
            Ok((name, span, ty))
        })
    }

    fn parse_pointers(&mut self, base_type: CType) -> CompileResult<CType> {
        let mut ty = base_type;
        while self.check(&TokenKind::Star) {
            self.link()?;
            let star = self.advance()?.span;
            let mut qualifiers = TypeQualifiers::default();
            loop {
                match self.current.kind {
                    TokenKind::Const => qualifiers.is_const = true,
                    TokenKind::Volatile => qualifiers.is_volatile = true,
                    _ => break,
                }
                self.advance()?;
            }
            let span = ty.span.merge(star);
            ty = CType::pointer_to(ty, span).with_qualifiers(qualifiers);
        }
        Ok(ty)
    }

    /// `[N]` suffixes; the leftmost dimension is the outermost array
    fn parse_array_suffix(&mut self, element: CType) -> CompileResult<CType> {
        let mut dimensions = Vec::new();
        while self.check(&TokenKind::LBracket) {
            self.link()?;
            let start_span = self.advance()?.span;
            let size = self.parse_array_size()?;
            self.expect(TokenKind::RBracket)?;
            dimensions.push((size, self.span_from(start_span)));
        }
        Ok(dimensions
            .into_iter()
            .rev()
            .fold(element, |inner, (size, span)| CType::array_of(inner, size, span)))
    }

    fn parse_array_size(&mut self) -> CompileResult<Option<usize>> {

        if self.check(&TokenKind::RBracket) {
            return Ok(None);
        }
        let expr = self.parse_conditional_expression()?;
        match expr.constant_value() {
            Some(n) => usize::try_from(n)
                .map(Some)
                .map_err(|_| CompileError::parser("array size is negative", expr.span)),
            None => Err(CompileError::parser(
                "array size must be an integer constant",
                expr.span,
            )),
        }
    }

    /// Type without a declarator name, as in casts and `sizeof`
    fn parse_type_name(&mut self) -> CompileResult<CType> {
        let base_type = self.parse_declaration_specifiers()?;
        self.chain(|p| {
            let ty = p.parse_pointers(base_type)?;
            p.parse_array_suffix(ty)
        })
    }

    fn parse_parameter_list(&mut self) -> CompileResult<(Vec<ParamDecl>, bool)> {
        let mut params = Vec::new();
        let mut variadic = false;

        if self.check(&TokenKind::RParen) {
            return Ok((params, variadic));
        }

        // (void)
        if self.check(&TokenKind::Void) && matches!(self.peek_kind()?, TokenKind::RParen) {
            self.advance()?;
            return Ok((params, variadic));
        }

        loop {
            if self.match_token(&TokenKind::Ellipsis)? {
                variadic = true;
                break;
            }

            let start_span = self.current.span;
            let base_type = self.parse_declaration_specifiers()?;
            let (name, ty) = self.chain(|p| {
                let ty = p.parse_pointers(base_type)?;
                let name = if matches!(p.current.kind, TokenKind::Identifier(_)) {
                    Some(p.expect_identifier("parameter name")?.0)
                } else {
                    None
                };
                Ok((name, p.parse_array_suffix(ty)?))
            })?;
            params.push(ParamDecl::new(name, ty, self.span_from(start_span)));

            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
        }

        Ok((params, variadic))
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_statement(&mut self) -> CompileResult<Stmt> {
        self.nested(Self::parse_statement_inner)
    }

    fn parse_statement_inner(&mut self) -> CompileResult<Stmt> {
        let start_span = self.current.span;

        match &self.current.kind {
            TokenKind::LBrace => {
                let block = self.parse_block()?;
                let span = block.span;
                Ok(Stmt::new(StmtKind::Block(block), span))
            }
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While | TokenKind::Do | TokenKind::For => self.parse_loop(),
            TokenKind::Break => {
                self.advance()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::new(StmtKind::Break, self.span_from(start_span)))
            }
            TokenKind::Continue => {
                self.advance()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::new(StmtKind::Continue, self.span_from(start_span)))
            }
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Semi => {
                self.advance()?;
                Ok(Stmt::new(StmtKind::Empty, start_span))
            }
            TokenKind::Reserved(word) => Err(self.unsupported(&format!("'{}'", word))),
            kind if kind.can_start_declaration() => Err(CompileError::parser(
                "a declaration is not allowed here; wrap it in braces",
                start_span,
            )),
            _ => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::new(StmtKind::Expr(expr), self.span_from(start_span)))
            }
        }
    }

    fn parse_block(&mut self) -> CompileResult<Block> {
        let start_span = self.current.span;
        self.expect(TokenKind::LBrace)?;

        let mut items = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            if self.current.kind.can_start_declaration() {
                items.push(BlockItem::Declaration(self.parse_declaration(false)?));
            } else {
                items.push(BlockItem::Statement(self.parse_statement()?));
            }
        }

        self.expect(TokenKind::RBrace)?;
        Ok(Block::new(items, self.span_from(start_span)))
    }

    fn parse_parenthesized(&mut self) -> CompileResult<Expr> {
        self.expect(TokenKind::LParen)?;
        let expr = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        Ok(expr)
    }

    fn parse_if_statement(&mut self) -> CompileResult<Stmt> {
        let start_span = self.expect(TokenKind::If)?.span;
        let condition = self.parse_parenthesized()?;
        let then_branch = Box::new(self.parse_statement()?);

        let else_branch = if self.match_token(&TokenKind::Else)? {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            self.span_from(start_span),
        ))
    }

    fn parse_loop(&mut self) -> CompileResult<Stmt> {
        let start_span = self.current.span;
        let lp = match self.advance()?.kind {
            TokenKind::While => {
                let condition = self.parse_parenthesized()?;
                Loop::new(LoopKind::While, Some(condition), self.parse_statement()?)
            }
            TokenKind::Do => {
                let body = self.parse_statement()?;
                self.expect(TokenKind::While)?;
                let condition = self.parse_parenthesized()?;
                self.expect(TokenKind::Semi)?;
                Loop::new(LoopKind::DoWhile, Some(condition), body)
            }
            _ => self.parse_for_clauses()?,
        };
        Ok(Stmt::new(StmtKind::Loop(lp), self.span_from(start_span)))
    }

    /// `(init; condition; update) body`, after the `for` keyword
    fn parse_for_clauses(&mut self) -> CompileResult<Loop> {
        self.expect(TokenKind::LParen)?;

        let init = if self.match_token(&TokenKind::Semi)? {
            None
        } else if self.current.kind.can_start_declaration() {
            Some(ForInit::Declaration(self.parse_declaration(false)?))
        } else {
            let expr = self.parse_expression()?;
            self.expect(TokenKind::Semi)?;
            Some(ForInit::Expr(expr))
        };

        let condition = self.parse_optional_expression(&TokenKind::Semi)?;
        self.expect(TokenKind::Semi)?;
        let update = self.parse_optional_expression(&TokenKind::RParen)?;
        self.expect(TokenKind::RParen)?;

        let mut lp = Loop::new(LoopKind::For, condition, self.parse_statement()?);
        lp.init = init;
        lp.update = update;
        Ok(lp)
    }

    fn parse_optional_expression(&mut self, terminator: &TokenKind) -> CompileResult<Option<Expr>> {
        if self.check(terminator) {
            Ok(None)
        } else {
            self.parse_expression().map(Some)
        }
    }

    fn parse_return_statement(&mut self) -> CompileResult<Stmt> {
        let start_span = self.expect(TokenKind::Return)?.span;

        let value = self.parse_optional_expression(&TokenKind::Semi)?;
        self.expect(TokenKind::Semi)?;

        Ok(Stmt::new(StmtKind::Return(value), self.span_from(start_span)))
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expression(&mut self) -> CompileResult<Expr> {
        let first = self.parse_assignment_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }

        let start_span = first.span;
        let mut exprs = vec![first];
        while self.match_token(&TokenKind::Comma)? {
            exprs.push(self.parse_assignment_expression()?);
        }
        Ok(Expr::new(ExprKind::Comma(exprs), self.span_from(start_span)))
    }

    fn parse_assignment_expression(&mut self) -> CompileResult<Expr> {
        let left = self.parse_conditional_expression()?;

        if let Some(op) = self.assignment_op() {
            self.advance()?;
            let right = self.nested(Self::parse_assignment_expression)?;
            let span = left.span.merge(right.span);
            return Ok(Expr::new(
                ExprKind::Assign {
                    op,
                    target: Box::new(left),
                    value: Box::new(right),
                },
                span,
            ));
        }

        Ok(left)
    }

    /// `=` gives `Some(None)`; `op=` gives `Some(Some(op))`
    fn assignment_op(&self) -> Option<Option<BinaryOp>> {
        let op = match &self.current.kind {
            TokenKind::Eq => return Some(None),
            TokenKind::PlusEq => BinaryOp::Add,
            TokenKind::MinusEq => BinaryOp::Sub,
            TokenKind::StarEq => BinaryOp::Mul,
            TokenKind::SlashEq => BinaryOp::Div,
            TokenKind::PercentEq => BinaryOp::Mod,
            TokenKind::AmpEq => BinaryOp::BitAnd,
            TokenKind::PipeEq => BinaryOp::BitOr,
            TokenKind::CaretEq => BinaryOp::BitXor,
            TokenKind::LtLtEq => BinaryOp::Shl,
            TokenKind::GtGtEq => BinaryOp::Shr,
            _ => return None,
        };
        Some(Some(op))
    }

    fn parse_conditional_expression(&mut self) -> CompileResult<Expr> {
        let condition = self.parse_binary_expression(1)?;

        if self.match_token(&TokenKind::Question)? {
            let then_expr = self.nested(Self::parse_expression)?;
            self.expect(TokenKind::Colon)?;
            let else_expr = self.nested(Self::parse_conditional_expression)?;
            let span = condition.span.merge(else_expr.span);

            return Ok(Expr::new(
                ExprKind::Ternary {
                    condition: Box::new(condition),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
                span,
            ));
        }

        Ok(condition)
    }

    /// Precedence climbing over the left-associative binary operators
    fn parse_binary_expression(&mut self, min_precedence: u8) -> CompileResult<Expr> {
        self.chain(|p| p.parse_binary_chain(min_precedence))
    }

    fn parse_binary_chain(&mut self, min_precedence: u8) -> CompileResult<Expr> {
        let mut left = self.parse_unary_expression()?;

        while let Some(precedence) = self
            .current
            .kind
            .binary_precedence()
            .filter(|&p| p >= min_precedence)
        {
            self.link()?;
            let op = match self.advance()?.kind {
                TokenKind::PipePipe => BinaryOp::LogOr,
                TokenKind::AmpAmp => BinaryOp::LogAnd,
                TokenKind::Pipe => BinaryOp::BitOr,
                TokenKind::Caret => BinaryOp::BitXor,
                TokenKind::Amp => BinaryOp::BitAnd,
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::LtEq => BinaryOp::Le,
                TokenKind::GtEq => BinaryOp::Ge,
                TokenKind::LtLt => BinaryOp::Shl,
                TokenKind::GtGt => BinaryOp::Shr,
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => BinaryOp::Mod,
            };
            let right = self.parse_binary_expression(precedence + 1)?;
            let span = left.span.merge(right.span);
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> CompileResult<Expr> {
        self.nested(Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> CompileResult<Expr> {
        let start_span = self.current.span;
        let is_cast =
            self.check(&TokenKind::LParen) && self.peek_kind()?.can_start_declaration();

        let wrap: fn(Box<Expr>) -> ExprKind = match &self.current.kind {
            TokenKind::PlusPlus => |operand| ExprKind::Step { operand, decrement: false, postfix: false },
            TokenKind::MinusMinus => |operand| ExprKind::Step { operand, decrement: true, postfix: false },
            TokenKind::Amp => ExprKind::AddrOf,
            TokenKind::Star => ExprKind::Deref,
            TokenKind::Minus => |operand| ExprKind::Unary { op: UnaryOp::Neg, operand },
            TokenKind::Bang => |operand| ExprKind::Unary { op: UnaryOp::Not, operand },
            TokenKind::Tilde => |operand| ExprKind::Unary { op: UnaryOp::BitNot, operand },
            TokenKind::Plus => {
                // Unary + is a no-op
                self.advance()?;
                return self.parse_unary_expression();
            }
            TokenKind::Sizeof => {
                self.advance()?;
                let arg = self.parse_sizeof_arg()?;
                return Ok(Expr::new(ExprKind::Sizeof(arg), self.span_from(start_span)));
            }
            TokenKind::Alignof => {
                self.advance()?;
                let arg = self.parse_sizeof_arg()?;
                return Ok(Expr::new(ExprKind::Alignof(arg), self.span_from(start_span)));
            }
            TokenKind::LParen if is_cast => {
                self.advance()?;
                let ty = self.parse_type_name()?;
                self.expect(TokenKind::RParen)?;
                let operand = self.parse_unary_expression()?;
                let span = start_span.merge(operand.span);
                return Ok(Expr::new(
                    ExprKind::Cast {
                        ty,
                        expr: Box::new(operand),
                    },
                    span,
                ));
            }
            _ => return self.parse_postfix_expression(),
        };

        self.advance()?;
        let operand = self.parse_unary_expression()?;
        let span = start_span.merge(operand.span);
        Ok(Expr::new(wrap(Box::new(operand)), span))
    }

    /// Operand of `sizeof`/`_Alignof`: `(type)` or a unary expression
    fn parse_sizeof_arg(&mut self) -> CompileResult<SizeofArg> {
        if self.check(&TokenKind::LParen) && self.peek_kind()?.can_start_declaration() {
            self.advance()?;
            let ty = self.parse_type_name()?;
            self.expect(TokenKind::RParen)?;
            Ok(SizeofArg::Type(ty))
        } else {
            Ok(SizeofArg::Expr(Box::new(self.parse_unary_expression()?)))
        }
    }

    fn parse_postfix_expression(&mut self) -> CompileResult<Expr> {
        self.chain(Self::parse_postfix_chain)
    }

    fn parse_postfix_chain(&mut self) -> CompileResult<Expr> {
        let mut expr = self.parse_primary_expression()?;

        loop {
            let start_span = expr.span;
            let kind = match &self.current.kind {
                TokenKind::LBracket => {
                    self.advance()?;
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket)?;
                    ExprKind::Index {
                        array: Box::new(expr),
                        index: Box::new(index),
                    }
                }
                TokenKind::LParen => {
                    self.advance()?;
                    let args = self.parse_argument_list()?;
                    self.expect(TokenKind::RParen)?;
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    }
                }
                TokenKind::Dot => {
                    self.advance()?;
                    let (field, _) = self.expect_identifier("member name")?;
                    ExprKind::Member {
                        object: Box::new(expr),
                        field,
                        resolved: None,
                    }
                }
                TokenKind::Arrow => {
                    self.advance()?;
                    let (field, _) = self.expect_identifier("member name")?;
                    ExprKind::PtrMember {
                        pointer: Box::new(expr),
                        field,
                        resolved: None,
                    }
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let decrement = self.advance()?.kind == TokenKind::MinusMinus;
                    ExprKind::Step {
                        operand: Box::new(expr),
                        decrement,
                        postfix: true,
                    }
                }
                _ => break,
            };
            self.link()?;
            expr = Expr::new(kind, self.span_from(start_span));
        }

        Ok(expr)
    }

    fn parse_argument_list(&mut self) -> CompileResult<Vec<Expr>> {
        let mut args = Vec::new();

        if self.check(&TokenKind::RParen) {
            return Ok(args);
        }

        loop {
            args.push(self.parse_assignment_expression()?);
            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
        }

        Ok(args)
    }

    fn parse_primary_expression(&mut self) -> CompileResult<Expr> {
        let span = self.current.span;
        let is_stmt_expr =
            self.check(&TokenKind::LParen) && matches!(self.peek_kind()?, TokenKind::LBrace);

        let kind = match &self.current.kind {
            TokenKind::IntLiteral(value) => ExprKind::IntLiteral(*value),
            TokenKind::CharLiteral(value) => ExprKind::CharLiteral(*value),
            TokenKind::StringLiteral(_) => return self.parse_string_literal(),
            TokenKind::Identifier(name) => ExprKind::Identifier(name.clone()),
            TokenKind::LParen if is_stmt_expr => {
                self.advance()?;
                let block = self.parse_block()?;
                self.expect(TokenKind::RParen)?;
                return Ok(Expr::new(ExprKind::StmtExpr(block), self.span_from(span)));
            }
            TokenKind::LParen => {
                let mut expr = self.parse_parenthesized()?;
                expr.span = self.span_from(span);
                return Ok(expr);
            }
            TokenKind::FloatLiteral(_) => return Err(self.unsupported("floating point")),
            TokenKind::Reserved(word) => return Err(self.unsupported(&format!("'{}'", word))),
            other => {
                return Err(CompileError::parser(
                    format!("unexpected token in expression: {}", other),
                    span,
                ));
            }
        };

        self.advance()?;
        Ok(Expr::new(kind, span))
    }

    /// Adjacent string literals concatenate
    fn parse_string_literal(&mut self) -> CompileResult<Expr> {
        let start_span = self.current.span;
        let mut value = String::new();
        while let TokenKind::StringLiteral(part) = &self.current.kind {
            value.push_str(part);
            self.advance()?;
        }
        Ok(Expr::new(ExprKind::StringLiteral(value), self.span_from(start_span)))
    }

    // =========================================================================
    // Initializers
    // =========================================================================

    fn parse_initializer(&mut self) -> CompileResult<Initializer> {
        if self.check(&TokenKind::LBrace) {
            self.nested(Self::parse_initializer_list)
        } else {
            Ok(Initializer::Expr(self.parse_assignment_expression()?))
        }
    }

    fn parse_initializer_list(&mut self) -> CompileResult<Initializer> {
        let start_span = self.expect(TokenKind::LBrace)?.span;
        let mut items = Vec::new();

        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Dot) || self.check(&TokenKind::LBracket) {
                return Err(self.unsupported("a designated initializer"));
            }
            items.push(self.parse_initializer()?);

            // Trailing comma allowed
            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
        }

        self.expect(TokenKind::RBrace)?;
        Ok(Initializer::List(items, self.span_from(start_span)))
    }
}
