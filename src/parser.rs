use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Keyword, Lexer, TemplatePiece, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = Lexer::tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_program()
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!("Expected {kind} but found {}", self.peek_kind())))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(format!("Expected identifier but found {other}"))),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self.peek();
        ParseError {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }

    /// Consume an explicit `;` or accept automatic insertion before `}`,
    /// end of input, or a line break.
    fn expect_statement_end(&mut self) -> Result<(), ParseError> {
        if self.eat(&TokenKind::Semicolon) {
            return Ok(());
        }
        match self.peek_kind() {
            TokenKind::RightBrace | TokenKind::Eof => Ok(()),
            _ => {
                let prev_line = self.tokens[self.pos.saturating_sub(1)].line;
                if self.peek().line > prev_line {
                    Ok(())
                } else {
                    Err(self.error_here(format!("Unexpected token {}", self.peek_kind())))
                }
            }
        }
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while !self.check(&TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let (line, column) = (self.peek().line, self.peek().column);
        let kind = self.parse_statement_kind()?;
        Ok(Statement { kind, line, column })
    }

    fn parse_statement_kind(&mut self) -> Result<StmtKind, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Semicolon => {
                self.advance();
                Ok(StmtKind::Empty)
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut body = Vec::new();
                while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
                    body.push(self.parse_statement()?);
                }
                self.expect(&TokenKind::RightBrace)?;
                Ok(StmtKind::Block(body))
            }
            TokenKind::Keyword(Keyword::Var) => self.parse_variable_statement(VarKind::Var),
            TokenKind::Keyword(Keyword::Let) => self.parse_variable_statement(VarKind::Let),
            TokenKind::Keyword(Keyword::Const) => self.parse_variable_statement(VarKind::Const),
            TokenKind::Keyword(Keyword::Function) => {
                let decl = self.parse_function_decl(false)?;
                Ok(StmtKind::FunctionDeclaration(decl))
            }
            TokenKind::Keyword(Keyword::Async)
                if matches!(self.peek_kind_at(1), TokenKind::Keyword(Keyword::Function)) =>
            {
                self.advance(); // async
                let decl = self.parse_function_decl(true)?;
                Ok(StmtKind::FunctionDeclaration(decl))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                let value = if self.check(&TokenKind::Semicolon)
                    || self.check(&TokenKind::RightBrace)
                    || self.check(&TokenKind::Eof)
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect_statement_end()?;
                Ok(StmtKind::Return(value))
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                let label = self.optional_label();
                self.expect_statement_end()?;
                Ok(StmtKind::Break(label))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                let label = self.optional_label();
                self.expect_statement_end()?;
                Ok(StmtKind::Continue(label))
            }
            TokenKind::Keyword(Keyword::Throw) => {
                self.advance();
                let value = self.parse_expression()?;
                self.expect_statement_end()?;
                Ok(StmtKind::Throw(value))
            }
            TokenKind::Keyword(Keyword::Try) => self.parse_try(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(),
            TokenKind::Identifier(name)
                if matches!(self.peek_kind_at(1), TokenKind::Colon) =>
            {
                self.advance(); // label
                self.advance(); // :
                let body = self.parse_statement()?;
                Ok(StmtKind::Labeled(name, Box::new(body)))
            }
            _ => {
                let expr = self.parse_expression()?;
                self.expect_statement_end()?;
                Ok(StmtKind::Expression(expr))
            }
        }
    }

    fn optional_label(&mut self) -> Option<String> {
        let prev_line = self.tokens[self.pos.saturating_sub(1)].line;
        if let TokenKind::Identifier(name) = self.peek_kind().clone() {
            // A label must sit on the same line as the break/continue.
            if self.peek().line == prev_line {
                self.advance();
                return Some(name);
            }
        }
        None
    }

    fn parse_variable_statement(&mut self, kind: VarKind) -> Result<StmtKind, ParseError> {
        self.advance(); // var/let/const
        let mut declarations = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            if kind == VarKind::Const && init.is_none() {
                return Err(self.error_here(format!(
                    "Missing initializer in const declaration of '{name}'"
                )));
            }
            declarations.push(VariableDeclarator { name, init });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_statement_end()?;
        Ok(StmtKind::Variable(VariableDeclaration { kind, declarations }))
    }

    fn parse_function_decl(&mut self, is_async: bool) -> Result<FunctionDecl, ParseError> {
        let line = self.peek().line;
        self.expect(&TokenKind::Keyword(Keyword::Function))?;
        let name = self.expect_identifier()?;
        let params = self.parse_params()?;
        let body = self.parse_function_body()?;
        Ok(FunctionDecl {
            name,
            params,
            body,
            is_async,
            line,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(&TokenKind::LeftParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                params.push(self.expect_identifier()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(params)
    }

    fn parse_function_body(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // if
        self.expect(&TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat(&TokenKind::Keyword(Keyword::Else)) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(StmtKind::If(IfStatement {
            test,
            consequent,
            alternate,
        }))
    }

    fn parse_while(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // while
        self.expect(&TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(StmtKind::While(WhileStatement { test, body }))
    }

    fn parse_do_while(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // do
        let body = Box::new(self.parse_statement()?);
        self.expect(&TokenKind::Keyword(Keyword::While))?;
        self.expect(&TokenKind::LeftParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        self.eat(&TokenKind::Semicolon);
        Ok(StmtKind::DoWhile(DoWhileStatement { test, body }))
    }

    fn parse_for(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // for
        self.expect(&TokenKind::LeftParen)?;
        let init = if self.eat(&TokenKind::Semicolon) {
            None
        } else if let TokenKind::Keyword(kw @ (Keyword::Var | Keyword::Let | Keyword::Const)) =
            self.peek_kind()
        {
            let kind = match kw {
                Keyword::Var => VarKind::Var,
                Keyword::Let => VarKind::Let,
                _ => VarKind::Const,
            };
            self.advance();
            let mut declarations = Vec::new();
            loop {
                let name = self.expect_identifier()?;
                let init = if self.eat(&TokenKind::Assign) {
                    Some(self.parse_assignment()?)
                } else {
                    None
                };
                declarations.push(VariableDeclarator { name, init });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::Semicolon)?;
            Some(ForInit::Variable(VariableDeclaration { kind, declarations }))
        } else {
            let expr = self.parse_expression()?;
            self.expect(&TokenKind::Semicolon)?;
            Some(ForInit::Expression(expr))
        };
        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        let update = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RightParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(StmtKind::For(ForStatement {
            init,
            test,
            update,
            body,
        }))
    }

    fn parse_try(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // try
        let block = self.parse_function_body()?;
        let handler = if self.eat(&TokenKind::Keyword(Keyword::Catch)) {
            let param = if self.eat(&TokenKind::LeftParen) {
                let name = self.expect_identifier()?;
                self.expect(&TokenKind::RightParen)?;
                Some(name)
            } else {
                None
            };
            let body = self.parse_function_body()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.eat(&TokenKind::Keyword(Keyword::Finally)) {
            Some(self.parse_function_body()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error_here("Missing catch or finally after try"));
        }
        Ok(StmtKind::Try(TryStatement {
            block,
            handler,
            finalizer,
        }))
    }

    fn parse_switch(&mut self) -> Result<StmtKind, ParseError> {
        self.advance(); // switch
        self.expect(&TokenKind::LeftParen)?;
        let discriminant = self.parse_expression()?;
        self.expect(&TokenKind::RightParen)?;
        self.expect(&TokenKind::LeftBrace)?;
        let mut cases = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            let test = if self.eat(&TokenKind::Keyword(Keyword::Case)) {
                let test = self.parse_expression()?;
                self.expect(&TokenKind::Colon)?;
                Some(test)
            } else {
                self.expect(&TokenKind::Keyword(Keyword::Default))?;
                self.expect(&TokenKind::Colon)?;
                None
            };
            let mut consequent = Vec::new();
            while !self.check(&TokenKind::RightBrace)
                && !self.check(&TokenKind::Keyword(Keyword::Case))
                && !self.check(&TokenKind::Keyword(Keyword::Default))
                && !self.check(&TokenKind::Eof)
            {
                consequent.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, consequent });
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(StmtKind::Switch(SwitchStatement { discriminant, cases }))
    }

    // ----- expressions -----

    pub fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        let first = self.parse_assignment()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat(&TokenKind::Comma) {
            exprs.push(self.parse_assignment()?);
        }
        Ok(Expression::Sequence(exprs))
    }

    fn parse_assignment(&mut self) -> Result<Expression, ParseError> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }
        let left = self.parse_conditional()?;
        let op = match self.peek_kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::AddAssign,
            TokenKind::MinusAssign => AssignOp::SubAssign,
            TokenKind::StarAssign => AssignOp::MulAssign,
            TokenKind::SlashAssign => AssignOp::DivAssign,
            TokenKind::PercentAssign => AssignOp::ModAssign,
            TokenKind::ExponentAssign => AssignOp::ExpAssign,
            TokenKind::LeftShiftAssign => AssignOp::LShiftAssign,
            TokenKind::RightShiftAssign => AssignOp::RShiftAssign,
            TokenKind::UnsignedRightShiftAssign => AssignOp::URShiftAssign,
            TokenKind::AmpersandAssign => AssignOp::BitAndAssign,
            TokenKind::PipeAssign => AssignOp::BitOrAssign,
            TokenKind::CaretAssign => AssignOp::BitXorAssign,
            _ => return Ok(left),
        };
        if !matches!(left, Expression::Identifier(_) | Expression::Member(_, _)) {
            return Err(self.error_here("Invalid assignment target"));
        }
        self.advance();
        let right = self.parse_assignment()?;
        Ok(Expression::Assign(op, Box::new(left), Box::new(right)))
    }

    /// Detect `x =>`, `(a, b) =>`, `async x =>`, `async (a) =>` without
    /// committing the cursor; returns None when the tokens are not an
    /// arrow function head.
    fn try_parse_arrow(&mut self) -> Result<Option<Expression>, ParseError> {
        let (is_async, offset) =
            if matches!(self.peek_kind(), TokenKind::Keyword(Keyword::Async)) {
                (true, 1usize)
            } else {
                (false, 0usize)
            };

        match self.peek_kind_at(offset) {
            TokenKind::Identifier(_) => {
                if !matches!(self.peek_kind_at(offset + 1), TokenKind::Arrow) {
                    return Ok(None);
                }
                let line = self.peek().line;
                if is_async {
                    self.advance();
                }
                let name = self.expect_identifier()?;
                self.expect(&TokenKind::Arrow)?;
                let body = self.parse_arrow_body()?;
                Ok(Some(Expression::ArrowFunction(ArrowFunction {
                    params: vec![name],
                    body,
                    is_async,
                    line,
                })))
            }
            TokenKind::LeftParen => {
                let close = match self.find_matching_paren(self.pos + offset) {
                    Some(idx) => idx,
                    None => return Ok(None),
                };
                if !matches!(self.tokens[close + 1].kind, TokenKind::Arrow) {
                    return Ok(None);
                }
                let line = self.peek().line;
                if is_async {
                    self.advance();
                }
                let params = self.parse_params()?;
                self.expect(&TokenKind::Arrow)?;
                let body = self.parse_arrow_body()?;
                Ok(Some(Expression::ArrowFunction(ArrowFunction {
                    params,
                    body,
                    is_async,
                    line,
                })))
            }
            _ => Ok(None),
        }
    }

    fn find_matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (idx, token) in self.tokens.iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        return if idx + 1 < self.tokens.len() {
                            Some(idx)
                        } else {
                            None
                        };
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
        }
        None
    }

    fn parse_arrow_body(&mut self) -> Result<ArrowBody, ParseError> {
        if self.check(&TokenKind::LeftBrace) {
            Ok(ArrowBody::Block(self.parse_function_body()?))
        } else {
            Ok(ArrowBody::Expression(Box::new(self.parse_assignment()?)))
        }
    }

    fn parse_conditional(&mut self) -> Result<Expression, ParseError> {
        let test = self.parse_nullish()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect(&TokenKind::Colon)?;
        let alternate = self.parse_assignment()?;
        Ok(Expression::Conditional(
            Box::new(test),
            Box::new(consequent),
            Box::new(alternate),
        ))
    }

    fn parse_nullish(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_logical_or()?;
        while self.eat(&TokenKind::NullishCoalescing) {
            let right = self.parse_logical_or()?;
            left = Expression::Logical(
                LogicalOp::NullishCoalescing,
                Box::new(left),
                Box::new(right),
            );
        }
        Ok(left)
    }

    fn parse_logical_or(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_logical_and()?;
        while self.eat(&TokenKind::LogicalOr) {
            let right = self.parse_logical_and()?;
            left = Expression::Logical(LogicalOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_bitwise_or()?;
        while self.eat(&TokenKind::LogicalAnd) {
            let right = self.parse_bitwise_or()?;
            left = Expression::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_bitwise_or(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_bitwise_xor()?;
        while self.eat(&TokenKind::Pipe) {
            let right = self.parse_bitwise_xor()?;
            left = Expression::Binary(BinaryOp::BitOr, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_bitwise_xor(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_bitwise_and()?;
        while self.eat(&TokenKind::Caret) {
            let right = self.parse_bitwise_and()?;
            left = Expression::Binary(BinaryOp::BitXor, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_bitwise_and(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_equality()?;
        while self.eat(&TokenKind::Ampersand) {
            let right = self.parse_equality()?;
            left = Expression::Binary(BinaryOp::BitAnd, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Equal => BinaryOp::Eq,
                TokenKind::NotEqual => BinaryOp::NotEq,
                TokenKind::StrictEqual => BinaryOp::StrictEq,
                TokenKind::StrictNotEqual => BinaryOp::StrictNotEq,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expression::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_shift()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::LessThan => BinaryOp::Lt,
                TokenKind::GreaterThan => BinaryOp::Gt,
                TokenKind::LessThanEqual => BinaryOp::LtEq,
                TokenKind::GreaterThanEqual => BinaryOp::GtEq,
                TokenKind::Keyword(Keyword::Instanceof) => BinaryOp::Instanceof,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_shift()?;
            left = Expression::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_shift(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::LeftShift => BinaryOp::LShift,
                TokenKind::RightShift => BinaryOp::RShift,
                TokenKind::UnsignedRightShift => BinaryOp::URShift,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expression::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expression::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_exponent()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_exponent()?;
            left = Expression::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_exponent(&mut self) -> Result<Expression, ParseError> {
        let left = self.parse_unary()?;
        if self.eat(&TokenKind::Exponent) {
            // Right-associative
            let right = self.parse_exponent()?;
            return Ok(Expression::Binary(
                BinaryOp::Exp,
                Box::new(left),
                Box::new(right),
            ));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Bang => {
                self.advance();
                Ok(Expression::Unary(
                    UnaryOp::Not,
                    Box::new(self.parse_unary()?),
                ))
            }
            TokenKind::Tilde => {
                self.advance();
                Ok(Expression::Unary(
                    UnaryOp::BitNot,
                    Box::new(self.parse_unary()?),
                ))
            }
            TokenKind::Plus => {
                self.advance();
                Ok(Expression::Unary(
                    UnaryOp::Plus,
                    Box::new(self.parse_unary()?),
                ))
            }
            TokenKind::Minus => {
                self.advance();
                Ok(Expression::Unary(
                    UnaryOp::Minus,
                    Box::new(self.parse_unary()?),
                ))
            }
            TokenKind::Increment => {
                self.advance();
                Ok(Expression::Update(
                    UpdateOp::Increment,
                    true,
                    Box::new(self.parse_unary()?),
                ))
            }
            TokenKind::Decrement => {
                self.advance();
                Ok(Expression::Update(
                    UpdateOp::Decrement,
                    true,
                    Box::new(self.parse_unary()?),
                ))
            }
            TokenKind::Keyword(Keyword::Typeof) => {
                self.advance();
                Ok(Expression::Typeof(Box::new(self.parse_unary()?)))
            }
            TokenKind::Keyword(Keyword::Void) => {
                self.advance();
                Ok(Expression::Void(Box::new(self.parse_unary()?)))
            }
            TokenKind::Keyword(Keyword::Delete) => {
                self.advance();
                Ok(Expression::Delete(Box::new(self.parse_unary()?)))
            }
            TokenKind::Keyword(Keyword::Await) => {
                self.advance();
                Ok(Expression::Await(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let expr = self.parse_call_member()?;
        let prev_line = self.tokens[self.pos.saturating_sub(1)].line;
        match self.peek_kind() {
            // A postfix operator may not cross a line break.
            TokenKind::Increment if self.peek().line == prev_line => {
                self.advance();
                Ok(Expression::Update(
                    UpdateOp::Increment,
                    false,
                    Box::new(expr),
                ))
            }
            TokenKind::Decrement if self.peek().line == prev_line => {
                self.advance();
                Ok(Expression::Update(
                    UpdateOp::Decrement,
                    false,
                    Box::new(expr),
                ))
            }
            _ => Ok(expr),
        }
    }

    fn parse_call_member(&mut self) -> Result<Expression, ParseError> {
        let mut expr = if self.eat(&TokenKind::Keyword(Keyword::New)) {
            let callee = self.parse_member_only()?;
            let args = if self.check(&TokenKind::LeftParen) {
                self.parse_arguments()?
            } else {
                Vec::new()
            };
            Expression::New(Box::new(callee), args)
        } else {
            self.parse_primary()?
        };

        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_property_name()?;
                    expr = Expression::Member(Box::new(expr), MemberProperty::Dot(name));
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let key = self.parse_expression()?;
                    self.expect(&TokenKind::RightBracket)?;
                    expr =
                        Expression::Member(Box::new(expr), MemberProperty::Computed(Box::new(key)));
                }
                TokenKind::LeftParen => {
                    let args = self.parse_arguments()?;
                    expr = Expression::Call(Box::new(expr), args);
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Like `parse_call_member` but stops before a call, so `new a.b.C()`
    /// attaches the argument list to the `new` and not to a call.
    fn parse_member_only(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_property_name()?;
                    expr = Expression::Member(Box::new(expr), MemberProperty::Dot(name));
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let key = self.parse_expression()?;
                    self.expect(&TokenKind::RightBracket)?;
                    expr =
                        Expression::Member(Box::new(expr), MemberProperty::Computed(Box::new(key)));
                }
                _ => return Ok(expr),
            }
        }
    }

    /// After `.` any identifier-shaped word is a property name, including
    /// keywords (`p.catch`, `p.finally`).
    fn expect_property_name(&mut self) -> Result<String, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            TokenKind::Keyword(kw) => {
                self.advance();
                Ok(keyword_text(kw).to_string())
            }
            other => Err(self.error_here(format!("Expected property name but found {other}"))),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        self.expect(&TokenKind::LeftParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                if self.eat(&TokenKind::Ellipsis) {
                    args.push(Expression::Spread(Box::new(self.parse_assignment()?)));
                } else {
                    args.push(self.parse_assignment()?);
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::NumericLiteral(n) => {
                self.advance();
                Ok(Expression::Literal(Literal::Number(n)))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(Expression::Literal(Literal::String(s)))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expression::Literal(Literal::Null))
            }
            TokenKind::Keyword(Keyword::This) => {
                self.advance();
                Ok(Expression::This)
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if name == "undefined" {
                    Ok(Expression::Literal(Literal::Undefined))
                } else {
                    Ok(Expression::Identifier(name))
                }
            }
            TokenKind::Keyword(Keyword::Function) => {
                Ok(Expression::Function(self.parse_function_expr(false)?))
            }
            TokenKind::Keyword(Keyword::Async)
                if matches!(self.peek_kind_at(1), TokenKind::Keyword(Keyword::Function)) =>
            {
                self.advance(); // async
                Ok(Expression::Function(self.parse_function_expr(true)?))
            }
            TokenKind::Template(pieces) => {
                self.advance();
                self.parse_template(pieces)
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::LeftBracket => self.parse_array_literal(),
            TokenKind::LeftBrace => self.parse_object_literal(),
            other => Err(self.error_here(format!("Unexpected token {other}"))),
        }
    }

    fn parse_function_expr(&mut self, is_async: bool) -> Result<FunctionExpr, ParseError> {
        let line = self.peek().line;
        self.expect(&TokenKind::Keyword(Keyword::Function))?;
        let name = if let TokenKind::Identifier(name) = self.peek_kind().clone() {
            self.advance();
            Some(name)
        } else {
            None
        };
        let params = self.parse_params()?;
        let body = self.parse_function_body()?;
        Ok(FunctionExpr {
            name,
            params,
            body,
            is_async,
            line,
        })
    }

    fn parse_template(&mut self, pieces: Vec<TemplatePiece>) -> Result<Expression, ParseError> {
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();
        for piece in pieces {
            match piece {
                TemplatePiece::Chunk(text) => quasis.push(text),
                TemplatePiece::Expr(source) => {
                    if quasis.len() == expressions.len() {
                        quasis.push(String::new());
                    }
                    expressions.push(parse_expression_source(&source)?);
                }
            }
        }
        while quasis.len() <= expressions.len() {
            quasis.push(String::new());
        }
        Ok(Expression::Template(TemplateLiteral {
            quasis,
            expressions,
        }))
    }

    fn parse_array_literal(&mut self) -> Result<Expression, ParseError> {
        self.expect(&TokenKind::LeftBracket)?;
        let mut elements = Vec::new();
        loop {
            if self.check(&TokenKind::RightBracket) {
                break;
            }
            if self.eat(&TokenKind::Comma) {
                // Elision hole
                elements.push(None);
                continue;
            }
            if self.eat(&TokenKind::Ellipsis) {
                elements.push(Some(Expression::Spread(Box::new(self.parse_assignment()?))));
            } else {
                elements.push(Some(self.parse_assignment()?));
            }
            if !self.check(&TokenKind::RightBracket) {
                self.expect(&TokenKind::Comma)?;
            }
        }
        self.expect(&TokenKind::RightBracket)?;
        Ok(Expression::Array(elements))
    }

    fn parse_object_literal(&mut self) -> Result<Expression, ParseError> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut props = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.check(&TokenKind::Eof) {
            if self.eat(&TokenKind::Ellipsis) {
                let value = self.parse_assignment()?;
                props.push(Property {
                    key: PropertyKey::Spread,
                    value,
                    shorthand: false,
                });
            } else {
                let key = match self.peek_kind().clone() {
                    TokenKind::Identifier(name) => {
                        self.advance();
                        PropertyKey::Identifier(name)
                    }
                    TokenKind::Keyword(kw) => {
                        self.advance();
                        PropertyKey::Identifier(keyword_text(kw).to_string())
                    }
                    TokenKind::StringLiteral(s) => {
                        self.advance();
                        PropertyKey::String(s)
                    }
                    TokenKind::NumericLiteral(n) => {
                        self.advance();
                        PropertyKey::Number(n)
                    }
                    TokenKind::LeftBracket => {
                        self.advance();
                        let key_expr = self.parse_assignment()?;
                        self.expect(&TokenKind::RightBracket)?;
                        PropertyKey::Computed(Box::new(key_expr))
                    }
                    other => {
                        return Err(
                            self.error_here(format!("Unexpected token {other} in object literal"))
                        )
                    }
                };
                if self.eat(&TokenKind::Colon) {
                    let value = self.parse_assignment()?;
                    props.push(Property {
                        key,
                        value,
                        shorthand: false,
                    });
                } else if let PropertyKey::Identifier(ref name) = key {
                    // Shorthand { a }
                    let value = Expression::Identifier(name.clone());
                    props.push(Property {
                        key,
                        value,
                        shorthand: true,
                    });
                } else {
                    return Err(self.error_here("Expected ':' in object literal"));
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(Expression::Object(props))
    }
}

/// Parse a standalone expression source, used for `${...}` template slots.
fn parse_expression_source(source: &str) -> Result<Expression, ParseError> {
    let tokens = Lexer::tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    parser.expect(&TokenKind::Eof)?;
    Ok(expr)
}

fn keyword_text(kw: Keyword) -> &'static str {
    match kw {
        Keyword::Async => "async",
        Keyword::Await => "await",
        Keyword::Break => "break",
        Keyword::Case => "case",
        Keyword::Catch => "catch",
        Keyword::Const => "const",
        Keyword::Continue => "continue",
        Keyword::Default => "default",
        Keyword::Delete => "delete",
        Keyword::Do => "do",
        Keyword::Else => "else",
        Keyword::False => "false",
        Keyword::Finally => "finally",
        Keyword::For => "for",
        Keyword::Function => "function",
        Keyword::If => "if",
        Keyword::Instanceof => "instanceof",
        Keyword::Let => "let",
        Keyword::New => "new",
        Keyword::Null => "null",
        Keyword::Return => "return",
        Keyword::Switch => "switch",
        Keyword::This => "this",
        Keyword::Throw => "throw",
        Keyword::True => "true",
        Keyword::Try => "try",
        Keyword::Typeof => "typeof",
        Keyword::Var => "var",
        Keyword::Void => "void",
        Keyword::While => "while",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        parse(src).unwrap()
    }

    fn first_expr(program: &Program) -> &Expression {
        match &program.body[0].kind {
            StmtKind::Expression(e) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn variable_declarations() {
        let program = parse_ok("let a = 1, b;\nconst c = 2;");
        assert_eq!(program.body.len(), 2);
        match &program.body[0].kind {
            StmtKind::Variable(decl) => {
                assert_eq!(decl.kind, VarKind::Let);
                assert_eq!(decl.declarations.len(), 2);
                assert_eq!(decl.declarations[1].name, "b");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn const_requires_initializer() {
        assert!(parse("const x;").is_err());
    }

    #[test]
    fn operator_precedence() {
        let program = parse_ok("1 + 2 * 3;");
        match first_expr(&program) {
            Expression::Binary(BinaryOp::Add, _, right) => {
                assert!(matches!(**right, Expression::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn exponent_is_right_associative() {
        let program = parse_ok("2 ** 3 ** 2;");
        match first_expr(&program) {
            Expression::Binary(BinaryOp::Exp, _, right) => {
                assert!(matches!(**right, Expression::Binary(BinaryOp::Exp, _, _)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn arrow_function_forms() {
        let program = parse_ok("x => x + 1;");
        assert!(matches!(
            first_expr(&program),
            Expression::ArrowFunction(ArrowFunction {
                body: ArrowBody::Expression(_),
                ..
            })
        ));

        let program = parse_ok("(a, b) => { return a; };");
        match first_expr(&program) {
            Expression::ArrowFunction(arrow) => {
                assert_eq!(arrow.params, vec!["a".to_string(), "b".to_string()]);
                assert!(matches!(arrow.body, ArrowBody::Block(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let program = parse_ok("async () => 1;");
        match first_expr(&program) {
            Expression::ArrowFunction(arrow) => assert!(arrow.is_async),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parenthesized_expression_is_not_arrow() {
        let program = parse_ok("(a + b) * 2;");
        assert!(matches!(
            first_expr(&program),
            Expression::Binary(BinaryOp::Mul, _, _)
        ));
    }

    #[test]
    fn call_and_member_chains() {
        let program = parse_ok("console.log(a[0], ...rest);");
        match first_expr(&program) {
            Expression::Call(callee, args) => {
                assert!(matches!(**callee, Expression::Member(_, _)));
                assert_eq!(args.len(), 2);
                assert!(matches!(args[1], Expression::Spread(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn keyword_property_names() {
        let program = parse_ok("p.catch(f).finally(g);");
        assert!(matches!(first_expr(&program), Expression::Call(_, _)));
    }

    #[test]
    fn new_expression_binds_arguments() {
        let program = parse_ok("new Promise(fn);");
        match first_expr(&program) {
            Expression::New(callee, args) => {
                assert!(matches!(**callee, Expression::Identifier(_)));
                assert_eq!(args.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn async_function_declaration() {
        let program = parse_ok("async function f() { await g(); }");
        match &program.body[0].kind {
            StmtKind::FunctionDeclaration(decl) => {
                assert!(decl.is_async);
                assert_eq!(decl.name, "f");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn template_literal_with_expressions() {
        let program = parse_ok("`a${1 + 2}b`;");
        match first_expr(&program) {
            Expression::Template(t) => {
                assert_eq!(t.quasis, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(t.expressions.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn array_holes_and_spread() {
        let program = parse_ok("[1, , 2, ...xs];");
        match first_expr(&program) {
            Expression::Array(elements) => {
                assert_eq!(elements.len(), 4);
                assert!(elements[1].is_none());
                assert!(matches!(elements[3], Some(Expression::Spread(_))));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn switch_with_default() {
        let program = parse_ok("switch (x) { case 1: a(); break; default: b(); }");
        match &program.body[0].kind {
            StmtKind::Switch(s) => {
                assert_eq!(s.cases.len(), 2);
                assert!(s.cases[0].test.is_some());
                assert!(s.cases[1].test.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn labeled_statement() {
        let program = parse_ok("outer: while (true) { break; }");
        assert!(matches!(&program.body[0].kind, StmtKind::Labeled(l, _) if l == "outer"));
    }

    #[test]
    fn statement_positions() {
        let program = parse_ok("let a = 1;\n  a = 2;");
        assert_eq!(program.body[0].line, 1);
        assert_eq!(program.body[1].line, 2);
        assert_eq!(program.body[1].column, 3);
    }

    #[test]
    fn semicolons_inserted_at_line_breaks() {
        let program = parse_ok("a = 1\nb = 2");
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn parse_error_carries_position() {
        let err = parse("let = 4;").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("identifier"));
    }
}
