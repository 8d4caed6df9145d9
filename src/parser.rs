//! Parser for the template language
//!
//! Transforms the token stream into a syntax tree with full span
//! information. Expressions are parsed by precedence climbing:
//!
//! ```text
//! || < && < (== !=) < (< <= > >=) < (+ -) < (* / %) < (! unary -) < |filter < (. [])
//! ```

use crate::ast::*;
use crate::error::{LexError, StackOverflow, SyntaxError, TemplateSource};
use crate::lexer::{Lexer, Token, TokenKind};
use miette::Result;

/// Hard ceiling on expression nesting
const MAX_EXPR_DEPTH: usize = 64;

/// Parser state
pub struct Parser {
    lexer: Lexer,
    source: TemplateSource,
    /// Current token
    current: Token,
    /// Previous token (for span info)
    previous: Token,
    /// Pending token (for lookahead pushback)
    pending: Option<Token>,
    /// Expression nesting depth
    depth: usize,
    /// Set as soon as a variable reference is parsed
    personalized: bool,
}

impl Parser {
    pub fn new(source: TemplateSource) -> Self {
        let mut lexer = Lexer::new(source.source().clone());
        let current = lexer.next_token();
        Self {
            lexer,
            source,
            current: current.clone(),
            previous: current,
            pending: None,
            depth: 0,
            personalized: false,
        }
    }

    /// Parse the full template
    pub fn parse(mut self) -> Result<SyntaxTree> {
        let mode = self.parse_mode_directive()?;
        let statements = self.parse_statements(&[])?;

        if !matches!(self.current.kind, TokenKind::Eof) {
            return Err(self.syntax_error("end of template"))?;
        }

        Ok(SyntaxTree {
            statements,
            mode,
            personalized: self.personalized,
        })
    }

    /// An optional `{mode IDENT}` or `{escape}` directive, honored only as
    /// the very first item of the template.
    fn parse_mode_directive(&mut self) -> Result<Option<String>> {
        if !self.check(&TokenKind::Open) {
            return Ok(None);
        }
        let next = self
            .pending
            .take()
            .unwrap_or_else(|| self.lexer.next_token());
        match next.kind {
            TokenKind::Mode => {
                self.previous = std::mem::replace(&mut self.current, next);
                self.advance(); // past `mode`
                let name = self.expect_ident()?;
                self.expect(&TokenKind::Close)?;
                Ok(Some(name))
            }
            TokenKind::Escape => {
                self.previous = std::mem::replace(&mut self.current, next);
                self.advance(); // past `escape`
                self.expect(&TokenKind::Close)?;
                Ok(Some("html".to_string()))
            }
            _ => {
                self.pending = Some(next);
                Ok(None)
            }
        }
    }

    /// Parse statements until a terminator directive or end of input. The
    /// terminator token itself stays pending; the caller consumes it.
    fn parse_statements(&mut self, terminators: &[TokenKind]) -> Result<Statements> {
        let start = self.current.span;
        let mut items = Vec::new();

        loop {
            match &self.current.kind {
                TokenKind::Eof => break,
                TokenKind::Error(message) => {
                    let message = message.clone();
                    return Err(LexError {
                        message,
                        span: self.current.span,
                        src: self.source.named_source(),
                    })?;
                }
                TokenKind::Text(text) => {
                    let text = text.clone();
                    let span = self.current.span;
                    self.advance();
                    items.push(Statement::Raw(RawStatement { text, span }));
                }
                TokenKind::Open => {
                    // peek at what follows the brace
                    let next = self
                        .pending
                        .take()
                        .unwrap_or_else(|| self.lexer.next_token());
                    let is_terminator = terminators
                        .iter()
                        .any(|t| std::mem::discriminant(&next.kind) == std::mem::discriminant(t));
                    if is_terminator {
                        self.pending = Some(next);
                        break;
                    }
                    self.previous = std::mem::replace(&mut self.current, next);
                    items.push(self.parse_directive()?);
                }
                _ => return Err(self.syntax_error("text or a directive"))?,
            }
        }

        let end = self.previous.span;
        Ok(Statements {
            items,
            span: join(start, end),
        })
    }

    /// Parse a directive; the opening brace is consumed and `current` is the
    /// first token inside it.
    fn parse_directive(&mut self) -> Result<Statement> {
        match &self.current.kind {
            TokenKind::If => {
                self.advance();
                self.parse_if()
            }
            TokenKind::Foreach => {
                self.advance();
                self.parse_foreach()
            }
            TokenKind::Assign => {
                self.advance();
                self.parse_assign()
            }
            TokenKind::Mode | TokenKind::Escape => {
                Err(self.syntax_error("the mode directive at the start of the template"))?
            }
            TokenKind::Error(message) => {
                let message = message.clone();
                Err(LexError {
                    message,
                    span: self.current.span,
                    src: self.source.named_source(),
                })?
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// The body of an `{if ...}`; also used for `{elseif ...}` arms, which
    /// become nested `If` statements in the else branch.
    fn parse_if(&mut self) -> Result<Statement> {
        let start = self.previous.span;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::Close)?;

        let then_branch =
            self.parse_statements(&[TokenKind::ElseIf, TokenKind::Else, TokenKind::EndIf])?;

        self.advance(); // move onto the terminator
        let else_branch = match &self.current.kind {
            TokenKind::ElseIf => {
                self.advance();
                let nested = self.parse_if()?;
                let span = match &nested {
                    Statement::If(i) => i.span,
                    _ => unreachable!(),
                };
                Some(Statements {
                    items: vec![nested],
                    span,
                })
            }
            TokenKind::Else => {
                self.advance();
                self.expect(&TokenKind::Close)?;
                let body = self.parse_statements(&[TokenKind::EndIf])?;
                self.advance(); // Open -> EndIf
                self.expect(&TokenKind::EndIf)?;
                self.expect(&TokenKind::Close)?;
                Some(body)
            }
            TokenKind::EndIf => {
                self.advance();
                self.expect(&TokenKind::Close)?;
                None
            }
            _ => return Err(self.syntax_error("{elseif}, {else} or {/if}"))?,
        };

        Ok(Statement::If(IfStatement {
            condition,
            then_branch,
            else_branch,
            span: join(start, self.previous.span),
        }))
    }

    /// `{foreach $v in $source}` or `{foreach $source as $v}` /
    /// `{foreach $source as $v => $k}`; the first binding is the value.
    fn parse_foreach(&mut self) -> Result<Statement> {
        let start = self.previous.span;
        let first = self.parse_variable_with_filters()?;

        let (source, value_name, key_name) = if self.check(&TokenKind::In) {
            let value_name = match first {
                Variable::Ref(r) => r.name,
                _ => return Err(self.syntax_error("a plain $name as the loop variable"))?,
            };
            self.advance();
            let source = self.parse_variable_with_filters()?;
            (source, value_name, None)
        } else {
            self.expect(&TokenKind::As)?;
            let value_name = self.expect_variable_name()?;
            let key_name = if self.check(&TokenKind::Arrow) {
                self.advance();
                Some(self.expect_variable_name()?)
            } else {
                None
            };
            (first, value_name, key_name)
        };
        self.expect(&TokenKind::Close)?;

        let body = self.parse_statements(&[TokenKind::ForeachElse, TokenKind::EndForeach])?;

        self.advance(); // move onto the terminator
        let else_body = match &self.current.kind {
            TokenKind::ForeachElse => {
                self.advance();
                self.expect(&TokenKind::Close)?;
                let body = self.parse_statements(&[TokenKind::EndForeach])?;
                self.advance(); // Open -> EndForeach
                self.expect(&TokenKind::EndForeach)?;
                self.expect(&TokenKind::Close)?;
                Some(body)
            }
            TokenKind::EndForeach => {
                self.advance();
                self.expect(&TokenKind::Close)?;
                None
            }
            _ => return Err(self.syntax_error("{foreachelse} or {/foreach}"))?,
        };

        Ok(Statement::Foreach(ForeachStatement {
            source,
            value_name,
            key_name,
            body,
            else_body,
            span: join(start, self.previous.span),
        }))
    }

    /// `{assign expr to $v}`
    fn parse_assign(&mut self) -> Result<Statement> {
        let start = self.previous.span;
        let value = self.parse_expr()?;
        self.expect(&TokenKind::To)?;
        let name = self.expect_variable_name()?;
        self.expect(&TokenKind::Close)?;

        Ok(Statement::Assign(AssignStatement {
            name,
            value,
            span: join(start, self.previous.span),
        }))
    }

    /// `{expr}` output, or the `{$v = expr}` assignment shorthand
    fn parse_expression_statement(&mut self) -> Result<Statement> {
        let start = self.current.span;
        let expr = self.parse_expr()?;

        if self.check(&TokenKind::Is) {
            let name = match expr {
                Expression::Variable(Variable::Ref(r)) => r.name,
                _ => return Err(self.syntax_error("a plain $name as the assignment target"))?,
            };
            self.advance();
            let value = self.parse_expr()?;
            self.expect(&TokenKind::Close)?;
            return Ok(Statement::Assign(AssignStatement {
                name,
                value,
                span: join(start, self.previous.span),
            }));
        }

        self.expect(&TokenKind::Close)?;
        let escape = matches!(expr, Expression::Variable(_));
        Ok(Statement::Output(OutputStatement {
            expr,
            escape,
            span: join(start, self.previous.span),
        }))
    }

    // ========================================================================
    // Expression parsing (precedence climbing)
    // ========================================================================

    fn parse_expr(&mut self) -> Result<Expression> {
        self.depth += 1;
        if self.depth > MAX_EXPR_DEPTH {
            self.depth -= 1;
            return Err(StackOverflow {
                limit: MAX_EXPR_DEPTH,
                span: self.current.span,
                src: self.source.named_source(),
            })?;
        }
        let result = self.parse_or();
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut left = self.parse_and()?;

        while self.check(&TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut left = self.parse_equality()?;

        while self.check(&TokenKind::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = binary(BinaryOp::And, left, right);
        }

        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expression> {
        let mut left = self.parse_relational()?;

        loop {
            let op = match &self.current.kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expression> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match &self.current.kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expression> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match &self.current.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match &self.current.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        let start = self.current.span;

        if self.check(&TokenKind::Not) {
            self.advance();
            let operand = self.parse_unary()?;
            let span = join(start, operand.span());
            return Ok(Expression::Unary(UnaryExpression {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                span,
            }));
        }

        if self.check(&TokenKind::Minus) {
            self.advance();
            let operand = self.parse_unary()?;
            // fold literals, desugar the rest to `0 - x`
            return Ok(match operand {
                Expression::LiteralInt(l) => Expression::LiteralInt(IntLiteral {
                    value: -l.value,
                    span: join(start, l.span),
                }),
                Expression::LiteralDouble(l) => Expression::LiteralDouble(DoubleLiteral {
                    value: -l.value,
                    span: join(start, l.span),
                }),
                operand => {
                    let span = join(start, operand.span());
                    Expression::Binary(BinaryExpression {
                        op: BinaryOp::Sub,
                        left: Box::new(Expression::LiteralInt(IntLiteral {
                            value: 0,
                            span: start,
                        })),
                        right: Box::new(operand),
                        span,
                    })
                }
            });
        }

        self.parse_filtered()
    }

    /// A primary expression with an optional modifier chain. Modifiers only
    /// attach to variable paths; anything else is a syntax error.
    fn parse_filtered(&mut self) -> Result<Expression> {
        let expr = self.parse_primary()?;

        if !self.check(&TokenKind::Pipe) {
            return Ok(expr);
        }
        let Expression::Variable(base) = expr else {
            return Err(self.syntax_error("modifiers apply to variables only"))?;
        };
        Ok(Expression::Variable(self.parse_filters(base)?))
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        let token = self.current.clone();

        match &token.kind {
            TokenKind::Int(v) => {
                let value = *v;
                self.advance();
                Ok(Expression::LiteralInt(IntLiteral {
                    value,
                    span: token.span,
                }))
            }
            TokenKind::Double(v) => {
                let value = *v;
                self.advance();
                Ok(Expression::LiteralDouble(DoubleLiteral {
                    value,
                    span: token.span,
                }))
            }
            TokenKind::String(v) => {
                let value = v.clone();
                self.advance();
                Ok(Expression::LiteralString(StringLiteral {
                    value,
                    span: token.span,
                }))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::LiteralBool(BoolLiteral {
                    value: true,
                    span: token.span,
                }))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::LiteralBool(BoolLiteral {
                    value: false,
                    span: token.span,
                }))
            }
            TokenKind::Variable(_) => Ok(Expression::Variable(self.parse_variable_path()?)),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            _ => Err(self.syntax_error("an expression"))?,
        }
    }

    /// `$name` followed by `.member` and `[expr]` segments
    fn parse_variable_path(&mut self) -> Result<Variable> {
        let name = self.expect_variable_name()?;
        let start = self.previous.span;
        let mut variable = Variable::Ref(VarRef { name, span: start });

        loop {
            if self.check(&TokenKind::Dot) {
                self.advance();
                let name = self.expect_ident()?;
                let span = join(start, self.previous.span);
                variable = Variable::Member(MemberAccess {
                    parent: Box::new(variable),
                    name,
                    span,
                });
            } else if self.check(&TokenKind::LBracket) {
                self.advance();
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBracket)?;
                let span = join(start, self.previous.span);
                variable = Variable::MemberExpr(IndexAccess {
                    parent: Box::new(variable),
                    index: Box::new(index),
                    span,
                });
            } else {
                break;
            }
        }

        Ok(variable)
    }

    /// A variable path with an optional modifier chain
    fn parse_variable_with_filters(&mut self) -> Result<Variable> {
        let base = self.parse_variable_path()?;
        if self.check(&TokenKind::Pipe) {
            self.parse_filters(base)
        } else {
            Ok(base)
        }
    }

    /// `|name:arg:arg|name...` applied to a variable path
    fn parse_filters(&mut self, base: Variable) -> Result<Variable> {
        let start = base.span();
        let mut applications = Vec::new();

        while self.check(&TokenKind::Pipe) {
            self.advance();
            let name_span = self.current.span;
            let name = self.expect_ident()?;
            let mut params = Vec::new();
            while self.check(&TokenKind::Colon) {
                self.advance();
                params.push(self.expect_literal_param()?);
            }
            applications.push(ModifierApplication {
                name,
                params,
                span: join(name_span, self.previous.span),
            });
        }

        let span = join(start, self.previous.span);
        Ok(Variable::Filtered(FilteredVariable {
            base: Box::new(base),
            modifiers: Modifiers { applications },
            span,
        }))
    }

    fn expect_literal_param(&mut self) -> Result<ModifierParam> {
        let param = match &self.current.kind {
            TokenKind::Int(v) => ModifierParam::Int(*v),
            TokenKind::Double(v) => ModifierParam::Double(*v),
            TokenKind::String(v) => ModifierParam::String(v.clone()),
            TokenKind::True => ModifierParam::Bool(true),
            TokenKind::False => ModifierParam::Bool(false),
            _ => return Err(self.syntax_error("a literal modifier argument"))?,
        };
        self.advance();
        Ok(param)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn advance(&mut self) {
        let next = self
            .pending
            .take()
            .unwrap_or_else(|| self.lexer.next_token());
        self.previous = std::mem::replace(&mut self.current, next);
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.syntax_error(&format!("{kind:?}")))?
        }
    }

    /// Consume a `$name` token and mark the template personalized
    fn expect_variable_name(&mut self) -> Result<String> {
        if let TokenKind::Variable(name) = &self.current.kind {
            let name = name.clone();
            self.personalized = true;
            self.advance();
            Ok(name)
        } else {
            Err(self.syntax_error("a $variable"))?
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        if let TokenKind::Ident(name) = &self.current.kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.syntax_error("an identifier"))?
        }
    }

    fn syntax_error(&self, expected: &str) -> SyntaxError {
        SyntaxError {
            found: format!("{:?}", self.current.kind),
            expected: expected.to_string(),
            span: self.current.span,
            src: self.source.named_source(),
        }
    }
}

fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    let span = join(left.span(), right.span());
    Expression::Binary(BinaryExpression {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span,
    })
}

/// The span covering `start` through `end`
fn join(start: Span, end: Span) -> Span {
    let from = start.offset();
    let to = (end.offset() + end.len()).max(from);
    span(from, to - from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn parse(s: &str) -> Result<SyntaxTree> {
        let source = TemplateSource::new("test", Arc::new(s.to_string()));
        Parser::new(source).parse()
    }

    #[test]
    fn test_parse_text() {
        let tree = parse("Hello, world!").unwrap();
        assert_eq!(tree.statements.items.len(), 1);
        assert!(matches!(&tree.statements.items[0], Statement::Raw(r) if r.text == "Hello, world!"));
        assert!(!tree.personalized);
    }

    #[test]
    fn test_parse_output_marks_personalized() {
        let tree = parse("{$name}").unwrap();
        assert!(tree.personalized);
        let Statement::Output(output) = &tree.statements.items[0] else {
            panic!("expected output statement");
        };
        assert!(output.escape);
        assert!(matches!(
            &output.expr,
            Expression::Variable(Variable::Ref(r)) if r.name == "name"
        ));
    }

    #[test]
    fn test_literal_output_is_not_personalized() {
        let tree = parse("{1 + 2}").unwrap();
        assert!(!tree.personalized);
        let Statement::Output(output) = &tree.statements.items[0] else {
            panic!("expected output statement");
        };
        assert!(!output.escape);
    }

    #[test]
    fn test_parse_if_else() {
        let tree = parse("{if $a}x{else}y{/if}").unwrap();
        let Statement::If(branch) = &tree.statements.items[0] else {
            panic!("expected if statement");
        };
        assert_eq!(branch.then_branch.items.len(), 1);
        assert!(branch.else_branch.is_some());
    }

    #[test]
    fn test_parse_elseif_desugars() {
        let tree = parse("{if $a}x{elseif $b}y{else}z{/if}").unwrap();
        let Statement::If(branch) = &tree.statements.items[0] else {
            panic!("expected if statement");
        };
        let else_branch = branch.else_branch.as_ref().unwrap();
        assert_eq!(else_branch.items.len(), 1);
        let Statement::If(nested) = &else_branch.items[0] else {
            panic!("expected nested if");
        };
        assert!(nested.else_branch.is_some());
    }

    #[test]
    fn test_parse_foreach_in_form() {
        let tree = parse("{foreach $item in $list}{$item}{/foreach}").unwrap();
        let Statement::Foreach(each) = &tree.statements.items[0] else {
            panic!("expected foreach");
        };
        assert_eq!(each.value_name, "item");
        assert!(each.key_name.is_none());
        assert!(matches!(&each.source, Variable::Ref(r) if r.name == "list"));
    }

    #[test]
    fn test_parse_foreach_as_form_with_key() {
        let tree = parse("{foreach $map as $v => $k}{/foreach}").unwrap();
        let Statement::Foreach(each) = &tree.statements.items[0] else {
            panic!("expected foreach");
        };
        assert_eq!(each.value_name, "v");
        assert_eq!(each.key_name.as_deref(), Some("k"));
    }

    #[test]
    fn test_parse_foreachelse() {
        let tree = parse("{foreach $v in $l}a{foreachelse}b{/foreach}").unwrap();
        let Statement::Foreach(each) = &tree.statements.items[0] else {
            panic!("expected foreach");
        };
        assert!(each.else_body.is_some());
    }

    #[test]
    fn test_parse_assign_forms() {
        let tree = parse("{assign 1 + 2 to $v}{$w = 3}").unwrap();
        assert!(matches!(&tree.statements.items[0], Statement::Assign(a) if a.name == "v"));
        assert!(matches!(&tree.statements.items[1], Statement::Assign(a) if a.name == "w"));
    }

    #[test]
    fn test_parse_member_path() {
        let tree = parse("{$a.b[$i]}").unwrap();
        let Statement::Output(output) = &tree.statements.items[0] else {
            panic!("expected output");
        };
        let Expression::Variable(Variable::MemberExpr(index)) = &output.expr else {
            panic!("expected subscript access");
        };
        assert!(matches!(&*index.parent, Variable::Member(_)));
    }

    #[test]
    fn test_parse_modifier_chain() {
        let tree = parse("{$name|toupper|tolower:1:\"x\"}").unwrap();
        let Statement::Output(output) = &tree.statements.items[0] else {
            panic!("expected output");
        };
        let Expression::Variable(Variable::Filtered(filtered)) = &output.expr else {
            panic!("expected filtered variable");
        };
        assert_eq!(filtered.modifiers.applications.len(), 2);
        assert_eq!(filtered.modifiers.applications[1].params.len(), 2);
    }

    #[test]
    fn test_modifier_on_literal_is_an_error() {
        let err = parse("{1|toupper}").unwrap_err();
        assert!(err.to_string().contains("modifiers apply to variables"));
    }

    #[test]
    fn test_precedence() {
        let tree = parse("{1 + 2 * 3 == 7 && true}").unwrap();
        let Statement::Output(output) = &tree.statements.items[0] else {
            panic!("expected output");
        };
        // top node must be the && with == on its left
        let Expression::Binary(and) = &output.expr else {
            panic!("expected binary");
        };
        assert_eq!(and.op, BinaryOp::And);
        let Expression::Binary(eq) = &*and.left else {
            panic!("expected ==");
        };
        assert_eq!(eq.op, BinaryOp::Eq);
    }

    #[test]
    fn test_unary_minus_folds_literals() {
        let tree = parse("{-4}").unwrap();
        let Statement::Output(output) = &tree.statements.items[0] else {
            panic!("expected output");
        };
        assert!(matches!(&output.expr, Expression::LiteralInt(l) if l.value == -4));
    }

    #[test]
    fn test_mode_directive_first() {
        let tree = parse("{mode html}{$x}").unwrap();
        assert_eq!(tree.mode.as_deref(), Some("html"));
        let tree = parse("{escape}x").unwrap();
        assert_eq!(tree.mode.as_deref(), Some("html"));
        let tree = parse("x").unwrap();
        assert!(tree.mode.is_none());
    }

    #[test]
    fn test_mode_directive_elsewhere_is_an_error() {
        assert!(parse("x{mode html}").is_err());
    }

    #[test]
    fn test_unterminated_if() {
        assert!(parse("{if $a}x").is_err());
    }

    #[test]
    fn test_lex_error_surfaces() {
        let err = parse("{\"unterminated}").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_deep_nesting_overflows() {
        let mut source = String::from("{");
        for _ in 0..100 {
            source.push('(');
        }
        source.push('1');
        for _ in 0..100 {
            source.push(')');
        }
        source.push('}');
        let err = parse(&source).unwrap_err();
        assert!(err.to_string().contains("nesting"));
    }
}
