//! The pushdown machine behind the parser.
//!
//! Parser state is a stack of tagged-union frames instead of a native call
//! stack: [Machine::step] advances exactly one token, so a driver can feed
//! tokens as they become available and resume between them. Infix
//! operators reduce through the pool builders as soon as precedence allows
//! (ties bind left), which is where parse-time constant folding happens.

use crate::diagnostic::{Diagnostic, DiagnosticCode, WithErrorInfo};
use crate::env::{Environment, Word};
use crate::fold::{Folder, ResolutionMode};
use crate::lexer::{Literal, Token, TokenKind};
use crate::lexicon::Lexicon;
use crate::pool::{BinOp, NodeId, NodePool, NodeTag, OperandStack};
use crate::span::Span;

/// A pending infix/prefix operator awaiting its reduction.
#[derive(Debug, Clone, Copy)]
enum PendOp {
    Bin(BinOp),
    Neg,
}

impl PendOp {
    fn precedence(self) -> u8 {
        match self {
            PendOp::Bin(op) => op.precedence(),
            // Unary minus binds tighter than any infix operator.
            PendOp::Neg => 8,
        }
    }
}

/// An open expression group: one operand-stack frame plus its pending
/// operators. `host` says what happens when the group closes.
#[derive(Debug)]
struct Group {
    host: Host,
    ops: Vec<PendOp>,
    expect_operand: bool,
}

impl Group {
    fn new(host: Host) -> Self {
        Group {
            host,
            ops: Vec::new(),
            expect_operand: false,
        }
    }

    fn is_empty(&self) -> bool {
        self.ops.is_empty() && !self.expect_operand
    }
}

#[derive(Debug)]
enum Host {
    /// A top-level dot-terminated expression.
    Top,
    /// `( … )`
    Paren,
    /// `[ … ]`
    ListItems,
    /// The value of one record binding; the key waits in the
    /// [Frame::RecordColon] frame below.
    RecordValue,
    /// `< params : … >`
    LambdaBody { params: Vec<(String, NodeId)> },
    IfCond,
    IfThen { cond: NodeId },
    IfElse { cond: NodeId, then: NodeId },
    CaseSubject,
    CaseArmPat,
    CaseArmVal { pattern: NodeId },
    /// The body of a `let`; closing folds or stores it and binds the word.
    LetBody {
        name: String,
        name_id: NodeId,
        params: Vec<(String, NodeId)>,
    },
    /// One `${ … }` expression inside a backtick string.
    InterpExpr,
}

#[derive(Debug)]
enum Frame {
    Group(Group),
    /// Inside `{ … }`, expecting a binding key or the closing brace.
    RecordKey { bindings: Vec<NodeId> },
    /// Got a binding key, expecting `:`.
    RecordColon { bindings: Vec<NodeId>, key: NodeId },
    /// Inside `< … :`, collecting parameter names.
    LambdaParams { params: Vec<(String, NodeId)> },
    /// Between `case … of` arms, expecting a pattern or `end`.
    CaseArms { subject: NodeId, arms: Vec<NodeId> },
    /// Accumulated fragments of an interpolated backtick string.
    InterpParts { parts: Vec<NodeId> },
    /// After `let`, expecting the definition name.
    LetName,
    /// Collecting `let` parameters, up to `=`.
    LetParams {
        name: String,
        name_id: NodeId,
        params: Vec<(String, NodeId)>,
    },
}

pub(crate) struct Machine<'l> {
    lexicon: &'l Lexicon,
    mode: ResolutionMode,
    pool: NodePool,
    stack: OperandStack,
    env: Environment,
    frames: Vec<Frame>,
    /// Folded results of completed top-level expression groups.
    groups: Vec<NodeId>,
    terminated: bool,
    leading_dot: bool,
}

impl<'l> Machine<'l> {
    pub fn new(lexicon: &'l Lexicon, mode: ResolutionMode) -> Self {
        Machine {
            lexicon,
            mode,
            pool: NodePool::new(),
            stack: OperandStack::new(),
            env: Environment::new(lexicon),
            frames: Vec::new(),
            groups: Vec::new(),
            terminated: false,
            leading_dot: false,
        }
    }

    pub fn terminated(&self) -> bool {
        self.terminated
    }

    /// Advance the machine by one token.
    pub fn step(&mut self, token: Token) -> Result<(), Diagnostic> {
        let mut pending = Some(token);
        while let Some(token) = pending.take() {
            pending = self.dispatch(token)?;
        }
        Ok(())
    }

    /// Record a recoverable failure as an inline `ERROR` node and reset to
    /// the between-groups state; the driver resynchronizes on the next `.`.
    pub fn recover(&mut self, diagnostic: &Diagnostic) {
        tracing::debug!("parse recovery: {}", diagnostic.message);
        let error = self.pool.error(diagnostic);
        self.groups.push(error);
        self.frames.clear();
        self.stack.reset();
        self.env.reset_to_base();
    }

    /// Finish the parse: every program must reach its `..` terminator.
    pub fn finish(mut self) -> Result<(NodePool, NodeId), Diagnostic> {
        if !self.terminated {
            return Err(Diagnostic::new(
                "end of program reached before the terminating `..`",
                DiagnosticCode::SYNTAX,
            ));
        }
        let exprs = self.pool.interior(NodeTag::Exprs, std::mem::take(&mut self.groups));
        let prog = self.pool.interior(NodeTag::Prog, vec![exprs]);
        Ok((self.pool, prog))
    }

    fn folder(&mut self) -> Folder<'_> {
        Folder {
            pool: &mut self.pool,
            stack: &mut self.stack,
            env: &mut self.env,
            lexicon: self.lexicon,
            mode: self.mode,
        }
    }

    /// Handle one token against the top frame. Returns the token back when
    /// it must be re-applied after closing a frame.
    fn dispatch(&mut self, token: Token) -> Result<Option<Token>, Diagnostic> {
        let Some(frame) = self.frames.pop() else {
            return self.between_groups(token);
        };
        match frame {
            Frame::Group(group) => self.in_group(group, token),
            Frame::RecordKey { bindings } => self.in_record_key(bindings, token),
            Frame::RecordColon { bindings, key } => self.in_record_colon(bindings, key, token),
            Frame::LambdaParams { params } => self.in_lambda_params(params, token),
            Frame::CaseArms { subject, arms } => self.in_case_arms(subject, arms, token),
            Frame::LetName => self.in_let_name(token),
            Frame::LetParams {
                name,
                name_id,
                params,
            } => self.in_let_params(name, name_id, params, token),
            Frame::InterpParts { .. } => Err(Diagnostic::new_assert(
                "interpolation frame exposed to the token stream",
            )),
        }
    }

    fn between_groups(&mut self, token: Token) -> Result<Option<Token>, Diagnostic> {
        if token.kind == TokenKind::Control('.') {
            if self.groups.is_empty() && !self.leading_dot {
                self.leading_dot = true;
            } else {
                self.terminated = true;
            }
            return Ok(None);
        }
        self.frames.push(Frame::Group(Group::new(Host::Top)));
        self.stack.enter();
        Ok(Some(token))
    }

    fn in_group(&mut self, mut group: Group, token: Token) -> Result<Option<Token>, Diagnostic> {
        let span = token.span;
        match &token.kind {
            TokenKind::Literal(lit) => {
                let id = self.literal_node(lit.clone());
                self.term(&mut group, id, span)?;
                self.frames.push(Frame::Group(group));
                Ok(None)
            }

            TokenKind::Ident(name) => {
                let id = self.pool.ident(name, Some(span));
                self.term(&mut group, id, span)?;
                self.frames.push(Frame::Group(group));
                Ok(None)
            }

            TokenKind::Op(op) => {
                self.group_op(&mut group, *op, span)?;
                self.frames.push(Frame::Group(group));
                Ok(None)
            }

            TokenKind::StrOpen(text) => {
                self.before_primary(&mut group, span)?;
                self.frames.push(Frame::Group(group));
                let prefix = self.pool.string(text);
                self.frames.push(Frame::InterpParts {
                    parts: vec![prefix],
                });
                self.open_group(Host::InterpExpr);
                Ok(None)
            }

            TokenKind::StrMid(text) => match group.host {
                Host::InterpExpr => {
                    let mid = self.pool.string(text);
                    let expr = self.close_to_node(group, span)?;
                    let Some(Frame::InterpParts { mut parts }) = self.frames.pop() else {
                        return Err(Diagnostic::new_assert("interpolation without parts frame"));
                    };
                    parts.push(expr);
                    parts.push(mid);
                    self.frames.push(Frame::InterpParts { parts });
                    self.open_group(Host::InterpExpr);
                    Ok(None)
                }
                Host::IfElse { .. } => self.close_if(group, token, span),
                _ => Err(unexpected(&token.kind, span)),
            },

            TokenKind::StrClose(text) => match group.host {
                Host::InterpExpr => {
                    let suffix = self.pool.string(text);
                    let expr = self.close_to_node(group, span)?;
                    let Some(Frame::InterpParts { mut parts }) = self.frames.pop() else {
                        return Err(Diagnostic::new_assert("interpolation without parts frame"));
                    };
                    parts.push(expr);
                    parts.push(suffix);

                    // Chain fragments and expressions left to right; the
                    // builder folds adjacent constants on the way.
                    let mut parts = parts.into_iter();
                    let mut chain = parts.next().expect("interpolation has a prefix");
                    for part in parts {
                        chain = self.pool.fold_binary(BinOp::Concat, chain, part);
                    }
                    self.push_term(chain)?;
                    Ok(None)
                }
                Host::IfElse { .. } => self.close_if(group, token, span),
                _ => Err(unexpected(&token.kind, span)),
            },

            TokenKind::Keyword(kw) => {
                let kw = *kw;
                self.in_group_keyword(group, kw, token, span)
            }

            TokenKind::Control(c) => {
                let c = *c;
                self.in_group_control(group, c, token, span)
            }
        }
    }

    fn in_group_keyword(
        &mut self,
        mut group: Group,
        kw: &'static str,
        token: Token,
        span: Span,
    ) -> Result<Option<Token>, Diagnostic> {
        match kw {
            "if" => {
                self.before_primary(&mut group, span)?;
                self.frames.push(Frame::Group(group));
                self.open_group(Host::IfCond);
                Ok(None)
            }
            "case" => {
                self.before_primary(&mut group, span)?;
                self.frames.push(Frame::Group(group));
                self.open_group(Host::CaseSubject);
                Ok(None)
            }
            "let" => {
                let at_definition_start = matches!(group.host, Host::Top)
                    && group.is_empty()
                    && self.stack.top_len() == 0;
                if !at_definition_start {
                    return Err(Diagnostic::new(
                        "`let` is only allowed at the start of a definition",
                        DiagnosticCode::SYNTAX,
                    )
                    .with_span(Some(span)));
                }
                self.frames.push(Frame::Group(group));
                self.frames.push(Frame::LetName);
                Ok(None)
            }
            "then" => match group.host {
                Host::IfCond => {
                    let cond = self.close_to_node(group, span)?;
                    self.open_group(Host::IfThen { cond });
                    Ok(None)
                }
                Host::IfElse { .. } => self.close_if(group, token, span),
                _ => Err(unexpected(&token.kind, span)),
            },
            "else" => match group.host {
                Host::IfThen { cond } => {
                    let then = self.close_to_node(group, span)?;
                    self.open_group(Host::IfElse { cond, then });
                    Ok(None)
                }
                Host::CaseArmPat => {
                    // `else` doubles as the catch-all case pattern.
                    let id = self.pool.ident("else", Some(span));
                    self.term(&mut group, id, span)?;
                    self.frames.push(Frame::Group(group));
                    Ok(None)
                }
                Host::IfElse { .. } => self.close_if(group, token, span),
                _ => Err(unexpected(&token.kind, span)),
            },
            "of" => match group.host {
                Host::CaseSubject => {
                    let subject = self.close_to_node(group, span)?;
                    self.frames.push(Frame::CaseArms {
                        subject,
                        arms: vec![],
                    });
                    Ok(None)
                }
                Host::IfElse { .. } => self.close_if(group, token, span),
                _ => Err(unexpected(&token.kind, span)),
            },
            "end" => match group.host {
                Host::CaseArmVal { pattern } => {
                    self.close_case_arm(group, pattern, span)?;
                    Ok(Some(token))
                }
                Host::IfElse { .. } => self.close_if(group, token, span),
                _ => Err(unexpected(&token.kind, span)),
            },
            _ => Err(unexpected(&token.kind, span)),
        }
    }

    fn in_group_control(
        &mut self,
        mut group: Group,
        c: char,
        token: Token,
        span: Span,
    ) -> Result<Option<Token>, Diagnostic> {
        match c {
            '(' => {
                self.before_primary(&mut group, span)?;
                self.frames.push(Frame::Group(group));
                self.open_group(Host::Paren);
                Ok(None)
            }
            '[' => {
                self.before_primary(&mut group, span)?;
                self.frames.push(Frame::Group(group));
                self.open_group(Host::ListItems);
                Ok(None)
            }
            '{' => {
                self.before_primary(&mut group, span)?;
                self.frames.push(Frame::Group(group));
                self.frames.push(Frame::RecordKey { bindings: vec![] });
                Ok(None)
            }
            '<' => {
                self.before_primary(&mut group, span)?;
                self.frames.push(Frame::Group(group));
                self.frames.push(Frame::LambdaParams { params: vec![] });
                Ok(None)
            }

            ')' => match group.host {
                Host::Paren => {
                    let terms = self.close_group(group, span)?;
                    if terms.is_empty() {
                        return Err(Diagnostic::new(
                            "empty parentheses",
                            DiagnosticCode::SYNTAX,
                        )
                        .with_span(Some(span)));
                    }
                    let paren = self.pool.interior(NodeTag::Paren, terms);
                    self.push_term(paren)?;
                    Ok(None)
                }
                Host::IfElse { .. } => self.close_if(group, token, span),
                _ => Err(unexpected(&token.kind, span)),
            },

            ']' => match group.host {
                Host::ListItems => {
                    let items = self.close_group(group, span)?;
                    let list = self.pool.interior(NodeTag::List, items);
                    self.push_term(list)?;
                    Ok(None)
                }
                Host::IfElse { .. } => self.close_if(group, token, span),
                _ => Err(unexpected(&token.kind, span)),
            },

            '}' | ',' if matches!(group.host, Host::RecordValue) => {
                let value = self.close_to_node(group, span)?;
                let Some(Frame::RecordColon { mut bindings, key }) = self.frames.pop() else {
                    return Err(Diagnostic::new_assert("record value without key frame"));
                };
                let binding = self.pool.interior(NodeTag::Binding, vec![key, value]);
                bindings.push(binding);
                self.frames.push(Frame::RecordKey { bindings });
                // Re-apply: `,` skips forward to the next key, `}` closes.
                Ok(Some(token))
            }

            ',' => match group.host {
                Host::ListItems => {
                    // Commas between list items are optional separators.
                    if group.expect_operand {
                        return Err(unexpected(&token.kind, span));
                    }
                    self.before_primary(&mut group, span)?;
                    self.frames.push(Frame::Group(group));
                    Ok(None)
                }
                Host::IfElse { .. } => self.close_if(group, token, span),
                _ => Err(unexpected(&token.kind, span)),
            },

            '.' => match group.host {
                Host::Top => {
                    let terms = self.close_group(group, span)?;
                    if terms.is_empty() {
                        return Err(Diagnostic::new("empty expression", DiagnosticCode::SYNTAX)
                            .with_span(Some(span)));
                    }
                    let folded = self.folder().fold_group(&terms)?;
                    self.groups.push(folded);
                    Ok(None)
                }
                Host::LetBody { .. } => {
                    self.close_let(group, span)?;
                    // The same dot also terminates the enclosing group.
                    Ok(Some(token))
                }
                Host::CaseArmVal { pattern } => {
                    self.close_case_arm(group, pattern, span)?;
                    Ok(None)
                }
                Host::IfElse { .. } => self.close_if(group, token, span),
                _ => Err(unexpected(&token.kind, span)),
            },

            '>' => match group.host {
                Host::LambdaBody { .. } => {
                    let lambda = self.close_lambda(group, span)?;
                    self.push_term(lambda)?;
                    Ok(None)
                }
                Host::IfElse { .. } => self.close_if(group, token, span),
                _ => Err(unexpected(&token.kind, span)),
            },

            ':' => match group.host {
                Host::CaseArmPat => {
                    let pattern = self.close_to_node(group, span)?;
                    self.open_group(Host::CaseArmVal { pattern });
                    Ok(None)
                }
                _ => Err(unexpected(&token.kind, span)),
            },

            '}' => match group.host {
                Host::IfElse { .. } => self.close_if(group, token, span),
                _ => Err(unexpected(&token.kind, span)),
            },

            _ => Err(unexpected(&token.kind, span)),
        }
    }

    fn in_record_key(
        &mut self,
        bindings: Vec<NodeId>,
        token: Token,
    ) -> Result<Option<Token>, Diagnostic> {
        match token.kind {
            TokenKind::Ident(name) => {
                let key = self.pool.string(&name);
                self.frames.push(Frame::RecordColon { bindings, key });
                Ok(None)
            }
            TokenKind::Literal(Literal::Text(text)) => {
                let key = self.pool.string(&text);
                self.frames.push(Frame::RecordColon { bindings, key });
                Ok(None)
            }
            TokenKind::Control(',') => {
                self.frames.push(Frame::RecordKey { bindings });
                Ok(None)
            }
            TokenKind::Control('}') => {
                let record = self.pool.interior(NodeTag::Record, bindings);
                self.push_term(record)?;
                Ok(None)
            }
            other => Err(Diagnostic::new(
                format!("expected a binding key, but found {other}"),
                DiagnosticCode::SYNTAX,
            )
            .with_span(Some(token.span))),
        }
    }

    fn in_record_colon(
        &mut self,
        bindings: Vec<NodeId>,
        key: NodeId,
        token: Token,
    ) -> Result<Option<Token>, Diagnostic> {
        if token.kind == TokenKind::Control(':') {
            self.frames.push(Frame::RecordColon { bindings, key });
            self.open_group(Host::RecordValue);
            Ok(None)
        } else {
            Err(Diagnostic::new(
                format!("expected `:`, but found {}", token.kind),
                DiagnosticCode::SYNTAX,
            )
            .with_span(Some(token.span)))
        }
    }

    fn in_lambda_params(
        &mut self,
        mut params: Vec<(String, NodeId)>,
        token: Token,
    ) -> Result<Option<Token>, Diagnostic> {
        match token.kind {
            TokenKind::Ident(name) => {
                let id = self.pool.ident(&name, Some(token.span));
                params.push((name, id));
                self.frames.push(Frame::LambdaParams { params });
                Ok(None)
            }
            // A bracketed list pattern is accepted around the names.
            TokenKind::Control('[') | TokenKind::Control(']') => {
                self.frames.push(Frame::LambdaParams { params });
                Ok(None)
            }
            TokenKind::Control(':') => {
                self.open_group(Host::LambdaBody { params });
                Ok(None)
            }
            other => Err(Diagnostic::new(
                format!("expected a parameter name or `:`, but found {other}"),
                DiagnosticCode::SYNTAX,
            )
            .with_span(Some(token.span))),
        }
    }

    fn in_case_arms(
        &mut self,
        subject: NodeId,
        arms: Vec<NodeId>,
        token: Token,
    ) -> Result<Option<Token>, Diagnostic> {
        if token.kind == TokenKind::Keyword("end") {
            let mut children = vec![subject];
            children.extend(arms);
            let case = self.pool.interior(NodeTag::Case, children);
            self.push_term(case)?;
            return Ok(None);
        }
        self.frames.push(Frame::CaseArms { subject, arms });
        self.open_group(Host::CaseArmPat);
        Ok(Some(token))
    }

    fn in_let_name(&mut self, token: Token) -> Result<Option<Token>, Diagnostic> {
        match token.kind {
            TokenKind::Ident(name) => {
                let name_id = self.pool.ident(&name, Some(token.span));
                self.frames.push(Frame::LetParams {
                    name,
                    name_id,
                    params: vec![],
                });
                Ok(None)
            }
            other => Err(Diagnostic::new(
                format!("expected a definition name, but found {other}"),
                DiagnosticCode::SYNTAX,
            )
            .with_span(Some(token.span))),
        }
    }

    fn in_let_params(
        &mut self,
        name: String,
        name_id: NodeId,
        mut params: Vec<(String, NodeId)>,
        token: Token,
    ) -> Result<Option<Token>, Diagnostic> {
        match token.kind {
            TokenKind::Ident(param) => {
                let id = self.pool.ident(&param, Some(token.span));
                params.push((param, id));
                self.frames.push(Frame::LetParams {
                    name,
                    name_id,
                    params,
                });
                Ok(None)
            }
            TokenKind::Control('=') => {
                // Register the word before the body parses, so the
                // definition can refer to itself.
                let word = if params.is_empty() {
                    Word::Val {
                        offset: 0,
                        nid: NodeId::NONE,
                    }
                } else {
                    Word::Function {
                        arity: params.len(),
                        nid: NodeId::NONE,
                        params: params.clone(),
                    }
                };
                self.env.add(&name, word);

                self.env.enter(&name, Some(token.span))?;
                for (offset, (param, id)) in params.iter().enumerate() {
                    self.env.add(
                        param,
                        Word::Val {
                            offset,
                            nid: NodeId::NONE,
                        },
                    );
                    self.env.pattern_push(*id);
                }

                self.open_group(Host::LetBody {
                    name,
                    name_id,
                    params,
                });
                Ok(None)
            }
            other => Err(Diagnostic::new(
                format!("expected a parameter name or `=`, but found {other}"),
                DiagnosticCode::SYNTAX,
            )
            .with_span(Some(token.span))),
        }
    }

    // --- group plumbing ---

    fn open_group(&mut self, host: Host) {
        self.frames.push(Frame::Group(Group::new(host)));
        self.stack.enter();
    }

    fn literal_node(&mut self, lit: Literal) -> NodeId {
        match lit {
            Literal::Num(text) => self.pool.num(&text),
            Literal::Text(text) => self.pool.string(&text),
            Literal::Bool(b) => self.pool.boolean(b),
            Literal::Null => self.pool.null(),
        }
    }

    /// A primary lands in the group: reduce completed operator runs first
    /// (a fresh juxtaposed term must not steal their operands).
    fn term(&mut self, group: &mut Group, id: NodeId, span: Span) -> Result<(), Diagnostic> {
        self.before_primary(group, span)?;
        self.stack.push(id);
        group.expect_operand = false;
        Ok(())
    }

    fn before_primary(&mut self, group: &mut Group, span: Span) -> Result<(), Diagnostic> {
        if !group.expect_operand {
            while let Some(op) = group.ops.pop() {
                self.reduce_one(op, span)?;
            }
        }
        Ok(())
    }

    fn group_op(&mut self, group: &mut Group, op: BinOp, span: Span) -> Result<(), Diagnostic> {
        if op == BinOp::Sub && (group.expect_operand || self.stack.top_len() == 0) {
            group.ops.push(PendOp::Neg);
            group.expect_operand = true;
            return Ok(());
        }
        if group.expect_operand {
            return Err(Diagnostic::new(
                format!("expected an expression, but found `{op}`"),
                DiagnosticCode::SYNTAX,
            )
            .with_span(Some(span)));
        }
        if self.stack.top_len() == 0 {
            return Err(Diagnostic::new(
                format!("`{op}` is missing its left operand"),
                DiagnosticCode::SYNTAX,
            )
            .with_span(Some(span)));
        }
        while let Some(pending) = group.ops.last() {
            if pending.precedence() >= op.precedence() {
                let pending = group.ops.pop().expect("just observed");
                self.reduce_one(pending, span)?;
            } else {
                break;
            }
        }
        group.ops.push(PendOp::Bin(op));
        group.expect_operand = true;
        Ok(())
    }

    fn reduce_one(&mut self, op: PendOp, span: Span) -> Result<(), Diagnostic> {
        match op {
            PendOp::Bin(op) => {
                let rhs = self.pop_operand(span)?;
                let lhs = self.pop_operand(span)?;
                let folded = self.pool.fold_binary(op, lhs, rhs);
                self.stack.push(folded);
            }
            PendOp::Neg => {
                let value = self.pop_operand(span)?;
                let folded = self.pool.fold_neg(value);
                self.stack.push(folded);
            }
        }
        Ok(())
    }

    fn pop_operand(&mut self, span: Span) -> Result<NodeId, Diagnostic> {
        self.stack.pop().ok_or_else(|| {
            Diagnostic::new("operator is missing an operand", DiagnosticCode::SYNTAX)
                .with_span(Some(span))
        })
    }

    /// Close a group: reduce pending operators and return its terms.
    fn close_group(&mut self, group: Group, span: Span) -> Result<Vec<NodeId>, Diagnostic> {
        self.close_group_parts(group.ops, group.expect_operand, span)
    }

    fn close_group_parts(
        &mut self,
        mut ops: Vec<PendOp>,
        expect_operand: bool,
        span: Span,
    ) -> Result<Vec<NodeId>, Diagnostic> {
        if expect_operand {
            return Err(Diagnostic::new(
                "expected an expression before the group ends",
                DiagnosticCode::SYNTAX,
            )
            .with_span(Some(span)));
        }
        while let Some(op) = ops.pop() {
            self.reduce_one(op, span)?;
        }
        Ok(self.stack.exit())
    }

    /// Close a group that must produce exactly one expression node.
    fn close_to_node(&mut self, group: Group, span: Span) -> Result<NodeId, Diagnostic> {
        self.close_to_node_parts(group.ops, group.expect_operand, span)
    }

    fn close_to_node_parts(
        &mut self,
        ops: Vec<PendOp>,
        expect_operand: bool,
        span: Span,
    ) -> Result<NodeId, Diagnostic> {
        let terms = self.close_group_parts(ops, expect_operand, span)?;
        match terms.len() {
            0 => Err(
                Diagnostic::new("empty expression", DiagnosticCode::SYNTAX)
                    .with_span(Some(span)),
            ),
            1 => Ok(terms[0]),
            _ => Ok(self.pool.interior(NodeTag::Exprs, terms)),
        }
    }

    /// Push a finished construct into the enclosing expression group.
    fn push_term(&mut self, id: NodeId) -> Result<(), Diagnostic> {
        match self.frames.last_mut() {
            Some(Frame::Group(group)) => {
                self.stack.push(id);
                group.expect_operand = false;
                Ok(())
            }
            _ => Err(Diagnostic::new_assert("expression term outside any group")),
        }
    }

    fn close_if(
        &mut self,
        group: Group,
        token: Token,
        span: Span,
    ) -> Result<Option<Token>, Diagnostic> {
        let Group {
            host,
            ops,
            expect_operand,
        } = group;
        let Host::IfElse { cond, then } = host else {
            return Err(Diagnostic::new_assert("close_if on a non-if group"));
        };
        let els = self.close_to_node_parts(ops, expect_operand, span)?;
        let if_node = self.pool.interior(NodeTag::If, vec![cond, then, els]);
        self.push_term(if_node)?;
        Ok(Some(token))
    }

    fn close_case_arm(
        &mut self,
        group: Group,
        pattern: NodeId,
        span: Span,
    ) -> Result<(), Diagnostic> {
        let value = self.close_to_node_parts(group.ops, group.expect_operand, span)?;
        let of_node = self.pool.interior(NodeTag::Of, vec![pattern, value]);
        match self.frames.last_mut() {
            Some(Frame::CaseArms { arms, .. }) => {
                arms.push(of_node);
                Ok(())
            }
            _ => Err(Diagnostic::new_assert("case arm outside a case")),
        }
    }

    fn close_lambda(&mut self, group: Group, span: Span) -> Result<NodeId, Diagnostic> {
        let Group {
            host,
            ops,
            expect_operand,
        } = group;
        let Host::LambdaBody { params } = host else {
            return Err(Diagnostic::new_assert("close_lambda on a non-lambda group"));
        };
        let terms = self.close_group_parts(ops, expect_operand, span)?;
        if terms.is_empty() {
            return Err(
                Diagnostic::new("empty lambda body", DiagnosticCode::SYNTAX)
                    .with_span(Some(span)),
            );
        }
        let body = match terms.len() {
            1 => terms[0],
            _ => self.pool.interior(NodeTag::Exprs, terms),
        };

        let param_ids: Vec<NodeId> = params.iter().map(|(_, id)| *id).collect();
        let names_list = self.pool.interior(NodeTag::List, param_ids.clone());
        let pattern_list = self.pool.interior(NodeTag::List, param_ids.clone());
        let inits_list = self
            .pool
            .interior(NodeTag::List, vec![NodeId::NONE; param_ids.len()]);
        Ok(self.pool.interior(
            NodeTag::Lambda,
            vec![names_list, body, pattern_list, inits_list],
        ))
    }

    fn close_let(&mut self, group: Group, span: Span) -> Result<(), Diagnostic> {
        let Group {
            host,
            ops,
            expect_operand,
        } = group;
        let Host::LetBody {
            name,
            name_id,
            params,
        } = host
        else {
            return Err(Diagnostic::new_assert("close_let on a non-let group"));
        };
        let terms = self.close_group_parts(ops, expect_operand, span)?;
        if terms.is_empty() {
            return Err(
                Diagnostic::new("empty definition body", DiagnosticCode::SYNTAX)
                    .with_span(Some(span)),
            );
        }
        // A parameterless definition folds now and binds its value; a
        // function body stays raw and is folded at each application.
        let folded = if params.is_empty() {
            Some(self.folder().fold_group(&terms)?)
        } else {
            None
        };
        let body = match terms.len() {
            1 => terms[0],
            _ => self.pool.interior(NodeTag::Exprs, terms),
        };
        let pattern = self.env.pattern().to_vec();
        self.env.exit();
        self.env.bind(&name, folded.unwrap_or(body));

        let mut children = vec![name_id];
        children.extend(pattern);
        children.push(body);
        let let_node = self.pool.interior(NodeTag::Let, children);
        self.push_term(let_node)
    }
}

fn unexpected(kind: &TokenKind, span: Span) -> Diagnostic {
    Diagnostic::new(format!("unexpected {kind}"), DiagnosticCode::SYNTAX).with_span(Some(span))
}
