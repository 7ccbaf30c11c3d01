//! Static analysis of template tags: which context names does a template read?

use super::lexer::{lex, Span, Tok};
use super::scanner::{scan, ScanIssue, Segment};
use std::collections::{BTreeSet, HashSet};

/// Names the template engine itself provides; never looked up in the context.
const ENGINE_GLOBALS: &[&str] = &[
    "range", "dict", "lipsum", "cycler", "joiner", "namespace", "lookup", "query",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParseIssue {
    /// Byte offset relative to the tag body.
    offset: usize,
    message: String,
}

type ParseResult<T> = std::result::Result<T, ParseIssue>;

/// A context lookup found in an expression, e.g. `service.port`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reference {
    path: Vec<String>,
}

impl Reference {
    fn head(&self) -> &str {
        &self.path[0]
    }

    fn dotted(&self) -> String {
        self.path.join(".")
    }
}

enum Operand {
    Ref(Reference),
    Value,
}

/// Recursive-descent parser over one tag body; collects references instead of building an AST.
struct ExprParser {
    toks: Vec<(Tok, Span)>,
    pos: usize,
    end: usize,
    refs: Vec<Reference>,
}

impl ExprParser {
    fn new(body: &str) -> ParseResult<Self> {
        let toks = lex(body).map_err(|span| ParseIssue {
            offset: span.start,
            message: format!(
                "unexpected char '{}'",
                body.get(span.start..)
                    .and_then(|rest| rest.chars().next())
                    .unwrap_or(char::REPLACEMENT_CHARACTER)
            ),
        })?;
        Ok(Self {
            toks,
            pos: 0,
            end: body.len(),
            refs: Vec::new(),
        })
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Tok> {
        self.toks.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.toks
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.end)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, tok: &Tok) -> bool {
        self.peek() == Some(tok)
    }

    fn at_name(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_name(keyword))
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.at(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_name(&mut self, keyword: &str) -> bool {
        if self.at_name(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        Err(ParseIssue {
            offset: self.offset(),
            message: message.into(),
        })
    }

    fn unexpected<T>(&self, wanted: &str) -> ParseResult<T> {
        match self.peek() {
            Some(tok) => self.error(format!("expected {}, got {}", wanted, tok.describe())),
            None => self.error(format!("expected {}, got end of tag", wanted)),
        }
    }

    fn expect(&mut self, tok: Tok, wanted: &str) -> ParseResult<()> {
        if self.eat(&tok) {
            Ok(())
        } else {
            self.unexpected(wanted)
        }
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        match self.peek() {
            Some(Tok::Name(n)) => {
                let n = n.clone();
                self.pos += 1;
                Ok(n)
            }
            _ => self.unexpected("a name"),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.eat_name(keyword) {
            Ok(())
        } else {
            self.unexpected(&format!("'{}'", keyword))
        }
    }

    fn expect_end(&self) -> ParseResult<()> {
        if self.at_end() {
            Ok(())
        } else {
            self.unexpected("end of tag")
        }
    }

    fn take_refs(&mut self) -> Vec<Reference> {
        std::mem::take(&mut self.refs)
    }

    fn expression(&mut self) -> ParseResult<()> {
        self.expression_with(true)
    }

    /// `with_condition = false` stops before a trailing `if`, as in `for x in items if x`.
    fn expression_with(&mut self, with_condition: bool) -> ParseResult<()> {
        self.or_expr()?;
        if with_condition && self.eat_name("if") {
            self.or_expr()?;
            if self.eat_name("else") {
                self.expression()?;
            }
        }
        Ok(())
    }

    /// Comma separated expressions, optionally trailing comma; used for tuples.
    fn tuple(&mut self, with_condition: bool) -> ParseResult<()> {
        self.expression_with(with_condition)?;
        while self.eat(&Tok::Comma) {
            if self.at_end() {
                break;
            }
            self.expression_with(with_condition)?;
        }
        Ok(())
    }

    fn or_expr(&mut self) -> ParseResult<()> {
        self.and_expr()?;
        while self.eat_name("or") {
            self.and_expr()?;
        }
        Ok(())
    }

    fn and_expr(&mut self) -> ParseResult<()> {
        self.not_expr()?;
        while self.eat_name("and") {
            self.not_expr()?;
        }
        Ok(())
    }

    fn not_expr(&mut self) -> ParseResult<()> {
        if self.eat_name("not") {
            return self.not_expr();
        }
        self.compare()
    }

    fn compare(&mut self) -> ParseResult<()> {
        self.arith()?;
        loop {
            match self.peek() {
                Some(Tok::Eq | Tok::Ne | Tok::Lt | Tok::Le | Tok::Gt | Tok::Ge) => {
                    self.pos += 1;
                }
                Some(t) if t.is_name("in") => {
                    self.pos += 1;
                }
                Some(t) if t.is_name("not") && self.peek_at(1).is_some_and(|n| n.is_name("in")) => {
                    self.pos += 2;
                }
                _ => return Ok(()),
            }
            self.arith()?;
        }
    }

    fn arith(&mut self) -> ParseResult<()> {
        self.term()?;
        while matches!(self.peek(), Some(Tok::Plus | Tok::Minus | Tok::Tilde)) {
            self.pos += 1;
            self.term()?;
        }
        Ok(())
    }

    fn term(&mut self) -> ParseResult<()> {
        self.power()?;
        while matches!(
            self.peek(),
            Some(Tok::Star | Tok::Slash | Tok::FloorDiv | Tok::Percent)
        ) {
            self.pos += 1;
            self.power()?;
        }
        Ok(())
    }

    fn power(&mut self) -> ParseResult<()> {
        self.unary()?;
        while self.eat(&Tok::Pow) {
            self.unary()?;
        }
        Ok(())
    }

    fn unary(&mut self) -> ParseResult<()> {
        if matches!(self.peek(), Some(Tok::Minus | Tok::Plus)) {
            self.pos += 1;
            return self.unary();
        }
        let operand = self.primary()?;
        let operand = self.postfix(operand)?;
        if let Operand::Ref(reference) = operand {
            self.refs.push(reference);
        }
        self.filters_and_tests()
    }

    fn primary(&mut self) -> ParseResult<Operand> {
        match self.bump() {
            Some(Tok::Name(name)) => match name.as_str() {
                "true" | "false" | "none" | "True" | "False" | "None" => Ok(Operand::Value),
                _ => Ok(Operand::Ref(Reference { path: vec![name] })),
            },
            Some(Tok::Str(_)) => {
                // adjacent literals concatenate
                while matches!(self.peek(), Some(Tok::Str(_))) {
                    self.pos += 1;
                }
                Ok(Operand::Value)
            }
            Some(Tok::Number(_)) => Ok(Operand::Value),
            Some(Tok::LParen) => {
                if !self.eat(&Tok::RParen) {
                    self.tuple(true)?;
                    self.expect(Tok::RParen, "')'")?;
                }
                Ok(Operand::Value)
            }
            Some(Tok::LBracket) => {
                while !self.eat(&Tok::RBracket) {
                    self.expression()?;
                    if !self.eat(&Tok::Comma) {
                        self.expect(Tok::RBracket, "']'")?;
                        break;
                    }
                }
                Ok(Operand::Value)
            }
            Some(Tok::LBrace) => {
                while !self.eat(&Tok::RBrace) {
                    self.expression()?;
                    self.expect(Tok::Colon, "':'")?;
                    self.expression()?;
                    if !self.eat(&Tok::Comma) {
                        self.expect(Tok::RBrace, "'}'")?;
                        break;
                    }
                }
                Ok(Operand::Value)
            }
            Some(tok) => {
                self.pos -= 1;
                self.error(format!("unexpected {}", tok.describe()))
            }
            None => self.error("unexpected end of expression"),
        }
    }

    fn postfix(&mut self, mut operand: Operand) -> ParseResult<Operand> {
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.pos += 1;
                    let attr = match self.peek() {
                        Some(Tok::Name(n)) | Some(Tok::Number(n)) => n.clone(),
                        _ => return self.unexpected("an attribute name after '.'"),
                    };
                    self.pos += 1;
                    if let Operand::Ref(reference) = &mut operand {
                        reference.path.push(attr);
                    }
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    // a constant string key keeps the path static: x['k'] is x.k
                    let static_key = match (self.peek(), self.peek_at(1)) {
                        (Some(Tok::Str(key)), Some(Tok::RBracket)) => Some(key.clone()),
                        _ => None,
                    };
                    if let Some(key) = static_key {
                        self.pos += 2;
                        if let Operand::Ref(reference) = &mut operand {
                            reference.path.push(key);
                        }
                        continue;
                    }
                    if let Operand::Ref(reference) = std::mem::replace(&mut operand, Operand::Value) {
                        self.refs.push(reference);
                    }
                    self.subscript()?;
                }
                Some(Tok::LParen) => {
                    self.pos += 1;
                    if let Operand::Ref(mut reference) =
                        std::mem::replace(&mut operand, Operand::Value)
                    {
                        // method call: the object is the lookup, not the method
                        if reference.path.len() > 1 {
                            reference.path.pop();
                        }
                        self.refs.push(reference);
                    }
                    self.call_args()?;
                }
                _ => return Ok(operand),
            }
        }
    }

    /// After `[`: an index expression or a slice, through the closing `]`.
    fn subscript(&mut self) -> ParseResult<()> {
        loop {
            if self.eat(&Tok::RBracket) {
                return Ok(());
            }
            if self.eat(&Tok::Colon) || self.eat(&Tok::Comma) {
                continue;
            }
            if self.at_end() {
                return self.unexpected("']'");
            }
            self.expression()?;
        }
    }

    /// After `(`: positional, keyword and splat arguments through the closing `)`.
    fn call_args(&mut self) -> ParseResult<()> {
        while !self.eat(&Tok::RParen) {
            if matches!(self.peek(), Some(Tok::Star | Tok::Pow)) {
                self.pos += 1;
            } else if matches!(self.peek(), Some(Tok::Name(_)))
                && self.peek_at(1) == Some(&Tok::Assign)
            {
                self.pos += 2;
            }
            self.expression()?;
            if !self.eat(&Tok::Comma) {
                self.expect(Tok::RParen, "')'")?;
                break;
            }
        }
        Ok(())
    }

    fn filters_and_tests(&mut self) -> ParseResult<()> {
        loop {
            if self.eat(&Tok::Pipe) {
                self.filter_call()?;
            } else if self.eat_name("is") {
                self.eat_name("not");
                self.expect_name()?;
                while self.eat(&Tok::Dot) {
                    self.expect_name()?;
                }
                if self.eat(&Tok::LParen) {
                    self.call_args()?;
                } else if self.test_argument_follows() {
                    self.unary()?;
                }
            } else {
                return Ok(());
            }
        }
    }

    fn test_argument_follows(&self) -> bool {
        match self.peek() {
            Some(Tok::Name(n)) => !matches!(n.as_str(), "else" | "or" | "and" | "if" | "is" | "in" | "not"),
            Some(Tok::Str(_) | Tok::Number(_) | Tok::LBracket | Tok::LBrace) => true,
            _ => false,
        }
    }

    /// A filter name with optional arguments; the leading `|` is already consumed.
    fn filter_call(&mut self) -> ParseResult<()> {
        self.expect_name()?;
        while self.eat(&Tok::Dot) {
            self.expect_name()?;
        }
        if self.eat(&Tok::LParen) {
            self.call_args()?;
        }
        Ok(())
    }

    /// Assignment targets: `a`, `a, b`, `(a, b)`.
    fn targets(&mut self) -> ParseResult<Vec<String>> {
        let parenthesized = self.eat(&Tok::LParen);
        let mut names = vec![self.expect_name()?];
        while self.eat(&Tok::Comma) {
            if parenthesized && self.at(&Tok::RParen) {
                break;
            }
            names.push(self.expect_name()?);
        }
        if parenthesized {
            self.expect(Tok::RParen, "')'")?;
        }
        Ok(names)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    For,
    Set,
    Macro,
    Call,
    Filter,
    With,
    Block,
    Autoescape,
}

impl BlockKind {
    fn tag(self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::For => "for",
            BlockKind::Set => "set",
            BlockKind::Macro => "macro",
            BlockKind::Call => "call",
            BlockKind::Filter => "filter",
            BlockKind::With => "with",
            BlockKind::Block => "block",
            BlockKind::Autoescape => "autoescape",
        }
    }

    fn from_end_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "endif" => BlockKind::If,
            "endfor" => BlockKind::For,
            "endset" => BlockKind::Set,
            "endmacro" => BlockKind::Macro,
            "endcall" => BlockKind::Call,
            "endfilter" => BlockKind::Filter,
            "endwith" => BlockKind::With,
            "endblock" => BlockKind::Block,
            "endautoescape" => BlockKind::Autoescape,
            _ => return None,
        })
    }

    fn opens_scope(self) -> bool {
        matches!(
            self,
            BlockKind::For | BlockKind::Macro | BlockKind::Call | BlockKind::With | BlockKind::Block
        )
    }
}

struct OpenBlock {
    kind: BlockKind,
    /// Absolute offset of the opening tag body.
    offset: usize,
    /// Names declared in the enclosing scope once the block closes (`set x` ... `endset`).
    declares: Vec<String>,
}

/// Walks tags in order, tracking which names the template binds itself.
struct Analyzer {
    scopes: Vec<HashSet<String>>,
    blocks: Vec<OpenBlock>,
    found: BTreeSet<String>,
}

/// Error raised while analyzing, located by absolute byte offset.
pub(crate) type AnalyzeResult<T> = std::result::Result<T, ScanIssue>;

impl Analyzer {
    fn new() -> Self {
        Self {
            scopes: vec![HashSet::new()],
            blocks: Vec::new(),
            found: BTreeSet::new(),
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        ENGINE_GLOBALS.contains(&name) || self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn record(&mut self, refs: Vec<Reference>) {
        for reference in refs {
            if !self.is_bound(reference.head()) {
                self.found.insert(reference.dotted());
            }
        }
    }

    fn declare(&mut self, names: impl IntoIterator<Item = String>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.extend(names);
        }
    }

    fn open(&mut self, kind: BlockKind, offset: usize, scope: Vec<String>, declares: Vec<String>) {
        if kind.opens_scope() {
            self.scopes.push(scope.into_iter().collect());
        }
        self.blocks.push(OpenBlock {
            kind,
            offset,
            declares,
        });
    }

    fn close(&mut self, kind: BlockKind) -> ParseResult<()> {
        match self.blocks.last() {
            Some(open) if open.kind == kind => {}
            Some(open) => {
                return Err(ParseIssue {
                    offset: 0,
                    message: format!(
                        "unexpected 'end{}', the innermost open block is '{}' (expected 'end{}')",
                        kind.tag(),
                        open.kind.tag(),
                        open.kind.tag()
                    ),
                })
            }
            None => {
                return Err(ParseIssue {
                    offset: 0,
                    message: format!("unexpected 'end{}' without an open '{}' block", kind.tag(), kind.tag()),
                })
            }
        }
        if let Some(open) = self.blocks.pop() {
            if kind.opens_scope() {
                self.scopes.pop();
            }
            self.declare(open.declares);
        }
        Ok(())
    }

    fn innermost(&self) -> Option<BlockKind> {
        self.blocks.last().map(|b| b.kind)
    }

    fn inside(&self, kind: BlockKind) -> bool {
        self.blocks.iter().any(|b| b.kind == kind)
    }

    fn expression_tag(&mut self, body: &str) -> ParseResult<()> {
        let mut parser = ExprParser::new(body)?;
        parser.expression()?;
        parser.expect_end()?;
        let refs = parser.take_refs();
        self.record(refs);
        Ok(())
    }

    fn statement_tag(&mut self, body: &str, offset: usize) -> ParseResult<()> {
        let mut p = ExprParser::new(body)?;
        let tag = match p.bump() {
            Some(Tok::Name(tag)) => tag,
            Some(tok) => {
                p.pos -= 1;
                return p.error(format!("expected a tag name, got {}", tok.describe()));
            }
            None => return p.error("empty statement tag"),
        };

        match tag.as_str() {
            "if" => {
                p.expression()?;
                let refs = p.take_refs();
                self.record(refs);
                self.open(BlockKind::If, offset, Vec::new(), Vec::new());
            }
            "elif" => {
                if self.innermost() != Some(BlockKind::If) {
                    return p.error("unexpected 'elif' outside of an 'if' block");
                }
                p.expression()?;
                let refs = p.take_refs();
                self.record(refs);
            }
            "else" => {
                if !matches!(self.innermost(), Some(BlockKind::If | BlockKind::For)) {
                    return p.error("unexpected 'else' outside of an 'if' or 'for' block");
                }
            }
            "for" => {
                let targets = p.targets()?;
                p.expect_keyword("in")?;
                p.tuple(false)?;
                let iterable = p.take_refs();
                self.record(iterable);

                let mut scope = targets;
                scope.push("loop".to_string());
                self.open(BlockKind::For, offset, scope, Vec::new());

                if p.eat_name("if") {
                    p.expression()?;
                    let refs = p.take_refs();
                    self.record(refs);
                }
                p.eat_name("recursive");
            }
            "set" => {
                let first = p.expect_name()?;
                if p.eat(&Tok::Dot) {
                    // namespace attribute assignment reads the namespace object
                    p.expect_name()?;
                    p.expect(Tok::Assign, "'='")?;
                    p.tuple(true)?;
                    let mut refs = p.take_refs();
                    refs.push(Reference { path: vec![first] });
                    self.record(refs);
                } else {
                    let mut targets = vec![first];
                    while p.eat(&Tok::Comma) {
                        targets.push(p.expect_name()?);
                    }
                    if p.eat(&Tok::Assign) {
                        p.tuple(true)?;
                        let refs = p.take_refs();
                        self.record(refs);
                        self.declare(targets);
                    } else {
                        while p.eat(&Tok::Pipe) {
                            p.filter_call()?;
                        }
                        let refs = p.take_refs();
                        self.record(refs);
                        self.open(BlockKind::Set, offset, Vec::new(), targets);
                    }
                }
            }
            "macro" => {
                let name = p.expect_name()?;
                let params = self.parameters(&mut p)?;
                self.declare([name]);
                let mut scope = params;
                scope.extend(["varargs", "kwargs", "caller"].map(String::from));
                self.open(BlockKind::Macro, offset, scope, Vec::new());
            }
            "call" => {
                let params = if p.at(&Tok::LParen) {
                    self.parameters(&mut p)?
                } else {
                    Vec::new()
                };
                p.expression()?;
                let refs = p.take_refs();
                self.record(refs);
                self.open(BlockKind::Call, offset, params, Vec::new());
            }
            "filter" => {
                p.filter_call()?;
                while p.eat(&Tok::Pipe) {
                    p.filter_call()?;
                }
                let refs = p.take_refs();
                self.record(refs);
                self.open(BlockKind::Filter, offset, Vec::new(), Vec::new());
            }
            "with" => {
                let mut names = Vec::new();
                while !p.at_end() {
                    names.push(p.expect_name()?);
                    p.expect(Tok::Assign, "'='")?;
                    p.expression()?;
                    if !p.eat(&Tok::Comma) {
                        break;
                    }
                }
                let refs = p.take_refs();
                self.record(refs);
                self.open(BlockKind::With, offset, names, Vec::new());
            }
            "block" => {
                p.expect_name()?;
                p.eat_name("scoped");
                p.eat_name("required");
                self.open(BlockKind::Block, offset, vec!["self".to_string(), "super".to_string()], Vec::new());
            }
            "autoescape" => {
                p.expression()?;
                let refs = p.take_refs();
                self.record(refs);
                self.open(BlockKind::Autoescape, offset, Vec::new(), Vec::new());
            }
            "extends" | "do" => {
                p.expression()?;
                let refs = p.take_refs();
                self.record(refs);
            }
            "include" => {
                p.expression()?;
                let refs = p.take_refs();
                self.record(refs);
                if p.eat_name("ignore") {
                    p.expect_keyword("missing")?;
                }
                Self::context_modifier(&mut p)?;
            }
            "import" => {
                p.expression()?;
                let refs = p.take_refs();
                self.record(refs);
                p.expect_keyword("as")?;
                let alias = p.expect_name()?;
                self.declare([alias]);
                Self::context_modifier(&mut p)?;
            }
            "from" => {
                p.expression()?;
                let refs = p.take_refs();
                self.record(refs);
                p.expect_keyword("import")?;
                loop {
                    if p.at_name("with") || p.at_name("without") {
                        break;
                    }
                    let mut bound = p.expect_name()?;
                    if p.eat_name("as") {
                        bound = p.expect_name()?;
                    }
                    self.declare([bound]);
                    if !p.eat(&Tok::Comma) {
                        break;
                    }
                }
                Self::context_modifier(&mut p)?;
            }
            "break" | "continue" => {
                if !self.inside(BlockKind::For) {
                    return p.error(format!("'{}' used outside of a 'for' loop", tag));
                }
            }
            "endraw" => return p.error("unexpected 'endraw' without an open 'raw' block"),
            end => match BlockKind::from_end_tag(end) {
                Some(kind) => {
                    if kind == BlockKind::Block && matches!(p.peek(), Some(Tok::Name(_))) {
                        p.bump();
                    }
                    self.close(kind).map_err(|issue| ParseIssue {
                        offset: 0,
                        message: issue.message,
                    })?;
                }
                None => {
                    p.pos -= 1;
                    return p.error(format!("unknown tag '{}'", end));
                }
            },
        }

        p.expect_end()
    }

    /// `(a, b=default, ...)`; defaults are evaluated in the enclosing scope.
    fn parameters(&mut self, p: &mut ExprParser) -> ParseResult<Vec<String>> {
        p.expect(Tok::LParen, "'('")?;
        let mut names = Vec::new();
        while !p.eat(&Tok::RParen) {
            names.push(p.expect_name()?);
            if p.eat(&Tok::Assign) {
                p.expression()?;
            }
            if !p.eat(&Tok::Comma) {
                p.expect(Tok::RParen, "')'")?;
                break;
            }
        }
        let refs = p.take_refs();
        self.record(refs);
        Ok(names)
    }

    fn context_modifier(p: &mut ExprParser) -> ParseResult<()> {
        if p.eat_name("with") || p.eat_name("without") {
            p.expect_keyword("context")?;
        }
        Ok(())
    }
}

fn locate(issue: ParseIssue, body_offset: usize) -> ScanIssue {
    ScanIssue {
        offset: body_offset + issue.offset,
        message: issue.message,
    }
}

/// Collects every context name `source` reads, as dotted paths.
pub(crate) fn analyze(source: &str) -> AnalyzeResult<BTreeSet<String>> {
    let mut analyzer = Analyzer::new();

    for segment in scan(source)? {
        match segment {
            Segment::Expression { body, offset } => analyzer
                .expression_tag(body)
                .map_err(|issue| locate(issue, offset))?,
            Segment::Statement { body, offset } => analyzer
                .statement_tag(body, offset)
                .map_err(|issue| locate(issue, offset))?,
        }
    }

    if let Some(open) = analyzer.blocks.last() {
        return Err(ScanIssue {
            offset: open.offset,
            message: format!(
                "unexpected end of template, '{}' block was never closed (expected 'end{}')",
                open.kind.tag(),
                open.kind.tag()
            ),
        });
    }

    Ok(analyzer.found)
}
