//! Infix text back into the expression DAG.
//!
//! Reads what `format_expression` prints: names resolve to aliased nodes or to
//! `d<ref>.<component>` variables, integers become the narrowest integer
//! constant, and anything with a `.` or exponent becomes an `f64` constant.
//! Rational and `f32` constants print in forms that read back as a division
//! and an `f64`, so they do not survive a print-parse cycle unchanged.
//!
//! Parsing is operator-precedence with explicit stacks, so nesting depth is
//! bounded by memory.

use crate::graph::{BinaryOp, ExpressionGraph, Pattern, ScalarValue, UnaryOp};
use crate::store::{Component, DatasetRef, NodeId, RegistryError};
use logos::Logos;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("Unexpected '{token}' at offset {offset}")]
    UnexpectedToken { token: String, offset: usize },
    #[error("Expression ends early")]
    UnexpectedEnd,
    #[error("Unbalanced parenthesis at offset {offset}")]
    UnbalancedParen { offset: usize },
    #[error("Invalid number '{text}' at offset {offset}")]
    InvalidNumber { text: String, offset: usize },
    #[error("Unknown name '{name}' at offset {offset}")]
    UnknownName { name: String, offset: usize },
    #[error("Wildcard '#{number}' at offset {offset} is only allowed in a pattern")]
    WildcardOutsidePattern { number: u16, offset: usize },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum TokenKind {
    #[token("(")]
    Open,
    #[token(")")]
    Close,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[regex(r"[0-9]+")]
    Int,
    #[regex(r"([0-9]+\.[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?")]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+")]
    #[token("inf")]
    #[token("NaN")]
    Float,
    #[regex(r"#[0-9]+")]
    Wildcard,
    #[regex(r"[A-Za-z_][A-Za-z0-9_.]*")]
    Name,
}

impl TokenKind {
    fn binary_op(self) -> Option<BinaryOp> {
        match self {
            Self::Plus => Some(BinaryOp::Add),
            Self::Minus => Some(BinaryOp::Sub),
            Self::Star => Some(BinaryOp::Mul),
            Self::Slash => Some(BinaryOp::Div),
            Self::Percent => Some(BinaryOp::Mod),
            Self::Caret => Some(BinaryOp::Pow),
            _ => None,
        }
    }

    fn is_number(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

#[derive(Debug, Clone, Copy)]
struct Lexeme<'a> {
    kind: TokenKind,
    text: &'a str,
    offset: usize,
}

impl Lexeme<'_> {
    fn unexpected(&self) -> ParseError {
        ParseError::UnexpectedToken { token: self.text.to_string(), offset: self.offset }
    }
}

fn lex(text: &str) -> Result<Vec<Lexeme<'_>>, ParseError> {
    let mut lexer = TokenKind::lexer(text);
    let mut out = Vec::new();
    while let Some(kind) = lexer.next() {
        let offset = lexer.span().start;
        match kind {
            Ok(kind) => out.push(Lexeme { kind, text: lexer.slice(), offset }),
            Err(()) => {
                let ch = lexer.slice().chars().next().unwrap_or('?');
                return Err(ParseError::UnexpectedChar { ch, offset });
            }
        }
    }
    Ok(out)
}

// --- Literals ---

fn literal(lexeme: &Lexeme<'_>, negative: bool) -> Result<ScalarValue, ParseError> {
    let text = if negative { format!("-{}", lexeme.text) } else { lexeme.text.to_string() };
    let invalid = || ParseError::InvalidNumber { text: text.clone(), offset: lexeme.offset };
    match lexeme.kind {
        TokenKind::Int => {
            let v: i64 = text.parse().map_err(|_| invalid())?;
            Ok(match i32::try_from(v) {
                Ok(v) => ScalarValue::Int32(v),
                Err(_) => ScalarValue::Int64(v),
            })
        }
        _ => text.parse::<f64>().map(ScalarValue::Float64).map_err(|_| invalid()),
    }
}

fn function(name: &str) -> Option<UnaryOp> {
    match name {
        "log" => Some(UnaryOp::Ln),
        _ => UnaryOp::ALL.into_iter().find(|op| op.name() == name),
    }
}

/// `d<ref>.<component>`, the form the printer uses for an unaliased variable.
fn variable_ref(name: &str) -> Option<(DatasetRef, Component)> {
    let (dataset, component) = name.strip_prefix('d')?.split_once('.')?;
    Some((DatasetRef(dataset.parse().ok()?), Component::from_name(component)?))
}

/// First alias wins, matching how the arena keeps aliases.
fn alias_table(graph: &ExpressionGraph) -> HashMap<String, NodeId> {
    let mut aliases = HashMap::new();
    for index in 0..graph.node_count() {
        let id = NodeId::new(index);
        if let Some(alias) = graph.print_alias(id) {
            aliases.entry(alias.to_string()).or_insert(id);
        }
    }
    aliases
}

// --- Targets ---

/// Where parsed operands and operators are assembled.
trait Sink {
    type Out;

    fn number(&mut self, value: ScalarValue) -> Self::Out;
    fn name(&mut self, name: &str, offset: usize) -> Result<Self::Out, ParseError>;
    fn wildcard(&mut self, number: u16, offset: usize) -> Result<Self::Out, ParseError>;
    fn unary(&mut self, op: UnaryOp, x: Self::Out) -> Self::Out;
    fn binary(&mut self, op: BinaryOp, lhs: Self::Out, rhs: Self::Out) -> Self::Out;
}

struct GraphSink<'g> {
    graph: &'g mut ExpressionGraph,
    aliases: HashMap<String, NodeId>,
}

impl Sink for GraphSink<'_> {
    type Out = NodeId;

    fn number(&mut self, value: ScalarValue) -> NodeId {
        self.graph.constant(value)
    }

    fn name(&mut self, name: &str, offset: usize) -> Result<NodeId, ParseError> {
        if let Some(&id) = self.aliases.get(name) {
            return Ok(id);
        }
        match variable_ref(name) {
            Some((dataset, component)) => Ok(self.graph.variable(dataset, component)?),
            None => Err(ParseError::UnknownName { name: name.to_string(), offset }),
        }
    }

    fn wildcard(&mut self, number: u16, offset: usize) -> Result<NodeId, ParseError> {
        Err(ParseError::WildcardOutsidePattern { number, offset })
    }

    fn unary(&mut self, op: UnaryOp, x: NodeId) -> NodeId {
        self.graph.unary(op, x)
    }

    fn binary(&mut self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.graph.binary(op, lhs, rhs)
    }
}

struct PatternSink<'g> {
    source: &'g ExpressionGraph,
    aliases: HashMap<String, NodeId>,
    // Same registry and hasher as `source`; holds the variables a pattern
    // names so their hashes can be taken without touching `source`.
    scratch: ExpressionGraph,
}

impl Sink for PatternSink<'_> {
    type Out = Pattern;

    fn number(&mut self, value: ScalarValue) -> Pattern {
        Pattern::Constant(value)
    }

    fn name(&mut self, name: &str, offset: usize) -> Result<Pattern, ParseError> {
        if let Some(&id) = self.aliases.get(name) {
            return Ok(Pattern::exact(self.source, id));
        }
        match variable_ref(name) {
            Some((dataset, component)) => {
                let id = self.scratch.variable(dataset, component)?;
                Ok(Pattern::exact(&self.scratch, id))
            }
            None => Err(ParseError::UnknownName { name: name.to_string(), offset }),
        }
    }

    fn wildcard(&mut self, number: u16, _offset: usize) -> Result<Pattern, ParseError> {
        Ok(Pattern::Any(number))
    }

    fn unary(&mut self, op: UnaryOp, x: Pattern) -> Pattern {
        Pattern::unary(op, x)
    }

    fn binary(&mut self, op: BinaryOp, lhs: Pattern, rhs: Pattern) -> Pattern {
        Pattern::binary(op, lhs, rhs)
    }
}

// --- Operator-precedence core ---

// Prefix minus sits between `*` and `^`: `-a ^ 2` is `-(a ^ 2)` and
// `-a * b` is `(-a) * b`.
const NEGATE: u8 = 3;
const POW: u8 = 4;

#[derive(Debug, Clone, Copy)]
enum Pending {
    Open(usize),
    Call(UnaryOp, usize),
    Negate,
    Binary(BinaryOp),
}

impl Pending {
    fn strength(self) -> u8 {
        match self {
            Self::Open(_) | Self::Call(..) => 0,
            Self::Negate => NEGATE,
            Self::Binary(op) => strength(op),
        }
    }
}

fn strength(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Pow => POW,
        _ => op.precedence(),
    }
}

fn pop<T>(output: &mut Vec<T>) -> Result<T, ParseError> {
    output.pop().ok_or(ParseError::UnexpectedEnd)
}

fn reduce<S: Sink>(pending: Pending, output: &mut Vec<S::Out>, sink: &mut S) -> Result<(), ParseError> {
    let value = match pending {
        Pending::Negate => {
            let x = pop(output)?;
            sink.unary(UnaryOp::Negate, x)
        }
        Pending::Binary(op) => {
            let rhs = pop(output)?;
            let lhs = pop(output)?;
            sink.binary(op, lhs, rhs)
        }
        Pending::Open(offset) | Pending::Call(_, offset) => return Err(ParseError::UnbalancedParen { offset }),
    };
    output.push(value);
    Ok(())
}

fn parse_into<S: Sink>(text: &str, sink: &mut S) -> Result<S::Out, ParseError> {
    let lexemes = lex(text)?;
    let mut output: Vec<S::Out> = Vec::new();
    let mut pending: Vec<Pending> = Vec::new();
    let mut expect_operand = true;
    let mut i = 0;

    while i < lexemes.len() {
        let lexeme = lexemes[i];
        i += 1;

        if expect_operand {
            match lexeme.kind {
                TokenKind::Int | TokenKind::Float => {
                    output.push(sink.number(literal(&lexeme, false)?));
                    expect_operand = false;
                }
                TokenKind::Wildcard => {
                    let number = lexeme.text[1..].parse().map_err(|_| ParseError::InvalidNumber {
                        text: lexeme.text.to_string(),
                        offset: lexeme.offset,
                    })?;
                    output.push(sink.wildcard(number, lexeme.offset)?);
                    expect_operand = false;
                }
                TokenKind::Name => {
                    let call = function(lexeme.text).filter(|_| matches!(lexemes.get(i), Some(l) if l.kind == TokenKind::Open));
                    match call {
                        Some(op) => {
                            pending.push(Pending::Call(op, lexeme.offset));
                            i += 1;
                        }
                        None => {
                            output.push(sink.name(lexeme.text, lexeme.offset)?);
                            expect_operand = false;
                        }
                    }
                }
                TokenKind::Open => pending.push(Pending::Open(lexeme.offset)),
                TokenKind::Minus => {
                    // `-3` is a literal unless it is the base of a power.
                    let number = lexemes.get(i).filter(|l| l.kind.is_number());
                    let before_pow = matches!(lexemes.get(i + 1), Some(l) if l.kind == TokenKind::Caret);
                    match number {
                        Some(number) if !before_pow => {
                            output.push(sink.number(literal(number, true)?));
                            i += 1;
                            expect_operand = false;
                        }
                        _ => pending.push(Pending::Negate),
                    }
                }
                _ => return Err(lexeme.unexpected()),
            }
            continue;
        }

        if let Some(op) = lexeme.kind.binary_op() {
            let incoming = strength(op);
            while let Some(&top) = pending.last() {
                // `^` groups to the right, everything else to the left.
                let pops = if op == BinaryOp::Pow { top.strength() > incoming } else { top.strength() >= incoming };
                if !pops {
                    break;
                }
                pending.pop();
                reduce(top, &mut output, sink)?;
            }
            pending.push(Pending::Binary(op));
            expect_operand = true;
        } else if lexeme.kind == TokenKind::Close {
            loop {
                match pending.pop() {
                    Some(Pending::Open(_)) => break,
                    Some(Pending::Call(op, _)) => {
                        let x = pop(&mut output)?;
                        output.push(sink.unary(op, x));
                        break;
                    }
                    Some(other) => reduce(other, &mut output, sink)?,
                    None => return Err(ParseError::UnbalancedParen { offset: lexeme.offset }),
                }
            }
        } else {
            return Err(lexeme.unexpected());
        }
    }

    if expect_operand {
        return Err(ParseError::UnexpectedEnd);
    }
    while let Some(top) = pending.pop() {
        reduce(top, &mut output, sink)?;
    }
    pop(&mut output)
}

// --- Entry points ---

/// Parses `text` into `graph` and returns the root. Subexpressions that
/// already exist are reused. On error, nodes interned before the failure
/// stay in the arena unreferenced.
pub fn parse_expression(graph: &mut ExpressionGraph, text: &str) -> Result<NodeId, ParseError> {
    let aliases = alias_table(graph);
    parse_into(text, &mut GraphSink { graph, aliases })
}

/// Parses a pattern for matching against `graph`. `#n` is a wildcard; names
/// become exact matches on the node they denote in `graph`; numbers match
/// constants by value.
pub fn parse_pattern(graph: &ExpressionGraph, text: &str) -> Result<Pattern, ParseError> {
    let mut sink = PatternSink {
        source: graph,
        aliases: alias_table(graph),
        scratch: ExpressionGraph::with_datasets(graph.datasets().clone(), graph.hasher().clone()),
    };
    parse_into(text, &mut sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::format_expression;
    use rstest::rstest;

    type Build = fn(&mut ExpressionGraph, [NodeId; 3]) -> NodeId;

    fn fixture() -> (ExpressionGraph, [NodeId; 3]) {
        let mut g = ExpressionGraph::new();
        let mut leaf = |name: &str| {
            let r = g.register_dataset(1, name.as_bytes()).unwrap();
            g.variable_with_alias(r, Component::VALUE, Some(name)).unwrap()
        };
        let vars = [leaf("a"), leaf("b"), leaf("c")];
        (g, vars)
    }

    fn sum_times(g: &mut ExpressionGraph, [a, b, c]: [NodeId; 3]) -> NodeId {
        let s = g.add(a, b);
        g.mul(s, c)
    }

    fn nested_differences(g: &mut ExpressionGraph, [a, b, c]: [NodeId; 3]) -> NodeId {
        let inner = g.sub(b, c);
        let left = g.sub(a, inner);
        g.sub(left, c)
    }

    fn product_of_remainder(g: &mut ExpressionGraph, [a, b, c]: [NodeId; 3]) -> NodeId {
        let m = g.modulo(b, c);
        let q = g.div(a, m);
        g.mul(a, q)
    }

    fn power_towers(g: &mut ExpressionGraph, [a, b, c]: [NodeId; 3]) -> NodeId {
        let right = g.pow(b, c);
        let up = g.pow(a, right);
        let left = g.pow(a, b);
        let down = g.pow(left, c);
        g.add(up, down)
    }

    fn negations(g: &mut ExpressionGraph, [a, b, _]: [NodeId; 3]) -> NodeId {
        let two = g.constant(ScalarValue::Int32(2));
        let three = g.constant(ScalarValue::Int32(3));
        let minus_three = g.constant(ScalarValue::Int32(-3));
        let na = g.neg(a);
        let sq = g.pow(na, two);
        let pa = g.pow(a, two);
        let neg_sq = g.neg(pa);
        let neg_three = g.neg(three);
        let scaled = g.mul(b, minus_three);
        let based = g.pow(minus_three, b);
        let nb = g.neg(b);
        let exp_neg = g.pow(a, nb);
        let terms = [neg_sq, neg_three, scaled, based, exp_neg];
        terms.into_iter().fold(sq, |acc, t| g.sub(acc, t))
    }

    fn functions(g: &mut ExpressionGraph, [a, b, _]: [NodeId; 3]) -> NodeId {
        let x = g.abs(a);
        let y = g.sign(b);
        let s = g.add(x, y);
        let e = g.exp(s);
        g.ln(e)
    }

    fn literals(g: &mut ExpressionGraph, [a, b, _]: [NodeId; 3]) -> NodeId {
        let two = g.constant(ScalarValue::Float64(2.0));
        let big = g.constant(ScalarValue::Int64(1 << 40));
        let small = g.constant(ScalarValue::Float64(-2.5e-300));
        let scaled = g.mul(a, two);
        let shifted = g.sub(big, small);
        let sum = g.add(scaled, shifted);
        g.div(sum, b)
    }

    fn unaliased_and_aliased(g: &mut ExpressionGraph, [a, b, c]: [NodeId; 3]) -> NodeId {
        let r = g.register_dataset(2, b"d").unwrap();
        let err = g.variable(r, Component::ERROR).unwrap();
        let x = g.add(a, b);
        g.alias(x, "x");
        let inner = g.sub(x, c);
        let prod = g.mul(x, inner);
        g.div(prod, err)
    }

    #[rstest]
    #[case(sum_times)]
    #[case(nested_differences)]
    #[case(product_of_remainder)]
    #[case(power_towers)]
    #[case(negations)]
    #[case(functions)]
    #[case(literals)]
    #[case(unaliased_and_aliased)]
    fn test_printed_form_parses_back(#[case] build: Build) {
        let (mut g, vars) = fixture();
        let root = build(&mut g, vars);
        let text = format_expression(&g, root);
        let before = g.node_count();

        let parsed = parse_expression(&mut g, &text).unwrap();
        assert_eq!(parsed, root, "{}", text);
        assert_eq!(g.node_count(), before);
    }

    #[test]
    fn test_precedence_and_functions_from_text() {
        let (mut g, [a, b, _]) = fixture();

        let two = g.constant(ScalarValue::Int32(2));
        let three = g.constant(ScalarValue::Int32(3));
        let cube = g.pow(b, three);
        let prod = g.mul(two, cube);
        let expected = g.add(a, prod);
        assert_eq!(parse_expression(&mut g, "a + 2 * b ^ 3").unwrap(), expected);

        let sq = g.pow(a, two);
        let neg_sq = g.neg(sq);
        assert_eq!(parse_expression(&mut g, "-a^2").unwrap(), neg_sq);

        let ln_a = g.ln(a);
        assert_eq!(parse_expression(&mut g, "log(a)").unwrap(), ln_a);
        assert_eq!(parse_expression(&mut g, "((( ln(a) )))").unwrap(), ln_a);

        let half = g.constant(ScalarValue::Float64(0.5));
        let scaled = g.mul(half, a);
        assert_eq!(parse_expression(&mut g, ".5*a").unwrap(), scaled);
    }

    #[test]
    fn test_deep_input_does_not_recurse() {
        let (mut g, [a, _, _]) = fixture();
        let mut chain = a;
        for _ in 0..50_000 {
            chain = g.neg(chain);
        }
        let text = format_expression(&g, chain);
        assert_eq!(parse_expression(&mut g, &text).unwrap(), chain);

        let nested = format!("{}a{}", "(".repeat(50_000), ")".repeat(50_000));
        assert_eq!(parse_expression(&mut g, &nested).unwrap(), a);
    }

    #[rstest]
    #[case::empty("", ParseError::UnexpectedEnd)]
    #[case::dangling_operator("a +", ParseError::UnexpectedEnd)]
    #[case::unclosed("(a", ParseError::UnbalancedParen { offset: 0 })]
    #[case::unopened("a)", ParseError::UnbalancedParen { offset: 1 })]
    #[case::empty_parens("()", ParseError::UnexpectedToken { token: ")".into(), offset: 1 })]
    #[case::bad_char("a $ b", ParseError::UnexpectedChar { ch: '$', offset: 2 })]
    #[case::adjacent_operands("a b", ParseError::UnexpectedToken { token: "b".into(), offset: 2 })]
    #[case::unknown("zeta", ParseError::UnknownName { name: "zeta".into(), offset: 0 })]
    #[case::wildcard("#1 + a", ParseError::WildcardOutsidePattern { number: 1, offset: 0 })]
    #[case::overflow("99999999999999999999", ParseError::InvalidNumber { text: "99999999999999999999".into(), offset: 0 })]
    #[case::bad_ref("d9.value", ParseError::Registry(RegistryError::InvalidReference { index: 9, count: 3 }))]
    fn test_parse_errors(#[case] text: &str, #[case] expected: ParseError) {
        let (mut g, _) = fixture();
        assert_eq!(parse_expression(&mut g, text).unwrap_err(), expected);
    }

    #[test]
    fn test_pattern_from_text() {
        let (mut g, [a, b, _]) = fixture();
        let e = g.exp(b);
        let root = g.mul(a, e);

        let pattern = parse_pattern(&g, "#1 * exp(#2)").unwrap();
        assert_eq!(
            pattern,
            Pattern::binary(BinaryOp::Mul, Pattern::Any(1), Pattern::unary(UnaryOp::Exp, Pattern::Any(2)))
        );
        let bindings = pattern.match_node(&g, root).unwrap();
        assert_eq!(bindings.get(&1), Some(&a));
        assert_eq!(bindings.get(&2), Some(&b));

        assert!(parse_pattern(&g, "a * #0").unwrap().matches(&g, root));
        assert!(!parse_pattern(&g, "b * #0").unwrap().matches(&g, root));
        assert!(parse_pattern(&g, "d0.value * exp(d1.value)").unwrap().matches(&g, root));
    }

    #[test]
    fn test_pattern_names_a_variable_not_yet_built() {
        let (mut g, [a, _, _]) = fixture();
        let pattern = parse_pattern(&g, "d0.error ^ 2.0").unwrap();
        let before = g.node_count();
        assert_eq!(before, 3);

        let err = g.variable(DatasetRef(0), Component::ERROR).unwrap();
        let two = g.constant(ScalarValue::Int32(2));
        let root = g.pow(err, two);
        assert!(pattern.matches(&g, root));

        let other = g.pow(a, two);
        assert!(!pattern.matches(&g, other));
    }
}
