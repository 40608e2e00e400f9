use field_profiler_common::{FieldProfilerError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::coerce::parse_number;
use crate::record::{FieldSpec, RawValue, Record, RecordId};

// --- AST ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

impl std::str::FromStr for CmpOp {
    type Err = FieldProfilerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" | "==" | "eq" => Ok(CmpOp::Eq),
            "!=" | "<>" | "ne" => Ok(CmpOp::Ne),
            "<" | "lt" => Ok(CmpOp::Lt),
            "<=" | "le" => Ok(CmpOp::Le),
            ">" | "gt" => Ok(CmpOp::Gt),
            ">=" | "ge" => Ok(CmpOp::Ge),
            other => Err(FieldProfilerError::InvalidCriterion(format!("unknown operator '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl Literal {
    fn as_number(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            Literal::Str(s) => parse_number(s.trim()),
            Literal::Bool(_) | Literal::Null => None,
        }
    }

    fn as_text(&self) -> String {
        match self {
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Str(s) => s.clone(),
            Literal::Bool(b) => b.to_string(),
            Literal::Null => String::new(),
        }
    }
}

/// Field references are resolved to positions when the rule is compiled.
#[derive(Debug, Clone)]
enum Expr {
    Comparison { field: usize, op: CmpOp, val: Literal },
    IsNull(usize),
    IsNotNull(usize),
    In { field: usize, vals: Vec<Literal> },
    Like { field: usize, pattern: Regex },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

// --- recursive descent parser ---

struct Parser<'f> {
    tokens: Vec<String>,
    pos: usize,
    fields: &'f [FieldSpec],
}

type ParseResult<T> = std::result::Result<T, String>;

impl<'f> Parser<'f> {
    fn new(input: &str, fields: &'f [FieldSpec]) -> Self {
        Parser { tokens: tokenize(input), pos: 0, fields }
    }
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(|s| s.as_str())
    }
    fn peek_upper(&self) -> Option<String> {
        self.peek().map(|s| s.to_uppercase())
    }
    fn consume(&mut self) -> Option<&str> {
        let t = self.tokens.get(self.pos).map(|s| s.as_str());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }
    fn expect(&mut self, s: &str) -> ParseResult<()> {
        match self.consume() {
            Some(t) if t.eq_ignore_ascii_case(s) => Ok(()),
            Some(t) => Err(format!("expected '{s}', got '{t}'")),
            None => Err(format!("expected '{s}', got end of rule")),
        }
    }
    fn parse(&mut self) -> ParseResult<Expr> {
        let e = self.parse_or()?;
        match self.peek() {
            Some(t) => Err(format!("unexpected token: '{t}'")),
            None => Ok(e),
        }
    }
    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek_upper().as_deref() == Some("OR") {
            self.consume();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }
    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_not()?;
        while self.peek_upper().as_deref() == Some("AND") {
            self.consume();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }
    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.peek_upper().as_deref() == Some("NOT") {
            self.consume();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_atom()
    }
    fn parse_atom(&mut self) -> ParseResult<Expr> {
        if self.peek() == Some("(") {
            self.consume();
            let inner = self.parse_or()?;
            self.expect(")")?;
            return Ok(inner);
        }
        let name = match self.consume() {
            Some(t) => strip_quotes(t),
            None => return Err("expected field name, got end of rule".into()),
        };
        let field = self
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| format!("unknown field '{name}'"))?;
        match self.peek_upper().as_deref() {
            Some("IS") => {
                self.consume();
                if self.peek_upper().as_deref() == Some("NOT") {
                    self.consume();
                    self.expect("NULL")?;
                    return Ok(Expr::IsNotNull(field));
                }
                self.expect("NULL")?;
                Ok(Expr::IsNull(field))
            }
            Some("IN") => {
                self.consume();
                self.expect("(")?;
                let mut vals = Vec::new();
                loop {
                    vals.push(self.parse_value()?);
                    match self.consume() {
                        Some(",") => {}
                        Some(")") => break,
                        Some(t) => return Err(format!("expected ',' or ')' in IN list, got '{t}'")),
                        None => return Err("unexpected end of rule in IN list".into()),
                    }
                }
                Ok(Expr::In { field, vals })
            }
            Some("LIKE") => {
                self.consume();
                let pattern = match self.consume() {
                    Some(t) => like_regex(&strip_quotes(t))?,
                    None => return Err("expected pattern after LIKE".into()),
                };
                Ok(Expr::Like { field, pattern })
            }
            _ => {
                let op = match self.consume() {
                    Some("=") | Some("==") => CmpOp::Eq,
                    Some("!=") | Some("<>") => CmpOp::Ne,
                    Some("<") => CmpOp::Lt,
                    Some("<=") => CmpOp::Le,
                    Some(">") => CmpOp::Gt,
                    Some(">=") => CmpOp::Ge,
                    Some(t) => return Err(format!("expected comparison operator, got '{t}'")),
                    None => return Err("expected comparison operator, got end of rule".into()),
                };
                let val = self.parse_value()?;
                Ok(Expr::Comparison { field, op, val })
            }
        }
    }
    fn parse_value(&mut self) -> ParseResult<Literal> {
        match self.consume() {
            None => Err("expected value, got end of rule".into()),
            Some(t) if t.eq_ignore_ascii_case("NULL") => Ok(Literal::Null),
            Some(t) if t.eq_ignore_ascii_case("TRUE") => Ok(Literal::Bool(true)),
            Some(t) if t.eq_ignore_ascii_case("FALSE") => Ok(Literal::Bool(false)),
            Some(t) => {
                if t.starts_with('\'') || t.starts_with('"') {
                    Ok(Literal::Str(strip_quotes(t)))
                } else if let Ok(i) = t.parse::<i64>() {
                    Ok(Literal::Int(i))
                } else if let Ok(f) = t.parse::<f64>() {
                    Ok(Literal::Float(f))
                } else {
                    Ok(Literal::Str(t.to_string()))
                }
            }
        }
    }
}

fn strip_quotes(s: &str) -> String {
    let quoted = s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')));
    if quoted {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '\'' || c == '"' {
            let q = c;
            let mut s = String::from(c);
            chars.next();
            for ch in chars.by_ref() {
                s.push(ch);
                if ch == q {
                    break;
                }
            }
            tokens.push(s);
            continue;
        }
        if matches!(c, '<' | '>' | '!' | '=') {
            let mut op = String::from(c);
            chars.next();
            if let Some(&next) = chars.peek() {
                if next == '=' || (c == '<' && next == '>') {
                    op.push(next);
                    chars.next();
                }
            }
            tokens.push(op);
            continue;
        }
        if matches!(c, '(' | ')' | ',') {
            tokens.push(c.to_string());
            chars.next();
            continue;
        }
        let mut word = String::new();
        while let Some(&ch) = chars.peek() {
            if ch.is_whitespace() || "(),='\"<>!".contains(ch) {
                break;
            }
            word.push(ch);
            chars.next();
        }
        if !word.is_empty() {
            tokens.push(word);
        }
    }
    tokens
}

// --- LIKE matching: % = any run, _ = one char ---

/// Compiles a LIKE pattern to an anchored regex, which matches in linear time.
fn like_regex(pattern: &str) -> ParseResult<Regex> {
    let mut re = String::from("(?s)^");
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '%' | '_' => {
                re.push_str(&regex::escape(&std::mem::take(&mut literal)));
                re.push_str(if c == '%' { ".*" } else { "." });
            }
            c => literal.push(c),
        }
    }
    re.push_str(&regex::escape(&literal));
    re.push('$');
    Regex::new(&re).map_err(|e| format!("invalid LIKE pattern '{pattern}': {e}"))
}

// --- evaluation ---

fn raw_number(v: &RawValue) -> Option<f64> {
    match v {
        RawValue::Int(i) => Some(*i as f64),
        RawValue::Float(f) => Some(*f),
        RawValue::Text(s) => parse_number(s.trim()),
        _ => None,
    }
}

/// SQL-style: comparisons against a null value are false.
fn compare(raw: &RawValue, op: CmpOp, lit: &Literal) -> bool {
    if let Literal::Null = lit {
        return match op {
            CmpOp::Eq => raw.is_null(),
            CmpOp::Ne => !raw.is_null(),
            _ => false,
        };
    }
    if raw.is_null() {
        return false;
    }
    if let (RawValue::Bool(a), Literal::Bool(b)) = (raw, lit) {
        return op.holds(a.cmp(b));
    }
    if let (Some(a), Some(b)) = (raw_number(raw), lit.as_number()) {
        return a.partial_cmp(&b).is_some_and(|ord| op.holds(ord));
    }
    match raw.to_text() {
        Some(text) => op.holds(text.as_str().cmp(lit.as_text().as_str())),
        None => false,
    }
}

fn eval(expr: &Expr, record: &Record) -> bool {
    match expr {
        Expr::And(a, b) => eval(a, record) && eval(b, record),
        Expr::Or(a, b) => eval(a, record) || eval(b, record),
        Expr::Not(inner) => !eval(inner, record),
        Expr::IsNull(f) => record.value(*f).is_null(),
        Expr::IsNotNull(f) => !record.value(*f).is_null(),
        Expr::Comparison { field, op, val } => compare(record.value(*field), *op, val),
        Expr::In { field, vals } => vals.iter().any(|v| compare(record.value(*field), CmpOp::Eq, v)),
        Expr::Like { field, pattern } => record
            .value(*field)
            .to_text()
            .is_some_and(|s| pattern.is_match(&s)),
    }
}

/// A compiled validation rule: records for which the expression is false fail it.
#[derive(Debug, Clone)]
pub struct Rule {
    source: String,
    expr: Expr,
}

impl Rule {
    pub fn parse(source: &str, fields: &[FieldSpec]) -> Result<Self> {
        let expr = Parser::new(source, fields)
            .parse()
            .map_err(|e| FieldProfilerError::Rule(format!("{source}: {e}")))?;
        Ok(Self { source: source.to_string(), expr })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn passes(&self, record: &Record) -> bool {
        eval(&self.expr, record)
    }
}

pub fn compile_rules(sources: &[String], fields: &[FieldSpec]) -> Result<Vec<Rule>> {
    sources.iter().map(|s| Rule::parse(s, fields)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule: String,
    pub total_checked: u64,
    pub fail_count: u64,
    pub failed_ids: Vec<RecordId>,
    pub ids_truncated: bool,
}

/// Running tally for one rule during a profiling pass.
#[derive(Debug, Clone)]
pub struct RuleTally {
    rule: Rule,
    outcome: RuleOutcome,
    id_cap: usize,
}

impl RuleTally {
    pub fn new(rule: Rule, id_cap: usize) -> Self {
        let outcome = RuleOutcome {
            rule: rule.source().to_string(),
            total_checked: 0,
            fail_count: 0,
            failed_ids: Vec::new(),
            ids_truncated: false,
        };
        Self { rule, outcome, id_cap }
    }

    pub fn check(&mut self, record: &Record) {
        self.outcome.total_checked += 1;
        if !self.rule.passes(record) {
            self.outcome.fail_count += 1;
            if self.outcome.failed_ids.len() < self.id_cap {
                self.outcome.failed_ids.push(record.id);
            } else {
                self.outcome.ids_truncated = true;
            }
        }
    }

    pub fn finish(&self) -> RuleOutcome {
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DeclaredKind;

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("age", DeclaredKind::Numeric),
            FieldSpec::new("name", DeclaredKind::Text),
        ]
    }

    fn rec(age: RawValue, name: RawValue) -> Record {
        Record::new(0, vec![age, name])
    }

    #[test]
    fn comparisons_and_logic() {
        let r = Rule::parse("age >= 18 AND name IS NOT NULL", &fields()).unwrap();
        assert!(r.passes(&rec(20.into(), "ann".into())));
        assert!(!r.passes(&rec(12.into(), "ann".into())));
        assert!(!r.passes(&rec(20.into(), RawValue::Null)));
    }

    #[test]
    fn double_equals_and_text_numbers() {
        let r = Rule::parse("age == 20", &fields()).unwrap();
        assert!(r.passes(&rec("20".into(), RawValue::Null)));
        assert!(r.passes(&rec(20.0.into(), RawValue::Null)));
        assert!(!r.passes(&rec(RawValue::Null, RawValue::Null)));
    }

    #[test]
    fn in_like_not() {
        let r = Rule::parse("name IN ('ann', 'bob') OR NOT (name LIKE 'x%')", &fields()).unwrap();
        assert!(r.passes(&rec(RawValue::Null, "bob".into())));
        assert!(r.passes(&rec(RawValue::Null, "carl".into())));
        assert!(!r.passes(&rec(RawValue::Null, "xavier".into())));
    }

    #[test]
    fn like_wildcards() {
        let p = like_regex("a_c%").unwrap();
        assert!(p.is_match("abcdef"));
        assert!(p.is_match("abc"));
        assert!(!p.is_match("ac"));
        assert!(!p.is_match("xabc"));
        assert!(like_regex("ż_%").unwrap().is_match("żółw"));
        assert!(like_regex("a.c").unwrap().is_match("a.c"));
        assert!(!like_regex("a.c").unwrap().is_match("abc"));
        assert!(like_regex("%").unwrap().is_match("line\nbreak"));
    }

    #[test]
    fn like_with_many_wildcards_stays_linear() {
        let p = like_regex("%a%a%a%a%a%a%a%b").unwrap();
        let subject = "a".repeat(30);
        let start = std::time::Instant::now();
        assert!(!p.is_match(&subject));
        assert!(p.is_match(&format!("{subject}b")));
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn unknown_field_and_bad_syntax_are_errors() {
        assert!(matches!(Rule::parse("height > 3", &fields()), Err(FieldProfilerError::Rule(_))));
        assert!(matches!(Rule::parse("age >", &fields()), Err(FieldProfilerError::Rule(_))));
        assert!(matches!(Rule::parse("age > 3 extra", &fields()), Err(FieldProfilerError::Rule(_))));
    }

    #[test]
    fn tally_counts_failures() {
        let rule = Rule::parse("age < 100", &fields()).unwrap();
        let mut t = RuleTally::new(rule, 1);
        t.check(&Record::new(0, vec![5.into(), RawValue::Null]));
        t.check(&Record::new(1, vec![500.into(), RawValue::Null]));
        t.check(&Record::new(2, vec![RawValue::Null, RawValue::Null]));
        let o = t.finish();
        assert_eq!(o.total_checked, 3);
        assert_eq!(o.fail_count, 2);
        assert_eq!(o.failed_ids, vec![RecordId(1)]);
        assert!(o.ids_truncated);
    }

    #[test]
    fn op_from_str() {
        assert_eq!("==".parse::<CmpOp>().unwrap(), CmpOp::Eq);
        assert_eq!("<>".parse::<CmpOp>().unwrap(), CmpOp::Ne);
        assert!("~".parse::<CmpOp>().is_err());
    }
}
