//! Control-flow evaluator: a small recursive-descent
//! expression/statement interpreter over an agent's `on input` block.
//! Deterministic, side-effect free over its bindings — missing keys
//! evaluate to the empty string rather than raising, per spec.

use std::collections::HashMap;

use as_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Values
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
        }
    }

    fn as_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Value::String(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::as_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::String(s) => s.parse().unwrap_or(0.0),
            Value::Bool(b) => if *b { 1.0 } else { 0.0 },
            _ => 0.0,
        }
    }
}

/// Bindings available to an expression: `input`, `config[name]`,
/// `steps[name]`, and whatever loop variables the enclosing `for_each`
/// statements have introduced.
#[derive(Debug, Clone, Default)]
pub struct Env {
    pub input: Value,
    pub config: HashMap<String, Value>,
    pub steps: HashMap<String, Value>,
    pub locals: HashMap<String, Value>,
}

impl Env {
    fn lookup(&self, name: &str) -> Value {
        match name {
            "input" => self.input.clone(),
            _ => self
                .locals
                .get(name)
                .cloned()
                .unwrap_or(Value::Null),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Expressions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    List(Vec<Expr>),
    Ident(String),
    /// `config[name]` / `steps[name]` — a namespaced lookup, kept distinct
    /// from general indexing so missing keys resolve to the empty string
    /// without needing the base collection to exist.
    Namespaced(String, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    And,
    Or,
}

pub fn eval(expr: &Expr, env: &Env) -> Value {
    match expr {
        Expr::Lit(v) => v.clone(),
        Expr::List(items) => Value::List(items.iter().map(|e| eval(e, env)).collect()),
        Expr::Ident(name) => env.lookup(name),
        Expr::Namespaced(ns, key) => {
            let key = eval(key, env).as_string();
            let map = match ns.as_str() {
                "config" => &env.config,
                "steps" => &env.steps,
                _ => return Value::String(String::new()),
            };
            map.get(&key).cloned().unwrap_or(Value::String(String::new()))
        }
        Expr::Index(base, idx) => {
            let base = eval(base, env);
            let idx = eval(idx, env);
            match base {
                Value::List(items) => {
                    let i = idx.as_number() as i64;
                    if i >= 0 {
                        items.get(i as usize).cloned().unwrap_or(Value::String(String::new()))
                    } else {
                        Value::String(String::new())
                    }
                }
                _ => Value::String(String::new()),
            }
        }
        Expr::Not(e) => Value::Bool(!eval(e, env).truthy()),
        Expr::Neg(e) => Value::Number(-eval(e, env).as_number()),
        Expr::Binary(op, l, r) => {
            let lv = eval(l, env);
            let rv = eval(r, env);
            match op {
                BinOp::And => Value::Bool(lv.truthy() && rv.truthy()),
                BinOp::Or => Value::Bool(lv.truthy() || rv.truthy()),
                BinOp::Eq => Value::Bool(values_equal(&lv, &rv)),
                BinOp::Ne => Value::Bool(!values_equal(&lv, &rv)),
                BinOp::Lt => Value::Bool(lv.as_number() < rv.as_number()),
                BinOp::Gt => Value::Bool(lv.as_number() > rv.as_number()),
                BinOp::Le => Value::Bool(lv.as_number() <= rv.as_number()),
                BinOp::Ge => Value::Bool(lv.as_number() >= rv.as_number()),
                BinOp::Add => {
                    if let (Value::String(_), _) | (_, Value::String(_)) = (&lv, &rv) {
                        if matches!(lv, Value::Number(_)) && matches!(rv, Value::Number(_)) {
                            Value::Number(lv.as_number() + rv.as_number())
                        } else {
                            Value::String(format!("{}{}", lv.as_string(), rv.as_string()))
                        }
                    } else {
                        Value::Number(lv.as_number() + rv.as_number())
                    }
                }
                BinOp::Sub => Value::Number(lv.as_number() - rv.as_number()),
            }
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), _) | (_, Value::Number(_)) => a.as_number() == b.as_number(),
        _ => a.as_string() == b.as_string(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Statements / Actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub enum Stmt {
    UseSkill { skill_name: String, args: Expr },
    Delegate { agent_name: String, input: Expr },
    Respond { output: Expr },
    If { branches: Vec<(Expr, Vec<Stmt>)>, else_branch: Option<Vec<Stmt>> },
    ForEach { var: String, iterable: Expr, body: Vec<Stmt> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionType {
    UseSkill,
    Delegate,
    Respond,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub action_type: ActionType,
    pub skill_name: Option<String>,
    pub agent_name: Option<String>,
    pub output: Option<String>,
}

/// Runs a block of statements against `env`, returning the actions
/// produced in order. A `respond` statement sets the running output and
/// short-circuits the remaining statements in its block (but not outer
/// blocks — callers should stop at the first `Respond` action if that is
/// the terminal semantics they want).
pub fn run(stmts: &[Stmt], env: &mut Env) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    for stmt in stmts {
        run_one(stmt, env, &mut actions)?;
        if actions.last().map(|a| a.action_type == ActionType::Respond).unwrap_or(false) {
            break;
        }
    }
    Ok(actions)
}

fn run_one(stmt: &Stmt, env: &mut Env, actions: &mut Vec<Action>) -> Result<()> {
    match stmt {
        Stmt::UseSkill { skill_name, args } => {
            let rendered = eval(args, env).as_string();
            actions.push(Action {
                action_type: ActionType::UseSkill,
                skill_name: Some(skill_name.clone()),
                agent_name: None,
                output: Some(rendered),
            });
        }
        Stmt::Delegate { agent_name, input } => {
            let rendered = eval(input, env).as_string();
            actions.push(Action {
                action_type: ActionType::Delegate,
                skill_name: None,
                agent_name: Some(agent_name.clone()),
                output: Some(rendered),
            });
        }
        Stmt::Respond { output } => {
            actions.push(Action {
                action_type: ActionType::Respond,
                skill_name: None,
                agent_name: None,
                output: Some(eval(output, env).as_string()),
            });
        }
        Stmt::If { branches, else_branch } => {
            for (cond, body) in branches {
                if eval(cond, env).truthy() {
                    actions.extend(run(body, env)?);
                    return Ok(());
                }
            }
            if let Some(body) = else_branch {
                actions.extend(run(body, env)?);
            }
        }
        Stmt::ForEach { var, iterable, body } => {
            let items = match eval(iterable, env) {
                Value::List(items) => items,
                other => vec![other],
            };
            for item in items {
                env.locals.insert(var.clone(), item);
                actions.extend(run(body, env)?);
                if actions.last().map(|a| a.action_type == ActionType::Respond).unwrap_or(false) {
                    break;
                }
            }
            env.locals.remove(var);
        }
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Expression parser (recursive descent, precedence climbing)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn parse_expr(src: &str) -> Result<Expr> {
    let tokens = tokenize(src)?;
    let mut pos = 0;
    let expr = parse_or(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(Error::InvalidInput(format!("unexpected trailing input in expression: {src}")));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    Sym(String),
}

fn tokenize(src: &str) -> Result<Vec<Tok>> {
    let mut out = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            let mut s = String::new();
            i += 1;
            while i < chars.len() && chars[i] != quote {
                s.push(chars[i]);
                i += 1;
            }
            if i >= chars.len() {
                return Err(Error::InvalidInput(format!("unterminated string literal: {src}")));
            }
            i += 1;
            out.push(Tok::Str(s));
            continue;
        }
        if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) && matches!(out.last(), None | Some(Tok::Sym(_)))) {
            let start = i;
            if c == '-' {
                i += 1;
            }
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let n: f64 = chars[start..i].iter().collect::<String>().parse().map_err(|_| {
                Error::InvalidInput(format!("invalid number literal: {src}"))
            })?;
            out.push(Tok::Num(n));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            out.push(Tok::Ident(word));
            continue;
        }
        // Multi-char operators first.
        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        if ["==", "!=", "<=", ">=", "&&", "||"].contains(&two.as_str()) {
            out.push(Tok::Sym(two));
            i += 2;
            continue;
        }
        if "+-<>!()[],".contains(c) {
            out.push(Tok::Sym(c.to_string()));
            i += 1;
            continue;
        }
        return Err(Error::InvalidInput(format!("unexpected character '{c}' in expression: {src}")));
    }
    Ok(out)
}

fn peek_sym(tokens: &[Tok], pos: usize, sym: &str) -> bool {
    matches!(tokens.get(pos), Some(Tok::Sym(s)) if s == sym)
}

fn parse_or(tokens: &[Tok], pos: &mut usize) -> Result<Expr> {
    let mut lhs = parse_and(tokens, pos)?;
    while peek_sym(tokens, *pos, "||") {
        *pos += 1;
        let rhs = parse_and(tokens, pos)?;
        lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_and(tokens: &[Tok], pos: &mut usize) -> Result<Expr> {
    let mut lhs = parse_cmp(tokens, pos)?;
    while peek_sym(tokens, *pos, "&&") {
        *pos += 1;
        let rhs = parse_cmp(tokens, pos)?;
        lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_cmp(tokens: &[Tok], pos: &mut usize) -> Result<Expr> {
    let lhs = parse_add(tokens, pos)?;
    let op = match tokens.get(*pos) {
        Some(Tok::Sym(s)) if s == "==" => Some(BinOp::Eq),
        Some(Tok::Sym(s)) if s == "!=" => Some(BinOp::Ne),
        Some(Tok::Sym(s)) if s == "<=" => Some(BinOp::Le),
        Some(Tok::Sym(s)) if s == ">=" => Some(BinOp::Ge),
        Some(Tok::Sym(s)) if s == "<" => Some(BinOp::Lt),
        Some(Tok::Sym(s)) if s == ">" => Some(BinOp::Gt),
        _ => None,
    };
    if let Some(op) = op {
        *pos += 1;
        let rhs = parse_add(tokens, pos)?;
        return Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
    }
    Ok(lhs)
}

fn parse_add(tokens: &[Tok], pos: &mut usize) -> Result<Expr> {
    let mut lhs = parse_unary(tokens, pos)?;
    loop {
        let op = match tokens.get(*pos) {
            Some(Tok::Sym(s)) if s == "+" => Some(BinOp::Add),
            Some(Tok::Sym(s)) if s == "-" => Some(BinOp::Sub),
            _ => None,
        };
        let Some(op) = op else { break };
        *pos += 1;
        let rhs = parse_unary(tokens, pos)?;
        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_unary(tokens: &[Tok], pos: &mut usize) -> Result<Expr> {
    if peek_sym(tokens, *pos, "!") {
        *pos += 1;
        return Ok(Expr::Not(Box::new(parse_unary(tokens, pos)?)));
    }
    parse_postfix(tokens, pos)
}

fn parse_postfix(tokens: &[Tok], pos: &mut usize) -> Result<Expr> {
    let mut expr = parse_primary(tokens, pos)?;
    while peek_sym(tokens, *pos, "[") {
        *pos += 1;
        let idx = parse_or(tokens, pos)?;
        if !peek_sym(tokens, *pos, "]") {
            return Err(Error::InvalidInput("expected ']'".into()));
        }
        *pos += 1;
        expr = match &expr {
            Expr::Ident(name) if name == "config" || name == "steps" => {
                Expr::Namespaced(name.clone(), Box::new(idx))
            }
            _ => Expr::Index(Box::new(expr), Box::new(idx)),
        };
    }
    Ok(expr)
}

fn parse_primary(tokens: &[Tok], pos: &mut usize) -> Result<Expr> {
    match tokens.get(*pos) {
        Some(Tok::Num(n)) => {
            *pos += 1;
            Ok(Expr::Lit(Value::Number(*n)))
        }
        Some(Tok::Str(s)) => {
            *pos += 1;
            Ok(Expr::Lit(Value::String(s.clone())))
        }
        Some(Tok::Ident(w)) if w == "true" => {
            *pos += 1;
            Ok(Expr::Lit(Value::Bool(true)))
        }
        Some(Tok::Ident(w)) if w == "false" => {
            *pos += 1;
            Ok(Expr::Lit(Value::Bool(false)))
        }
        Some(Tok::Ident(w)) => {
            *pos += 1;
            Ok(Expr::Ident(w.clone()))
        }
        Some(Tok::Sym(s)) if s == "(" => {
            *pos += 1;
            let e = parse_or(tokens, pos)?;
            if !peek_sym(tokens, *pos, ")") {
                return Err(Error::InvalidInput("expected ')'".into()));
            }
            *pos += 1;
            Ok(e)
        }
        Some(Tok::Sym(s)) if s == "[" => {
            *pos += 1;
            let mut items = Vec::new();
            if !peek_sym(tokens, *pos, "]") {
                items.push(parse_or(tokens, pos)?);
                while peek_sym(tokens, *pos, ",") {
                    *pos += 1;
                    items.push(parse_or(tokens, pos)?);
                }
            }
            if !peek_sym(tokens, *pos, "]") {
                return Err(Error::InvalidInput("expected ']'".into()));
            }
            *pos += 1;
            Ok(Expr::List(items))
        }
        other => Err(Error::InvalidInput(format!("unexpected token in expression: {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_input(s: &str) -> Env {
        Env { input: Value::String(s.to_string()), ..Default::default() }
    }

    #[test]
    fn literals_and_identifiers() {
        let env = env_with_input("hello");
        assert_eq!(eval(&parse_expr("input").unwrap(), &env), Value::String("hello".into()));
        assert_eq!(eval(&parse_expr("42").unwrap(), &env), Value::Number(42.0));
        assert_eq!(eval(&parse_expr("true").unwrap(), &env), Value::Bool(true));
    }

    #[test]
    fn comparisons_and_logic() {
        let env = Env::default();
        assert_eq!(eval(&parse_expr("1 == 1").unwrap(), &env), Value::Bool(true));
        assert_eq!(eval(&parse_expr("1 != 2 && 2 < 3").unwrap(), &env), Value::Bool(true));
        assert_eq!(eval(&parse_expr("1 > 2 || 3 >= 3").unwrap(), &env), Value::Bool(true));
    }

    #[test]
    fn missing_config_key_is_empty_string_not_error() {
        let env = Env::default();
        assert_eq!(eval(&parse_expr("config[\"missing\"]").unwrap(), &env), Value::String(String::new()));
    }

    #[test]
    fn list_literal_and_indexing() {
        let env = Env::default();
        let v = eval(&parse_expr("[1, 2, 3][1]").unwrap(), &env);
        assert_eq!(v, Value::Number(2.0));
    }

    #[test]
    fn negation_and_string_concat() {
        let env = Env::default();
        assert_eq!(eval(&parse_expr("!false").unwrap(), &env), Value::Bool(true));
        assert_eq!(eval(&parse_expr("\"a\" + \"b\"").unwrap(), &env), Value::String("ab".into()));
    }

    #[test]
    fn if_elif_else_picks_first_matching_branch() {
        let mut env = env_with_input("b");
        let stmts = vec![Stmt::If {
            branches: vec![
                (parse_expr("input == \"a\"").unwrap(), vec![Stmt::Respond { output: Expr::Lit(Value::String("A".into())) }]),
                (parse_expr("input == \"b\"").unwrap(), vec![Stmt::Respond { output: Expr::Lit(Value::String("B".into())) }]),
            ],
            else_branch: Some(vec![Stmt::Respond { output: Expr::Lit(Value::String("ELSE".into())) }]),
        }];
        let actions = run(&stmts, &mut env).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].output.as_deref(), Some("B"));
    }

    #[test]
    fn for_each_iterates_list_literal() {
        let mut env = Env::default();
        let stmts = vec![Stmt::ForEach {
            var: "x".into(),
            iterable: parse_expr("[1, 2, 3]").unwrap(),
            body: vec![Stmt::UseSkill { skill_name: "noop".into(), args: Expr::Ident("x".into()) }],
        }];
        let actions = run(&stmts, &mut env).unwrap();
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[2].output.as_deref(), Some("3"));
    }

    #[test]
    fn delegate_and_use_skill_produce_typed_actions() {
        let mut env = env_with_input("hi");
        let stmts = vec![
            Stmt::UseSkill { skill_name: "search".into(), args: Expr::Ident("input".into()) },
            Stmt::Delegate { agent_name: "billing".into(), input: Expr::Ident("input".into()) },
        ];
        let actions = run(&stmts, &mut env).unwrap();
        assert_eq!(actions[0].action_type, ActionType::UseSkill);
        assert_eq!(actions[0].skill_name.as_deref(), Some("search"));
        assert_eq!(actions[1].action_type, ActionType::Delegate);
        assert_eq!(actions[1].agent_name.as_deref(), Some("billing"));
    }
}
