//! 内置的校验表达式求值器
//!
//! 支持的语法：
//! - 字面量：数字、单/双引号字符串、`true`、`false`、`null`
//! - 路径：以 `document` 或 `config` 开头的点分路径，数组下标写作数字段，缺失的路径为 `null`
//! - 运算符：`== != < <= > >=`、`&&`、`||`、`!`、`in [..]`，以及括号

use serde_json::{Number, Value};

use hookcast_core::{ExpressionEvaluator, HookcastError, HookcastResult};

/// `!` 和括号的最大嵌套层数
const MAX_NESTING: usize = 64;
/// 单个表达式的最大词法单元数，限制 `&&`/`||` 链的深度
const MAX_TOKENS: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

#[derive(Debug, Clone, PartialEq)]
enum Root {
    Document,
    Config,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path(Root, Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(&'static str, Box<Expr>, Box<Expr>),
    In(Box<Expr>, Vec<Expr>),
}

fn syntax_error(expression: &str, message: impl std::fmt::Display) -> HookcastError {
    HookcastError::Expression(format!("{message}: {expression}"))
}

fn tokenize(input: &str) -> HookcastResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(syntax_error(input, "字符串未闭合")),
                        Some('\\') => {
                            let Some(escaped) = chars.get(i + 1) else {
                                return Err(syntax_error(input, "字符串未闭合"));
                            };
                            text.push(*escaped);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                // 小数点后必须跟数字，否则是路径分隔符
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| syntax_error(input, format!("无效的数字 {text}")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let op = match (c, next) {
                    ('=', Some('=')) => "==",
                    ('!', Some('=')) => "!=",
                    ('<', Some('=')) => "<=",
                    ('>', Some('=')) => ">=",
                    ('&', Some('&')) => "&&",
                    ('|', Some('|')) => "||",
                    ('<', _) => "<",
                    ('>', _) => ">",
                    ('!', _) => "!",
                    _ => return Err(syntax_error(input, format!("无法识别的字符 '{c}'"))),
                };
                i += op.len();
                tokens.push(Token::Op(op));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            input,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn descend(&mut self) -> HookcastResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(syntax_error(self.input, format!("嵌套超过 {MAX_NESTING} 层")));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> HookcastResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(syntax_error(
                self.input,
                format!("期望 {expected:?}，实际为 {other:?}"),
            )),
        }
    }

    fn parse(mut self) -> HookcastResult<Expr> {
        let expr = self.parse_or()?;
        if let Some(token) = self.peek() {
            return Err(syntax_error(self.input, format!("多余的内容 {token:?}")));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> HookcastResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_op("||") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> HookcastResult<Expr> {
        let mut left = self.parse_unary()?;
        while self.eat_op("&&") {
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> HookcastResult<Expr> {
        if self.eat_op("!") {
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> HookcastResult<Expr> {
        let left = self.parse_primary()?;

        if matches!(self.peek(), Some(Token::Ident(word)) if word == "in") {
            self.pos += 1;
            self.expect(Token::LBracket)?;
            let mut items = Vec::new();
            if !matches!(self.peek(), Some(Token::RBracket)) {
                loop {
                    items.push(self.parse_primary()?);
                    if matches!(self.peek(), Some(Token::Comma)) {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
            }
            self.expect(Token::RBracket)?;
            return Ok(Expr::In(Box::new(left), items));
        }

        for op in ["==", "!=", "<=", ">=", "<", ">"] {
            if self.eat_op(op) {
                let right = self.parse_primary()?;
                return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
            }
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> HookcastResult<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::LParen) => {
                self.descend()?;
                let expr = self.parse_or()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(expr)
            }
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "document" => self.parse_path(Root::Document),
                "config" => self.parse_path(Root::Config),
                other => Err(syntax_error(self.input, format!("未知的标识符 {other}"))),
            },
            other => Err(syntax_error(self.input, format!("意外的内容 {other:?}"))),
        }
    }

    fn parse_path(&mut self, root: Root) -> HookcastResult<Expr> {
        let mut segments = Vec::new();
        while matches!(self.peek(), Some(Token::Dot)) {
            self.pos += 1;
            match self.next() {
                Some(Token::Ident(name)) => segments.push(name),
                Some(Token::Number(n)) if n >= 0.0 && n.fract() == 0.0 => {
                    segments.push(format!("{}", n as u64))
                }
                other => {
                    return Err(syntax_error(self.input, format!("无效的路径段 {other:?}")));
                }
            }
        }
        Ok(Expr::Path(root, segments))
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn lookup<'v>(root: &'v Value, segments: &[String]) -> Option<&'v Value> {
    segments.iter().try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

struct Context<'v> {
    expression: &'v str,
    document: &'v Value,
    config: &'v Value,
}

impl Context<'_> {
    fn eval(&self, expr: &Expr) -> HookcastResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path(root, segments) => {
                let base = match root {
                    Root::Document => self.document,
                    Root::Config => self.config,
                };
                Ok(lookup(base, segments).cloned().unwrap_or(Value::Null))
            }
            Expr::Not(inner) => Ok(Value::Bool(!self.eval_bool(inner)?)),
            Expr::And(left, right) => Ok(Value::Bool(self.eval_bool(left)? && self.eval_bool(right)?)),
            Expr::Or(left, right) => Ok(Value::Bool(self.eval_bool(left)? || self.eval_bool(right)?)),
            Expr::Compare(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.compare(op, &left, &right).map(Value::Bool)
            }
            Expr::In(needle, items) => {
                let needle = self.eval(needle)?;
                for item in items {
                    if values_equal(&needle, &self.eval(item)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
        }
    }

    fn eval_bool(&self, expr: &Expr) -> HookcastResult<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(syntax_error(
                self.expression,
                format!("期望布尔值，实际为 {other}"),
            )),
        }
    }

    fn compare(&self, op: &str, left: &Value, right: &Value) -> HookcastResult<bool> {
        match op {
            "==" => return Ok(values_equal(left, right)),
            "!=" => return Ok(!values_equal(left, right)),
            _ => {}
        }

        let ordering = match (left, right) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .zip(y.as_f64())
                .and_then(|(x, y)| x.partial_cmp(&y)),
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            _ => None,
        };
        let Some(ordering) = ordering else {
            return Err(syntax_error(
                self.expression,
                format!("无法比较 {left} {op} {right}"),
            ));
        };

        Ok(match op {
            "<" => ordering.is_lt(),
            "<=" => ordering.is_le(),
            ">" => ordering.is_gt(),
            _ => ordering.is_ge(),
        })
    }
}

/// 内置表达式求值器，求值从不 panic，语法或类型错误一律返回错误
#[derive(Debug, Default, Clone)]
pub struct SimpleExpressionEvaluator;

impl SimpleExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionEvaluator for SimpleExpressionEvaluator {
    fn evaluate(&self, expression: &str, document: &Value, config: &Value) -> HookcastResult<bool> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Err(syntax_error(expression, "表达式为空"));
        }
        if tokens.len() > MAX_TOKENS {
            return Err(syntax_error(expression, format!("表达式超过 {MAX_TOKENS} 个词法单元")));
        }
        let ast = Parser::new(expression, tokens).parse()?;
        Context {
            expression,
            document,
            config,
        }
        .eval_bool(&ast)
    }
}
