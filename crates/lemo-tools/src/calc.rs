//! Calculator tool for agents
//!
//! Expressions are tokenized and evaluated by a small recursive-descent parser
//! over a fixed grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('^' unary)?
//! primary := number | constant | function '(' expr (',' expr)* ')' | '(' expr ')'
//! ```

use crate::base::{AiTool, required_str};
use anyhow::{Error, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Calculator over basic arithmetic and a fixed set of math functions
pub struct MathTool;

#[async_trait]
impl AiTool for MathTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "执行数学计算。支持加减乘除、取余、幂运算(^)、括号，以及 abs/round/sqrt/pow/sin/cos/tan/log/log10/exp 函数和常量 pi、e。输入：数学表达式，例如 2+2*3 或 sqrt(16)"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The mathematical expression to evaluate"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, Error> {
        self.validate_params(&params)?;
        let expression = required_str(&params, "expression")?;

        let result = evaluate_expression(expression)?;
        debug!("Evaluated {:?} = {}", expression, result);

        serde_json::Number::from_f64(result)
            .map(Value::Number)
            .ok_or_else(|| anyhow!("Result is not a finite number"))
    }

    fn validate_params(&self, params: &Value) -> Result<(), Error> {
        if !params.is_object() {
            return Err(anyhow!("Parameters must be an object"));
        }

        if !params.get("expression").is_some_and(|v| v.is_string()) {
            return Err(anyhow!("Missing or invalid 'expression' parameter"));
        }

        Ok(())
    }

    fn primary_param(&self) -> &str {
        "expression"
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, Error> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| anyhow!("Invalid number: {}", literal))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(ident.to_ascii_lowercase()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Caret);
                i += 2;
            }
            _ => {
                let token = match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' | '×' => Token::Star,
                    '/' | '÷' => Token::Slash,
                    '%' => Token::Percent,
                    '^' => Token::Caret,
                    '(' | '（' => Token::LParen,
                    ')' | '）' => Token::RParen,
                    ',' | '，' => Token::Comma,
                    other => bail!("Unexpected character: '{}'", other),
                };
                tokens.push(token);
                i += 1;
            }
        }
    }

    Ok(tokens)
}

const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn descend(&mut self) -> Result<(), Error> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            bail!("Expression nested too deeply");
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

    fn expect(&mut self, expected: Token) -> Result<(), Error> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => bail!("Expected {:?}, found {:?}", expected, token),
            None => bail!("Expected {:?}, found end of expression", expected),
        }
    }

    fn expr(&mut self) -> Result<f64, Error> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, Error> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        bail!("Division by zero");
                    }
                    value /= divisor;
                }
                Some(Token::Percent) => {
                    self.pos += 1;
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        bail!("Division by zero");
                    }
                    value %= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, Error> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.descend()?;
                let value = -self.unary()?;
                self.depth -= 1;
                Ok(value)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.descend()?;
                let value = self.unary()?;
                self.depth -= 1;
                Ok(value)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, Error> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            self.descend()?;
            let exponent = self.unary()?;
            self.depth -= 1;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, Error> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                self.descend()?;
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    self.descend()?;
                    let args = self.arguments()?;
                    self.depth -= 1;
                    apply_function(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(token) => bail!("Unexpected token: {:?}", token),
            None => bail!("Unexpected end of expression"),
        }
    }

    fn arguments(&mut self) -> Result<Vec<f64>, Error> {
        let mut args = vec![self.expr()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            args.push(self.expr()?);
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }
}

fn constant(name: &str) -> Result<f64, Error> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        other => bail!("Unknown identifier: {}", other),
    }
}

fn apply_function(name: &str, args: &[f64]) -> Result<f64, Error> {
    let unary = |f: fn(f64) -> f64| -> Result<f64, Error> {
        match args {
            [x] => Ok(f(*x)),
            _ => bail!("{}() takes 1 argument, got {}", name, args.len()),
        }
    };

    match name {
        "abs" => unary(f64::abs),
        "round" => unary(f64::round),
        "sqrt" => unary(f64::sqrt),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "log10" => unary(f64::log10),
        "exp" => unary(f64::exp),
        "log" => match args {
            [x] => Ok(x.ln()),
            [x, base] => Ok(x.log(*base)),
            _ => bail!("log() takes 1 or 2 arguments, got {}", args.len()),
        },
        "pow" => match args {
            [x, y] => Ok(x.powf(*y)),
            _ => bail!("pow() takes 2 arguments, got {}", args.len()),
        },
        other => bail!("Unknown identifier: {}", other),
    }
}

/// Evaluate an arithmetic expression
pub fn evaluate_expression(expr: &str) -> Result<f64, Error> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        bail!("Empty expression");
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;

    if let Some(token) = parser.peek() {
        bail!("Unexpected trailing input: {:?}", token);
    }
    if !value.is_finite() {
        bail!("Result is not a finite number");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: &str) -> f64 {
        evaluate_expression(expr).unwrap()
    }

    #[test]
    fn test_evaluate_expression() {
        assert_eq!(eval("2 + 3"), 5.0);
        assert_eq!(eval("2 - 3"), -1.0);
        assert_eq!(eval("2 * 3"), 6.0);
        assert_eq!(eval("6 / 3"), 2.0);
        assert_eq!(eval("2 + 3 * 4"), 14.0);
        assert_eq!(eval("(2 + 3) * 4"), 20.0);
        assert_eq!(eval("10 % 4"), 2.0);
        assert_eq!(
            evaluate_expression("6 / 0").unwrap_err().to_string(),
            "Division by zero"
        );
    }

    #[test]
    fn test_power_and_unary() {
        assert_eq!(eval("2 ^ 10"), 1024.0);
        assert_eq!(eval("2 ** 3"), 8.0);
        assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("-(3 - 5)"), 2.0);
        assert_eq!(eval("--4"), 4.0);
        assert_eq!(eval("2 ^ -1"), 0.5);
    }

    #[test]
    fn test_functions_and_constants() {
        assert_eq!(eval("sqrt(16)"), 4.0);
        assert_eq!(eval("abs(-7.5)"), 7.5);
        assert_eq!(eval("round(2.6)"), 3.0);
        assert_eq!(eval("pow(2, 5)"), 32.0);
        assert!((eval("log10(1000)") - 3.0).abs() < 1e-12);
        assert!((eval("log(e)") - 1.0).abs() < 1e-12);
        assert!((eval("log(8, 2)") - 3.0).abs() < 1e-12);
        assert!((eval("sin(pi / 2)") - 1.0).abs() < 1e-12);
        assert!((eval("cos(0) + exp(0)") - 2.0).abs() < 1e-12);
        assert!((eval("tan(0)")).abs() < 1e-12);
        assert_eq!(eval("SQRT(9)"), 3.0);
    }

    #[test]
    fn test_fullwidth_operators() {
        assert_eq!(eval("（1+2）×3"), 9.0);
        assert_eq!(eval("8÷2"), 4.0);
    }

    #[test]
    fn test_rejected_inputs() {
        for expr in [
            "",
            "2 + + ",
            "(1 + 2",
            "1 + 2)",
            "2 3",
            "foo(1)",
            "x + 1",
            "__import__('os')",
            "pow(2)",
            "sqrt(-1)",
            "5 % 0",
            "1..2",
        ] {
            assert!(evaluate_expression(expr).is_err(), "accepted {:?}", expr);
        }
        assert!(
            evaluate_expression("abc")
                .unwrap_err()
                .to_string()
                .contains("Unknown identifier")
        );
        assert!(
            evaluate_expression("1 2")
                .unwrap_err()
                .to_string()
                .contains("trailing")
        );
    }

    #[test]
    fn test_nesting_limit() {
        assert_eq!(eval(&format!("{}1{}", "(".repeat(60), ")".repeat(60))), 1.0);
        assert_eq!(eval(&format!("{}5", "-".repeat(60))), 5.0);

        let parens = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(
            evaluate_expression(&parens)
                .unwrap_err()
                .to_string()
                .contains("nested too deeply")
        );
        assert!(evaluate_expression(&format!("{}1", "-".repeat(10_000))).is_err());
        assert!(evaluate_expression(&format!("{}1", "1^".repeat(10_000))).is_err());
        assert!(evaluate_expression(&format!("{}1{}", "abs(".repeat(10_000), ")".repeat(10_000))).is_err());
    }

    #[tokio::test]
    async fn test_nested_input_through_tool() {
        let expression = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
        assert!(MathTool.execute(json!({ "expression": expression })).await.is_err());
    }

    #[tokio::test]
    async fn test_math_tool() {
        let tool = MathTool;

        let result = tool.execute(json!({"expression": "2 + 3 * 4"})).await.unwrap();
        assert_eq!(result.as_f64().unwrap(), 14.0);

        let result = tool.execute(json!({"expression": "3.14 * 2"})).await.unwrap();
        assert!((result.as_f64().unwrap() - 6.28).abs() < 0.001);

        assert!(tool.execute(json!({"expression": "5 / 0"})).await.is_err());
        assert!(tool.execute(json!({})).await.is_err());
        assert!(tool.execute(json!({"expression": 123})).await.is_err());
    }

    #[test]
    fn test_tool_metadata() {
        let tool = MathTool;

        assert_eq!(tool.name(), "calculator");
        assert_eq!(tool.primary_param(), "expression");

        let schema = tool.schema();
        assert!(schema["type"].as_str() == Some("object"));
        assert!(schema["required"].as_array().unwrap().contains(&json!("expression")));
    }
}
