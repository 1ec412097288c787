//! Equation expressions over a single variable `x`

use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Log,
    Sqrt,
    Abs,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "exp" => Func::Exp,
            "ln" => Func::Ln,
            "log" => Func::Log,
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            _ => return None,
        })
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Func::Sin => v.sin(),
            Func::Cos => v.cos(),
            Func::Tan => v.tan(),
            Func::Exp => v.exp(),
            Func::Ln => v.ln(),
            Func::Log => v.log10(),
            Func::Sqrt => v.sqrt(),
            Func::Abs => v.abs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Num(f64),
    X,
    Neg(Box<Node>),
    Add(Box<Node>, Box<Node>),
    Sub(Box<Node>, Box<Node>),
    Mul(Box<Node>, Box<Node>),
    Div(Box<Node>, Box<Node>),
    Pow(Box<Node>, Box<Node>),
    Call(Func, Box<Node>),
}

impl Node {
    fn eval(&self, x: f64) -> f64 {
        match self {
            Node::Num(v) => *v,
            Node::X => x,
            Node::Neg(a) => -a.eval(x),
            Node::Add(a, b) => a.eval(x) + b.eval(x),
            Node::Sub(a, b) => a.eval(x) - b.eval(x),
            Node::Mul(a, b) => a.eval(x) * b.eval(x),
            Node::Div(a, b) => a.eval(x) / b.eval(x),
            Node::Pow(a, b) => a.eval(x).powf(b.eval(x)),
            Node::Call(f, a) => f.apply(a.eval(x)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<Chars<'_>> = text.chars().peekable();
    let mut depth = 0i32;

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    let exponent_sign =
                        (d == '-' || d == '+') && literal.ends_with(['e', 'E']);
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal
                    .parse()
                    .map_err(|_| format!("bad number '{literal}'"))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                depth += 1;
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err("unbalanced ')'".to_string());
                }
                tokens.push(Token::Close);
                chars.next();
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    if depth != 0 {
        return Err("unbalanced '('".to_string());
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Node, String> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = if op == '+' {
                Node::Add(Box::new(lhs), Box::new(rhs))
            } else {
                Node::Sub(Box::new(lhs), Box::new(rhs))
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Node, String> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = if op == '*' {
                Node::Mul(Box::new(lhs), Box::new(rhs))
            } else {
                Node::Div(Box::new(lhs), Box::new(rhs))
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node, String> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(Node::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Node, String> {
        let base = self.atom()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Node::Pow(Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Node, String> {
        match self.bump() {
            Some(Token::Num(v)) => Ok(Node::Num(v)),
            Some(Token::Ident(name)) => match name.as_str() {
                "x" => Ok(Node::X),
                "pi" => Ok(Node::Num(std::f64::consts::PI)),
                "e" => Ok(Node::Num(std::f64::consts::E)),
                _ => {
                    let func =
                        Func::lookup(&name).ok_or_else(|| format!("unknown name '{name}'"))?;
                    if self.bump() != Some(Token::Open) {
                        return Err(format!("expected '(' after '{name}'"));
                    }
                    let arg = self.expr()?;
                    if self.bump() != Some(Token::Close) {
                        return Err(format!("expected ')' to close '{name}('"));
                    }
                    Ok(Node::Call(func, Box::new(arg)))
                }
            },
            Some(Token::Open) => {
                let inner = self.expr()?;
                if self.bump() != Some(Token::Close) {
                    return Err("expected ')'".to_string());
                }
                Ok(inner)
            }
            Some(Token::Op(op)) => Err(format!("unexpected operator '{op}'")),
            Some(Token::Close) => Err("unexpected ')'".to_string()),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

/// A parsed equation such as `sin(x)^2 + 0.5*x`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Expression {
    root: Node,
}

impl Expression {
    pub fn parse(text: &str) -> Result<Self, String> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err("empty equation".to_string());
        }
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expr()?;
        if let Some(token) = parser.peek() {
            return Err(format!("trailing input at {token:?}"));
        }
        Ok(Self { root })
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.root.eval(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str, x: f64) -> f64 {
        Expression::parse(text).unwrap().eval(x)
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3", 0.0), 7.0);
        assert_eq!(eval("(1 + 2) * 3", 0.0), 9.0);
        assert_eq!(eval("2^3^2", 0.0), 512.0);
        assert_eq!(eval("-x^2", 3.0), -9.0);
        assert_eq!(eval("x/2 - 1", 4.0), 1.0);
    }

    #[test]
    fn test_functions_and_constants() {
        assert_eq!(eval("sqrt(x)", 16.0), 4.0);
        assert_eq!(eval("abs(-x)", 2.5), 2.5);
        assert!((eval("sin(pi/2)", 0.0) - 1.0).abs() < 1e-12);
        assert_eq!(eval("1.5e2", 0.0), 150.0);
        assert_eq!(eval("2e-1*x", 10.0), 2.0);
    }

    #[test]
    fn test_malformed_equations() {
        assert!(Expression::parse("").is_err());
        assert!(Expression::parse("   ").is_err());
        assert!(Expression::parse("(x + 1").is_err());
        assert!(Expression::parse("x + 1)").is_err());
        assert!(Expression::parse("x +").is_err());
        assert!(Expression::parse("foo(x)").is_err());
        assert!(Expression::parse("x $ 2").is_err());
        assert!(Expression::parse("x x").is_err());
    }
}
