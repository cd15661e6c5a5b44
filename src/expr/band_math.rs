//! Band-math expressions such as `(B8 - B11) / (B8 + B11)`.
//!
//! Grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | primary
//! primary := NUMBER | BAND | "b" '(' STRING ')' | '(' expr ')'
//! ```
//!
//! Bare identifiers name bands. `b('B8')` is accepted for band names that are
//! not valid identifiers.

use super::Node;
use anyhow::Result;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOp {
    fn algorithm(self) -> &'static str {
        match self {
            BinaryOp::Add => "Image.add",
            BinaryOp::Subtract => "Image.subtract",
            BinaryOp::Multiply => "Image.multiply",
            BinaryOp::Divide => "Image.divide",
        }
    }
}

/// Parsed band-math expression.
#[derive(Debug, Clone, PartialEq)]
pub enum BandExpr {
    Number(f64),
    Band(String),
    Negate(Box<BandExpr>),
    Binary(BinaryOp, Box<BandExpr>, Box<BandExpr>),
}

impl BandExpr {
    /// Parse an expression, reporting the byte offset of the first error.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0, len: source.len() };
        let expr = parser.expr()?;
        if let Some((token, offset)) = parser.tokens.get(parser.pos) {
            anyhow::bail!("Unexpected {} at offset {} in '{}'", token.describe(), offset, source);
        }
        Ok(expr)
    }

    /// Source bands referenced by the expression, in first-use order.
    pub fn bands(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_bands(&mut out);
        out
    }

    fn collect_bands(&self, out: &mut Vec<String>) {
        match self {
            BandExpr::Number(_) => {}
            BandExpr::Band(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            BandExpr::Negate(inner) => inner.collect_bands(out),
            BandExpr::Binary(_, lhs, rhs) => {
                lhs.collect_bands(out);
                rhs.collect_bands(out);
            }
        }
    }

    /// Compile to image algebra over `image`.
    ///
    /// Reflectance bands are stored as integers, so every band is cast to
    /// float before arithmetic.
    pub fn compile(&self, image: &Node) -> Node {
        match self {
            BandExpr::Number(value) => Node::call("Image.constant", [("value", Node::constant(json!(value)))]),
            BandExpr::Band(name) => {
                let selected = Node::call(
                    "Image.select",
                    [
                        ("input", image.clone()),
                        ("bandSelectors", Node::constant(json!([name]))),
                    ],
                );
                Node::call("Image.toFloat", [("value", selected)])
            }
            BandExpr::Negate(inner) => Node::call(
                "Image.multiply",
                [
                    ("image1", inner.compile(image)),
                    ("image2", BandExpr::Number(-1.0).compile(image)),
                ],
            ),
            BandExpr::Binary(op, lhs, rhs) => Node::call(
                op.algorithm(),
                [("image1", lhs.compile(image)), ("image2", rhs.compile(image))],
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Str(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Ident(s) => format!("identifier '{}'", s),
            Token::Str(s) => format!("string '{}'", s),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'+' => tokens.push((Token::Plus, start)),
            b'-' => tokens.push((Token::Minus, start)),
            b'*' => tokens.push((Token::Star, start)),
            b'/' => tokens.push((Token::Slash, start)),
            b'(' => tokens.push((Token::LParen, start)),
            b')' => tokens.push((Token::RParen, start)),
            b'\'' | b'"' => {
                let end = source[i + 1..]
                    .find(c as char)
                    .map(|n| i + 1 + n)
                    .ok_or_else(|| anyhow::anyhow!("Unterminated string at offset {} in '{}'", start, source))?;
                tokens.push((Token::Str(source[i + 1..end].to_string()), start));
                i = end + 1;
                continue;
            }
            b'0'..=b'9' | b'.' => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                // Exponent, e.g. 1e-4
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        i = j;
                        while i < bytes.len() && bytes[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text = &source[start..i];
                let value: f64 = text
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid number '{}' at offset {} in '{}'", text, start, source))?;
                tokens.push((Token::Number(value), start));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push((Token::Ident(source[start..i].to_string()), start));
                continue;
            }
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                anyhow::bail!("Unexpected character '{}' at offset {} in '{}'", ch, start, source);
            }
        }
        i += 1;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, o)| *o).unwrap_or(self.len)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let offset = self.offset();
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => anyhow::bail!("Expected {} at offset {}, found {}", expected.describe(), offset, t.describe()),
            None => anyhow::bail!("Expected {} at offset {}, found end of input", expected.describe(), offset),
        }
    }

    fn expr(&mut self) -> Result<BandExpr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Subtract,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = BandExpr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<BandExpr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Multiply,
                Some(Token::Slash) => BinaryOp::Divide,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = BandExpr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<BandExpr> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(match self.unary()? {
                BandExpr::Number(n) => BandExpr::Number(-n),
                inner => BandExpr::Negate(Box::new(inner)),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<BandExpr> {
        let offset = self.offset();
        match self.next() {
            Some(Token::Number(n)) => Ok(BandExpr::Number(n)),
            Some(Token::Ident(name)) if name == "b" && self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                let band_offset = self.offset();
                let band = match self.next() {
                    Some(Token::Str(band)) => band,
                    _ => anyhow::bail!("Expected quoted band name at offset {}", band_offset),
                };
                self.expect(Token::RParen)?;
                Ok(BandExpr::Band(band))
            }
            Some(Token::Ident(name)) => Ok(BandExpr::Band(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(t) => anyhow::bail!("Unexpected {} at offset {}", t.describe(), offset),
            None => anyhow::bail!("Unexpected end of expression at offset {}", offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(name: &str) -> Box<BandExpr> {
        Box::new(BandExpr::Band(name.to_string()))
    }

    #[test]
    fn test_precedence() {
        let expr = BandExpr::parse("B8 - B4 * 2").unwrap();
        assert_eq!(
            expr,
            BandExpr::Binary(
                BinaryOp::Subtract,
                band("B8"),
                Box::new(BandExpr::Binary(BinaryOp::Multiply, band("B4"), Box::new(BandExpr::Number(2.0)))),
            )
        );
    }

    #[test]
    fn test_left_associative() {
        let expr = BandExpr::parse("B1 / B2 / B3").unwrap();
        assert_eq!(
            expr,
            BandExpr::Binary(
                BinaryOp::Divide,
                Box::new(BandExpr::Binary(BinaryOp::Divide, band("B1"), band("B2"))),
                band("B3"),
            )
        );
    }

    #[test]
    fn test_parentheses_and_band_function() {
        let expr = BandExpr::parse("(b('B8') - B11) / (B8 + B11)").unwrap();
        assert_eq!(expr.bands(), vec!["B8", "B11"]);
        let BandExpr::Binary(BinaryOp::Divide, lhs, _) = expr else {
            panic!("expected a division");
        };
        assert_eq!(*lhs, BandExpr::Binary(BinaryOp::Subtract, band("B8"), band("B11")));
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(BandExpr::parse("-2.5").unwrap(), BandExpr::Number(-2.5));
        assert_eq!(BandExpr::parse("-B4").unwrap(), BandExpr::Negate(band("B4")));
        assert_eq!(BandExpr::parse("1e-4").unwrap(), BandExpr::Number(1e-4));
    }

    #[test]
    fn test_errors_report_offset() {
        let err = BandExpr::parse("B8 + ").unwrap_err().to_string();
        assert!(err.contains("offset 5"), "{}", err);

        let err = BandExpr::parse("B8 B4").unwrap_err().to_string();
        assert!(err.contains("offset 3"), "{}", err);

        let err = BandExpr::parse("(B8 - B4").unwrap_err().to_string();
        assert!(err.contains("')'"), "{}", err);

        assert!(BandExpr::parse("B8 % B4").is_err());
        assert!(BandExpr::parse("b('B8").is_err());
        assert!(BandExpr::parse("").is_err());
    }

    #[test]
    fn test_compile_selects_and_casts() {
        let image = Node::argument("img");
        let node = BandExpr::parse("B8 / 2").unwrap().compile(&image);
        assert_eq!(node.function_name(), Some("Image.divide"));

        let lhs = node.arg("image1").unwrap();
        assert_eq!(lhs.function_name(), Some("Image.toFloat"));
        let select = lhs.arg("value").unwrap();
        assert_eq!(select.function_name(), Some("Image.select"));
        assert_eq!(select.arg("input"), Some(&image));
        assert_eq!(select.arg("bandSelectors"), Some(&Node::constant(json!(["B8"]))));

        let rhs = node.arg("image2").unwrap();
        assert_eq!(rhs.function_name(), Some("Image.constant"));
    }
}
