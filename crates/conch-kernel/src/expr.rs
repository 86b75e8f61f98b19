//! The expression language behind `xp` and attribute tests.
//!
//! Values are integers, floats, strings, booleans, and times (seconds,
//! carried as integers from `10s`/`5m`/`2h` literals). Operators follow
//! the usual precedence; `^` is exponentiation. Function application is
//! juxtaposition (`sqrt 2`, `size /tmp/f`): a name resolves to a numeric
//! builtin, a file-attribute accessor, or a printf-like format when it
//! begins with `%`.

use std::fmt;
use std::os::unix::fs::PermissionsExt;

use conch_types::CmdError;

/// An expression value.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Int(i64),
    Flt(f64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Int(v) => write!(f, "{v}"),
            Val::Flt(v) => write!(f, "{v}"),
            Val::Str(s) => write!(f, "{s}"),
            Val::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl Val {
    pub fn is_false(&self) -> bool {
        matches!(self, Val::Bool(false))
    }

    fn as_f64(&self) -> Result<f64, CmdError> {
        match self {
            Val::Int(v) => Ok(*v as f64),
            Val::Flt(v) => Ok(*v),
            other => Err(CmdError::other(format!("{other}: not a number"))),
        }
    }

    fn as_i64(&self) -> Result<i64, CmdError> {
        match self {
            Val::Int(v) => Ok(*v),
            Val::Flt(v) => Ok(*v as i64),
            other => Err(CmdError::other(format!("{other}: not a number"))),
        }
    }

    fn as_bool(&self) -> Result<bool, CmdError> {
        match self {
            Val::Bool(b) => Ok(*b),
            Val::Int(v) => Ok(*v != 0),
            other => Err(CmdError::other(format!("{other}: not a boolean"))),
        }
    }
}

/// Evaluate a source expression.
pub fn eval_str(src: &str) -> Result<Val, CmdError> {
    let toks = lex(src)?;
    let mut p = P { toks, pos: 0 };
    let v = p.expr(0)?;
    if p.pos != p.toks.len() {
        return Err(CmdError::Parse(format!(
            "expression: trailing input at {:?}",
            p.toks[p.pos]
        )));
    }
    Ok(v)
}

#[derive(Debug, Clone, PartialEq)]
enum T {
    Num(i64),
    Flt(f64),
    Str(String),
    Name(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn lex(src: &str) -> Result<Vec<T>, CmdError> {
    let cs: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < cs.len() {
        let c = cs[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            out.push(T::LParen);
            i += 1;
            continue;
        }
        if c == ')' {
            out.push(T::RParen);
            i += 1;
            continue;
        }
        if c == '"' {
            i += 1;
            let start = i;
            while i < cs.len() && cs[i] != '"' {
                i += 1;
            }
            if i == cs.len() {
                return Err(CmdError::Parse("expression: unclosed string".into()));
            }
            out.push(T::Str(cs[start..i].iter().collect()));
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            let mut is_float = false;
            while i < cs.len() && (cs[i].is_ascii_digit() || cs[i] == '.') {
                if cs[i] == '.' {
                    is_float = true;
                }
                i += 1;
            }
            let text: String = cs[start..i].iter().collect();
            // time suffixes make seconds
            let scale = match cs.get(i) {
                Some('s') => Some(1),
                Some('m') => Some(60),
                Some('h') => Some(3600),
                _ => None,
            };
            if let Some(scale) = scale {
                i += 1;
                let n: i64 = text
                    .parse()
                    .map_err(|_| CmdError::Parse(format!("expression: bad time {text:?}")))?;
                out.push(T::Num(n * scale));
            } else if is_float {
                let f: f64 = text
                    .parse()
                    .map_err(|_| CmdError::Parse(format!("expression: bad float {text:?}")))?;
                out.push(T::Flt(f));
            } else {
                let n: i64 = text
                    .parse()
                    .map_err(|_| CmdError::Parse(format!("expression: bad number {text:?}")))?;
                out.push(T::Num(n));
            }
            continue;
        }
        // `%x` and friends are format names, not the modulo operator
        if c == '%' && cs.get(i + 1).is_some_and(|c| c.is_ascii_alphabetic()) {
            let start = i;
            i += 1;
            while i < cs.len() && cs[i].is_ascii_alphabetic() {
                i += 1;
            }
            out.push(T::Name(cs[start..i].iter().collect()));
            continue;
        }
        // multi-rune operators first
        let two: String = cs[i..(i + 2).min(cs.len())].iter().collect();
        let op2 = ["<<", ">>", "<=", ">=", "==", "!=", "&&", "||"]
            .iter()
            .find(|o| **o == two)
            .copied();
        if let Some(op) = op2 {
            out.push(T::Op(op));
            i += 2;
            continue;
        }
        if let Some(op) = ["+", "-", "*", "/", "%", "^", "&", "|", "<", ">", "!"]
            .iter()
            .find(|o| o.chars().next() == Some(c))
            .copied()
        {
            out.push(T::Op(op));
            i += 1;
            continue;
        }
        // names: function identifiers, attribute accessors, bare paths,
        // and %-formats
        let start = i;
        while i < cs.len()
            && !cs[i].is_whitespace()
            && !"()\"+-*/%^&|<>!=".contains(cs[i])
        {
            i += 1;
        }
        if i == start {
            return Err(CmdError::Parse(format!("expression: bad rune {c:?}")));
        }
        out.push(T::Name(cs[start..i].iter().collect()));
    }
    Ok(out)
}

struct P {
    toks: Vec<T>,
    pos: usize,
}

fn prec(op: &str) -> Option<(u8, bool)> {
    // (binding power, right-assoc)
    Some(match op {
        "^" => (80, true),
        "*" | "/" | "%" => (70, false),
        "+" | "-" => (60, false),
        "<<" | ">>" => (50, false),
        "&" => (45, false),
        "|" => (42, false),
        "<" | ">" | "<=" | ">=" | "==" | "!=" => (40, false),
        "&&" => (30, false),
        "||" => (20, false),
        _ => return None,
    })
}

impl P {
    fn peek(&self) -> Option<&T> {
        self.toks.get(self.pos)
    }

    fn expr(&mut self, min_bp: u8) -> Result<Val, CmdError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(T::Op(op)) => *op,
                _ => break,
            };
            let Some((bp, right)) = prec(op) else { break };
            if bp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.expr(if right { bp } else { bp + 1 })?;
            lhs = binop(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Val, CmdError> {
        match self.peek().cloned() {
            Some(T::Op("-")) => {
                self.pos += 1;
                let v = self.unary()?;
                match v {
                    Val::Int(n) => Ok(Val::Int(-n)),
                    Val::Flt(f) => Ok(Val::Flt(-f)),
                    other => Err(CmdError::other(format!("-: {other}: not a number"))),
                }
            }
            Some(T::Op("!")) => {
                self.pos += 1;
                let v = self.unary()?;
                Ok(Val::Bool(!v.as_bool()?))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Val, CmdError> {
        match self.peek().cloned() {
            Some(T::Num(n)) => {
                self.pos += 1;
                Ok(Val::Int(n))
            }
            Some(T::Flt(f)) => {
                self.pos += 1;
                Ok(Val::Flt(f))
            }
            Some(T::Str(s)) => {
                self.pos += 1;
                Ok(Val::Str(s))
            }
            Some(T::LParen) => {
                self.pos += 1;
                let v = self.expr(0)?;
                match self.peek() {
                    Some(T::RParen) => {
                        self.pos += 1;
                        Ok(v)
                    }
                    _ => Err(CmdError::Parse("expression: missing )".into())),
                }
            }
            Some(T::Name(n)) => {
                self.pos += 1;
                if n == "true" {
                    return Ok(Val::Bool(true));
                }
                if n == "false" {
                    return Ok(Val::Bool(false));
                }
                if is_function(&n) {
                    let arg = self.unary()?;
                    return apply(&n, arg);
                }
                Ok(Val::Str(n))
            }
            other => Err(CmdError::Parse(format!("expression: unexpected {other:?}"))),
        }
    }
}

fn is_function(name: &str) -> bool {
    name.starts_with('%')
        || matches!(
            name,
            "abs" | "sqrt" | "exp" | "log" | "floor" | "ceil"
                | "r" | "w" | "x" | "mode" | "size" | "mtime"
        )
}

fn apply(name: &str, arg: Val) -> Result<Val, CmdError> {
    if let Some(fmt) = name.strip_prefix('%') {
        return format_val(fmt, &arg);
    }
    match name {
        "abs" => match arg {
            Val::Int(n) => Ok(Val::Int(n.abs())),
            Val::Flt(f) => Ok(Val::Flt(f.abs())),
            other => Err(CmdError::other(format!("abs: {other}: not a number"))),
        },
        "sqrt" => Ok(Val::Flt(arg.as_f64()?.sqrt())),
        "exp" => Ok(Val::Flt(arg.as_f64()?.exp())),
        "log" => Ok(Val::Flt(arg.as_f64()?.ln())),
        "floor" => Ok(Val::Int(arg.as_f64()?.floor() as i64)),
        "ceil" => Ok(Val::Int(arg.as_f64()?.ceil() as i64)),
        "r" | "w" | "x" | "mode" | "size" | "mtime" => file_attr(name, &arg),
        other => Err(CmdError::other(format!("{other}: unknown function"))),
    }
}

/// File-attribute accessors take a path string.
fn file_attr(name: &str, arg: &Val) -> Result<Val, CmdError> {
    let Val::Str(path) = arg else {
        return Err(CmdError::other(format!("{name}: {arg}: not a file name")));
    };
    let meta = std::fs::metadata(path).map_err(|e| CmdError::from_io(path, &e))?;
    let mode = meta.permissions().mode();
    Ok(match name {
        "size" => Val::Int(meta.len() as i64),
        "mode" => Val::Int((mode & 0o7777) as i64),
        "mtime" => {
            use std::os::unix::fs::MetadataExt;
            Val::Int(meta.mtime())
        }
        "r" => Val::Bool(mode & 0o400 != 0),
        "w" => Val::Bool(mode & 0o200 != 0),
        "x" => Val::Bool(mode & 0o100 != 0),
        _ => return Err(CmdError::Bug(format!("file_attr {name}"))),
    })
}

fn format_val(fmt: &str, v: &Val) -> Result<Val, CmdError> {
    let s = match fmt {
        "x" => format!("{:x}", v.as_i64()?),
        "o" => format!("{:o}", v.as_i64()?),
        "b" => format!("{:b}", v.as_i64()?),
        "d" => format!("{}", v.as_i64()?),
        "e" => format!("{:e}", v.as_f64()?),
        "f" => format!("{:.6}", v.as_f64()?),
        "s" => v.to_string(),
        other => {
            return Err(CmdError::other(format!("%{other}: unknown format")))
        }
    };
    Ok(Val::Str(s))
}

fn binop(op: &str, l: Val, r: Val) -> Result<Val, CmdError> {
    // logical and comparison first, then numeric promotion
    match op {
        "&&" => return Ok(Val::Bool(l.as_bool()? && r.as_bool()?)),
        "||" => return Ok(Val::Bool(l.as_bool()? || r.as_bool()?)),
        "==" | "!=" | "<" | ">" | "<=" | ">=" => return compare(op, &l, &r),
        _ => {}
    }
    match (&l, &r) {
        (Val::Flt(_), _) | (_, Val::Flt(_)) => {
            let (a, b) = (l.as_f64()?, r.as_f64()?);
            let v = match op {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" => a / b,
                "%" => a % b,
                "^" => a.powf(b),
                _ => {
                    return Err(CmdError::other(format!("{op}: not a float operator")))
                }
            };
            Ok(Val::Flt(v))
        }
        _ => {
            let (a, b) = (l.as_i64()?, r.as_i64()?);
            let v = match op {
                "+" => a.wrapping_add(b),
                "-" => a.wrapping_sub(b),
                "*" => a.wrapping_mul(b),
                "/" => {
                    if b == 0 {
                        return Err(CmdError::other("division by zero"));
                    }
                    a / b
                }
                "%" => {
                    if b == 0 {
                        return Err(CmdError::other("division by zero"));
                    }
                    a % b
                }
                "^" => {
                    let e: u32 = b
                        .try_into()
                        .map_err(|_| CmdError::other(format!("^: bad exponent {b}")))?;
                    a.wrapping_pow(e)
                }
                "&" => a & b,
                "|" => a | b,
                "<<" => a.wrapping_shl(b as u32),
                ">>" => a.wrapping_shr(b as u32),
                _ => return Err(CmdError::Bug(format!("binop {op}"))),
            };
            Ok(Val::Int(v))
        }
    }
}

fn compare(op: &str, l: &Val, r: &Val) -> Result<Val, CmdError> {
    let ord = match (l, r) {
        (Val::Str(a), Val::Str(b)) => a.cmp(b),
        (Val::Bool(a), Val::Bool(b)) => a.cmp(b),
        _ => {
            let (a, b) = (l.as_f64()?, r.as_f64()?);
            a.partial_cmp(&b)
                .ok_or_else(|| CmdError::other("unordered comparison"))?
        }
    };
    let v = match op {
        "==" => ord.is_eq(),
        "!=" => ord.is_ne(),
        "<" => ord.is_lt(),
        ">" => ord.is_gt(),
        "<=" => ord.is_le(),
        ">=" => ord.is_ge(),
        _ => return Err(CmdError::Bug(format!("compare {op}"))),
    };
    Ok(Val::Bool(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(s: &str) -> Val {
        eval_str(s).unwrap()
    }

    #[test]
    fn arithmetic_with_precedence() {
        assert_eq!(ev("1 + 2 * 3"), Val::Int(7));
        assert_eq!(ev("(1 + 2) * 3"), Val::Int(9));
        assert_eq!(ev("2 ^ 10"), Val::Int(1024));
        assert_eq!(ev("2 ^ 3 ^ 2"), Val::Int(512), "pow is right-assoc");
        assert_eq!(ev("7 % 3"), Val::Int(1));
    }

    #[test]
    fn floats_promote() {
        assert_eq!(ev("1 + 0.5"), Val::Flt(1.5));
        assert_eq!(ev("3.0 * 2"), Val::Flt(6.0));
    }

    #[test]
    fn bit_operations() {
        assert_eq!(ev("1 << 4"), Val::Int(16));
        assert_eq!(ev("6 & 3"), Val::Int(2));
        assert_eq!(ev("6 | 1"), Val::Int(7));
        assert_eq!(ev("16 >> 2"), Val::Int(4));
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(ev("1 < 2"), Val::Bool(true));
        assert_eq!(ev("1 < 2 && 3 >= 3"), Val::Bool(true));
        assert_eq!(ev("1 == 2 || 2 == 2"), Val::Bool(true));
        assert_eq!(ev("!(1 == 1)"), Val::Bool(false));
        assert_eq!(ev("\"abc\" < \"abd\""), Val::Bool(true));
    }

    #[test]
    fn unary_minus() {
        assert_eq!(ev("-3 + 5"), Val::Int(2));
    }

    #[test]
    fn time_literals_are_seconds() {
        assert_eq!(ev("2m + 30s"), Val::Int(150));
        assert_eq!(ev("1h"), Val::Int(3600));
    }

    #[test]
    fn functions_bind_tighter_than_ops() {
        assert_eq!(ev("abs -5 + 1"), Val::Int(6));
        match ev("sqrt 4") {
            Val::Flt(f) => assert!((f - 2.0).abs() < 1e-12),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn formats() {
        assert_eq!(ev("%x 255"), Val::Str("ff".into()));
        assert_eq!(ev("%o 8"), Val::Str("10".into()));
    }

    #[test]
    fn file_attributes() {
        // absolute paths contain operator runes, so they are quoted
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"12345").unwrap();
        let p = tmp.path().to_string_lossy().to_string();
        assert_eq!(ev(&format!("size \"{p}\"")), Val::Int(5));
        assert_eq!(ev(&format!("size \"{p}\" > 3")), Val::Bool(true));
        assert_eq!(ev(&format!("r \"{p}\"")), Val::Bool(true));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(eval_str("1 / 0").is_err());
    }

    #[test]
    fn bad_input_is_a_parse_error() {
        assert!(eval_str("1 +").is_err());
        assert!(eval_str("(1").is_err());
    }
}
