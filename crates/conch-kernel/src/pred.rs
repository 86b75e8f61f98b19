//! Predicates on directory records, as used by the file traversal
//! producers.
//!
//! A predicate is compiled from a small expression language and evaluated
//! at `(Dir, depth)`, yielding a match flag plus a prune flag telling the
//! walker the subtree cannot contain matches:
//!
//! ```text
//!   ``              true
//!   `type=d`        directories
//!   `name~*.rs`     glob on an attribute
//!   `path~~regexp`  regex instead of glob
//!   `size>4096`     numeric tests on size, mtime, depth, ...
//!   `mode&0222`     mode-bit test
//!   `depth<=2`      with pruning once the bound is reached
//!   `2`             shorthand for depth<=2; `d`, `-`, `c` for type
//!   `prune`         false, and cut the subtree
//!   `!p`  `(p)`  `p&q`  `p,q`  `p|q`  `p:q`
//! ```
//!
//! Checking that `name` or `path` differs from a value implies prune when
//! it matches: there is no point walking into a subtree the user excluded
//! by name. A `path` test whose value does not start with `/` applies to
//! `name` instead, as a convenience.

use conch_types::{CmdError, Dir};
use regex::Regex;

/// Comparison and combination operators of the predicate language.
#[derive(Debug, Clone)]
enum Node {
    True,
    False,
    Prune,
    Not(Box<Node>),
    And(Vec<Node>),
    Or(Vec<Node>),
    /// attr OP value, numeric.
    Num { attr: String, op: NumOp, val: i64 },
    /// (attr & mask) != 0.
    Mask { attr: String, mask: u64 },
    /// attr == / != value, string.
    Str { attr: String, val: String, neg: bool },
    /// attr ~ glob.
    Glob { attr: String, pat: String },
    /// attr ~~ regexp.
    Rexp { attr: String, re: Regex },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

/// A compiled predicate.
#[derive(Debug, Clone)]
pub struct Pred {
    root: Node,
}

impl Pred {
    /// Compile a predicate. The empty string means "everything".
    pub fn new(src: &str) -> Result<Pred, CmdError> {
        let src = src.trim();
        if src.is_empty() {
            return Ok(Pred { root: Node::True });
        }
        let mut p = Parser {
            src: src.chars().collect(),
            pos: 0,
        };
        let root = p.or_expr()?;
        p.skip_ws();
        if p.pos != p.src.len() {
            return Err(CmdError::Parse(format!(
                "predicate: trailing input at {}",
                p.pos
            )));
        }
        Ok(Pred { root })
    }

    /// Evaluate at a record considered to be at the given depth. Returns
    /// `(matches, prune)`.
    pub fn eval_at(&self, d: &Dir, depth: usize) -> (bool, bool) {
        eval(&self.root, d, depth)
    }
}

fn eval(n: &Node, d: &Dir, depth: usize) -> (bool, bool) {
    match n {
        Node::True => (true, false),
        Node::False => (false, false),
        Node::Prune => (false, true),
        Node::Not(inner) => {
            let (v, mut prune) = eval(inner, d, depth);
            // negated name/path matches prune the matching subtree
            if let Node::Str { attr, .. } | Node::Glob { attr, .. } | Node::Rexp { attr, .. } =
                inner.as_ref()
            {
                if attr == "name" || attr == "path" {
                    prune = v;
                }
            }
            (!v, prune)
        }
        Node::And(args) => {
            for a in args {
                let (v, prune) = eval(a, d, depth);
                if !v || prune {
                    return (v, prune);
                }
            }
            (true, false)
        }
        Node::Or(args) => {
            for a in args {
                let (v, prune) = eval(a, d, depth);
                if v || prune {
                    return (v, prune);
                }
            }
            (false, false)
        }
        Node::Num { attr, op, val } => {
            let isdepth = attr == "depth";
            let n1 = if isdepth {
                depth as i64
            } else {
                match d.get(attr) {
                    Some(_) => d.num(attr) as i64,
                    None => return (false, false),
                }
            };
            let (v, toodeep) = match op {
                NumOp::Lt => (n1 < *val, isdepth && n1 >= *val - 1),
                NumOp::Le => (n1 <= *val, isdepth && n1 >= *val),
                NumOp::Eq => (n1 == *val, isdepth && n1 >= *val),
                NumOp::Ge => (n1 >= *val, false),
                NumOp::Gt => (n1 > *val, false),
            };
            (v, toodeep)
        }
        Node::Mask { attr, mask } => (d.num(attr) & mask != 0, false),
        Node::Str { attr, val, neg } => {
            let attr = name_for(attr, val);
            match d.get(attr) {
                None => (*neg, false),
                Some(have) => {
                    let eq = have == val;
                    if *neg {
                        let prune = (attr == "name" || attr == "path") && eq;
                        (!eq, prune)
                    } else {
                        (eq, false)
                    }
                }
            }
        }
        Node::Glob { attr, pat } => {
            let attr = name_for(attr, pat);
            match d.get(attr) {
                None => (false, false),
                Some(have) => {
                    if attr == "path" && pat.starts_with('/') {
                        path_match(pat, have)
                    } else {
                        (glob_match(pat, have), false)
                    }
                }
            }
        }
        Node::Rexp { attr, re } => match d.get(attr) {
            None => (false, false),
            Some(have) => (re.is_match(have), false),
        },
    }
}

/// A `path` test against a non-absolute value really tests `name`.
fn name_for<'a>(attr: &'a str, val: &str) -> &'a str {
    if attr == "path" && !val.starts_with('/') {
        "name"
    } else {
        attr
    }
}

/// Component-wise path glob: also reports prune when the walked path is
/// already deeper than the pattern allows.
fn path_match(pat: &str, p: &str) -> (bool, bool) {
    let pels: Vec<&str> = p.split('/').filter(|e| !e.is_empty()).collect();
    let els: Vec<&str> = pat.split('/').filter(|e| !e.is_empty()).collect();
    if pels.len() > els.len() {
        return (false, true);
    }
    for (pe, el) in pels.iter().zip(&els) {
        if !glob_match(el, pe) {
            return (false, true);
        }
    }
    (pels.len() == els.len(), false)
}

/// Shell-style glob: `*`, `?`, and `[...]` classes.
pub fn glob_match(pat: &str, s: &str) -> bool {
    let p: Vec<char> = pat.chars().collect();
    let t: Vec<char> = s.chars().collect();
    glob_at(&p, 0, &t, 0)
}

fn glob_at(p: &[char], mut pi: usize, t: &[char], mut ti: usize) -> bool {
    while pi < p.len() {
        match p[pi] {
            '*' => {
                // collapse runs of *
                while pi < p.len() && p[pi] == '*' {
                    pi += 1;
                }
                if pi == p.len() {
                    return true;
                }
                for k in ti..=t.len() {
                    if glob_at(p, pi, t, k) {
                        return true;
                    }
                }
                return false;
            }
            '?' => {
                if ti >= t.len() {
                    return false;
                }
                pi += 1;
                ti += 1;
            }
            '[' => {
                if ti >= t.len() {
                    return false;
                }
                let (ok, next) = class_match(p, pi, t[ti]);
                if !ok {
                    return false;
                }
                pi = next;
                ti += 1;
            }
            c => {
                if ti >= t.len() || t[ti] != c {
                    return false;
                }
                pi += 1;
                ti += 1;
            }
        }
    }
    ti == t.len()
}

fn class_match(p: &[char], open: usize, c: char) -> (bool, usize) {
    let mut i = open + 1;
    let neg = i < p.len() && (p[i] == '^' || p[i] == '!');
    if neg {
        i += 1;
    }
    let mut hit = false;
    let mut first = true;
    while i < p.len() && (p[i] != ']' || first) {
        first = false;
        if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' {
            if p[i] <= c && c <= p[i + 2] {
                hit = true;
            }
            i += 3;
        } else {
            if p[i] == c {
                hit = true;
            }
            i += 1;
        }
    }
    if i >= p.len() {
        return (false, i); // unterminated class matches nothing
    }
    (hit != neg, i + 1)
}

struct Parser {
    src: Vec<char>,
    pos: usize,
}

impl Parser {
    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn or_expr(&mut self) -> Result<Node, CmdError> {
        let mut args = vec![self.and_expr()?];
        loop {
            self.skip_ws();
            match self.peek() {
                Some('|') | Some(':') => {
                    self.pos += 1;
                    args.push(self.and_expr()?);
                }
                _ => break,
            }
        }
        Ok(if args.len() == 1 {
            args.pop().expect("one arg")
        } else {
            Node::Or(args)
        })
    }

    fn and_expr(&mut self) -> Result<Node, CmdError> {
        let mut args = vec![self.unary()?];
        loop {
            self.skip_ws();
            match self.peek() {
                Some('&') | Some(',') => {
                    self.pos += 1;
                    args.push(self.unary()?);
                }
                _ => break,
            }
        }
        Ok(if args.len() == 1 {
            args.pop().expect("one arg")
        } else {
            Node::And(args)
        })
    }

    fn unary(&mut self) -> Result<Node, CmdError> {
        self.skip_ws();
        match self.peek() {
            Some('!') => {
                self.pos += 1;
                Ok(Node::Not(Box::new(self.unary()?)))
            }
            Some('(') => {
                self.pos += 1;
                let inner = self.or_expr()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return Err(CmdError::Parse("predicate: missing )".into()));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(_) => self.term(),
            None => Err(CmdError::Parse("predicate: unexpected end".into())),
        }
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.src.len() {
            let c = self.src[self.pos];
            if c.is_whitespace() || "&,|:!()<>=~\"".contains(c) {
                break;
            }
            self.pos += 1;
        }
        self.src[start..self.pos].iter().collect()
    }

    fn value(&mut self) -> String {
        self.skip_ws();
        if self.peek() == Some('"') {
            self.pos += 1;
            let start = self.pos;
            while self.pos < self.src.len() && self.src[self.pos] != '"' {
                self.pos += 1;
            }
            let v: String = self.src[start..self.pos].iter().collect();
            if self.pos < self.src.len() {
                self.pos += 1;
            }
            return v;
        }
        let start = self.pos;
        while self.pos < self.src.len() {
            let c = self.src[self.pos];
            if c.is_whitespace() || "&,|:()".contains(c) {
                break;
            }
            self.pos += 1;
        }
        self.src[start..self.pos].iter().collect()
    }

    fn term(&mut self) -> Result<Node, CmdError> {
        let attr = self.word();
        self.skip_ws();
        // shorthands with no operator
        let at_op = matches!(self.peek(), Some('=') | Some('~') | Some('<') | Some('>'))
            || (self.peek() == Some('&') && attr == "mode");
        if !at_op {
            return match attr.as_str() {
                "" => Err(CmdError::Parse("predicate: expected a term".into())),
                "t" | "true" => Ok(Node::True),
                "f" | "false" => Ok(Node::False),
                "prune" => Ok(Node::Prune),
                "d" | "-" | "c" | "F" | "D" => Ok(Node::Str {
                    attr: "type".into(),
                    val: attr,
                    neg: false,
                }),
                n if n.chars().all(|c| c.is_ascii_digit()) => Ok(Node::Num {
                    attr: "depth".into(),
                    op: NumOp::Le,
                    val: n.parse().map_err(|_| CmdError::Parse("predicate: bad depth".into()))?,
                }),
                other => Err(CmdError::Parse(format!("predicate: bad term {other:?}"))),
            };
        }
        // mode&mask
        if self.peek() == Some('&') {
            self.pos += 1;
            let v = self.value();
            let mask = u64::from_str_radix(v.trim_start_matches('0'), 8)
                .or_else(|_| if v.chars().all(|c| c == '0') { Ok(0) } else { Err(()) })
                .map_err(|_| CmdError::Parse(format!("predicate: bad mask {v:?}")))?;
            return Ok(Node::Mask { attr, mask });
        }
        let mut op = String::new();
        while let Some(c) = self.peek() {
            if "=~<>!".contains(c) && op.len() < 2 {
                op.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        let val = self.value();
        let numeric = |nop| -> Result<Node, CmdError> {
            let radix = if val.starts_with('0') && val.len() > 1 { 8 } else { 10 };
            let n = i64::from_str_radix(&val, radix)
                .map_err(|_| CmdError::Parse(format!("predicate: {val:?} is not a number")))?;
            Ok(Node::Num { attr: attr.clone(), op: nop, val: n })
        };
        match op.as_str() {
            "=" => Ok(Node::Str { attr, val, neg: false }),
            "!=" => Ok(Node::Str { attr, val, neg: true }),
            "~" => Ok(Node::Glob { attr, pat: val }),
            "~~" => Ok(Node::Rexp {
                attr,
                re: Regex::new(&val)
                    .map_err(|e| CmdError::Parse(format!("predicate: {e}")))?,
            }),
            "==" => numeric(NumOp::Eq),
            "<" => numeric(NumOp::Lt),
            "<=" => numeric(NumOp::Le),
            ">" => numeric(NumOp::Gt),
            ">=" => numeric(NumOp::Ge),
            other => Err(CmdError::Parse(format!("predicate: bad operator {other:?}"))),
        }
    }
}
