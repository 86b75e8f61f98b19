//! AST for the conch shell.
//!
//! The tree mirrors the surface language: programs are items (pipes,
//! function definitions, sources), pipes are stages joined by tagged
//! connectors, and commands carry a word list plus redirections. Words
//! are expansion nodes, not strings: variable references, broadcast
//! concatenation, and IO substitutions all live here and are resolved by
//! the evaluator.

use std::fmt;

/// A parsed program: items executed in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

/// One top-level (or block-level) item.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Pipe(Pipe),
    /// `func name { body }`
    Func(Func),
    /// `< name` — read and run commands from a file.
    Src(Word),
}

/// A pipeline: stages joined by connectors, optionally backgrounded.
///
/// `tags[i]` names the connector between `stages[i]` and `stages[i+1]`;
/// `None` is the default `out` → `in` junction.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipe {
    pub stages: Vec<Cmd>,
    pub tags: Vec<Option<String>>,
    /// `Some(tag)` for `&tag`, `Some("")` for a bare `&`.
    pub bg: Option<String>,
}

impl Pipe {
    /// A single-stage foreground pipe.
    pub fn single(cmd: Cmd) -> Self {
        Pipe {
            stages: vec![cmd],
            tags: Vec::new(),
            bg: None,
        }
    }
}

/// A function definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub name: String,
    pub body: Block,
}

/// `{ ... }` with its trailing redirections.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub items: Vec<Item>,
    pub redirs: Vec<Redir>,
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    /// `name words... redirs`
    Exec { words: Vec<Word>, redirs: Vec<Redir> },
    Block(Block),
    /// `for names { body } redirs`; an empty word list after the variable
    /// name makes the loop consume words from `in`.
    For {
        words: Vec<Word>,
        body: Block,
        redirs: Vec<Redir>,
    },
    /// `while pipe { body } redirs`
    While {
        cond: Box<Pipe>,
        body: Block,
        redirs: Vec<Redir>,
    },
    /// `cond { ... } or { ... } ... redirs`; `&&`/`||` lower to this.
    Cond { arms: Vec<OrArm>, redirs: Vec<Redir> },
    /// `name = words` or `name[idx] = words`
    Set {
        name: String,
        idx: Option<Box<Word>>,
        words: Vec<Word>,
    },
    /// `name = ([k v ...] [k v ...] ...)`
    SetMap { name: String, entries: Vec<Vec<Word>> },
}

/// One `cond` arm: its pipes run in order and all must succeed.
#[derive(Debug, Clone, PartialEq)]
pub struct OrArm {
    pub pipes: Vec<Pipe>,
}

/// An expansion node in a word list.
#[derive(Debug, Clone, PartialEq)]
pub enum Word {
    /// A literal word.
    Name(String),
    /// `( words )` — a grouped list, used with `^`.
    Group(Vec<Word>),
    /// `$name` or `$name[idx]`
    Val { name: String, idx: Option<Box<Word>> },
    /// `$^name` — the expansion joined into a single word.
    Single { name: String, idx: Option<Box<Word>> },
    /// `$#name` — the element count.
    Len(String),
    /// `a ^ b` — pairwise concatenation with broadcasting.
    App(Box<Word>, Box<Word>),
    /// `<{b}`, `>[t]{b}`, `<|{b}` — IO substitution.
    IoBlk {
        dir: IoDir,
        tag: Option<String>,
        block: Block,
    },
}

impl Word {
    pub fn name(s: impl Into<String>) -> Word {
        Word::Name(s.into())
    }

    pub fn val(name: impl Into<String>) -> Word {
        Word::Val {
            name: name.into(),
            idx: None,
        }
    }
}

/// Direction of an IO substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDir {
    /// `<{b}` — the block's output becomes a readable file argument.
    In,
    /// `>{b}` — the block consumes a file argument the command writes.
    Out,
    /// `<|{b}` — the block's output becomes an in-process endpoint.
    InPipe,
}

/// A redirection: `< name`, `> name`, `>> name`, with optional `[tags]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Redir {
    pub op: RedirOp,
    /// Endpoint tags; `>[a,b]` duplicates one target under two tags.
    pub tags: Vec<String>,
    pub target: Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirOp {
    In,
    Out,
    Append,
}

impl Redir {
    /// The default tag for each operator: `in` for `<`, `out` for the
    /// rest.
    pub fn new(op: RedirOp, tags: Vec<String>, target: Word) -> Redir {
        let tags = if tags.is_empty() {
            match op {
                RedirOp::In => vec!["in".to_string()],
                _ => vec!["out".to_string()],
            }
        } else {
            tags
        };
        Redir { op, tags, target }
    }
}

impl fmt::Display for RedirOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirOp::In => write!(f, "<"),
            RedirOp::Out => write!(f, ">"),
            RedirOp::Append => write!(f, ">>"),
        }
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Word::Name(s) => write!(f, "{s}"),
            Word::Group(ws) => {
                write!(f, "(")?;
                for (i, w) in ws.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{w}")?;
                }
                write!(f, ")")
            }
            Word::Val { name, idx: None } => write!(f, "${name}"),
            Word::Val { name, idx: Some(i) } => write!(f, "${name}[{i}]"),
            Word::Single { name, idx: None } => write!(f, "$^{name}"),
            Word::Single { name, idx: Some(i) } => write!(f, "$^{name}[{i}]"),
            Word::Len(name) => write!(f, "$#{name}"),
            Word::App(l, r) => write!(f, "{l}^{r}"),
            Word::IoBlk { dir, tag, .. } => {
                let t = tag.as_deref().unwrap_or("");
                match dir {
                    IoDir::In => write!(f, "<[{t}]{{...}}"),
                    IoDir::Out => write!(f, ">[{t}]{{...}}"),
                    IoDir::InPipe => write!(f, "<|[{t}]{{...}}"),
                }
            }
        }
    }
}
