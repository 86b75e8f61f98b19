//! Recursive-descent parser for the conch shell.
//!
//! Accepts the surface grammar:
//!
//! ```text
//! program := { pipe | src | func }
//! pipe    := cmd { '|' [tag] cmd } [ '&' [tag] ]
//! cmd     := names redirs | block | for | while | cond | set
//! block   := '{' { pipe | src } '}' redirs
//! for     := 'for' names '{' block '}' redirs
//! while   := 'while' pipe '{' block '}' redirs
//! cond    := 'cond' '{' pipe '}' { 'or' '{' pipe '}' } redirs
//! set     := NAME '=' names | NAME '[' idx ']' '=' names
//!          | NAME '=' '(' { '[' names ']' } ')'
//! ```
//!
//! `a && b` and `a || b` are accepted and lowered into `Cond`/`Or` arms.
//! Duplicate redirection tags within one node are parse errors.

use std::collections::HashSet;

use conch_types::CmdError;

use crate::ast::{Block, Cmd, Func, IoDir, Item, OrArm, Pipe, Program, Redir, RedirOp, Word};
use crate::lexer::{tokenize, Tok, Token};

/// Parse a complete source text into a program.
pub fn parse(src: &str) -> Result<Program, CmdError> {
    let toks = tokenize(src)?;
    let mut p = Parser { toks, pos: 0 };
    let items = p.items(None)?;
    Ok(Program { items })
}

struct Parser {
    toks: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|t| &t.tok)
    }

    fn peek_at(&self, n: usize) -> Option<&Tok> {
        self.toks.get(self.pos + n).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.toks
            .get(self.pos.min(self.toks.len().saturating_sub(1)))
            .map(|t| t.line)
            .unwrap_or(0)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).map(|t| t.tok.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl AsRef<str>) -> CmdError {
        CmdError::Parse(format!("line {}: {}", self.line(), msg.as_ref()))
    }

    fn expect(&mut self, want: &Tok, what: &str) -> Result<(), CmdError> {
        match self.peek() {
            Some(t) if t == want => {
                self.next();
                Ok(())
            }
            other => Err(self.err(format!("expected {what}, got {other:?}"))),
        }
    }

    fn skip_seps(&mut self) {
        while matches!(self.peek(), Some(Tok::Nl) | Some(Tok::Semi)) {
            self.next();
        }
    }

    /// Items up to `end` (or end of input when `end` is None).
    fn items(&mut self, end: Option<&Tok>) -> Result<Vec<Item>, CmdError> {
        let mut items = Vec::new();
        loop {
            self.skip_seps();
            match self.peek() {
                None => {
                    if end.is_some() {
                        return Err(self.err("unexpected end of input"));
                    }
                    return Ok(items);
                }
                Some(t) if Some(t) == end => return Ok(items),
                _ => items.push(self.item()?),
            }
        }
    }

    fn item(&mut self) -> Result<Item, CmdError> {
        match self.peek() {
            Some(Tok::FuncKw) => {
                self.next();
                let name = match self.next() {
                    Some(Tok::Name(n)) => n,
                    other => return Err(self.err(format!("func: expected a name, got {other:?}"))),
                };
                self.expect(&Tok::LBrace, "{")?;
                let body = self.items(Some(&Tok::RBrace))?;
                self.expect(&Tok::RBrace, "}")?;
                Ok(Item::Func(Func {
                    name,
                    body: Block { items: body, redirs: Vec::new() },
                }))
            }
            // `< name` at item position reads commands from a file
            Some(Tok::IRedir(None)) => {
                self.next();
                let w = self
                    .word()?
                    .ok_or_else(|| self.err("source: expected a file name"))?;
                Ok(Item::Src(w))
            }
            _ => Ok(Item::Pipe(self.pipe_chain()?)),
        }
    }

    /// A pipe, with `&&`/`||` chains lowered into a single-stage `Cond`.
    fn pipe_chain(&mut self) -> Result<Pipe, CmdError> {
        let first = self.pipe()?;
        if !matches!(self.peek(), Some(Tok::AndAnd) | Some(Tok::OrOr)) {
            return Ok(first);
        }
        let mut arms = Vec::new();
        let mut cur = vec![first];
        loop {
            match self.peek() {
                Some(Tok::AndAnd) => {
                    self.next();
                    cur.push(self.pipe()?);
                }
                Some(Tok::OrOr) => {
                    self.next();
                    arms.push(OrArm { pipes: std::mem::take(&mut cur) });
                    cur.push(self.pipe()?);
                }
                _ => break,
            }
        }
        arms.push(OrArm { pipes: cur });
        Ok(Pipe::single(Cmd::Cond { arms, redirs: Vec::new() }))
    }

    fn pipe(&mut self) -> Result<Pipe, CmdError> {
        let mut stages = vec![self.cmd()?];
        let mut tags = Vec::new();
        while let Some(Tok::Pipe(tag)) = self.peek() {
            let tag = tag.clone();
            self.next();
            self.skip_seps_in_pipe();
            tags.push(tag);
            stages.push(self.cmd()?);
        }
        let bg = match self.peek() {
            Some(Tok::Bg(tag)) => {
                let t = tag.clone().unwrap_or_default();
                self.next();
                Some(t)
            }
            _ => None,
        };
        Ok(Pipe { stages, tags, bg })
    }

    /// A newline right after `|` continues the pipe on the next line.
    fn skip_seps_in_pipe(&mut self) {
        while matches!(self.peek(), Some(Tok::Nl)) {
            self.next();
        }
    }

    fn cmd(&mut self) -> Result<Cmd, CmdError> {
        match self.peek() {
            Some(Tok::LBrace) => {
                let block = self.block()?;
                Ok(Cmd::Block(block))
            }
            // `( a ; b )` in command position groups like a block
            Some(Tok::LParen) => {
                self.next();
                let items = self.items(Some(&Tok::RParen))?;
                self.expect(&Tok::RParen, ")")?;
                let redirs = self.redirs()?;
                Ok(Cmd::Block(Block { items, redirs }))
            }
            Some(Tok::For) => self.for_cmd(),
            Some(Tok::While) => self.while_cmd(),
            Some(Tok::CondKw) => self.cond_cmd(),
            Some(Tok::Name(_)) if self.is_set() => self.set_cmd(),
            _ => self.exec_cmd(),
        }
    }

    /// Lookahead: `name =` or `name [ idx ] =`.
    fn is_set(&self) -> bool {
        match self.peek_at(1) {
            Some(Tok::Eq) => true,
            Some(Tok::LBrack) => {
                // name [ word ] =
                let mut i = 2;
                let mut depth = 1;
                while depth > 0 {
                    match self.peek_at(i) {
                        Some(Tok::LBrack) => depth += 1,
                        Some(Tok::RBrack) => depth -= 1,
                        None | Some(Tok::Nl) => return false,
                        _ => {}
                    }
                    i += 1;
                }
                matches!(self.peek_at(i), Some(Tok::Eq))
            }
            _ => false,
        }
    }

    fn set_cmd(&mut self) -> Result<Cmd, CmdError> {
        let name = match self.next() {
            Some(Tok::Name(n)) => n,
            other => return Err(self.err(format!("set: expected a name, got {other:?}"))),
        };
        let idx = if matches!(self.peek(), Some(Tok::LBrack)) {
            self.next();
            let w = self
                .word()?
                .ok_or_else(|| self.err("set: expected an index"))?;
            self.expect(&Tok::RBrack, "]")?;
            Some(Box::new(w))
        } else {
            None
        };
        self.expect(&Tok::Eq, "=")?;
        // map literal: ( [k v ...] ... )
        if idx.is_none()
            && matches!(self.peek(), Some(Tok::LParen))
            && matches!(self.peek_at(1), Some(Tok::LBrack))
        {
            self.next(); // (
            let mut entries = Vec::new();
            loop {
                match self.peek() {
                    Some(Tok::LBrack) => {
                        self.next();
                        let mut entry = Vec::new();
                        while !matches!(self.peek(), Some(Tok::RBrack)) {
                            match self.word()? {
                                Some(w) => entry.push(w),
                                None => return Err(self.err("map entry: expected a word")),
                            }
                        }
                        self.expect(&Tok::RBrack, "]")?;
                        if entry.is_empty() {
                            return Err(self.err("map entry: missing key"));
                        }
                        entries.push(entry);
                    }
                    Some(Tok::RParen) => {
                        self.next();
                        break;
                    }
                    other => return Err(self.err(format!("map: unexpected {other:?}"))),
                }
            }
            return Ok(Cmd::SetMap { name, entries });
        }
        let words = self.words()?;
        Ok(Cmd::Set { name, idx, words })
    }

    fn exec_cmd(&mut self) -> Result<Cmd, CmdError> {
        let (words, redirs) = self.words_and_redirs()?;
        if words.is_empty() {
            return Err(self.err(format!("expected a command, got {:?}", self.peek())));
        }
        Ok(Cmd::Exec { words, redirs })
    }

    fn block(&mut self) -> Result<Block, CmdError> {
        self.expect(&Tok::LBrace, "{")?;
        let items = self.items(Some(&Tok::RBrace))?;
        self.expect(&Tok::RBrace, "}")?;
        let redirs = self.redirs()?;
        Ok(Block { items, redirs })
    }

    fn for_cmd(&mut self) -> Result<Cmd, CmdError> {
        self.next(); // for
        let mut words = self.words()?;
        if words.is_empty() {
            return Err(self.err("for: missing variable name"));
        }
        // `for x in a b c`: the `in` filler is surface sugar
        if words.len() > 1 && words[1] == Word::Name("in".to_string()) {
            words.remove(1);
        }
        let body = self.block()?;
        let redirs = self.redirs()?;
        Ok(Cmd::For { words, body, redirs })
    }

    fn while_cmd(&mut self) -> Result<Cmd, CmdError> {
        self.next(); // while
        let cond = self.pipe()?;
        let body = self.block()?;
        let redirs = self.redirs()?;
        Ok(Cmd::While { cond: Box::new(cond), body, redirs })
    }

    fn cond_cmd(&mut self) -> Result<Cmd, CmdError> {
        self.next(); // cond
        let mut arms = Vec::new();
        arms.push(self.cond_arm()?);
        loop {
            self.skip_seps();
            if matches!(self.peek(), Some(Tok::OrKw)) {
                self.next();
                arms.push(self.cond_arm()?);
            } else {
                break;
            }
        }
        let redirs = self.redirs()?;
        Ok(Cmd::Cond { arms, redirs })
    }

    fn cond_arm(&mut self) -> Result<OrArm, CmdError> {
        self.expect(&Tok::LBrace, "{")?;
        let items = self.items(Some(&Tok::RBrace))?;
        self.expect(&Tok::RBrace, "}")?;
        let mut pipes = Vec::new();
        for it in items {
            match it {
                Item::Pipe(p) => pipes.push(p),
                other => {
                    return Err(self.err(format!("cond: only pipes allowed, got {other:?}")))
                }
            }
        }
        Ok(OrArm { pipes })
    }

    /// Words and redirections of one command; the grammar puts redirs
    /// last but interleaving is accepted.
    fn words_and_redirs(&mut self) -> Result<(Vec<Word>, Vec<Redir>), CmdError> {
        let mut words = Vec::new();
        let mut redirs = Vec::new();
        loop {
            if let Some(r) = self.redir()? {
                redirs.push(r);
                continue;
            }
            match self.word()? {
                Some(w) => words.push(w),
                None => break,
            }
        }
        check_tags(&redirs).map_err(|m| self.err(m))?;
        Ok((words, redirs))
    }

    fn words(&mut self) -> Result<Vec<Word>, CmdError> {
        let mut words = Vec::new();
        while let Some(w) = self.word()? {
            words.push(w);
        }
        Ok(words)
    }

    fn redirs(&mut self) -> Result<Vec<Redir>, CmdError> {
        let mut redirs = Vec::new();
        while let Some(r) = self.redir()? {
            redirs.push(r);
        }
        check_tags(&redirs).map_err(|m| self.err(m))?;
        Ok(redirs)
    }

    fn redir(&mut self) -> Result<Option<Redir>, CmdError> {
        let (op, tag) = match self.peek() {
            Some(Tok::IRedir(t)) => (RedirOp::In, t.clone()),
            Some(Tok::ORedir(t)) => (RedirOp::Out, t.clone()),
            Some(Tok::Append(t)) => (RedirOp::Append, t.clone()),
            _ => return Ok(None),
        };
        self.next();
        let target = self
            .word()?
            .ok_or_else(|| self.err(format!("{op}: expected a target")))?;
        let tags: Vec<String> = tag
            .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();
        Ok(Some(Redir::new(op, tags, target)))
    }

    /// One word, with `^` binding tighter than juxtaposition.
    fn word(&mut self) -> Result<Option<Word>, CmdError> {
        let Some(mut w) = self.primary_word()? else {
            return Ok(None);
        };
        while matches!(self.peek(), Some(Tok::Caret)) {
            self.next();
            let r = self
                .primary_word()?
                .ok_or_else(|| self.err("^: expected a word"))?;
            w = Word::App(Box::new(w), Box::new(r));
        }
        Ok(Some(w))
    }

    fn primary_word(&mut self) -> Result<Option<Word>, CmdError> {
        match self.peek() {
            Some(Tok::Name(_)) | Some(Tok::Str(_)) => {
                let s = match self.next() {
                    Some(Tok::Name(s)) | Some(Tok::Str(s)) => s,
                    _ => unreachable!("peeked a word token"),
                };
                Ok(Some(Word::Name(s)))
            }
            Some(Tok::Dollar) => {
                self.next();
                let (name, idx) = self.var_ref()?;
                Ok(Some(Word::Val { name, idx }))
            }
            Some(Tok::DollarSingle) => {
                self.next();
                let (name, idx) = self.var_ref()?;
                Ok(Some(Word::Single { name, idx }))
            }
            Some(Tok::DollarLen) => {
                self.next();
                match self.next() {
                    Some(Tok::Name(n)) => Ok(Some(Word::Len(n))),
                    other => Err(self.err(format!("$#: expected a name, got {other:?}"))),
                }
            }
            Some(Tok::LParen) => {
                self.next();
                let ws = self.words()?;
                self.expect(&Tok::RParen, ")")?;
                Ok(Some(Word::Group(ws)))
            }
            Some(Tok::InBlk(tag)) => {
                let tag = tag.clone();
                self.next();
                let block = self.block()?;
                Ok(Some(Word::IoBlk { dir: IoDir::In, tag, block }))
            }
            Some(Tok::OutBlk(tag)) => {
                let tag = tag.clone();
                self.next();
                let block = self.block()?;
                Ok(Some(Word::IoBlk { dir: IoDir::Out, tag, block }))
            }
            Some(Tok::InPipeBlk(tag)) => {
                let tag = tag.clone();
                self.next();
                let block = self.block()?;
                Ok(Some(Word::IoBlk { dir: IoDir::InPipe, tag, block }))
            }
            // keywords demoted to words in word position
            Some(Tok::For) => {
                self.next();
                Ok(Some(Word::name("for")))
            }
            Some(Tok::OrKw) => {
                self.next();
                Ok(Some(Word::name("or")))
            }
            _ => Ok(None),
        }
    }

    fn var_ref(&mut self) -> Result<(String, Option<Box<Word>>), CmdError> {
        let name = match self.next() {
            Some(Tok::Name(n)) => n,
            other => return Err(self.err(format!("$: expected a name, got {other:?}"))),
        };
        let idx = if matches!(self.peek(), Some(Tok::LBrack)) {
            self.next();
            let w = self.word()?.ok_or_else(|| self.err("$name[]: expected an index"))?;
            self.expect(&Tok::RBrack, "]")?;
            Some(Box::new(w))
        } else {
            None
        };
        Ok((name, idx))
    }
}

/// Redirection tags must be unique within one node.
fn check_tags(redirs: &[Redir]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for r in redirs {
        for t in &r.tags {
            if !seen.insert(t.clone()) {
                return Err(format!("duplicate redirection tag [{t}]"));
            }
        }
    }
    Ok(())
}
