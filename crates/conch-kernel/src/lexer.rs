//! Lexer for the conch shell.
//!
//! Words are delimited by whitespace and by the punctuation set
//! `{}();|&<>^=$#[]`. Quoting: `'...'` is literal with `''` for an
//! embedded quote; backquoted text is raw; `[...]` quotes redirection and
//! connector tags. `#` starts a comment. `←` is a synonym for `=`.

use conch_types::CmdError;

/// One token of shell input.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    /// An unquoted word (may be a path, a flag, anything).
    Name(String),
    /// A quoted word; never a keyword.
    Str(String),
    Nl,
    Semi,
    /// `|` or `|[tag]`
    Pipe(Option<String>),
    /// `&` or `&tag`
    Bg(Option<String>),
    AndAnd,
    OrOr,
    /// `<` or `<[tag]`
    IRedir(Option<String>),
    /// `>` or `>[tags]`
    ORedir(Option<String>),
    /// `>>` or `>>[tag]`
    Append(Option<String>),
    /// `<{` intro (brace not consumed) or `<[tag]` followed by `{`
    InBlk(Option<String>),
    /// `>{` intro or `>[tag]` followed by `{`
    OutBlk(Option<String>),
    /// `<|{` intro, optionally tagged
    InPipeBlk(Option<String>),
    Dollar,
    DollarLen,
    DollarSingle,
    LBrace,
    RBrace,
    LBrack,
    RBrack,
    LParen,
    RParen,
    Caret,
    Eq,
    For,
    While,
    FuncKw,
    CondKw,
    OrKw,
}

/// A token plus the 1-based source line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

/// True for the runes that end a word.
fn is_punct(c: char) -> bool {
    c.is_whitespace() || "{}();|&<>^=$#[]'`←".contains(c)
}

struct Lex {
    src: Vec<char>,
    pos: usize,
    line: usize,
    out: Vec<Token>,
}

/// Tokenize a whole source text.
pub fn tokenize(src: &str) -> Result<Vec<Token>, CmdError> {
    let mut l = Lex {
        src: src.chars().collect(),
        pos: 0,
        line: 1,
        out: Vec::new(),
    };
    l.run()?;
    Ok(l.out)
}

impl Lex {
    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn emit(&mut self, tok: Tok) {
        self.out.push(Token { tok, line: self.line });
    }

    fn run(&mut self) -> Result<(), CmdError> {
        while let Some(c) = self.peek() {
            match c {
                '\n' => {
                    self.emit(Tok::Nl);
                    self.next();
                }
                c if c.is_whitespace() => {
                    self.next();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.next();
                    }
                }
                '\'' => self.quote()?,
                '`' => self.raw_quote()?,
                ';' => {
                    self.next();
                    self.emit(Tok::Semi);
                }
                '{' => {
                    self.next();
                    self.emit(Tok::LBrace);
                }
                '}' => {
                    self.next();
                    self.emit(Tok::RBrace);
                }
                '[' => {
                    self.next();
                    self.emit(Tok::LBrack);
                }
                ']' => {
                    self.next();
                    self.emit(Tok::RBrack);
                }
                '(' => {
                    self.next();
                    self.emit(Tok::LParen);
                }
                ')' => {
                    self.next();
                    self.emit(Tok::RParen);
                }
                '^' => {
                    self.next();
                    self.emit(Tok::Caret);
                }
                '=' | '←' => {
                    self.next();
                    self.emit(Tok::Eq);
                }
                '$' => {
                    self.next();
                    match self.peek() {
                        Some('#') => {
                            self.next();
                            self.emit(Tok::DollarLen);
                        }
                        Some('^') => {
                            self.next();
                            self.emit(Tok::DollarSingle);
                        }
                        _ => self.emit(Tok::Dollar),
                    }
                }
                '|' => {
                    self.next();
                    match self.peek() {
                        Some('|') => {
                            self.next();
                            self.emit(Tok::OrOr);
                        }
                        Some('[') => {
                            let tag = self.tag()?;
                            self.emit(Tok::Pipe(Some(tag)));
                        }
                        _ => self.emit(Tok::Pipe(None)),
                    }
                }
                '&' => {
                    self.next();
                    match self.peek() {
                        Some('&') => {
                            self.next();
                            self.emit(Tok::AndAnd);
                        }
                        Some(c) if !is_punct(c) => {
                            let w = self.word_text();
                            self.emit(Tok::Bg(Some(w)));
                        }
                        _ => self.emit(Tok::Bg(None)),
                    }
                }
                '<' => {
                    self.next();
                    match self.peek() {
                        Some('|') => {
                            self.next();
                            let tag = if self.peek() == Some('[') {
                                Some(self.tag()?)
                            } else {
                                None
                            };
                            self.emit(Tok::InPipeBlk(tag));
                        }
                        Some('[') => {
                            let tag = self.tag()?;
                            if self.peek() == Some('{') {
                                self.emit(Tok::InBlk(Some(tag)));
                            } else {
                                self.emit(Tok::IRedir(Some(tag)));
                            }
                        }
                        Some('{') => self.emit(Tok::InBlk(None)),
                        _ => self.emit(Tok::IRedir(None)),
                    }
                }
                '>' => {
                    self.next();
                    match self.peek() {
                        Some('>') => {
                            self.next();
                            let tag = if self.peek() == Some('[') {
                                Some(self.tag()?)
                            } else {
                                None
                            };
                            self.emit(Tok::Append(tag));
                        }
                        Some('[') => {
                            let tag = self.tag()?;
                            if self.peek() == Some('{') {
                                self.emit(Tok::OutBlk(Some(tag)));
                            } else {
                                self.emit(Tok::ORedir(Some(tag)));
                            }
                        }
                        Some('{') => self.emit(Tok::OutBlk(None)),
                        _ => self.emit(Tok::ORedir(None)),
                    }
                }
                _ => {
                    let w = self.word_text();
                    let tok = match w.as_str() {
                        "for" => Tok::For,
                        "while" => Tok::While,
                        "func" => Tok::FuncKw,
                        "cond" => Tok::CondKw,
                        "or" => Tok::OrKw,
                        _ => Tok::Name(w),
                    };
                    self.emit(tok);
                }
            }
        }
        Ok(())
    }

    fn word_text(&mut self) -> String {
        let mut w = String::new();
        while let Some(c) = self.peek() {
            if is_punct(c) {
                break;
            }
            w.push(c);
            self.next();
        }
        w
    }

    /// `[...]` after a redirection rune: the raw tag text.
    fn tag(&mut self) -> Result<String, CmdError> {
        let open = self.line;
        self.next(); // consume [
        let mut t = String::new();
        loop {
            match self.next() {
                Some(']') => return Ok(t),
                Some(c) => t.push(c),
                None => {
                    return Err(CmdError::Parse(format!("line {open}: unclosed [")))
                }
            }
        }
    }

    /// `'...'`; an embedded `''` is a literal quote.
    fn quote(&mut self) -> Result<(), CmdError> {
        let open = self.line;
        self.next(); // consume '
        let mut s = String::new();
        loop {
            match self.next() {
                Some('\'') => {
                    if self.peek() == Some('\'') {
                        self.next();
                        s.push('\'');
                    } else {
                        self.emit(Tok::Str(s));
                        return Ok(());
                    }
                }
                Some(c) => s.push(c),
                None => {
                    return Err(CmdError::Parse(format!("line {open}: unclosed quote")))
                }
            }
        }
    }

    /// Backquoted raw text.
    fn raw_quote(&mut self) -> Result<(), CmdError> {
        let open = self.line;
        self.next();
        let mut s = String::new();
        loop {
            match self.next() {
                Some('`') => {
                    self.emit(Tok::Str(s));
                    return Ok(());
                }
                Some(c) => s.push(c),
                None => {
                    return Err(CmdError::Parse(format!("line {open}: unclosed `")))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn words_and_newlines() {
        assert_eq!(
            toks("echo hi\n"),
            [Tok::Name("echo".into()), Tok::Name("hi".into()), Tok::Nl]
        );
    }

    #[test]
    fn pipes_and_tags() {
        assert_eq!(
            toks("a | b |[err] c"),
            [
                Tok::Name("a".into()),
                Tok::Pipe(None),
                Tok::Name("b".into()),
                Tok::Pipe(Some("err".into())),
                Tok::Name("c".into()),
            ]
        );
    }

    #[test]
    fn redirections() {
        assert_eq!(
            toks("a <f >g >>h >[out,err] i"),
            [
                Tok::Name("a".into()),
                Tok::IRedir(None),
                Tok::Name("f".into()),
                Tok::ORedir(None),
                Tok::Name("g".into()),
                Tok::Append(None),
                Tok::Name("h".into()),
                Tok::ORedir(Some("out,err".into())),
                Tok::Name("i".into()),
            ]
        );
    }

    #[test]
    fn io_blocks() {
        assert_eq!(
            toks("a <{b} >[x]{c} <|{d}"),
            [
                Tok::Name("a".into()),
                Tok::InBlk(None),
                Tok::LBrace,
                Tok::Name("b".into()),
                Tok::RBrace,
                Tok::OutBlk(Some("x".into())),
                Tok::LBrace,
                Tok::Name("c".into()),
                Tok::RBrace,
                Tok::InPipeBlk(None),
                Tok::LBrace,
                Tok::Name("d".into()),
                Tok::RBrace,
            ]
        );
    }

    #[test]
    fn vars_len_single() {
        assert_eq!(
            toks("$x $#x $^x $x[2]"),
            [
                Tok::Dollar,
                Tok::Name("x".into()),
                Tok::DollarLen,
                Tok::Name("x".into()),
                Tok::DollarSingle,
                Tok::Name("x".into()),
                Tok::Dollar,
                Tok::Name("x".into()),
                Tok::LBrack,
                Tok::Name("2".into()),
                Tok::RBrack,
            ]
        );
    }

    #[test]
    fn assignment_and_caret() {
        assert_eq!(
            toks("x=(a b)^$y"),
            [
                Tok::Name("x".into()),
                Tok::Eq,
                Tok::LParen,
                Tok::Name("a".into()),
                Tok::Name("b".into()),
                Tok::RParen,
                Tok::Caret,
                Tok::Dollar,
                Tok::Name("y".into()),
            ]
        );
    }

    #[test]
    fn arrow_is_eq() {
        assert_eq!(toks("x ← v"), [Tok::Name("x".into()), Tok::Eq, Tok::Name("v".into())]);
    }

    #[test]
    fn background_tags() {
        assert_eq!(toks("a &"), [Tok::Name("a".into()), Tok::Bg(None)]);
        assert_eq!(
            toks("a &job1"),
            [Tok::Name("a".into()), Tok::Bg(Some("job1".into()))]
        );
        assert_eq!(
            toks("a && b"),
            [Tok::Name("a".into()), Tok::AndAnd, Tok::Name("b".into())]
        );
    }

    #[test]
    fn quoting() {
        assert_eq!(toks("'a b'"), [Tok::Str("a b".into())]);
        assert_eq!(toks("'it''s'"), [Tok::Str("it's".into())]);
        assert_eq!(toks("`raw $x |`"), [Tok::Str("raw $x |".into())]);
        // quoted keywords stay words
        assert_eq!(toks("'for'"), [Tok::Str("for".into())]);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            toks("a # comment\nb"),
            [Tok::Name("a".into()), Tok::Nl, Tok::Name("b".into())]
        );
    }

    #[test]
    fn keywords() {
        assert_eq!(
            toks("for while func cond or"),
            [Tok::For, Tok::While, Tok::FuncKw, Tok::CondKw, Tok::OrKw]
        );
    }

    #[test]
    fn unclosed_quote_is_an_error() {
        assert!(tokenize("'abc").is_err());
        assert!(tokenize("a <[x").is_err());
    }

    #[test]
    fn lines_are_tracked() {
        let ts = tokenize("a\nb\nc").unwrap();
        assert_eq!(ts[0].line, 1);
        assert_eq!(ts[2].line, 2);
        assert_eq!(ts[4].line, 3);
    }
}
