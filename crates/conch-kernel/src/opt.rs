//! Flag parsing for builtin commands.
//!
//! Every command shares the same contract: single-rune flags introduced
//! by `-`, combinable (`-lu`), with `--` ending flag processing. A flag
//! may take a value (`-r 2,4` or `-r2,4`), repeatable. Unknown flags
//! produce a usage error naming every known flag.

use std::collections::{HashMap, HashSet};

use conch_types::CmdError;

/// A command's flag specification.
pub struct Opts {
    argv0: String,
    usage: String,
    spec: Vec<(char, &'static str)>,
    val_spec: Vec<(char, &'static str)>,
}

/// Parsed command line: flags seen plus the remaining arguments.
#[derive(Debug, Default)]
pub struct Parsed {
    pub args: Vec<String>,
    flags: HashSet<char>,
    vals: HashMap<char, Vec<String>>,
}

impl Parsed {
    pub fn has(&self, flag: char) -> bool {
        self.flags.contains(&flag)
    }

    /// All values given for a value flag, in order.
    pub fn vals(&self, flag: char) -> &[String] {
        self.vals.get(&flag).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Opts {
    /// `usage` describes the operands, e.g. `"{file}"`.
    pub fn new(argv0: impl Into<String>, usage: impl Into<String>) -> Self {
        Opts {
            argv0: argv0.into(),
            usage: usage.into(),
            spec: Vec::new(),
            val_spec: Vec::new(),
        }
    }

    /// Declare a flag.
    pub fn flag(mut self, c: char, help: &'static str) -> Self {
        self.spec.push((c, help));
        self
    }

    /// Declare a flag that takes a value.
    pub fn val_flag(mut self, c: char, help: &'static str) -> Self {
        self.val_spec.push((c, help));
        self
    }

    /// The usage text, one flag per line.
    pub fn usage(&self) -> String {
        let mut s = format!("usage: {} [flags] {}", self.argv0, self.usage);
        for (c, help) in &self.spec {
            s.push_str(&format!("\n\t-{c}: {help}"));
        }
        for (c, help) in &self.val_spec {
            s.push_str(&format!("\n\t-{c} val: {help}"));
        }
        s
    }

    fn usage_err(&self) -> CmdError {
        CmdError::Usage(self.usage())
    }

    /// Parse `argv` (without the command name).
    pub fn parse(&self, argv: &[String]) -> Result<Parsed, CmdError> {
        let mut out = Parsed::default();
        let mut i = 0;
        while i < argv.len() {
            let a = &argv[i];
            if a == "--" {
                i += 1;
                break;
            }
            let Some(flags) = a.strip_prefix('-') else {
                // flags stop at the first operand
                break;
            };
            if flags.is_empty() {
                break;
            }
            let cs: Vec<char> = flags.chars().collect();
            let mut k = 0;
            while k < cs.len() {
                let c = cs[k];
                if self.val_spec.iter().any(|(f, _)| *f == c) {
                    // the rest of the token, or the next argument
                    let val: String = if k + 1 < cs.len() {
                        cs[k + 1..].iter().collect()
                    } else {
                        i += 1;
                        argv.get(i).ok_or_else(|| self.usage_err())?.clone()
                    };
                    out.vals.entry(c).or_default().push(val);
                    break;
                }
                if !self.spec.iter().any(|(f, _)| *f == c) {
                    return Err(self.usage_err());
                }
                out.flags.insert(c);
                k += 1;
            }
            i += 1;
        }
        out.args.extend(argv[i..].iter().cloned());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn combined_flags() {
        let o = Opts::new("cnt", "{file}").flag('l', "lines").flag('u', "unix out");
        let p = o.parse(&argv(&["-lu", "f1", "f2"])).unwrap();
        assert!(p.has('l'));
        assert!(p.has('u'));
        assert_eq!(p.args, ["f1", "f2"]);
    }

    #[test]
    fn flags_stop_at_first_operand() {
        let o = Opts::new("t", "{file}").flag('x', "x");
        let p = o.parse(&argv(&["file", "-x"])).unwrap();
        assert!(!p.has('x'));
        assert_eq!(p.args, ["file", "-x"]);
    }

    #[test]
    fn double_dash_ends_flags() {
        let o = Opts::new("t", "{file}").flag('x', "x");
        let p = o.parse(&argv(&["-x", "--", "-notaflag"])).unwrap();
        assert!(p.has('x'));
        assert_eq!(p.args, ["-notaflag"]);
    }

    #[test]
    fn unknown_flag_is_usage() {
        let o = Opts::new("t", "{file}").flag('x', "x");
        match o.parse(&argv(&["-z"])) {
            Err(CmdError::Usage(u)) => assert!(u.contains("-x: x")),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn lone_dash_is_an_operand() {
        let o = Opts::new("t", "{file}");
        let p = o.parse(&argv(&["-"])).unwrap();
        assert_eq!(p.args, ["-"]);
    }

    #[test]
    fn value_flags_take_the_next_arg() {
        let o = Opts::new("lns", "{file}").val_flag('r', "range");
        let p = o.parse(&argv(&["-r", "2,-2", "f"])).unwrap();
        assert_eq!(p.vals('r'), ["2,-2"]);
        assert_eq!(p.args, ["f"]);
    }

    #[test]
    fn value_flags_accept_attached_values_and_repeat() {
        let o = Opts::new("lns", "{file}").val_flag('r', "range");
        let p = o.parse(&argv(&["-r1", "-r", "-3,-1"])).unwrap();
        assert_eq!(p.vals('r'), ["1", "-3,-1"]);
    }

    #[test]
    fn missing_value_is_usage() {
        let o = Opts::new("lns", "{file}").val_flag('r', "range");
        assert!(matches!(o.parse(&argv(&["-r"])), Err(CmdError::Usage(_))));
    }
}
