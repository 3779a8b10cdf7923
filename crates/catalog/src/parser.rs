// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-oriented stanza parser for job configuration files.
//!
//! Each file defines one job class. Lines hold one stanza each; `#` starts a
//! comment; `script`/`end script` delimit inline shell bodies. Parsing
//! produces a [`ClassBuilder`] so `@` override fragments can be merged on
//! top of a base definition before the final [`JobClass`] is built.

use crate::class::JobClass;
use crate::expression::{parse_expression, ExprParseError};
use ember_core::env::is_valid_name;
use ember_core::job::signal_number;
use ember_core::{CommandLine, ConsoleMode, ExitStatus, ExpectMode, ProcessKind, ResourceLimit};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: unknown stanza '{stanza}'")]
    UnknownStanza { line: usize, stanza: String },

    #[error("line {line}: expected {expected}")]
    Expected { line: usize, expected: String },

    #[error("line {line}: {message}")]
    Invalid { line: usize, message: String },

    #[error("line {line}: duplicate '{stanza}' stanza")]
    Duplicate { line: usize, stanza: String },

    #[error("line {line}: 'script' without matching 'end script'")]
    UnterminatedScript { line: usize },

    #[error("line {line}: bad event expression: {source}")]
    Expression {
        line: usize,
        source: ExprParseError,
    },
}

/// Partially specified class, the unit override merging operates on.
#[derive(Debug, Clone, Default)]
pub struct ClassBuilder {
    task: Option<bool>,
    manual: Option<bool>,
    start_on: Option<String>,
    stop_on: Option<String>,
    emits: Vec<String>,
    pre_start: Option<CommandLine>,
    main: Option<CommandLine>,
    post_start: Option<CommandLine>,
    pre_stop: Option<CommandLine>,
    post_stop: Option<CommandLine>,
    instance: Option<String>,
    respawn: Option<bool>,
    respawn_limit: Option<(u32, u32)>,
    normal_exit: Vec<ExitStatus>,
    expect: Option<ExpectMode>,
    kill_timeout: Option<u32>,
    kill_signal: Option<i32>,
    console: Option<ConsoleMode>,
    env: Vec<(String, String)>,
    export: Vec<String>,
    chdir: Option<PathBuf>,
    chroot: Option<PathBuf>,
    umask: Option<u32>,
    nice: Option<i32>,
    oom_score: Option<i32>,
    limits: Vec<ResourceLimit>,
    setuid: Option<String>,
    setgid: Option<String>,
    usage: Option<String>,
    description: Option<String>,
    author: Option<String>,
    version: Option<String>,
}

impl ClassBuilder {
    /// True when the fragment defines any process stanza. Overrides may not.
    pub fn has_process_stanzas(&self) -> bool {
        self.pre_start.is_some()
            || self.main.is_some()
            || self.post_start.is_some()
            || self.pre_stop.is_some()
            || self.post_stop.is_some()
    }

    /// Apply an override fragment on top of this builder.
    ///
    /// Scalar fields from the override win; list fields append. Process
    /// stanzas in the override are ignored; the caller reports them.
    pub fn merge_override(&mut self, other: &ClassBuilder) {
        macro_rules! take {
            ($($field:ident),+ $(,)?) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })+
            };
        }
        take!(
            task, manual, start_on, stop_on, instance, respawn, respawn_limit, expect,
            kill_timeout, kill_signal, console, chdir, chroot, umask, nice, oom_score, setuid,
            setgid, usage, description, author, version,
        );
        self.emits.extend(other.emits.iter().cloned());
        self.normal_exit.extend(other.normal_exit.iter().cloned());
        self.env.extend(other.env.iter().cloned());
        self.export.extend(other.export.iter().cloned());
        self.limits.extend(other.limits.iter().cloned());
    }

    /// Finish the builder into a class named `name`.
    pub fn build(self, name: impl Into<String>) -> Result<JobClass, ParseError> {
        let mut class = JobClass::empty(name);
        if let Some(task) = self.task {
            class.task = task;
        }
        if let Some(manual) = self.manual {
            class.manual = manual;
        }
        if let Some(text) = &self.start_on {
            class.start_on =
                Some(parse_expression(text).map_err(|source| ParseError::Expression {
                    line: 0,
                    source,
                })?);
        }
        if let Some(text) = &self.stop_on {
            class.stop_on =
                Some(parse_expression(text).map_err(|source| ParseError::Expression {
                    line: 0,
                    source,
                })?);
        }
        class.emits = self.emits;
        class.pre_start = self.pre_start;
        class.main = self.main;
        class.post_start = self.post_start;
        class.pre_stop = self.pre_stop;
        class.post_stop = self.post_stop;
        if let Some(instance) = self.instance {
            class.instance = instance;
        }
        if let Some(respawn) = self.respawn {
            class.respawn = respawn;
        }
        if let Some(limit) = self.respawn_limit {
            class.respawn_limit = limit;
        }
        class.normal_exit = self.normal_exit;
        if let Some(expect) = self.expect {
            class.expect = expect;
        }
        if let Some(timeout) = self.kill_timeout {
            class.kill_timeout = timeout;
        }
        if let Some(signal) = self.kill_signal {
            class.kill_signal = signal;
        }
        if let Some(console) = self.console {
            class.console = console;
        }
        class.env = self.env;
        class.export = self.export;
        class.chdir = self.chdir;
        class.chroot = self.chroot;
        class.umask = self.umask;
        class.nice = self.nice;
        class.oom_score = self.oom_score;
        class.limits = self.limits;
        class.setuid = self.setuid;
        class.setgid = self.setgid;
        class.usage = self.usage;
        class.description = self.description;
        class.author = self.author;
        class.version = self.version;
        Ok(class)
    }
}

/// Parse a complete class definition.
pub fn parse_class(name: &str, content: &str) -> Result<JobClass, ParseError> {
    parse_fragment(content)?.build(name)
}

/// Parse a file into a builder, for later override merging.
pub fn parse_fragment(content: &str) -> Result<ClassBuilder, ParseError> {
    let mut builder = ClassBuilder::default();
    let mut lines = content.lines().enumerate().peekable();

    while let Some((index, raw)) = lines.next() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (stanza, rest) = split_stanza(line);
        match stanza {
            "exec" => {
                set_process(
                    &mut builder,
                    ProcessKind::Main,
                    exec_command(rest, line_no)?,
                    line_no,
                )?;
            }
            "script" => {
                let body = read_script(&mut lines, line_no)?;
                set_process(
                    &mut builder,
                    ProcessKind::Main,
                    CommandLine::Script(body),
                    line_no,
                )?;
            }
            "pre-start" | "post-start" | "pre-stop" | "post-stop" => {
                let kind = match stanza {
                    "pre-start" => ProcessKind::PreStart,
                    "post-start" => ProcessKind::PostStart,
                    "pre-stop" => ProcessKind::PreStop,
                    _ => ProcessKind::PostStop,
                };
                let (sub, sub_rest) = split_stanza(rest);
                let command = match sub {
                    "exec" => exec_command(sub_rest, line_no)?,
                    "script" => CommandLine::Script(read_script(&mut lines, line_no)?),
                    _ => {
                        return Err(ParseError::Expected {
                            line: line_no,
                            expected: format!("'exec' or 'script' after '{}'", stanza),
                        })
                    }
                };
                set_process(&mut builder, kind, command, line_no)?;
            }
            "start" | "stop" => {
                let (sub, expr_text) = split_stanza(rest);
                if sub != "on" {
                    return Err(ParseError::Expected {
                        line: line_no,
                        expected: format!("'on' after '{}'", stanza),
                    });
                }
                // Validate now so the error carries the line number
                parse_expression(expr_text)
                    .map_err(|source| ParseError::Expression {
                        line: line_no,
                        source,
                    })?;
                let slot = if stanza == "start" {
                    &mut builder.start_on
                } else {
                    &mut builder.stop_on
                };
                set_scalar(slot, expr_text.to_string(), stanza, line_no)?;
            }
            "emits" => {
                if rest.is_empty() {
                    return Err(ParseError::Expected {
                        line: line_no,
                        expected: "event names after 'emits'".into(),
                    });
                }
                builder.emits.extend(rest.split_whitespace().map(String::from));
            }
            "instance" => {
                set_scalar(
                    &mut builder.instance,
                    required(rest, "instance template", line_no)?.to_string(),
                    stanza,
                    line_no,
                )?;
            }
            "respawn" => {
                if rest.is_empty() {
                    builder.respawn = Some(true);
                } else {
                    let (sub, args) = split_stanza(rest);
                    if sub != "limit" {
                        return Err(ParseError::Expected {
                            line: line_no,
                            expected: "'limit' after 'respawn'".into(),
                        });
                    }
                    let limit = parse_respawn_limit(args, line_no)?;
                    set_scalar(&mut builder.respawn_limit, limit, "respawn limit", line_no)?;
                }
            }
            "normal" => {
                let (sub, args) = split_stanza(rest);
                if sub != "exit" {
                    return Err(ParseError::Expected {
                        line: line_no,
                        expected: "'exit' after 'normal'".into(),
                    });
                }
                if args.is_empty() {
                    return Err(ParseError::Expected {
                        line: line_no,
                        expected: "exit codes or signal names after 'normal exit'".into(),
                    });
                }
                for token in args.split_whitespace() {
                    builder.normal_exit.push(parse_exit_token(token, line_no)?);
                }
            }
            "expect" => {
                let mode = match required(rest, "'none', 'fork', 'daemon' or 'stop'", line_no)? {
                    "none" => ExpectMode::None,
                    "fork" => ExpectMode::Fork,
                    "daemon" => ExpectMode::Daemon,
                    "stop" => ExpectMode::Stop,
                    other => {
                        return Err(ParseError::Invalid {
                            line: line_no,
                            message: format!("unknown expect mode '{}'", other),
                        })
                    }
                };
                set_scalar(&mut builder.expect, mode, stanza, line_no)?;
            }
            "kill" => {
                let (sub, args) = split_stanza(rest);
                match sub {
                    "timeout" => {
                        let secs: u32 = parse_number(args, "kill timeout seconds", line_no)?;
                        set_scalar(&mut builder.kill_timeout, secs, "kill timeout", line_no)?;
                    }
                    "signal" => {
                        let signal = signal_number(args).ok_or_else(|| ParseError::Invalid {
                            line: line_no,
                            message: format!("unknown signal '{}'", args),
                        })?;
                        set_scalar(&mut builder.kill_signal, signal, "kill signal", line_no)?;
                    }
                    _ => {
                        return Err(ParseError::Expected {
                            line: line_no,
                            expected: "'timeout' or 'signal' after 'kill'".into(),
                        })
                    }
                }
            }
            "console" => {
                let mode = match required(rest, "'none', 'log', 'owner' or 'output'", line_no)? {
                    "none" => ConsoleMode::None,
                    "log" => ConsoleMode::Log,
                    "owner" => ConsoleMode::Owner,
                    "output" => ConsoleMode::Output,
                    other => {
                        return Err(ParseError::Invalid {
                            line: line_no,
                            message: format!("unknown console mode '{}'", other),
                        })
                    }
                };
                set_scalar(&mut builder.console, mode, stanza, line_no)?;
            }
            "env" => {
                let pair = required(rest, "KEY=VALUE after 'env'", line_no)?;
                let (key, value) = match pair.split_once('=') {
                    Some((k, v)) => (k, v),
                    None => (pair, ""),
                };
                if !is_valid_name(key) {
                    return Err(ParseError::Invalid {
                        line: line_no,
                        message: format!("invalid variable name '{}'", key),
                    });
                }
                builder.env.push((key.to_string(), value.to_string()));
            }
            "export" => {
                if rest.is_empty() {
                    return Err(ParseError::Expected {
                        line: line_no,
                        expected: "variable names after 'export'".into(),
                    });
                }
                for key in rest.split_whitespace() {
                    if !is_valid_name(key) {
                        return Err(ParseError::Invalid {
                            line: line_no,
                            message: format!("invalid variable name '{}'", key),
                        });
                    }
                    builder.export.push(key.to_string());
                }
            }
            "chdir" => {
                let path = required(rest, "directory after 'chdir'", line_no)?;
                set_scalar(&mut builder.chdir, PathBuf::from(path), stanza, line_no)?;
            }
            "chroot" => {
                let path = required(rest, "directory after 'chroot'", line_no)?;
                set_scalar(&mut builder.chroot, PathBuf::from(path), stanza, line_no)?;
            }
            "umask" => {
                let text = required(rest, "octal mask after 'umask'", line_no)?;
                let mask = u32::from_str_radix(text, 8).map_err(|_| ParseError::Invalid {
                    line: line_no,
                    message: format!("invalid umask '{}'", text),
                })?;
                set_scalar(&mut builder.umask, mask, stanza, line_no)?;
            }
            "nice" => {
                let value: i32 = parse_number(rest, "nice value", line_no)?;
                if !(-20..=19).contains(&value) {
                    return Err(ParseError::Invalid {
                        line: line_no,
                        message: format!("nice value {} out of range", value),
                    });
                }
                set_scalar(&mut builder.nice, value, stanza, line_no)?;
            }
            "oom" => {
                let (sub, args) = split_stanza(rest);
                if sub != "score" {
                    return Err(ParseError::Expected {
                        line: line_no,
                        expected: "'score' after 'oom'".into(),
                    });
                }
                let value = if args == "never" {
                    -1000
                } else {
                    parse_number(args, "oom score", line_no)?
                };
                if !(-1000..=1000).contains(&value) {
                    return Err(ParseError::Invalid {
                        line: line_no,
                        message: format!("oom score {} out of range", value),
                    });
                }
                set_scalar(&mut builder.oom_score, value, "oom score", line_no)?;
            }
            "limit" => {
                let mut words = rest.split_whitespace();
                let resource = words.next().ok_or_else(|| ParseError::Expected {
                    line: line_no,
                    expected: "resource name after 'limit'".into(),
                })?;
                let soft = parse_limit_value(words.next(), line_no)?;
                let hard = parse_limit_value(words.next(), line_no)?;
                if words.next().is_some() {
                    return Err(ParseError::Invalid {
                        line: line_no,
                        message: "trailing tokens after 'limit'".into(),
                    });
                }
                builder.limits.push(ResourceLimit {
                    resource: resource.to_string(),
                    soft,
                    hard,
                });
            }
            "setuid" => {
                let user = required(rest, "user name after 'setuid'", line_no)?;
                set_scalar(&mut builder.setuid, user.to_string(), stanza, line_no)?;
            }
            "setgid" => {
                let group = required(rest, "group name after 'setgid'", line_no)?;
                set_scalar(&mut builder.setgid, group.to_string(), stanza, line_no)?;
            }
            "task" => {
                expect_bare(rest, stanza, line_no)?;
                builder.task = Some(true);
            }
            "manual" => {
                expect_bare(rest, stanza, line_no)?;
                builder.manual = Some(true);
            }
            "usage" => {
                set_scalar(
                    &mut builder.usage,
                    unquote(required(rest, "text after 'usage'", line_no)?),
                    stanza,
                    line_no,
                )?;
            }
            "description" => {
                set_scalar(
                    &mut builder.description,
                    unquote(required(rest, "text after 'description'", line_no)?),
                    stanza,
                    line_no,
                )?;
            }
            "author" => {
                set_scalar(
                    &mut builder.author,
                    unquote(required(rest, "text after 'author'", line_no)?),
                    stanza,
                    line_no,
                )?;
            }
            "version" => {
                set_scalar(
                    &mut builder.version,
                    unquote(required(rest, "text after 'version'", line_no)?),
                    stanza,
                    line_no,
                )?;
            }
            "end" => {
                return Err(ParseError::Invalid {
                    line: line_no,
                    message: "'end script' without matching 'script'".into(),
                });
            }
            other => {
                return Err(ParseError::UnknownStanza {
                    line: line_no,
                    stanza: other.to_string(),
                });
            }
        }
    }

    Ok(builder)
}

/// Split a line into its first word and the trimmed remainder.
fn split_stanza(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    }
}

fn exec_command(rest: &str, line: usize) -> Result<CommandLine, ParseError> {
    if rest.is_empty() {
        return Err(ParseError::Expected {
            line,
            expected: "command after 'exec'".into(),
        });
    }
    Ok(CommandLine::Exec(rest.to_string()))
}

fn set_process(
    builder: &mut ClassBuilder,
    kind: ProcessKind,
    command: CommandLine,
    line: usize,
) -> Result<(), ParseError> {
    let slot = match kind {
        ProcessKind::PreStart => &mut builder.pre_start,
        ProcessKind::Main => &mut builder.main,
        ProcessKind::PostStart => &mut builder.post_start,
        ProcessKind::PreStop => &mut builder.pre_stop,
        ProcessKind::PostStop => &mut builder.post_stop,
    };
    if slot.is_some() {
        return Err(ParseError::Duplicate {
            line,
            stanza: kind.to_string(),
        });
    }
    *slot = Some(command);
    Ok(())
}

fn set_scalar<T>(
    slot: &mut Option<T>,
    value: T,
    stanza: &str,
    line: usize,
) -> Result<(), ParseError> {
    if slot.is_some() {
        return Err(ParseError::Duplicate {
            line,
            stanza: stanza.to_string(),
        });
    }
    *slot = Some(value);
    Ok(())
}

/// Collect script body lines until `end script`.
fn read_script(
    lines: &mut std::iter::Peekable<std::iter::Enumerate<std::str::Lines<'_>>>,
    start_line: usize,
) -> Result<String, ParseError> {
    let mut body = String::new();
    for (_, raw) in lines.by_ref() {
        if raw.trim() == "end script" {
            return Ok(body);
        }
        body.push_str(raw);
        body.push('\n');
    }
    Err(ParseError::UnterminatedScript { line: start_line })
}

fn required<'a>(rest: &'a str, expected: &str, line: usize) -> Result<&'a str, ParseError> {
    if rest.is_empty() {
        Err(ParseError::Expected {
            line,
            expected: expected.to_string(),
        })
    } else {
        Ok(rest)
    }
}

fn expect_bare(rest: &str, stanza: &str, line: usize) -> Result<(), ParseError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(ParseError::Invalid {
            line,
            message: format!("unexpected argument after '{}'", stanza),
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    text: &str,
    what: &str,
    line: usize,
) -> Result<T, ParseError> {
    text.parse().map_err(|_| ParseError::Invalid {
        line,
        message: format!("invalid {} '{}'", what, text),
    })
}

fn parse_respawn_limit(args: &str, line: usize) -> Result<(u32, u32), ParseError> {
    if args == "unlimited" {
        return Ok((0, 0));
    }
    let mut words = args.split_whitespace();
    let count: u32 = parse_number(
        words.next().unwrap_or_default(),
        "respawn limit count",
        line,
    )?;
    let window: u32 = parse_number(
        words.next().unwrap_or_default(),
        "respawn limit window",
        line,
    )?;
    if words.next().is_some() {
        return Err(ParseError::Invalid {
            line,
            message: "trailing tokens after 'respawn limit'".into(),
        });
    }
    Ok((count, window))
}

fn parse_exit_token(token: &str, line: usize) -> Result<ExitStatus, ParseError> {
    if let Ok(code) = token.parse::<i32>() {
        return Ok(ExitStatus::Code(code));
    }
    signal_number(token)
        .map(ExitStatus::Signal)
        .ok_or_else(|| ParseError::Invalid {
            line,
            message: format!("invalid exit status '{}'", token),
        })
}

fn parse_limit_value(token: Option<&str>, line: usize) -> Result<u64, ParseError> {
    match token {
        None => Err(ParseError::Expected {
            line,
            expected: "soft and hard values after 'limit'".into(),
        }),
        Some("unlimited") => Ok(u64::MAX),
        Some(text) => parse_number(text, "limit value", line),
    }
}

fn unquote(text: &str) -> String {
    let trimmed = text.trim();
    let stripped = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| {
            trimmed
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
        });
    stripped.unwrap_or(trimmed).to_string()
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
