use super::{Lock, ParseResult, ThreadRecord, ThreadState};
use std::fmt;
use std::io::BufRead;
use tracing::debug;

const SYNCHRONIZER_COUNT_PREFIX: &str = "Number of locked synchronizers";

/// Why a dump was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Header line that does not follow `"<name>" Id=<id> <STATE> ...`
    MalformedHeader(&'static str),
    UnknownState(String),
    /// Line inside a thread block that matches no known form
    UnexpectedLine,
    InvalidSynchronizerCount,
    SynchronizerCountMismatch { declared: usize, found: usize },
    /// `- waiting on` / `- blocked on` naming a different lock than the header
    WaitTargetMismatch { header: String, annotation: String },
    Io(String),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::MalformedHeader(reason) => write!(f, "malformed thread header: {}", reason),
            ParseErrorKind::UnknownState(state) => write!(f, "unknown thread state '{}'", state),
            ParseErrorKind::UnexpectedLine => write!(f, "unexpected line in thread block"),
            ParseErrorKind::InvalidSynchronizerCount => {
                write!(f, "locked synchronizer count is not a number")
            }
            ParseErrorKind::SynchronizerCountMismatch { declared, found } => write!(
                f,
                "declared {} locked synchronizers but found {}",
                declared, found
            ),
            ParseErrorKind::WaitTargetMismatch { header, annotation } => write!(
                f,
                "header waits on {} but annotation names {}",
                header, annotation
            ),
            ParseErrorKind::Io(e) => write!(f, "failed to read dump: {}", e),
        }
    }
}

/// A rejected dump, with the line that caused it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line number
    pub line_number: usize,
    pub line: String,
    pub kind: ParseErrorKind,
}

impl ParseError {
    fn new(line_number: usize, line: &str, kind: ParseErrorKind) -> Self {
        Self {
            line_number,
            line: line.to_string(),
            kind,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {:?}", self.line_number, self.kind, self.line)
    }
}

impl std::error::Error for ParseError {}

/// Parser for the thread dump a JVM prints for deadlocked threads.
///
/// Stateless: every call builds its own parse state, so one parser can be
/// shared between threads.
///
/// Recognised lines (leading whitespace is ignored):
/// - `"<name>" Id=<id> <STATE>[ on <lock> owned by "<owner>" Id=<owner-id>]`,
///   optionally with `daemon` and `prio=<n>` before `Id=`
/// - `at <frame>`
/// - `- waiting on <lock>`, `- blocked on <lock>`, `- locked <lock>`
/// - `...` (truncated stack)
/// - `Number of locked synchronizers = <n>` followed by `n` lines `- <lock>`
///
/// Blank lines are skipped and text before the first header is ignored.
/// Anything else fails the whole call; there are no partial results.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadlockParser;

impl DeadlockParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_str(&self, text: &str) -> Result<ParseResult, ParseError> {
        let mut state = ParseState::default();
        for (index, line) in text.lines().enumerate() {
            state.feed(index + 1, line)?;
        }
        state.finish()
    }

    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<ParseResult, ParseError> {
        let mut state = ParseState::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line
                .map_err(|e| ParseError::new(index + 1, "", ParseErrorKind::Io(e.to_string())))?;
            state.feed(index + 1, &line)?;
        }
        state.finish()
    }
}

/// Parse a dump held in memory.
pub fn parse_str(text: &str) -> Result<ParseResult, ParseError> {
    DeadlockParser::new().parse_str(text)
}

#[derive(Default)]
struct ParseState {
    threads: Vec<ThreadRecord>,
    current: Option<PendingThread>,
}

impl ParseState {
    fn feed(&mut self, line_number: usize, raw: &str) -> Result<(), ParseError> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(());
        }

        if line.starts_with('"') {
            self.complete_current()?;
            let record = parse_header(line)
                .map_err(|kind| ParseError::new(line_number, raw, kind))?;
            self.current = Some(PendingThread {
                record,
                synchronizers: None,
            });
            return Ok(());
        }

        match self.current.as_mut() {
            Some(thread) => thread
                .accept(line_number, line)
                .map_err(|kind| ParseError::new(line_number, raw, kind)),
            // Preamble such as "No Deadlocks Detected."
            None => Ok(()),
        }
    }

    fn complete_current(&mut self) -> Result<(), ParseError> {
        if let Some(thread) = self.current.take() {
            self.threads.push(thread.complete()?);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<ParseResult, ParseError> {
        self.complete_current()?;
        debug!(threads = self.threads.len(), "Parsed deadlock dump");
        Ok(ParseResult {
            threads: self.threads,
        })
    }
}

/// Declared synchronizer section of the current block
struct SynchronizerSection {
    declared: usize,
    line_number: usize,
    line: String,
}

struct PendingThread {
    record: ThreadRecord,
    synchronizers: Option<SynchronizerSection>,
}

impl PendingThread {
    fn accept(&mut self, line_number: usize, line: &str) -> Result<(), ParseErrorKind> {
        if let Some(section) = &self.synchronizers {
            // Only synchronizer entries may follow the count line
            let lock_id = line
                .strip_prefix('-')
                .map(str::trim_start)
                .filter(|id| !id.is_empty())
                .ok_or(ParseErrorKind::UnexpectedLine)?;

            let found = self.record.owned_locks.len() + 1;
            if found > section.declared {
                return Err(ParseErrorKind::SynchronizerCountMismatch {
                    declared: section.declared,
                    found,
                });
            }
            let owner = self.record.id.clone();
            self.record.owned_locks.push(Lock::new(lock_id, owner));
            return Ok(());
        }

        if let Some(frame) = line.strip_prefix("at ") {
            self.record.stack_trace.push(frame.trim_start().to_string());
            return Ok(());
        }

        if line == "..." {
            return Ok(());
        }

        if let Some(rest) = line.strip_prefix(SYNCHRONIZER_COUNT_PREFIX) {
            let declared = rest
                .trim_start()
                .strip_prefix('=')
                .and_then(|n| n.trim().parse::<usize>().ok())
                .ok_or(ParseErrorKind::InvalidSynchronizerCount)?;
            self.synchronizers = Some(SynchronizerSection {
                declared,
                line_number,
                line: line.to_string(),
            });
            return Ok(());
        }

        if let Some(annotation) = line.strip_prefix('-') {
            return self.accept_annotation(annotation.trim_start());
        }

        Err(ParseErrorKind::UnexpectedLine)
    }

    fn accept_annotation(&mut self, annotation: &str) -> Result<(), ParseErrorKind> {
        let waited = annotation
            .strip_prefix("waiting on ")
            .or_else(|| annotation.strip_prefix("blocked on "));

        if let Some(lock_id) = waited {
            let lock_id = lock_id.trim();
            if let Some(lock) = &self.record.waiting_on {
                if lock.id != lock_id {
                    return Err(ParseErrorKind::WaitTargetMismatch {
                        header: lock.id.clone(),
                        annotation: lock_id.to_string(),
                    });
                }
            }
            return Ok(());
        }

        if let Some(lock_id) = annotation.strip_prefix("locked ") {
            let owner = self.record.id.clone();
            self.record.locked_monitors.push(Lock::new(lock_id.trim(), owner));
            return Ok(());
        }

        Err(ParseErrorKind::UnexpectedLine)
    }

    fn complete(self) -> Result<ThreadRecord, ParseError> {
        if let Some(section) = self.synchronizers {
            let found = self.record.owned_locks.len();
            if found != section.declared {
                return Err(ParseError::new(
                    section.line_number,
                    &section.line,
                    ParseErrorKind::SynchronizerCountMismatch {
                        declared: section.declared,
                        found,
                    },
                ));
            }
        }
        Ok(self.record)
    }
}

/// Parse `"<name>" Id=<id> <STATE>[ on <lock> owned by "<owner>" Id=<owner-id>]`.
fn parse_header(line: &str) -> Result<ThreadRecord, ParseErrorKind> {
    let rest = line
        .strip_prefix('"')
        .ok_or(ParseErrorKind::MalformedHeader("thread name must be quoted"))?;

    let (name, rest) = split_name(rest)?;

    let (id, rest) = split_token(rest);
    if id.is_empty() {
        return Err(ParseErrorKind::MalformedHeader("missing thread id"));
    }

    let (state_token, rest) = split_token(rest);
    if state_token.is_empty() {
        return Err(ParseErrorKind::MalformedHeader("missing thread state"));
    }
    let state = ThreadState::from_token(state_token)
        .ok_or_else(|| ParseErrorKind::UnknownState(state_token.to_string()))?;

    let mut record = ThreadRecord {
        name: name.to_string(),
        id: id.to_string(),
        state,
        waiting_on: None,
        lock_owner_name: None,
        owned_locks: Vec::new(),
        locked_monitors: Vec::new(),
        stack_trace: Vec::new(),
    };

    let rest = strip_markers(rest);
    if rest.is_empty() {
        return Ok(record);
    }

    let wait = rest
        .strip_prefix("on ")
        .ok_or(ParseErrorKind::MalformedHeader("unexpected text after thread state"))?;

    let (lock_id, owner) = wait
        .split_once(" owned by \"")
        .ok_or(ParseErrorKind::MalformedHeader("wait target without owner"))?;
    let lock_id = lock_id.trim();
    if lock_id.is_empty() {
        return Err(ParseErrorKind::MalformedHeader("missing lock identity"));
    }

    let (owner_name, owner_id) = owner
        .rsplit_once("\" Id=")
        .ok_or(ParseErrorKind::MalformedHeader("missing lock owner id"))?;
    let owner_id = owner_id.trim();
    if owner_id.is_empty() || owner_id.contains(char::is_whitespace) {
        return Err(ParseErrorKind::MalformedHeader("missing lock owner id"));
    }

    record.waiting_on = Some(Lock::new(lock_id, owner_id));
    record.lock_owner_name = (!owner_name.is_empty()).then(|| owner_name.to_string());
    Ok(record)
}

/// Split the quoted thread name from the text after `Id=`.
///
/// Newer JVMs print `daemon` and `prio=N` between the name and the id; both
/// are skipped. Names that themselves contain `" ` fall back to the first
/// `" Id=` in the line.
fn split_name(s: &str) -> Result<(&str, &str), ParseErrorKind> {
    if let Some((name, mut rest)) = s.split_once("\" ") {
        loop {
            rest = rest.trim_start();
            if let Some(id_rest) = rest.strip_prefix("Id=") {
                return Ok((name, id_rest));
            }
            let (token, tail) = split_token(rest);
            if token == "daemon" || is_priority(token) {
                rest = tail;
            } else {
                break;
            }
        }
    }

    s.split_once("\" Id=")
        .ok_or(ParseErrorKind::MalformedHeader("missing thread id"))
}

fn is_priority(token: &str) -> bool {
    token
        .strip_prefix("prio=")
        .is_some_and(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

/// Split off the first whitespace-delimited token.
fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(end) => (&s[..end], s[end..].trim_start()),
        None => (s, ""),
    }
}

/// Drop trailing ` (suspended)` / ` (in native)` markers.
fn strip_markers(mut s: &str) -> &str {
    loop {
        let trimmed = s.trim_end();
        match trimmed
            .strip_suffix("(suspended)")
            .or_else(|| trimmed.strip_suffix("(in native)"))
        {
            Some(rest) => s = rest,
            None => return trimmed,
        }
    }
}
