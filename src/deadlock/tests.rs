use super::*;
use std::io::{BufReader, Cursor};

const SINGLE_THREAD: &str = "\"Alice\" Id=8 WAITING on L@1 owned by \"Bob\" Id=9\n\
\tat com.foo.Bar.run(Bar.java:1337)\n\
\n\
\tNumber of locked synchronizers = 1\n\
\t- L2@2\n";

const PHILOSOPHERS: &str = "\
\"Mallory\" Id=12 WAITING on java.util.concurrent.locks.ReentrantLock$NonfairSync@52de95c7 owned by \"Alice\" Id=10
\tat sun.misc.Unsafe.park(Native Method)
\t-  waiting on java.util.concurrent.locks.ReentrantLock$NonfairSync@52de95c7
\tat java.util.concurrent.locks.LockSupport.park(LockSupport.java:175)
\tat java.util.concurrent.locks.AbstractQueuedSynchronizer.parkAndCheckInterrupt(AbstractQueuedSynchronizer.java:836)
\tat java.util.concurrent.locks.AbstractQueuedSynchronizer.acquireQueued(AbstractQueuedSynchronizer.java:870)
\tat java.util.concurrent.locks.AbstractQueuedSynchronizer.acquire(AbstractQueuedSynchronizer.java:1199)
\tat java.util.concurrent.locks.ReentrantLock$NonfairSync.lock(ReentrantLock.java:209)
\tat java.util.concurrent.locks.ReentrantLock.lock(ReentrantLock.java:285)
\tat com.example.DeadLock$Philosopher.run(DeadLock.java:57)
\t...

\tNumber of locked synchronizers = 1
\t- java.util.concurrent.locks.ReentrantLock$NonfairSync@441634c2


\"Alice\" Id=10 WAITING on java.util.concurrent.locks.ReentrantLock$NonfairSync@105ff84e owned by \"Bob\" Id=11
\tat sun.misc.Unsafe.park(Native Method)
\t-  waiting on java.util.concurrent.locks.ReentrantLock$NonfairSync@105ff84e
\tat java.util.concurrent.locks.LockSupport.park(LockSupport.java:175)
\tat java.util.concurrent.locks.AbstractQueuedSynchronizer.parkAndCheckInterrupt(AbstractQueuedSynchronizer.java:836)
\tat java.util.concurrent.locks.AbstractQueuedSynchronizer.acquireQueued(AbstractQueuedSynchronizer.java:870)
\tat java.util.concurrent.locks.AbstractQueuedSynchronizer.acquire(AbstractQueuedSynchronizer.java:1199)
\tat java.util.concurrent.locks.ReentrantLock$NonfairSync.lock(ReentrantLock.java:209)
\tat java.util.concurrent.locks.ReentrantLock.lock(ReentrantLock.java:285)
\tat com.example.DeadLock$Philosopher.run(DeadLock.java:57)
\t...

\tNumber of locked synchronizers = 1
\t- java.util.concurrent.locks.ReentrantLock$NonfairSync@52de95c7


\"Bob\" Id=11 WAITING on java.util.concurrent.locks.ReentrantLock$NonfairSync@441634c2 owned by \"Mallory\" Id=12
\tat sun.misc.Unsafe.park(Native Method)
\t-  waiting on java.util.concurrent.locks.ReentrantLock$NonfairSync@441634c2
\tat java.util.concurrent.locks.LockSupport.park(LockSupport.java:175)
\tat java.util.concurrent.locks.AbstractQueuedSynchronizer.parkAndCheckInterrupt(AbstractQueuedSynchronizer.java:836)
\tat java.util.concurrent.locks.AbstractQueuedSynchronizer.acquireQueued(AbstractQueuedSynchronizer.java:870)
\tat java.util.concurrent.locks.AbstractQueuedSynchronizer.acquire(AbstractQueuedSynchronizer.java:1199)
\tat java.util.concurrent.locks.ReentrantLock$NonfairSync.lock(ReentrantLock.java:209)
\tat java.util.concurrent.locks.ReentrantLock.lock(ReentrantLock.java:285)
\tat com.example.DeadLock$Philosopher.run(DeadLock.java:57)
\t...

\tNumber of locked synchronizers = 1
\t- java.util.concurrent.locks.ReentrantLock$NonfairSync@105ff84e


";

fn without_tabs(text: &str) -> String {
    text.lines()
        .map(|line| line.trim_start_matches('\t'))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_err(text: &str) -> ParseError {
    parse_str(text).unwrap_err()
}

// ── Parsing ───────────────────────────────────────────────────────────────────

#[test]
fn test_empty_input_is_empty_result() {
    let result = parse_str("").unwrap();
    assert!(result.is_empty());
    assert_eq!(result, ParseResult::default());

    let result = DeadlockParser::new()
        .parse_reader(BufReader::new(Cursor::new(Vec::<u8>::new())))
        .unwrap();
    assert!(result.threads.is_empty());
}

#[test]
fn test_text_without_headers_is_empty_result() {
    assert!(parse_str(NO_DEADLOCK).unwrap().is_empty());
    assert!(parse_str("\n\n   \n").unwrap().is_empty());
}

#[test]
fn test_single_thread() {
    let result = parse_str(SINGLE_THREAD).unwrap();
    assert_eq!(result.len(), 1);

    let alice = &result.threads[0];
    assert_eq!(alice.name, "Alice");
    assert_eq!(alice.id, "8");
    assert_eq!(alice.state, ThreadState::Waiting);
    assert_eq!(alice.waiting_on, Some(Lock::new("L@1", "9")));
    assert_eq!(alice.lock_owner_name.as_deref(), Some("Bob"));
    assert_eq!(alice.owned_locks, vec![Lock::new("L2@2", "8")]);
    assert_eq!(alice.stack_trace.len(), 1);
    assert!(alice.stack_trace[0].contains("Bar.java:1337"));
    assert!(!alice.stack_trace[0].starts_with("at"));
}

#[test]
fn test_circular_wait_fixture() {
    let result = parse_str(PHILOSOPHERS).unwrap();
    assert_eq!(result.len(), 3);

    let names: Vec<_> = result.threads.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Mallory", "Alice", "Bob"]);

    for thread in &result.threads {
        assert_eq!(thread.state, ThreadState::Waiting);
        assert_eq!(thread.owned_locks.len(), 1);
        assert_eq!(thread.owned_locks[0].owner_id, thread.id);
        assert!(thread.waiting_on.is_some());
        assert_eq!(thread.stack_trace.len(), 8);
        assert!(thread.stack_trace[7].contains("DeadLock.java:57"));
    }

    let mallory = &result.threads[0];
    assert_eq!(
        mallory.waiting_on,
        Some(Lock::new(
            "java.util.concurrent.locks.ReentrantLock$NonfairSync@52de95c7",
            "10"
        ))
    );
    assert_eq!(
        mallory.owned_locks[0],
        Lock::new("java.util.concurrent.locks.ReentrantLock$NonfairSync@441634c2", "12")
    );

    // Follow waiting_on.owner_id around the ring back to Mallory
    let mut id = mallory.id.clone();
    let mut visited = Vec::new();
    for _ in 0..3 {
        let thread = result.thread(&id).unwrap();
        visited.push(thread.name.clone());
        id = thread.waiting_on.as_ref().unwrap().owner_id.clone();
    }
    assert_eq!(visited, vec!["Mallory", "Alice", "Bob"]);
    assert_eq!(id, mallory.id);
}

#[test]
fn test_tabs_are_optional() {
    let tabbed = parse_str(PHILOSOPHERS).unwrap();
    let plain = parse_str(&without_tabs(PHILOSOPHERS)).unwrap();
    assert_eq!(tabbed, plain);

    let single = parse_str(&without_tabs(SINGLE_THREAD)).unwrap();
    assert_eq!(single, parse_str(SINGLE_THREAD).unwrap());
}

#[test]
fn test_reader_matches_str() {
    let from_reader = DeadlockParser::new()
        .parse_reader(BufReader::new(PHILOSOPHERS.as_bytes()))
        .unwrap();
    assert_eq!(from_reader, parse_str(PHILOSOPHERS).unwrap());
}

#[test]
fn test_parsing_is_deterministic() {
    let parser = DeadlockParser::new();
    assert_eq!(
        parser.parse_str(PHILOSOPHERS).unwrap(),
        parser.parse_str(PHILOSOPHERS).unwrap()
    );
}

#[test]
fn test_header_without_wait_target() {
    let result = parse_str("\"main\" Id=1 RUNNABLE\n\tat Main.main(Main.java:3)\n").unwrap();
    let main = &result.threads[0];
    assert_eq!(main.state, ThreadState::Runnable);
    assert_eq!(main.waiting_on, None);
    assert_eq!(main.lock_owner_name, None);
    assert!(main.owned_locks.is_empty());
}

#[test]
fn test_header_markers_and_non_numeric_id() {
    let text = "\"worker\" Id=t-7 BLOCKED on M@3 owned by \"other thread\" Id=t-9 (in native)\n";
    let worker = &parse_str(text).unwrap().threads[0];
    assert_eq!(worker.id, "t-7");
    assert_eq!(worker.state, ThreadState::Blocked);
    assert_eq!(worker.waiting_on, Some(Lock::new("M@3", "t-9")));
    assert_eq!(worker.lock_owner_name.as_deref(), Some("other thread"));

    let suspended = parse_str("\"idle\" Id=4 TIMED_WAITING (suspended)\n").unwrap();
    assert_eq!(suspended.threads[0].state, ThreadState::TimedWaiting);
}

#[test]
fn test_daemon_and_priority_tokens_before_id() {
    let text = "\"Finalizer\" daemon prio=8 Id=3 WAITING on java.lang.ref.ReferenceQueue$Lock@1b2c owned by \"main\" Id=1\n\
                \tat java.lang.Object.wait(Native Method)\n";
    let finalizer = &parse_str(text).unwrap().threads[0];
    assert_eq!(finalizer.name, "Finalizer");
    assert_eq!(finalizer.id, "3");
    assert_eq!(finalizer.state, ThreadState::Waiting);
    assert_eq!(
        finalizer.waiting_on,
        Some(Lock::new("java.lang.ref.ReferenceQueue$Lock@1b2c", "1"))
    );

    let plain = parse_str("\"Reference Handler\" daemon Id=2 RUNNABLE\n").unwrap();
    assert_eq!(plain.threads[0].name, "Reference Handler");
    assert_eq!(plain.threads[0].id, "2");

    // A quote inside the name still splits at the id
    let quoted = parse_str("\"say \" hi\" Id=6 NEW\n").unwrap();
    assert_eq!(quoted.threads[0].name, "say \" hi");
}

#[test]
fn test_locked_monitors_are_kept_apart_from_synchronizers() {
    let text = "\"t\" Id=5 BLOCKED on A@1 owned by \"u\" Id=6\n\
                \tat Foo.bar(Foo.java:10)\n\
                \t-  blocked on A@1\n\
                \t-  locked B@2\n";
    let t = &parse_str(text).unwrap().threads[0];
    assert_eq!(t.locked_monitors, vec![Lock::new("B@2", "5")]);
    assert!(t.owned_locks.is_empty());
}

#[test]
fn test_preamble_before_first_header_is_ignored() {
    let text = format!("Found one Java-level deadlock:\n=============================\n\n{}", SINGLE_THREAD);
    assert_eq!(parse_str(&text).unwrap().len(), 1);
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_state_is_rejected_with_line() {
    let err = parse_err("\n\"Alice\" Id=8 SLEEPING\n");
    assert_eq!(err.line_number, 2);
    assert_eq!(err.line, "\"Alice\" Id=8 SLEEPING");
    assert_eq!(err.kind, ParseErrorKind::UnknownState("SLEEPING".to_string()));
}

#[test]
fn test_missing_id_is_rejected() {
    let err = parse_err("\"Alice\" WAITING\n");
    assert_eq!(err.kind, ParseErrorKind::MalformedHeader("missing thread id"));

    let err = parse_err("\"Alice\" Id= WAITING\n");
    assert!(matches!(err.kind, ParseErrorKind::UnknownState(_) | ParseErrorKind::MalformedHeader(_)));
}

#[test]
fn test_missing_state_is_rejected() {
    let err = parse_err("\"Alice\" Id=8\n");
    assert_eq!(err.kind, ParseErrorKind::MalformedHeader("missing thread state"));
}

#[test]
fn test_wait_target_without_owner_is_rejected() {
    let err = parse_err("\"Alice\" Id=8 WAITING on L@1\n");
    assert_eq!(err.kind, ParseErrorKind::MalformedHeader("wait target without owner"));
}

#[test]
fn test_synchronizer_shortfall_is_rejected() {
    let text = "\"Alice\" Id=8 RUNNABLE\n\tNumber of locked synchronizers = 2\n\t- L@1\n\n\"Bob\" Id=9 RUNNABLE\n";
    let err = parse_err(text);
    assert_eq!(err.line_number, 2);
    assert_eq!(
        err.kind,
        ParseErrorKind::SynchronizerCountMismatch {
            declared: 2,
            found: 1
        }
    );
}

#[test]
fn test_synchronizer_excess_is_rejected() {
    let text = "\"Alice\" Id=8 RUNNABLE\n\tNumber of locked synchronizers = 1\n\t- L@1\n\t- L@2\n";
    let err = parse_err(text);
    assert_eq!(err.line_number, 4);
    assert_eq!(
        err.kind,
        ParseErrorKind::SynchronizerCountMismatch {
            declared: 1,
            found: 2
        }
    );
}

#[test]
fn test_truncated_synchronizer_list_at_eof_is_rejected() {
    let err = parse_err("\"Alice\" Id=8 RUNNABLE\nNumber of locked synchronizers = 1\n");
    assert!(matches!(err.kind, ParseErrorKind::SynchronizerCountMismatch { declared: 1, found: 0 }));
}

#[test]
fn test_bad_synchronizer_count_is_rejected() {
    let err = parse_err("\"Alice\" Id=8 RUNNABLE\nNumber of locked synchronizers = many\n");
    assert_eq!(err.kind, ParseErrorKind::InvalidSynchronizerCount);
}

#[test]
fn test_contradicting_wait_annotation_is_rejected() {
    let text = "\"Alice\" Id=8 WAITING on L@1 owned by \"Bob\" Id=9\n\t-  waiting on L@2\n";
    let err = parse_err(text);
    assert_eq!(
        err.kind,
        ParseErrorKind::WaitTargetMismatch {
            header: "L@1".to_string(),
            annotation: "L@2".to_string()
        }
    );
}

#[test]
fn test_unknown_line_in_block_is_rejected() {
    let err = parse_err("\"Alice\" Id=8 RUNNABLE\n\tsomething odd\n");
    assert_eq!(err.line_number, 2);
    assert_eq!(err.kind, ParseErrorKind::UnexpectedLine);
    assert!(err.to_string().starts_with("line 2: unexpected line"));
}

// ── Rendering ─────────────────────────────────────────────────────────────────

#[test]
fn test_display_parses_back_to_equal_records() {
    let parsed = parse_str(PHILOSOPHERS).unwrap();
    let rendered = parsed.to_string();
    assert_eq!(parse_str(&rendered).unwrap(), parsed);

    let header = rendered.lines().next().unwrap();
    assert!(header.starts_with("\"Mallory\" Id=12 WAITING on "));
    assert!(header.ends_with("owned by \"Alice\" Id=10"));
}

#[test]
fn test_result_serializes_state_names() {
    let json = serde_json::to_value(parse_str(SINGLE_THREAD).unwrap()).unwrap();
    assert_eq!(json["threads"][0]["state"], "WAITING");
    assert_eq!(json["threads"][0]["waiting_on"]["owner_id"], "9");
}

// ── Wait-for graph ────────────────────────────────────────────────────────────

#[test]
fn test_graph_finds_philosopher_cycle() {
    let parsed = parse_str(PHILOSOPHERS).unwrap();
    let graph = WaitGraph::from_threads(&parsed.threads);

    assert_eq!(graph.edges().len(), 3);
    assert_eq!(graph.waits_for("12").unwrap().owner, "10");
    assert_eq!(graph.find_cycles(), vec![vec!["12", "10", "11"]]);
    assert!(graph.has_deadlock());
}

#[test]
fn test_graph_cycle_starts_at_first_listed_member() {
    // "x" waits on the ring but is not part of it
    let text = "\
\"x\" Id=1 WAITING on A owned by \"b\" Id=3
\"a\" Id=2 WAITING on B owned by \"b\" Id=3
\"b\" Id=3 WAITING on C owned by \"a\" Id=2
";
    let parsed = parse_str(text).unwrap();
    let graph = WaitGraph::from_threads(&parsed.threads);
    assert_eq!(graph.find_cycles(), vec![vec!["2", "3"]]);
}

#[test]
fn test_graph_chain_without_cycle() {
    let text = "\
\"a\" Id=1 BLOCKED on A owned by \"b\" Id=2
\"b\" Id=2 BLOCKED on B owned by \"gone\" Id=99
";
    let parsed = parse_str(text).unwrap();
    let graph = WaitGraph::from_threads(&parsed.threads);
    assert!(graph.find_cycles().is_empty());
    assert!(!graph.has_deadlock());
    assert!(WaitGraph::from_threads(&[]).find_cycles().is_empty());
}

// ── Stored records ────────────────────────────────────────────────────────────

#[test]
fn test_record_without_deadlock() {
    let record = DeadlockRecord::no_deadlock("agent-1", "vm-1");
    assert!(!record.is_deadlocked());
    assert_eq!(record.description, "No Deadlocks Detected.");
    assert!(record.threads().unwrap().is_empty());
    assert!(record.recorded_at().is_some());

    let empty = DeadlockRecord::from_threads("agent-1", "vm-1", &[]);
    assert!(!empty.is_deadlocked());
}

#[test]
fn test_record_round_trips_threads() {
    let parsed = parse_str(PHILOSOPHERS).unwrap();
    let record = DeadlockRecord::from_threads("agent-1", "vm-1", &parsed.threads);

    assert!(record.is_deadlocked());
    assert_eq!(record.threads().unwrap(), parsed);

    let raw = DeadlockRecord::new("agent-1", "vm-1", SINGLE_THREAD);
    assert_eq!(raw.threads().unwrap().len(), 1);
}

#[test]
fn test_record_round_trips_wait_without_owner_name() {
    let thread = ThreadRecord {
        name: "worker".to_string(),
        id: "4".to_string(),
        state: ThreadState::Blocked,
        waiting_on: Some(Lock::new("M@9", "7")),
        lock_owner_name: None,
        owned_locks: vec![Lock::new("S@1", "4")],
        locked_monitors: Vec::new(),
        stack_trace: vec!["Foo.bar(Foo.java:3)".to_string()],
    };

    let record = DeadlockRecord::from_threads("agent-1", "vm-1", std::slice::from_ref(&thread));
    assert!(record.description.contains("owned by \"\" Id=7"));
    assert_eq!(record.threads().unwrap().threads, vec![thread]);
}
