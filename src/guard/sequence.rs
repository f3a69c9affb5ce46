//! Last-evaluation-wins bookkeeping for re-triggered checks.
//!
//! A page can fire several guard evaluations (or list re-fetches) before the
//! first one resolves. Each run takes a [`Ticket`]; when it resolves, its
//! result is only used if no newer ticket was handed out for the same key.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Builds a per-client key for `scope` without keeping the raw credential.
pub fn client_key(credential: &str, scope: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    format!("{}:{}", hex::encode(&digest[..16]), scope)
}

/// Upper bound on tracked keys for [`EvaluationSequencer::new`].
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// The outcome of [`EvaluationSequencer::begin_at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The run is the newest for its key.
    Current(Ticket),
    /// A newer run for the key has already started.
    Superseded,
    /// The key is new and the sequencer is full; run without sequencing.
    Untracked,
}

/// A claim on the latest slot for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    key: String,
    seq: u64,
}

impl Ticket {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    seq: u64,
    touched: Instant,
}

/// Per-key high-water marks of issued tickets.
///
/// Caller-sequenced keys are capped at `max_keys`; marks are dropped by
/// [`EvaluationSequencer::sweep`].
#[derive(Debug)]
pub struct EvaluationSequencer {
    marks: DashMap<String, Mark>,
    max_keys: usize,
}

impl Default for EvaluationSequencer {
    fn default() -> Self {
        Self::with_max_keys(DEFAULT_MAX_KEYS)
    }
}

impl EvaluationSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_keys(max_keys: usize) -> Self {
        Self {
            marks: DashMap::new(),
            max_keys,
        }
    }

    /// Starts a new run for `key` with the next sequence number.
    pub fn begin(&self, key: &str) -> Ticket {
        let mut entry = self.marks.entry(key.to_string()).or_insert(Mark {
            seq: 0,
            touched: Instant::now(),
        });
        entry.seq += 1;
        entry.touched = Instant::now();

        Ticket {
            key: key.to_string(),
            seq: entry.seq,
        }
    }

    /// Starts a run with a caller-supplied sequence number.
    ///
    /// A new key is only tracked while fewer than `max_keys` keys are held.
    pub fn begin_at(&self, key: &str, seq: u64) -> Admission {
        // Checked before `entry`, which holds a shard lock that `len` needs.
        if !self.marks.contains_key(key) && self.marks.len() >= self.max_keys {
            tracing::debug!(tracked = self.marks.len(), "Sequencer full, running unsequenced");
            return Admission::Untracked;
        }

        let mut entry = self.marks.entry(key.to_string()).or_insert(Mark {
            seq: 0,
            touched: Instant::now(),
        });

        if seq < entry.seq {
            return Admission::Superseded;
        }
        entry.seq = seq;
        entry.touched = Instant::now();

        Admission::Current(Ticket {
            key: key.to_string(),
            seq,
        })
    }

    /// Whether `ticket` is still the newest run for its key.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.marks
            .get(&ticket.key)
            .map(|mark| mark.seq == ticket.seq)
            .unwrap_or(false)
    }

    /// Drops marks untouched for longer than `max_idle`. Returns how many.
    pub fn sweep(&self, max_idle: Duration) -> usize {
        let before = self.marks.len();
        self.marks.retain(|_, mark| mark.touched.elapsed() <= max_idle);
        before - self.marks.len()
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_ticket_supersedes_older() {
        let sequencer = EvaluationSequencer::new();
        let first = sequencer.begin("/courses/learn-ai");
        let second = sequencer.begin("/courses/learn-ai");

        assert!(!sequencer.is_current(&first));
        assert!(sequencer.is_current(&second));
        assert_eq!(second.seq(), first.seq() + 1);
    }

    #[test]
    fn keys_are_independent() {
        let sequencer = EvaluationSequencer::new();
        let a = sequencer.begin("a");
        let b = sequencer.begin("b");
        assert!(sequencer.is_current(&a));
        assert!(sequencer.is_current(&b));
    }

    #[test]
    fn caller_sequence_rejects_stale_starts() {
        let sequencer = EvaluationSequencer::new();
        let Admission::Current(seven) = sequencer.begin_at("page", 7) else {
            panic!("first start should be current");
        };
        assert_eq!(sequencer.begin_at("page", 6), Admission::Superseded);
        assert!(sequencer.is_current(&seven));

        let Admission::Current(eight) = sequencer.begin_at("page", 8) else {
            panic!("newer start should be current");
        };
        assert!(!sequencer.is_current(&seven));
        assert!(sequencer.is_current(&eight));
    }

    #[test]
    fn full_sequencer_runs_new_keys_untracked() {
        let sequencer = EvaluationSequencer::with_max_keys(2);
        assert!(matches!(sequencer.begin_at("a", 1), Admission::Current(_)));
        assert!(matches!(sequencer.begin_at("b", 1), Admission::Current(_)));

        assert_eq!(sequencer.begin_at("c", 1), Admission::Untracked);
        assert_eq!(sequencer.len(), 2);

        // Keys already held keep sequencing.
        assert!(matches!(sequencer.begin_at("a", 2), Admission::Current(_)));
        assert_eq!(sequencer.begin_at("b", 0), Admission::Superseded);
    }

    #[test]
    fn sweep_forgets_idle_keys() {
        let sequencer = EvaluationSequencer::new();
        let ticket = sequencer.begin("page");
        assert_eq!(sequencer.sweep(Duration::from_secs(60)), 0);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(sequencer.sweep(Duration::ZERO), 1);
        assert!(sequencer.is_empty());
        assert!(!sequencer.is_current(&ticket));
    }

    #[test]
    fn client_keys_hide_the_credential() {
        let key = client_key("secret-session", "/courses");
        assert!(!key.contains("secret-session"));
        assert!(key.ends_with(":/courses"));
        assert_ne!(key, client_key("other-session", "/courses"));
    }
}
