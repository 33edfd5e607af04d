//! Search space of a login attempt and the rules applied to each try.
//!
//! The broker walks a [`SearchPlan`] lazily, asks [`verdict`] what to do
//! after every attempt, and hands the collected records to [`classify`]
//! once the plan is exhausted.

use classroom_common::{AttemptOutcome, AttemptRecord, Encoding, FieldPair};

use crate::error::LoginError;

/// Attempt records attached to a failure when diagnostics are enabled
pub const MAX_DETAIL_ATTEMPTS: usize = 6;

/// One (path, field pair, encoding) combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Combination<'a> {
    /// Position of `path` in the candidate list
    pub path_index: usize,
    pub path: &'a str,
    pub pair: &'a FieldPair,
    pub encoding: Encoding,
}

/// Finite, restartable sequence of combinations in try order:
/// paths, then field pairs, then JSON before form.
#[derive(Debug, Clone, Copy)]
pub struct SearchPlan<'a> {
    paths: &'a [String],
    pairs: &'a [FieldPair],
}

impl<'a> SearchPlan<'a> {
    pub fn new(paths: &'a [String], pairs: &'a [FieldPair]) -> Self {
        Self { paths, pairs }
    }

    /// Upper bound on upstream calls for one login
    pub fn len(&self) -> usize {
        self.paths.len() * self.pairs.len() * Encoding::ORDER.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Combination<'a>> + 'a {
        let (paths, pairs) = (self.paths, self.pairs);
        paths
            .iter()
            .enumerate()
            .flat_map(move |(path_index, path)| {
                pairs.iter().flat_map(move |pair| {
                    Encoding::ORDER.into_iter().map(move |encoding| Combination {
                        path_index,
                        path: path.as_str(),
                        pair,
                        encoding,
                    })
                })
            })
    }
}

/// What to do after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 2xx with a JSON body: return it
    Succeed,
    /// Authoritative rejection: skip the rest of this path
    AbandonPath,
    Continue,
}

fn is_json(content_type: &str) -> bool {
    content_type.contains("application/json")
}

/// Decide from a single attempt record whether the search goes on.
pub fn verdict(record: &AttemptRecord) -> Verdict {
    if record.outcome != AttemptOutcome::Response {
        return Verdict::Continue;
    }
    let Some(status) = record.http_status else {
        return Verdict::Continue;
    };

    if (200..300).contains(&status) && is_json(&record.content_type) && record.error.is_none() {
        Verdict::Succeed
    } else if record.is_auth_rejection() && is_json(&record.content_type) {
        Verdict::AbandonPath
    } else {
        Verdict::Continue
    }
}

/// Turn the attempt history of a failed search into one classification.
///
/// Any 404 means the route itself is wrong, which takes priority over a
/// 401/403 seen elsewhere.
pub fn classify(attempts: &[AttemptRecord], verbose: bool) -> LoginError {
    let detail = verbose.then(|| attempts.iter().take(MAX_DETAIL_ATTEMPTS).cloned().collect());

    if attempts.iter().any(AttemptRecord::is_not_found) {
        LoginError::NotFoundMisconfiguration { detail }
    } else if attempts.iter().any(AttemptRecord::is_auth_rejection) {
        LoginError::Unauthorized { detail }
    } else {
        LoginError::UpstreamUnavailableOrMismatch { detail }
    }
}
