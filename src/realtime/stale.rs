use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::RealtimeSnapshot;
use crate::config::StalePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub age_seconds: i64,
    pub stale: bool,
}

/// Age of a snapshot relative to `now`. Clock skew never yields a negative age.
pub fn freshness(snapshot: &RealtimeSnapshot, window: Duration, now: DateTime<Utc>) -> Freshness {
    let age_seconds = (now - snapshot.observed_at()).num_seconds().max(0);
    let window_secs = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
    Freshness {
        age_seconds,
        stale: age_seconds > window_secs,
    }
}

/// Applies the configured policy to a snapshot older than `window`.
///
/// Returns `None` only for [`StalePolicy::Discard`].
pub fn apply_stale_policy(
    mut snapshot: RealtimeSnapshot,
    policy: StalePolicy,
    window: Duration,
    now: DateTime<Utc>,
) -> Option<RealtimeSnapshot> {
    let freshness = freshness(&snapshot, window, now);
    if !freshness.stale {
        snapshot.stale = false;
        return Some(snapshot);
    }

    match policy {
        StalePolicy::Serve => {
            info!(age_seconds = freshness.age_seconds, "Serving stale real-time snapshot");
            snapshot.stale = false;
            Some(snapshot)
        }
        StalePolicy::Flag => {
            warn!(age_seconds = freshness.age_seconds, "Real-time snapshot is stale");
            snapshot.stale = true;
            Some(snapshot)
        }
        StalePolicy::Discard => {
            warn!(
                age_seconds = freshness.age_seconds,
                "Discarding stale real-time snapshot, treating real-time data as missing"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::merge;

    const WINDOW: Duration = Duration::from_secs(6 * 60 * 60);

    fn snapshot_at(ts: i64) -> RealtimeSnapshot {
        merge(Vec::new(), DateTime::from_timestamp(ts, 0).unwrap())
    }

    fn at(ts: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(ts, 0).unwrap()
    }

    #[test]
    fn test_fresh_snapshot_untouched_by_every_policy() {
        for policy in [StalePolicy::Serve, StalePolicy::Flag, StalePolicy::Discard] {
            let kept = apply_stale_policy(snapshot_at(1_000), policy, WINDOW, at(1_060)).unwrap();
            assert!(!kept.stale);
        }
    }

    #[test]
    fn test_serve_keeps_old_snapshot_unflagged() {
        let kept = apply_stale_policy(snapshot_at(0), StalePolicy::Serve, WINDOW, at(86_400));
        assert_eq!(kept.map(|s| s.stale), Some(false));
    }

    #[test]
    fn test_flag_marks_old_snapshot() {
        let kept = apply_stale_policy(snapshot_at(0), StalePolicy::Flag, WINDOW, at(21_601));
        assert_eq!(kept.map(|s| s.stale), Some(true));
    }

    #[test]
    fn test_discard_drops_old_snapshot() {
        assert!(apply_stale_policy(snapshot_at(0), StalePolicy::Discard, WINDOW, at(21_601)).is_none());
    }

    #[test]
    fn test_window_boundary_is_fresh() {
        let f = freshness(&snapshot_at(0), WINDOW, at(21_600));
        assert_eq!(f.age_seconds, 21_600);
        assert!(!f.stale);
    }

    #[test]
    fn test_future_snapshot_has_zero_age() {
        let f = freshness(&snapshot_at(500), WINDOW, at(100));
        assert_eq!(f.age_seconds, 0);
    }
}
