//! Property-Based Tests for the Sliding Window
//!
//! Verifies the window invariants hold for arbitrary request timings:
//! no trailing window ever contains more than `limit` allowed requests,
//! and a denial's retry-after never exceeds the window length.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use tokio::runtime::Runtime;

use super::store::{InMemoryRateLimitStore, RateLimitStore, WindowDecision};

const WINDOW_SECS: i64 = 24 * 3600;
const LIMIT: u32 = 3;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
}

/// Offsets spanning roughly two window lengths, in seconds
fn arb_offsets() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0..(2 * WINDOW_SECS), 1..60).prop_map(|mut v| {
        v.sort_unstable();
        v
    })
}

proptest! {
    #[test]
    fn no_window_ever_exceeds_limit(offsets in arb_offsets()) {
        let rt = Runtime::new().unwrap();
        let store = InMemoryRateLimitStore::new();
        let window = Duration::seconds(WINDOW_SECS);

        let mut allowed_at: Vec<i64> = Vec::new();
        for offset in offsets {
            let now = base() + Duration::seconds(offset);
            let decision = rt
                .block_on(store.check_and_record("H1", now, window, LIMIT))
                .unwrap();
            match decision {
                WindowDecision::Allowed { .. } => allowed_at.push(offset),
                WindowDecision::Denied { retry_after } => {
                    prop_assert!(retry_after.as_secs() <= WINDOW_SECS as u64);
                }
            }
        }

        // Every trailing window around an allowed instant holds at most
        // LIMIT allowed requests
        for &t in &allowed_at {
            let in_window = allowed_at
                .iter()
                .filter(|&&u| u > t - WINDOW_SECS && u <= t)
                .count();
            prop_assert!(in_window as u32 <= LIMIT);
        }
    }

    #[test]
    fn retained_instants_never_exceed_limit(offsets in arb_offsets()) {
        let rt = Runtime::new().unwrap();
        let store = InMemoryRateLimitStore::new();
        let window = Duration::seconds(WINDOW_SECS);

        let mut last = base();
        for offset in offsets {
            let now = base() + Duration::seconds(offset);
            last = now;
            rt.block_on(store.check_and_record("H1", now, window, LIMIT))
                .unwrap();
        }

        let len = rt.block_on(store.window_len("H1", last, window)).unwrap();
        prop_assert!(len <= LIMIT);
    }
}
