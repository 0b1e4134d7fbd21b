//! Per-client daily rate governor
//!
//! Counts gated exchanges per client identity per calendar day. All state
//! sits behind one mutex, so check/increment/reap are linearizable.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default number of exchanges per client per day
pub const DEFAULT_DAILY_LIMIT: u32 = 10;

/// Source of the current calendar day
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local wall-clock date
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Usage count for one identity on one day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRecord {
    pub day: NaiveDate,
    /// Completed exchanges
    pub count: u32,
    /// Slots held by exchanges still in flight
    pub reserved: u32,
}

impl RateRecord {
    fn fresh(day: NaiveDate) -> Self {
        Self {
            day,
            count: 0,
            reserved: 0,
        }
    }

    fn used(&self) -> u32 {
        self.count.saturating_add(self.reserved)
    }
}

/// Quota position of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub allowed: bool,
    pub count: u32,
    pub remaining: u32,
    pub limit: u32,
}

impl QuotaStatus {
    fn of(record: Option<&RateRecord>, limit: u32) -> Self {
        let (count, used) = record.map_or((0, 0), |r| (r.count, r.used()));
        Self {
            allowed: used < limit,
            count,
            remaining: limit.saturating_sub(used),
            limit,
        }
    }
}

pub struct RateGovernor {
    limit: u32,
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, RateRecord>>,
}

impl RateGovernor {
    pub fn new(limit: u32) -> Self {
        Self::with_clock(limit, Arc::new(SystemClock))
    }

    pub fn with_clock(limit: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            clock,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, RateRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Today's record for `identity`, replacing a stale one
    fn current<'a>(
        records: &'a mut HashMap<String, RateRecord>,
        identity: &str,
        today: NaiveDate,
    ) -> &'a mut RateRecord {
        let record = records
            .entry(identity.to_string())
            .or_insert_with(|| RateRecord::fresh(today));
        if record.day != today {
            *record = RateRecord::fresh(today);
        }
        record
    }

    /// Current position of `identity`; never mutates
    pub fn check(&self, identity: &str) -> QuotaStatus {
        let today = self.clock.today();
        let records = self.records();
        let record = records.get(identity).filter(|record| record.day == today);
        QuotaStatus::of(record, self.limit)
    }

    /// Count one exchange for `identity`, returning the post-increment status
    pub fn increment(&self, identity: &str) -> QuotaStatus {
        let today = self.clock.today();
        let mut records = self.records();
        let record = Self::current(&mut records, identity, today);
        record.count = record.count.saturating_add(1);
        QuotaStatus::of(Some(&*record), self.limit)
    }

    /// Check and hold one slot for `identity` under a single lock.
    ///
    /// The slot counts against the limit until the reservation is committed
    /// (it becomes a completed exchange) or dropped (it is freed). A refusal
    /// carries the status that caused it.
    pub fn try_acquire(self: &Arc<Self>, identity: &str) -> Result<QuotaReservation, QuotaStatus> {
        let today = self.clock.today();
        let mut records = self.records();
        let record = Self::current(&mut records, identity, today);
        if record.used() >= self.limit {
            return Err(QuotaStatus::of(Some(&*record), self.limit));
        }
        record.reserved += 1;
        Ok(QuotaReservation {
            governor: Arc::clone(self),
            identity: identity.to_string(),
            day: today,
            committed: false,
        })
    }

    /// Drop every record from a previous day; returns how many went
    pub fn reap(&self) -> usize {
        let today = self.clock.today();
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, record| record.day == today);
        before - records.len()
    }

    /// Number of identities currently tracked
    pub fn tracked(&self) -> usize {
        self.records().len()
    }

    /// Run `reap` every `every` until the returned task is aborted
    pub fn spawn_reaper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let governor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reaped = governor.reap();
                if reaped > 0 {
                    tracing::info!(reaped, remaining = governor.tracked(), "Reaped stale rate records");
                }
            }
        })
    }
}

/// A slot held against an identity's daily limit
#[must_use = "dropping a reservation frees the slot"]
pub struct QuotaReservation {
    governor: Arc<RateGovernor>,
    identity: String,
    day: NaiveDate,
    committed: bool,
}

impl QuotaReservation {
    /// Turn the slot into a completed exchange; returns the new status
    pub fn commit(mut self) -> QuotaStatus {
        self.committed = true;
        let today = self.governor.clock.today();
        let mut records = self.governor.records();
        let record = RateGovernor::current(&mut records, &self.identity, today);
        if record.day == self.day {
            record.reserved = record.reserved.saturating_sub(1);
        }
        record.count = record.count.saturating_add(1);
        QuotaStatus::of(Some(&*record), self.governor.limit)
    }
}

impl Drop for QuotaReservation {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut records = self.governor.records();
        if let Some(record) = records.get_mut(&self.identity).filter(|r| r.day == self.day) {
            record.reserved = record.reserved.saturating_sub(1);
        }
    }
}

impl std::fmt::Debug for QuotaReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaReservation")
            .field("identity", &self.identity)
            .field("day", &self.day)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGovernor")
            .field("limit", &self.limit)
            .field("tracked", &self.tracked())
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;

    fn governor_at(limit: u32) -> (RateGovernor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()));
        (RateGovernor::with_clock(limit, clock.clone()), clock)
    }

    #[test]
    fn test_fresh_identity_has_full_quota() {
        let (governor, _) = governor_at(10);
        let status = governor.check("1.2.3.4");
        assert!(status.allowed);
        assert_eq!(status.count, 0);
        assert_eq!(status.remaining, 10);
        // check does not create records
        assert_eq!(governor.tracked(), 0);
    }

    #[test]
    fn test_limit_reached_after_ten_increments() {
        let (governor, _) = governor_at(10);
        for i in 1..=10 {
            let status = governor.increment("client");
            assert_eq!(status.count, i);
            assert_eq!(status.remaining, 10 - i);
        }
        let status = governor.check("client");
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);
    }

    #[test]
    fn test_identities_are_independent() {
        let (governor, _) = governor_at(2);
        governor.increment("a");
        governor.increment("a");
        assert!(!governor.check("a").allowed);
        assert!(governor.check("b").allowed);
    }

    #[test]
    fn test_date_rollover_resets_quota() {
        let (governor, clock) = governor_at(10);
        for _ in 0..10 {
            governor.increment("client");
        }
        clock.advance_days(1);

        let status = governor.check("client");
        assert!(status.allowed);
        assert_eq!(status.remaining, 10);

        // Stale record is replaced, not decremented
        let status = governor.increment("client");
        assert_eq!(status.count, 1);
        assert_eq!(status.remaining, 9);
    }

    #[test]
    fn test_reap_drops_only_stale_records() {
        let (governor, clock) = governor_at(10);
        governor.increment("yesterday");
        clock.advance_days(1);
        governor.increment("today");

        assert_eq!(governor.reap(), 1);
        assert_eq!(governor.tracked(), 1);
        assert_eq!(governor.check("today").count, 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let (governor, _) = governor_at(1000);
        let governor = Arc::new(governor);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let governor = Arc::clone(&governor);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        governor.increment("shared");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(governor.check("shared").count, 400);
    }

    #[test]
    fn test_reservations_hold_slots_until_committed() {
        let (governor, _) = governor_at(2);
        let governor = Arc::new(governor);

        let first = governor.try_acquire("client").unwrap();
        let second = governor.try_acquire("client").unwrap();
        let refused = governor.try_acquire("client").unwrap_err();
        assert!(!refused.allowed);
        assert_eq!(refused.count, 0);
        assert_eq!(refused.remaining, 0);
        assert!(!governor.check("client").allowed);

        let status = first.commit();
        assert_eq!(status.count, 1);
        assert_eq!(status.remaining, 0);

        // A dropped reservation frees its slot without touching the count
        drop(second);
        let status = governor.check("client");
        assert!(status.allowed);
        assert_eq!(status.count, 1);
        assert_eq!(status.remaining, 1);
    }

    #[test]
    fn test_concurrent_reservations_never_exceed_limit() {
        let (governor, _) = governor_at(3);
        let governor = Arc::new(governor);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let governor = Arc::clone(&governor);
                std::thread::spawn(move || {
                    governor.try_acquire("shared").map(QuotaReservation::commit).is_ok()
                })
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(granted, 3);
        assert_eq!(governor.check("shared").count, 3);
    }

    #[test]
    fn test_reservation_committed_after_rollover_counts_today() {
        let (governor, clock) = governor_at(5);
        let governor = Arc::new(governor);
        governor.increment("client");
        let reservation = governor.try_acquire("client").unwrap();
        clock.advance_days(1);

        let status = reservation.commit();
        assert_eq!(status.count, 1);
        assert_eq!(status.remaining, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_task_runs_periodically() {
        let (governor, clock) = governor_at(10);
        let governor = Arc::new(governor);
        governor.increment("old");
        clock.advance_days(1);

        let reaper = governor.spawn_reaper(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_secs(3601)).await;
        tokio::task::yield_now().await;

        assert_eq!(governor.tracked(), 0);
        reaper.abort();
    }
}
