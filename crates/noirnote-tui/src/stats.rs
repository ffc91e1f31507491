//! Player statistics derived from the result ledger
//!
//! Every submission appends an immutable [`ResultRecord`]. A player's
//! [`UserStats`] are never accumulated in place: they are a fold over the
//! first win of each case, rebuilt from the ledger whenever they change.

use crate::clock::Clock;
use crate::leaderboard::LeaderboardReconciler;
use crate::session::{Outcome, Player};
use crate::store::{lock, DocPath, PersistenceGateway, Query, StoreResult, WriteAck};
use noirnote_core::{average_time_ms, case_score, total_score, CaseCatalog};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Collection holding every player's result ledger
pub const RESULTS_COLLECTION: &str = "results";

/// One submission, win or loss. Never modified once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub uid: String,
    pub case_id: String,
    pub finished_at: u64,
    pub duration_ms: u64,
    pub penalty_ms: u64,
    pub attempts: u32,
    pub is_win: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
}

impl ResultRecord {
    pub fn new(uid: &str, case_id: &str, finished_at: u64, outcome: &Outcome) -> Self {
        Self {
            uid: uid.to_string(),
            case_id: case_id.to_string(),
            finished_at,
            duration_ms: outcome.duration_ms,
            penalty_ms: outcome.penalty_ms,
            attempts: outcome.attempts,
            is_win: outcome.is_win(),
            score: outcome.score,
        }
    }

    /// Unique per submission: attempts grow within a session
    pub fn doc_id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.uid, self.case_id, self.finished_at, self.attempts
        )
    }

    pub fn path(&self) -> DocPath {
        DocPath::new(RESULTS_COLLECTION, self.doc_id())
    }
}

/// Aggregate over a player's first wins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_score: u64,
    pub solved_cases: u32,
    pub average_time_ms: u64,
    pub total_attempts: u64,
    #[serde(default)]
    pub last_updated: u64,
}

impl UserStats {
    /// Compare everything except the timestamp
    pub fn same_figures(&self, other: &UserStats) -> bool {
        self.total_score == other.total_score
            && self.solved_cases == other.solved_cases
            && self.average_time_ms == other.average_time_ms
            && self.total_attempts == other.total_attempts
    }
}

pub fn stats_path(uid: &str) -> DocPath {
    DocPath::new(format!("users/{}/stats", uid), "main")
}

/// The earliest win of each case, oldest first.
///
/// Wins with equal `finished_at` keep their ledger order.
pub fn first_wins(records: &[ResultRecord]) -> Vec<&ResultRecord> {
    let mut firsts: HashMap<&str, &ResultRecord> = HashMap::new();
    for record in records.iter().filter(|r| r.is_win) {
        firsts
            .entry(record.case_id.as_str())
            .and_modify(|best| {
                if record.finished_at < best.finished_at {
                    *best = record;
                }
            })
            .or_insert(record);
    }

    let mut selected: Vec<&ResultRecord> = records
        .iter()
        .filter(|r| {
            firsts
                .get(r.case_id.as_str())
                .is_some_and(|first| std::ptr::eq(*first, *r))
        })
        .collect();
    selected.sort_by_key(|r| r.finished_at);
    selected
}

/// Rebuilds stats from the ledger and publishes them
#[derive(Clone)]
pub struct StatsAggregator {
    gateway: Arc<PersistenceGateway>,
    catalog: Arc<CaseCatalog>,
    clock: Arc<dyn Clock>,
    leaderboard: LeaderboardReconciler,
    /// Players whose stats wait for a ledger read that failed offline
    deferred: Arc<Mutex<HashSet<String>>>,
}

impl StatsAggregator {
    pub fn new(
        gateway: Arc<PersistenceGateway>,
        catalog: Arc<CaseCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let leaderboard = LeaderboardReconciler::new(gateway.clone(), clock.clone());
        Self {
            gateway,
            catalog,
            clock,
            leaderboard,
            deferred: Arc::default(),
        }
    }

    pub fn gateway(&self) -> &Arc<PersistenceGateway> {
        &self.gateway
    }

    pub fn catalog(&self) -> &Arc<CaseCatalog> {
        &self.catalog
    }

    pub fn leaderboard(&self) -> &LeaderboardReconciler {
        &self.leaderboard
    }

    /// Append a record to the ledger
    pub fn append(&self, record: &ResultRecord) -> StoreResult<WriteAck> {
        self.gateway.set_from(&record.path(), record, false)
    }

    /// A player's ledger, oldest first
    pub fn ledger(&self, uid: &str) -> StoreResult<Vec<ResultRecord>> {
        let query = Query::collection(RESULTS_COLLECTION).where_eq("uid", uid);
        let mut records: Vec<ResultRecord> = self.gateway.query_as(&query)?;
        records.sort_by_key(|r| r.finished_at);
        Ok(records)
    }

    /// Score of a win; records written without one are rescored from the case
    fn score_of(&self, record: &ResultRecord) -> u64 {
        if let Some(score) = record.score {
            return score;
        }
        match self.catalog.get(&record.case_id) {
            Some(case) => case_score(record.duration_ms, record.attempts, case.difficulty),
            None => {
                log::warn!(
                    "[stats] win on unknown case {} has no score, counting 0",
                    record.case_id
                );
                0
            }
        }
    }

    /// Fold a ledger into stats
    pub fn fold(&self, records: &[ResultRecord]) -> UserStats {
        let firsts = first_wins(records);
        let scores: Vec<u64> = firsts.iter().map(|r| self.score_of(r)).collect();
        let durations: Vec<u64> = firsts.iter().map(|r| r.duration_ms).collect();

        UserStats {
            total_score: total_score(&scores),
            solved_cases: u32::try_from(firsts.len()).unwrap_or(u32::MAX),
            average_time_ms: average_time_ms(&durations),
            total_attempts: firsts.iter().map(|r| u64::from(r.attempts)).sum(),
            last_updated: self.clock.now_ms(),
        }
    }

    /// Stats computed from the ledger, without writing anything
    pub fn compute(&self, uid: &str) -> StoreResult<UserStats> {
        Ok(self.fold(&self.ledger(uid)?))
    }

    /// The stored stats document, if any
    pub fn load(&self, uid: &str) -> StoreResult<Option<UserStats>> {
        self.gateway.get_as(&stats_path(uid))
    }

    fn store(&self, uid: &str, stats: &UserStats) -> StoreResult<WriteAck> {
        self.gateway.set_from(&stats_path(uid), stats, false)
    }

    /// Refresh stats and leaderboards after a win has been appended.
    ///
    /// The per-case entry is only published when `record` is the player's
    /// first win on that case. When the full ledger cannot be read nothing is
    /// published, the player is marked for [`Self::catch_up`] and the result
    /// is `None`.
    pub fn process_win(&self, player: &Player, record: &ResultRecord) -> StoreResult<Option<UserStats>> {
        let mut ledger = match self.ledger(&player.id) {
            Ok(ledger) => ledger,
            Err(e) if e.is_transient() => {
                log::info!("[stats] deferring stats for {} until the ledger is readable: {}", player.id, e);
                lock(&self.deferred).insert(player.id.clone());
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if !ledger.contains(record) {
            ledger.push(record.clone());
            ledger.sort_by_key(|r| r.finished_at);
        }

        let stats = self.fold(&ledger);
        self.store(&player.id, &stats)?;
        self.leaderboard.publish_global(player, &stats)?;

        let is_first = first_wins(&ledger).into_iter().any(|first| first == record);
        if is_first {
            self.leaderboard.publish_case(player, record)?;
        } else {
            log::debug!(
                "[stats] {} already solved {}, case leaderboard unchanged",
                player.id,
                record.case_id
            );
        }
        Ok(Some(stats))
    }

    /// Recompute everything from the ledger and republish it
    pub fn rebuild(&self, player: &Player) -> StoreResult<UserStats> {
        let ledger = self.ledger(&player.id)?;
        let stats = self.fold(&ledger);
        self.store(&player.id, &stats)?;
        self.leaderboard.publish_global(player, &stats)?;

        let mut published = 0;
        for first in first_wins(&ledger) {
            if self.leaderboard.publish_case(player, first)? {
                published += 1;
            }
        }

        log::info!(
            "[stats] rebuilt {} from {} records: {} solved, {} points, {} case entries added",
            player.id,
            ledger.len(),
            stats.solved_cases,
            stats.total_score,
            published
        );
        lock(&self.deferred).remove(&player.id);
        Ok(stats)
    }

    pub fn is_deferred(&self, uid: &str) -> bool {
        lock(&self.deferred).contains(uid)
    }

    /// Run a deferred rebuild once the store is reachable again
    pub fn catch_up(&self, player: &Player) -> StoreResult<Option<UserStats>> {
        if !self.is_deferred(&player.id) || !self.gateway.is_online() {
            return Ok(None);
        }
        self.gateway.flush();
        self.rebuild(player).map(Some)
    }

    /// Stats are stale when missing or different from the ledger fold
    pub fn is_stale(stored: Option<&UserStats>, computed: &UserStats) -> bool {
        match stored {
            None => computed.solved_cases > 0,
            Some(stored) => !stored.same_figures(computed),
        }
    }

    /// Current stats, repairing them first if they disagree with the ledger.
    ///
    /// Returns the stats and whether a repair ran.
    pub fn ensure_fresh(&self, player: &Player) -> StoreResult<(UserStats, bool)> {
        let stored = self.load(&player.id)?;
        let computed = self.compute(&player.id)?;

        if Self::is_stale(stored.as_ref(), &computed) {
            log::warn!(
                "[stats] stats for {} are stale ({} solved stored, {} in ledger), rebuilding",
                player.id,
                stored.as_ref().map_or(0, |s| s.solved_cases),
                computed.solved_cases
            );
            return Ok((self.rebuild(player)?, true));
        }
        Ok((stored.unwrap_or(computed), false))
    }
}

impl std::fmt::Debug for StatsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsAggregator")
            .field("gateway", &self.gateway)
            .field("cases", &self.catalog.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::leaderboard::Scope;
    use crate::session::OutcomeKind;
    use crate::store::MemoryStore;

    const T0: u64 = 1_700_000_000_000;

    fn aggregator() -> (Arc<MemoryStore>, StatsAggregator) {
        let backend = Arc::new(MemoryStore::new());
        let gateway = Arc::new(PersistenceGateway::new(backend.clone()));
        let stats = StatsAggregator::new(
            gateway,
            Arc::new(CaseCatalog::builtin()),
            Arc::new(ManualClock::new(T0)),
        );
        (backend, stats)
    }

    fn record(case_id: &str, finished_at: u64, win: bool, score: Option<u64>) -> ResultRecord {
        ResultRecord {
            uid: "u1".into(),
            case_id: case_id.into(),
            finished_at,
            duration_ms: 60_000,
            penalty_ms: 0,
            attempts: 1,
            is_win: win,
            score,
        }
    }

    fn player() -> Player {
        Player {
            id: "u1".into(),
            display_name: Some("Sam".into()),
            photo_url: None,
        }
    }

    #[test]
    fn test_record_from_outcome() {
        let outcome = Outcome {
            kind: OutcomeKind::Win,
            duration_ms: 610_000,
            attempts: 3,
            penalty_ms: 600_000,
            score: Some(30),
        };
        let record = ResultRecord::new("u1", "case-001", T0, &outcome);
        assert!(record.is_win);
        assert_eq!(record.doc_id(), format!("u1_case-001_{}_3", T0));
        assert_eq!(record.path().collection, RESULTS_COLLECTION);
    }

    #[test]
    fn test_first_wins_picks_earliest_per_case() {
        let records = vec![
            record("case-001", T0 + 10, false, None),
            record("case-001", T0 + 30, true, Some(900)),
            record("case-002", T0 + 20, true, Some(100)),
            record("case-001", T0 + 20, true, Some(500)),
        ];
        let firsts = first_wins(&records);
        assert_eq!(firsts.len(), 2);
        assert_eq!(firsts[0].score, Some(100));
        assert_eq!(firsts[1].score, Some(500));
    }

    #[test]
    fn test_first_wins_tie_keeps_ledger_order() {
        let records = vec![
            record("case-001", T0, true, Some(1)),
            record("case-001", T0, true, Some(2)),
        ];
        let firsts = first_wins(&records);
        assert_eq!(firsts.len(), 1);
        assert_eq!(firsts[0].score, Some(1));
    }

    #[test]
    fn test_fold_aggregates_first_wins_only() {
        let (_, stats) = aggregator();
        let mut slow = record("case-002", T0 + 5, true, Some(250));
        slow.duration_ms = 120_001;
        slow.attempts = 2;
        let records = vec![
            record("case-001", T0, true, Some(500)),
            record("case-001", T0 + 10, true, Some(900)),
            slow,
            record("case-003", T0, false, None),
        ];

        let folded = stats.fold(&records);
        assert_eq!(folded.total_score, 750);
        assert_eq!(folded.solved_cases, 2);
        assert_eq!(folded.average_time_ms, 90_001);
        assert_eq!(folded.total_attempts, 3);
    }

    #[test]
    fn test_fold_rescores_missing_score() {
        let (_, stats) = aggregator();
        let folded = stats.fold(&[record("case-001", T0, true, None)]);
        assert_eq!(folded.total_score, 500);
    }

    #[test]
    fn test_fold_empty_ledger() {
        let (_, stats) = aggregator();
        let folded = stats.fold(&[]);
        assert_eq!(folded.total_score, 0);
        assert_eq!(folded.solved_cases, 0);
        assert_eq!(folded.average_time_ms, 0);
    }

    #[test]
    fn test_replayed_win_does_not_count() {
        let (_, stats) = aggregator();
        let player = player();

        let first = record("case-001", T0, true, Some(500));
        stats.append(&first).unwrap();
        stats.process_win(&player, &first).unwrap();

        let replay = record("case-001", T0 + 60_000, true, Some(900));
        stats.append(&replay).unwrap();
        let after = stats.process_win(&player, &replay).unwrap().unwrap();
        assert_eq!(after.total_score, 500);
        assert_eq!(after.solved_cases, 1);

        let stored = stats.load("u1").unwrap().unwrap();
        assert_eq!(stored.total_score, 500);

        let scope = Scope::Case("case-001".into());
        let entry = stats.leaderboard().entry(&scope, "u1").unwrap().unwrap();
        assert_eq!(entry.score, 500);

        let global = stats.leaderboard().entry(&Scope::Global, "u1").unwrap().unwrap();
        assert_eq!(global.score, 500);
        assert_eq!(global.display_name.as_deref(), Some("Sam"));
    }

    #[test]
    fn test_offline_win_waits_for_full_ledger() {
        let (backend, stats) = aggregator();
        let player = player();
        for (case_id, at, score) in [("case-001", T0, 500), ("case-002", T0 + 1, 200)] {
            let win = record(case_id, at, true, Some(score));
            stats.append(&win).unwrap();
            stats.process_win(&player, &win).unwrap();
        }
        assert_eq!(stats.load("u1").unwrap().unwrap().total_score, 700);

        // A later run that starts offline and has none of that history cached
        let gateway = Arc::new(PersistenceGateway::new(backend.clone()));
        gateway.set_network_enabled(false);
        let offline = StatsAggregator::new(
            gateway.clone(),
            Arc::new(CaseCatalog::builtin()),
            Arc::new(ManualClock::new(T0 + 10)),
        );
        let win = record("case-003", T0 + 5, true, Some(300));
        offline.append(&win).unwrap();
        assert_eq!(offline.process_win(&player, &win).unwrap(), None);
        assert!(offline.is_deferred("u1"));
        assert!(offline.rebuild(&player).unwrap_err().is_transient());
        assert_eq!(offline.catch_up(&player).unwrap(), None);
        assert_eq!(gateway.pending_writes(), 1);

        gateway.set_network_enabled(true);
        assert_eq!(stats.load("u1").unwrap().unwrap().total_score, 700);

        let caught_up = offline.catch_up(&player).unwrap().unwrap();
        assert_eq!(caught_up.total_score, 1000);
        assert_eq!(caught_up.solved_cases, 3);
        assert!(!offline.is_deferred("u1"));
        assert_eq!(offline.catch_up(&player).unwrap(), None);

        assert_eq!(stats.load("u1").unwrap().unwrap().total_score, 1000);
        let global = stats.leaderboard().entry(&Scope::Global, "u1").unwrap().unwrap();
        assert_eq!(global.score, 1000);
        assert!(stats
            .leaderboard()
            .entry(&Scope::Case("case-003".into()), "u1")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_stale_stats_are_repaired() {
        let (_, stats) = aggregator();
        let player = player();

        // Wins in the ledger but no stats or leaderboard entries
        stats.append(&record("case-001", T0, true, Some(500))).unwrap();
        stats.append(&record("case-002", T0 + 1, true, Some(200))).unwrap();
        assert!(stats.load("u1").unwrap().is_none());

        let (fresh, repaired) = stats.ensure_fresh(&player).unwrap();
        assert!(repaired);
        assert_eq!(fresh.total_score, 700);
        assert_eq!(fresh.solved_cases, 2);
        assert!(stats
            .leaderboard()
            .entry(&Scope::Case("case-002".into()), "u1")
            .unwrap()
            .is_some());

        let (again, repaired) = stats.ensure_fresh(&player).unwrap();
        assert!(!repaired);
        assert_eq!(again.total_score, 700);
    }

    #[test]
    fn test_zeroed_stats_are_stale() {
        let computed = UserStats {
            total_score: 500,
            solved_cases: 1,
            average_time_ms: 60_000,
            total_attempts: 1,
            last_updated: T0,
        };
        assert!(StatsAggregator::is_stale(Some(&UserStats::default()), &computed));
        assert!(StatsAggregator::is_stale(None, &computed));
        assert!(!StatsAggregator::is_stale(None, &UserStats::default()));

        let mut same = computed.clone();
        same.last_updated = T0 + 1;
        assert!(!StatsAggregator::is_stale(Some(&same), &computed));
    }

    #[test]
    fn test_rebuild_keeps_existing_case_entry() {
        let (_, stats) = aggregator();
        let player = player();

        let first = record("case-001", T0, true, Some(500));
        stats.append(&first).unwrap();
        stats.process_win(&player, &first).unwrap();

        stats.rebuild(&player).unwrap();
        let entry = stats
            .leaderboard()
            .entry(&Scope::Case("case-001".into()), "u1")
            .unwrap()
            .unwrap();
        assert_eq!(entry.score, 500);
    }

    #[test]
    fn test_losses_are_ledgered_but_not_counted() {
        let (backend, stats) = aggregator();
        stats.append(&record("case-001", T0, false, None)).unwrap();
        stats.append(&record("case-001", T0 + 1, false, None)).unwrap();
        assert_eq!(backend.count(RESULTS_COLLECTION), 2);
        assert_eq!(stats.ledger("u1").unwrap().len(), 2);
        assert_eq!(stats.compute("u1").unwrap().solved_cases, 0);
    }
}
