//! Leaderboard projections
//!
//! Two scopes, one entry per player in each:
//! - Global: the player's current aggregate stats, re-published on every win
//! - Per case: the player's first win on that case, written once and never
//!   replaced

use crate::clock::Clock;
use crate::session::Player;
use crate::stats::{ResultRecord, UserStats};
use crate::store::{DocPath, Direction, PersistenceGateway, Query, StoreResult, WriteAck};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which ranking an entry belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Case(String),
}

impl Scope {
    pub fn key(&self) -> &str {
        match self {
            Scope::Global => "global",
            Scope::Case(case_id) => case_id,
        }
    }

    pub fn collection(&self) -> String {
        format!("leaderboard/{}/entries", self.key())
    }

    pub fn entry_path(&self, uid: &str) -> DocPath {
        DocPath::new(self.collection(), uid)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => write!(f, "All cases"),
            Scope::Case(case_id) => write!(f, "{}", case_id),
        }
    }
}

/// Leaderboard entry for publication and retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    /// Total score (global) or the winning score (per case)
    pub score: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved_cases: Option<u32>,
    pub updated_at: u64,
    /// Position within the scope (populated on retrieval)
    #[serde(default, skip_serializing)]
    pub rank: Option<usize>,
}

impl LeaderboardEntry {
    fn for_player(player: &Player, score: u64, updated_at: u64) -> Self {
        Self {
            uid: player.id.clone(),
            display_name: player.display_name.clone(),
            photo_url: player.photo_url.clone(),
            score,
            duration_ms: None,
            attempts: None,
            solved_cases: None,
            updated_at,
            rank: None,
        }
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.uid)
    }
}

/// Publishes stats and first wins into the leaderboard collections
#[derive(Clone)]
pub struct LeaderboardReconciler {
    gateway: Arc<PersistenceGateway>,
    clock: Arc<dyn Clock>,
}

impl LeaderboardReconciler {
    pub fn new(gateway: Arc<PersistenceGateway>, clock: Arc<dyn Clock>) -> Self {
        Self { gateway, clock }
    }

    /// Upsert the player's global entry from their current stats
    pub fn publish_global(&self, player: &Player, stats: &UserStats) -> StoreResult<WriteAck> {
        let mut entry = LeaderboardEntry::for_player(player, stats.total_score, self.clock.now_ms());
        entry.duration_ms = Some(stats.average_time_ms);
        entry.attempts = Some(stats.total_attempts);
        entry.solved_cases = Some(stats.solved_cases);

        log::debug!("[leaderboard] global entry for {}: {} points", player.id, entry.score);
        self.gateway
            .set_from(&Scope::Global.entry_path(&player.id), &entry, true)
    }

    /// Write the player's entry for a case unless one already exists.
    ///
    /// An entry seen locally is a successful no-op (`Ok(false)`). Otherwise
    /// the entry is queued as a create, which the store drops on delivery if
    /// the backend already holds one.
    pub fn publish_case(&self, player: &Player, record: &ResultRecord) -> StoreResult<bool> {
        let scope = Scope::Case(record.case_id.clone());
        let path = scope.entry_path(&player.id);

        match self.gateway.get(&path) {
            Ok(Some(_)) => {
                log::debug!("[leaderboard] {} already ranked on {}", player.id, scope);
                return Ok(false);
            }
            Ok(None) => {}
            Err(e) if e.is_transient() => {
                log::info!("[leaderboard] cannot check {} offline, queueing a create: {}", path, e);
            }
            Err(e) => return Err(e),
        }

        let mut entry =
            LeaderboardEntry::for_player(player, record.score.unwrap_or(0), record.finished_at);
        entry.duration_ms = Some(record.duration_ms);
        entry.attempts = Some(u64::from(record.attempts));

        log::debug!("[leaderboard] first win for {} on {}: {} points", player.id, scope, entry.score);
        self.gateway.create_from(&path, &entry)?;
        Ok(true)
    }

    pub fn entry(&self, scope: &Scope, uid: &str) -> StoreResult<Option<LeaderboardEntry>> {
        self.gateway.get_as(&scope.entry_path(uid))
    }

    fn ranked(&self, scope: &Scope, limit: Option<usize>) -> StoreResult<Vec<LeaderboardEntry>> {
        let mut query = Query::collection(scope.collection()).order_by("score", Direction::Descending);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        let mut entries: Vec<LeaderboardEntry> = self.gateway.query_as(&query)?;
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = Some(i + 1);
        }
        Ok(entries)
    }

    /// Top entries by score; equal scores keep publication order
    pub fn ranking(&self, scope: &Scope, limit: usize) -> StoreResult<Vec<LeaderboardEntry>> {
        self.ranked(scope, Some(limit))
    }

    /// 1-based position of a player, if ranked
    pub fn player_rank(&self, scope: &Scope, uid: &str) -> StoreResult<Option<usize>> {
        Ok(self
            .ranked(scope, None)?
            .into_iter()
            .find(|e| e.uid == uid)
            .and_then(|e| e.rank))
    }
}

impl std::fmt::Debug for LeaderboardReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderboardReconciler")
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn reconciler() -> (Arc<MemoryStore>, LeaderboardReconciler) {
        let backend = Arc::new(MemoryStore::new());
        let gateway = Arc::new(PersistenceGateway::new(backend.clone()));
        let reconciler = LeaderboardReconciler::new(gateway, Arc::new(ManualClock::new(1_000)));
        (backend, reconciler)
    }

    fn win(uid: &str, case_id: &str, score: u64, finished_at: u64) -> ResultRecord {
        ResultRecord {
            uid: uid.into(),
            case_id: case_id.into(),
            finished_at,
            duration_ms: 60_000,
            penalty_ms: 0,
            attempts: 1,
            is_win: true,
            score: Some(score),
        }
    }

    fn stats(total_score: u64) -> UserStats {
        UserStats {
            total_score,
            solved_cases: 1,
            average_time_ms: 60_000,
            total_attempts: 1,
            last_updated: 0,
        }
    }

    #[test]
    fn test_scope_paths() {
        assert_eq!(
            Scope::Global.entry_path("u1").to_string(),
            "leaderboard/global/entries/u1"
        );
        assert_eq!(
            Scope::Case("case-002".into()).collection(),
            "leaderboard/case-002/entries"
        );
    }

    #[test]
    fn test_case_entry_written_once() {
        let (_, lb) = reconciler();
        let player = Player::new("u1");

        assert!(lb.publish_case(&player, &win("u1", "case-001", 500, 10)).unwrap());
        assert!(!lb.publish_case(&player, &win("u1", "case-001", 900, 20)).unwrap());

        let entry = lb
            .entry(&Scope::Case("case-001".into()), "u1")
            .unwrap()
            .unwrap();
        assert_eq!(entry.score, 500);
        assert_eq!(entry.updated_at, 10);
    }

    #[test]
    fn test_case_entry_guard_uses_queued_write() {
        let (backend, lb) = reconciler();
        backend.set_available(false);
        let player = Player::new("u1");

        assert!(lb.publish_case(&player, &win("u1", "case-001", 500, 10)).unwrap());
        assert!(!lb.publish_case(&player, &win("u1", "case-001", 900, 20)).unwrap());

        backend.set_available(true);
        lb.gateway.flush();
        let entry = lb
            .entry(&Scope::Case("case-001".into()), "u1")
            .unwrap()
            .unwrap();
        assert_eq!(entry.score, 500);
    }

    #[test]
    fn test_offline_replay_keeps_remote_case_entry() {
        let (backend, lb) = reconciler();
        let player = Player::new("u1");
        assert!(lb.publish_case(&player, &win("u1", "case-001", 500, 10)).unwrap());

        // Another process that has never read this entry
        let gateway = Arc::new(PersistenceGateway::new(backend.clone()));
        gateway.set_network_enabled(false);
        let offline = LeaderboardReconciler::new(gateway.clone(), Arc::new(ManualClock::new(2_000)));
        assert!(offline.publish_case(&player, &win("u1", "case-001", 900, 20)).unwrap());

        gateway.set_network_enabled(true);
        assert_eq!(gateway.pending_writes(), 0);
        let scope = Scope::Case("case-001".into());
        assert_eq!(lb.entry(&scope, "u1").unwrap().unwrap().score, 500);
        assert_eq!(offline.entry(&scope, "u1").unwrap().unwrap().score, 500);
    }

    #[test]
    fn test_global_entry_is_upserted() {
        let (backend, lb) = reconciler();
        let player = Player::new("u1");
        lb.publish_global(&player, &stats(500)).unwrap();
        lb.publish_global(&player, &stats(800)).unwrap();

        assert_eq!(backend.count("leaderboard/global/entries"), 1);
        let entry = lb.entry(&Scope::Global, "u1").unwrap().unwrap();
        assert_eq!(entry.score, 800);
        assert_eq!(entry.solved_cases, Some(1));
    }

    #[test]
    fn test_ranking_orders_by_score_with_stable_ties() {
        let (_, lb) = reconciler();
        for (uid, score) in [("a", 300), ("b", 500), ("c", 300), ("d", 100)] {
            lb.publish_global(&Player::new(uid), &stats(score)).unwrap();
        }

        let ranking = lb.ranking(&Scope::Global, 10).unwrap();
        let order: Vec<(&str, Option<usize>)> =
            ranking.iter().map(|e| (e.uid.as_str(), e.rank)).collect();
        assert_eq!(
            order,
            vec![("b", Some(1)), ("a", Some(2)), ("c", Some(3)), ("d", Some(4))]
        );

        assert_eq!(lb.ranking(&Scope::Global, 2).unwrap().len(), 2);
        assert_eq!(lb.player_rank(&Scope::Global, "c").unwrap(), Some(3));
        assert_eq!(lb.player_rank(&Scope::Global, "zz").unwrap(), None);
    }

    #[test]
    fn test_players_do_not_clobber_each_other() {
        let (_, lb) = reconciler();
        lb.publish_case(&Player::new("u1"), &win("u1", "case-001", 500, 10))
            .unwrap();
        lb.publish_case(&Player::new("u2"), &win("u2", "case-001", 700, 20))
            .unwrap();

        let ranking = lb.ranking(&Scope::Case("case-001".into()), 10).unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].uid, "u2");
    }
}
