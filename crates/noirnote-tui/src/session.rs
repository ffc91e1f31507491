//! Play session for one player on one case
//!
//! The controller decides every submission synchronously against the case
//! solution and updates its local state before anything is written. The
//! session document, the result ledger entry and (on a win) the stats and
//! leaderboard projections then go through the [`PersistenceGateway`], which
//! queues them while the store is unreachable. Nothing in that tail can undo
//! an outcome the player has already seen.
//!
//! A session opened while its document cannot be read is provisional: it is
//! written as a create, and once the store answers again a stored session for
//! the same case replaces it.

use crate::clock::Clock;
use crate::stats::{ResultRecord, StatsAggregator};
use crate::store::{DocPath, PersistenceGateway};
use noirnote_core::{case_score, Axis, AxisPair, Candidate, CaseDefinition, DeductionBoard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// The signed-in player
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Player {
    pub id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl Player {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    /// Name for display, falling back to the id
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Playing,
    /// Terminal
    Finished,
}

/// Persisted session document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub case_id: String,
    pub status: SessionStatus,
    pub started_at: u64,
    pub attempts: u32,
    pub penalty_ms: u64,
    #[serde(default)]
    pub finished_at: Option<u64>,
    #[serde(default, rename = "gridStateSerialized")]
    pub board_state: String,
    #[serde(default)]
    pub updated_at: u64,
}

impl Session {
    fn start(case_id: &str, now: u64, board_state: String) -> Self {
        Self {
            case_id: case_id.to_string(),
            status: SessionStatus::Playing,
            started_at: now,
            attempts: 0,
            penalty_ms: 0,
            finished_at: None,
            board_state,
            updated_at: now,
        }
    }

    /// Time since start plus penalties; stops at the winning submission
    pub fn elapsed_ms(&self, now: u64) -> u64 {
        self.finished_at
            .unwrap_or(now)
            .saturating_sub(self.started_at)
            .saturating_add(self.penalty_ms)
    }

    pub fn is_finished(&self) -> bool {
        self.status == SessionStatus::Finished
    }
}

/// Location of a player's session document for a case
pub fn session_path(uid: &str, case_id: &str) -> DocPath {
    DocPath::new(format!("users/{}/activeCase", uid), case_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Time added for each wrong submission
    pub penalty_ms: u64,
    /// Quiet period after the last board edit before the board is saved
    pub board_save_debounce_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            penalty_ms: 5 * 60 * 1000,
            board_save_debounce_ms: 500,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no player signed in")]
    NotAuthenticated,
    #[error("unknown case: {0}")]
    UnknownCase(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Win,
    Loss,
}

/// Result of one submission, as shown to the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub duration_ms: u64,
    pub attempts: u32,
    pub penalty_ms: u64,
    /// Only wins are scored
    pub score: Option<u64>,
}

impl Outcome {
    pub fn is_win(&self) -> bool {
        self.kind == OutcomeKind::Win
    }
}

/// Owns the session, board and submission flow for one case
pub struct SessionController {
    player: Player,
    case: CaseDefinition,
    session: Session,
    board: DeductionBoard,
    stats: StatsAggregator,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    last_outcome: Option<Outcome>,
    /// Time of the last unsaved board edit
    board_edited_at: Option<u64>,
    /// Started without knowing whether a stored session exists
    provisional: bool,
}

impl SessionController {
    /// Restore the player's session for `case_id`, or start a new one.
    ///
    /// Fails only when no player is signed in or the case does not exist.
    pub fn open(
        player: Option<Player>,
        case_id: &str,
        stats: StatsAggregator,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let player = player.ok_or(SessionError::NotAuthenticated)?;
        let case = stats
            .catalog()
            .get(case_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownCase(case_id.to_string()))?;

        let mut board = DeductionBoard::for_case(&case);
        let path = session_path(&player.id, case_id);

        let mut provisional = false;
        let restored = match stats.gateway().get_as::<Session>(&path) {
            Ok(Some(session)) => Some(session),
            Ok(None) => None,
            Err(e) if e.is_transient() => {
                log::info!("[session] {} not available offline, starting provisionally", path);
                provisional = true;
                None
            }
            Err(e) => {
                log::warn!("[session] cannot read {}: {}", path, e);
                None
            }
        };

        let controller = match restored {
            Some(session) => {
                if !session.board_state.is_empty() {
                    board.restore_snapshot(&session.board_state);
                }
                log::info!(
                    "[session] restored {} for {}: {:?}, {} attempts",
                    case_id,
                    player.id,
                    session.status,
                    session.attempts
                );
                Self::with_session(player, case, session, board, stats, clock, config)
            }
            None => {
                let session = Session::start(case_id, clock.now_ms(), board.to_snapshot());
                log::info!("[session] new session on {} for {}", case_id, player.id);
                let mut controller =
                    Self::with_session(player, case, session, board, stats, clock, config);
                if provisional {
                    controller.provisional = true;
                    controller.create();
                } else {
                    controller.save();
                }
                controller
            }
        };
        Ok(controller)
    }

    fn with_session(
        player: Player,
        case: CaseDefinition,
        session: Session,
        board: DeductionBoard,
        stats: StatsAggregator,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            player,
            case,
            session,
            board,
            stats,
            clock,
            config,
            last_outcome: None,
            board_edited_at: None,
            provisional: false,
        }
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn case(&self) -> &CaseDefinition {
        &self.case
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn board(&self) -> &DeductionBoard {
        &self.board
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    pub fn gateway(&self) -> &Arc<PersistenceGateway> {
        self.stats.gateway()
    }

    pub fn is_finished(&self) -> bool {
        self.session.is_finished()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.session.elapsed_ms(self.clock.now_ms())
    }

    /// Outcome of the most recent submission in this run
    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.last_outcome.as_ref()
    }

    pub fn has_unsaved_board(&self) -> bool {
        self.board_edited_at.is_some()
    }

    pub fn is_provisional(&self) -> bool {
        self.provisional
    }

    /// Cycle a grid cell; the board is saved after the debounce period
    pub fn cycle(&mut self, pair: AxisPair, row: usize, col: usize) -> bool {
        let changed = self.board.cycle(pair, row, col);
        if changed {
            self.board_edited_at = Some(self.clock.now_ms());
        }
        changed
    }

    /// Pick the final answer along one axis
    pub fn select(&mut self, axis: Axis, id: &str) -> bool {
        self.board.select(axis, id)
    }

    /// Submit the answer chosen with the selectors, if all three are set
    pub fn submit_selection(&mut self) -> Option<Outcome> {
        let candidate = self.board.submit_candidate()?;
        self.submit(&candidate)
    }

    /// Judge a final answer.
    ///
    /// Returns `None` once the session is finished; a finished session never
    /// changes again.
    pub fn submit(&mut self, candidate: &Candidate) -> Option<Outcome> {
        self.reconcile();
        if self.session.is_finished() {
            log::debug!("[session] ignoring submission on finished {}", self.case.id);
            return None;
        }

        let now = self.clock.now_ms();
        self.session.attempts = self.session.attempts.saturating_add(1);
        let attempts = self.session.attempts;

        let outcome = if self.case.is_solved_by(candidate) {
            let duration_ms = self.session.elapsed_ms(now);
            let score = case_score(duration_ms, attempts, self.case.difficulty);
            self.session.status = SessionStatus::Finished;
            self.session.finished_at = Some(now);
            Outcome {
                kind: OutcomeKind::Win,
                duration_ms,
                attempts,
                penalty_ms: self.session.penalty_ms,
                score: Some(score),
            }
        } else {
            self.session.penalty_ms = self.session.penalty_ms.saturating_add(self.config.penalty_ms);
            Outcome {
                kind: OutcomeKind::Loss,
                duration_ms: self.session.elapsed_ms(now),
                attempts,
                penalty_ms: self.session.penalty_ms,
                score: None,
            }
        };

        log::info!(
            "[session] {} on {}: {:?} after {} attempts, {} ms",
            self.player.id,
            self.case.id,
            outcome.kind,
            outcome.attempts,
            outcome.duration_ms
        );
        self.last_outcome = Some(outcome.clone());
        self.record(&outcome, now);
        Some(outcome)
    }

    /// Persist everything a submission produced. Failures are logged only.
    fn record(&mut self, outcome: &Outcome, now: u64) {
        self.save();

        let record = ResultRecord::new(&self.player.id, &self.case.id, now, outcome);
        if let Err(e) = self.stats.append(&record) {
            log::error!("[session] cannot record result {}: {}", record.doc_id(), e);
            return;
        }

        if outcome.is_win() {
            if let Err(e) = self.stats.process_win(&self.player, &record) {
                log::warn!("[session] stats update after win on {} failed: {}", self.case.id, e);
            }
        }
    }

    /// Settle offline leftovers, then save the board once it has been left
    /// alone for the debounce period
    pub fn tick(&mut self) {
        self.reconcile();
        if self.stats.is_deferred(&self.player.id) {
            match self.stats.catch_up(&self.player) {
                Ok(Some(stats)) => log::info!(
                    "[session] caught up stats for {}: {} points",
                    self.player.id,
                    stats.total_score
                ),
                Ok(None) => {}
                Err(e) if e.is_transient() => log::debug!("[session] stats catch-up waiting: {}", e),
                Err(e) => log::warn!("[session] stats catch-up failed: {}", e),
            }
        }

        if let Some(edited_at) = self.board_edited_at {
            let now = self.clock.now_ms();
            if now.saturating_sub(edited_at) >= self.config.board_save_debounce_ms {
                self.save();
            }
        }
    }

    /// Save pending board edits immediately
    pub fn flush_board(&mut self) {
        if self.board_edited_at.is_some() {
            self.save();
        }
    }

    /// Adopt the stored session once a provisional one can be checked.
    ///
    /// Returns true when the stored session replaced the local one.
    fn reconcile(&mut self) -> bool {
        if !self.provisional {
            return false;
        }
        let path = session_path(&self.player.id, &self.case.id);
        let gateway = self.gateway().clone();
        if !gateway.is_online() || gateway.has_pending(&path) {
            return false;
        }

        match gateway.get_as::<Session>(&path) {
            Ok(Some(stored)) if stored.started_at != self.session.started_at => {
                log::info!(
                    "[session] {} already had a session on {}: {:?}, {} attempts",
                    self.player.id,
                    self.case.id,
                    stored.status,
                    stored.attempts
                );
                self.board = DeductionBoard::for_case(&self.case);
                if !stored.board_state.is_empty() {
                    self.board.restore_snapshot(&stored.board_state);
                }
                self.session = stored;
                self.board_edited_at = None;
                self.provisional = false;
                true
            }
            Ok(_) => {
                self.provisional = false;
                false
            }
            Err(e) => {
                log::debug!("[session] cannot check {} yet: {}", path, e);
                false
            }
        }
    }

    fn snapshot(&mut self) {
        self.session.board_state = self.board.to_snapshot();
        self.session.updated_at = self.clock.now_ms();
        self.board_edited_at = None;
    }

    fn save(&mut self) {
        if self.reconcile() {
            return;
        }
        self.snapshot();

        let path = session_path(&self.player.id, &self.case.id);
        if let Err(e) = self.gateway().set_from(&path, &self.session, true) {
            log::error!("[session] cannot encode session {}: {}", path, e);
        }
    }

    /// First write of a provisional session; never replaces a stored one
    fn create(&mut self) {
        self.snapshot();

        let path = session_path(&self.player.id, &self.case.id);
        if let Err(e) = self.gateway().create_from(&path, &self.session) {
            log::error!("[session] cannot encode session {}: {}", path, e);
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("player", &self.player.id)
            .field("case", &self.case.id)
            .field("session", &self.session)
            .finish()
    }
}
