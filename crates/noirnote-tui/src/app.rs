use crate::clock::Clock;
use crate::leaderboard::{LeaderboardEntry, Scope};
use crate::session::{Outcome, SessionConfig, SessionController};
use crate::stats::UserStats;
use crate::theme::Theme;
use crossterm::event::{KeyCode, KeyEvent};
use noirnote_core::{Axis, AxisPair, CellDisplay, GRID_SIZE};
use std::sync::Arc;
use std::time::Duration;

/// Rows shown on the leaderboard screen
pub const LEADERBOARD_SIZE: usize = 10;

/// Result of handling a key press
pub enum AppAction {
    Continue,
    Quit,
}

/// Current screen state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
    /// Marking grids and choosing an answer
    Playing,
    /// Outcome of the last submission
    Result,
    /// Player statistics
    Profile,
    /// Rankings
    Leaderboard,
}

/// Selected cell: grid plus row/column within it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub pair: AxisPair,
    pub row: usize,
    pub col: usize,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            pair: AxisPair::SuspectLocation,
            row: 0,
            col: 0,
        }
    }
}

impl Cursor {
    fn step(&mut self, d_row: isize, d_col: isize) {
        let max = GRID_SIZE as isize - 1;
        self.row = (self.row as isize + d_row).clamp(0, max) as usize;
        self.col = (self.col as isize + d_col).clamp(0, max) as usize;
    }

    fn next_grid(&mut self, forward: bool) {
        let i = AxisPair::ALL.iter().position(|p| *p == self.pair).unwrap_or(0);
        let n = AxisPair::ALL.len();
        let next = if forward { (i + 1) % n } else { (i + n - 1) % n };
        self.pair = AxisPair::ALL[next];
    }
}

/// The main application state
pub struct App {
    /// Session for the open case
    pub session: SessionController,
    pub cursor: Cursor,
    /// Color theme
    pub theme: Theme,
    high_contrast: bool,
    /// Message to display
    pub message: Option<String>,
    /// Message timer
    message_timer: u32,
    /// Current screen state
    pub screen_state: ScreenState,
    /// Stats shown on the profile screen
    pub profile: Option<UserStats>,
    /// Selected leaderboard scope
    pub leaderboard_scope: Scope,
    /// Entries for the selected scope
    pub leaderboard: Vec<LeaderboardEntry>,
    /// The player's rank in the selected scope
    pub player_rank: Option<usize>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl App {
    pub fn new(session: SessionController, clock: Arc<dyn Clock>, config: SessionConfig) -> Self {
        Self {
            session,
            cursor: Cursor::default(),
            theme: Theme::noir(),
            high_contrast: false,
            message: None,
            message_timer: 0,
            screen_state: ScreenState::Playing,
            profile: None,
            leaderboard_scope: Scope::Global,
            leaderboard: Vec::new(),
            player_rank: None,
            clock,
            config,
        }
    }

    /// Get the tick rate based on current screen
    pub fn get_tick_rate(&self) -> Duration {
        Duration::from_millis(100)
    }

    /// Update timers and save board edits (called every tick)
    pub fn tick(&mut self) {
        if self.message_timer > 0 {
            self.message_timer -= 1;
            if self.message_timer == 0 {
                self.message = None;
            }
        }
        self.session.tick();
    }

    /// Show a temporary message
    pub fn show_message(&mut self, msg: &str) {
        self.message = Some(msg.to_string());
        self.message_timer = 30; // ~3 seconds at 100ms poll
    }

    /// Outcome to present on the result screen
    pub fn outcome(&self) -> Option<&Outcome> {
        self.session.last_outcome()
    }

    /// Handle a key press
    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        match self.screen_state {
            ScreenState::Playing => self.handle_game_key(key),
            ScreenState::Result => self.handle_result_key(key),
            ScreenState::Profile => self.handle_profile_key(key),
            ScreenState::Leaderboard => self.handle_leaderboard_key(key),
        }
    }

    fn handle_game_key(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('q') => return self.quit(),
            KeyCode::Up | KeyCode::Char('k') => self.cursor.step(-1, 0),
            KeyCode::Down | KeyCode::Char('j') => self.cursor.step(1, 0),
            KeyCode::Left | KeyCode::Char('h') => self.cursor.step(0, -1),
            KeyCode::Right | KeyCode::Char('l') => self.cursor.step(0, 1),
            KeyCode::Tab => self.cursor.next_grid(true),
            KeyCode::BackTab => self.cursor.next_grid(false),
            KeyCode::Char(' ') | KeyCode::Enter => self.cycle_cell(),
            KeyCode::Char('1') => self.cycle_selector(Axis::Suspect),
            KeyCode::Char('2') => self.cycle_selector(Axis::Location),
            KeyCode::Char('3') => self.cycle_selector(Axis::Weapon),
            KeyCode::Char('a') => self.submit(),
            KeyCode::Char('p') => self.open_profile(),
            KeyCode::Char('b') => self.open_leaderboard(),
            KeyCode::Char('n') => self.toggle_network(),
            KeyCode::Char('r') => self.repair_stats(),
            KeyCode::Char('c') => self.next_case(),
            KeyCode::Char('t') => self.toggle_theme(),
            _ => {}
        }
        AppAction::Continue
    }

    fn handle_result_key(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('q') => return self.quit(),
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char(' ') => {
                self.screen_state = ScreenState::Playing
            }
            KeyCode::Char('b') => self.open_leaderboard(),
            KeyCode::Char('p') => self.open_profile(),
            KeyCode::Char('c') => self.next_case(),
            _ => {}
        }
        AppAction::Continue
    }

    fn handle_profile_key(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('q') => return self.quit(),
            KeyCode::Esc | KeyCode::Char('p') => self.screen_state = ScreenState::Playing,
            KeyCode::Char('r') => self.repair_stats(),
            KeyCode::Char('b') => self.open_leaderboard(),
            _ => {}
        }
        AppAction::Continue
    }

    fn handle_leaderboard_key(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('q') => return self.quit(),
            KeyCode::Esc | KeyCode::Char('b') => self.screen_state = ScreenState::Playing,
            KeyCode::Left | KeyCode::Char('h') => self.switch_scope(false),
            KeyCode::Right | KeyCode::Char('l') => self.switch_scope(true),
            _ => {}
        }
        AppAction::Continue
    }

    fn quit(&mut self) -> AppAction {
        self.session.flush_board();
        AppAction::Quit
    }

    fn cycle_cell(&mut self) {
        let Cursor { pair, row, col } = self.cursor;
        if !self.session.cycle(pair, row, col)
            && self.session.board().display(pair, row, col) == CellDisplay::DerivedCrossed
        {
            self.show_message("Ruled out by a confirmed link");
        }
    }

    /// Advance the final-answer selector for one axis
    fn cycle_selector(&mut self, axis: Axis) {
        let board = self.session.board();
        let next = board
            .selected(axis)
            .and_then(|id| board.index_of(axis, id))
            .map_or(0, |i| (i + 1) % GRID_SIZE);
        let id = board.entity_at(axis, next).to_string();
        self.session.select(axis, &id);
    }

    fn submit(&mut self) {
        if self.session.is_finished() {
            self.show_message("Case closed");
            return;
        }
        match self.session.submit_selection() {
            Some(_) => self.screen_state = ScreenState::Result,
            None => self.show_message("Pick a suspect, location and weapon first (1/2/3)"),
        }
    }

    fn open_profile(&mut self) {
        let player = self.session.player().clone();
        match self.session.stats().ensure_fresh(&player) {
            Ok((stats, repaired)) => {
                self.profile = Some(stats);
                if repaired {
                    self.show_message("Stats repaired from your case history");
                }
            }
            Err(e) => {
                log::warn!("[app] cannot load stats: {}", e);
                self.profile = None;
                self.show_message("Stats unavailable offline");
            }
        }
        self.screen_state = ScreenState::Profile;
    }

    fn repair_stats(&mut self) {
        let player = self.session.player().clone();
        match self.session.stats().rebuild(&player) {
            Ok(stats) => {
                self.profile = Some(stats);
                self.show_message("Stats rebuilt");
            }
            Err(e) => {
                log::warn!("[app] stats rebuild failed: {}", e);
                self.show_message("Rebuild failed, see log");
            }
        }
    }

    /// Global plus one scope per case
    pub fn scopes(&self) -> Vec<Scope> {
        std::iter::once(Scope::Global)
            .chain(
                self.session
                    .stats()
                    .catalog()
                    .iter()
                    .map(|case| Scope::Case(case.id.clone())),
            )
            .collect()
    }

    fn open_leaderboard(&mut self) {
        self.load_leaderboard();
        self.screen_state = ScreenState::Leaderboard;
    }

    fn switch_scope(&mut self, forward: bool) {
        let scopes = self.scopes();
        let i = scopes
            .iter()
            .position(|s| *s == self.leaderboard_scope)
            .unwrap_or(0);
        let n = scopes.len();
        let next = if forward { (i + 1) % n } else { (i + n - 1) % n };
        self.leaderboard_scope = scopes[next].clone();
        self.load_leaderboard();
    }

    fn load_leaderboard(&mut self) {
        let leaderboard = self.session.stats().leaderboard().clone();
        let uid = self.session.player().id.clone();
        match leaderboard.ranking(&self.leaderboard_scope, LEADERBOARD_SIZE) {
            Ok(entries) => self.leaderboard = entries,
            Err(e) => {
                log::warn!("[app] cannot load {} leaderboard: {}", self.leaderboard_scope, e);
                self.leaderboard.clear();
                if e.is_transient() {
                    self.show_message("Leaderboard unavailable offline");
                }
            }
        }
        self.player_rank = leaderboard
            .player_rank(&self.leaderboard_scope, &uid)
            .unwrap_or(None);
    }

    fn toggle_network(&mut self) {
        let gateway = self.session.gateway().clone();
        let enable = !gateway.network_enabled();
        gateway.set_network_enabled(enable);
        if enable {
            let pending = gateway.pending_writes();
            if pending == 0 {
                self.show_message("Online, all changes synced");
            } else {
                self.show_message(&format!("Online, {} changes still queued", pending));
            }
        } else {
            self.show_message("Offline, changes will be queued");
        }
    }

    fn toggle_theme(&mut self) {
        self.high_contrast = !self.high_contrast;
        self.theme = if self.high_contrast {
            Theme::high_contrast()
        } else {
            Theme::noir()
        };
    }

    /// Open the next case in the catalog
    fn next_case(&mut self) {
        let catalog = self.session.stats().catalog().clone();
        let current = self.session.case().id.clone();
        let ids: Vec<&str> = catalog.iter().map(|c| c.id.as_str()).collect();
        let i = ids.iter().position(|id| *id == current).unwrap_or(0);
        let next = ids[(i + 1) % ids.len()];

        self.session.flush_board();
        match SessionController::open(
            Some(self.session.player().clone()),
            next,
            self.session.stats().clone(),
            self.clock.clone(),
            self.config,
        ) {
            Ok(session) => {
                self.session = session;
                self.cursor = Cursor::default();
                self.screen_state = ScreenState::Playing;
                self.show_message(&format!("Opened {}", next));
            }
            Err(e) => {
                log::error!("[app] cannot open {}: {}", next, e);
                self.show_message("Cannot open the next case");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::Player;
    use crate::stats::StatsAggregator;
    use crate::store::{MemoryStore, PersistenceGateway};
    use crossterm::event::KeyModifiers;
    use noirnote_core::{CaseCatalog, CellMark};

    fn app() -> (Arc<ManualClock>, App) {
        let backend = Arc::new(MemoryStore::new());
        let gateway = Arc::new(PersistenceGateway::new(backend));
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let stats = StatsAggregator::new(gateway, Arc::new(CaseCatalog::builtin()), clock.clone());
        let config = SessionConfig::default();
        let session =
            SessionController::open(Some(Player::new("u1")), "case-001", stats, clock.clone(), config)
                .unwrap();
        (clock.clone(), App::new(session, clock, config))
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn test_cursor_moves_and_cycles() {
        let (_, mut app) = app();
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Char(' '));

        let cursor = app.cursor;
        assert_eq!(cursor.pair, AxisPair::SuspectWeapon);
        assert_eq!((cursor.row, cursor.col), (1, 1));
        assert_eq!(
            app.session.board().grid(AxisPair::SuspectWeapon).mark(1, 1),
            CellMark::Crossed
        );
    }

    #[test]
    fn test_cursor_stays_in_grid() {
        let (_, mut app) = app();
        for _ in 0..5 {
            press(&mut app, KeyCode::Up);
            press(&mut app, KeyCode::Left);
        }
        assert_eq!((app.cursor.row, app.cursor.col), (0, 0));
        for _ in 0..5 {
            press(&mut app, KeyCode::Down);
        }
        assert_eq!(app.cursor.row, GRID_SIZE - 1);
    }

    #[test]
    fn test_submit_requires_full_selection() {
        let (_, mut app) = app();
        press(&mut app, KeyCode::Char('1'));
        press(&mut app, KeyCode::Char('a'));
        assert_eq!(app.screen_state, ScreenState::Playing);
        assert!(app.message.is_some());
        assert_eq!(app.session.session().attempts, 0);
    }

    #[test]
    fn test_solve_through_selectors() {
        let (clock, mut app) = app();
        clock.advance(60_000);
        // suspect-001, location-002, weapon-003
        press(&mut app, KeyCode::Char('1'));
        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('2'));
        for _ in 0..3 {
            press(&mut app, KeyCode::Char('3'));
        }
        press(&mut app, KeyCode::Char('a'));

        assert_eq!(app.screen_state, ScreenState::Result);
        let outcome = app.outcome().unwrap();
        assert!(outcome.is_win());
        assert_eq!(outcome.score, Some(500));

        press(&mut app, KeyCode::Char('b'));
        assert_eq!(app.screen_state, ScreenState::Leaderboard);
        assert_eq!(app.leaderboard.len(), 1);
        assert_eq!(app.player_rank, Some(1));

        press(&mut app, KeyCode::Right);
        assert_eq!(app.leaderboard_scope, Scope::Case("case-001".into()));
        assert_eq!(app.leaderboard[0].score, 500);
    }

    #[test]
    fn test_profile_shows_stats() {
        let (_, mut app) = app();
        press(&mut app, KeyCode::Char('p'));
        assert_eq!(app.screen_state, ScreenState::Profile);
        assert_eq!(app.profile.as_ref().map(|s| s.solved_cases), Some(0));
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.screen_state, ScreenState::Playing);
    }

    #[test]
    fn test_network_toggle_queues_writes() {
        let (_, mut app) = app();
        press(&mut app, KeyCode::Char('n'));
        assert!(!app.session.gateway().is_online());

        press(&mut app, KeyCode::Char('1'));
        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('3'));
        press(&mut app, KeyCode::Char('a'));
        assert!(app.session.gateway().pending_writes() > 0);

        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.session.gateway().pending_writes(), 0);
    }

    #[test]
    fn test_next_case_opens_new_session() {
        let (_, mut app) = app();
        press(&mut app, KeyCode::Char('c'));
        assert_eq!(app.session.case().id, "case-002");
        press(&mut app, KeyCode::Char('c'));
        press(&mut app, KeyCode::Char('c'));
        assert_eq!(app.session.case().id, "case-001");
    }
}
