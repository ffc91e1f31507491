use crate::app::{App, ScreenState};
use crate::clock::format_duration;
use crate::leaderboard::Scope;
use crate::session::OutcomeKind;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::{Color, Print, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use noirnote_core::{Axis, AxisPair, GRID_SIZE};
use std::io;

/// Width of one grid including its row labels
const GRID_WIDTH: u16 = 22;
const CELL_WIDTH: u16 = 5;
const LABEL_WIDTH: u16 = 7;

pub fn render(stdout: &mut io::Stdout, app: &App) -> io::Result<()> {
    let (term_width, term_height) = terminal::size()?;

    execute!(stdout, Hide, SetBackgroundColor(app.theme.bg), Clear(ClearType::All))?;

    match app.screen_state {
        ScreenState::Playing => render_game_screen(stdout, app, term_width)?,
        ScreenState::Result => {
            render_game_screen(stdout, app, term_width)?;
            render_result_overlay(stdout, app, term_width, term_height)?;
        }
        ScreenState::Profile => render_profile_screen(stdout, app, term_width)?,
        ScreenState::Leaderboard => render_leaderboard_screen(stdout, app, term_width)?,
    }

    if let Some(ref msg) = app.message {
        render_message(stdout, app, msg, term_width)?;
    }

    execute!(stdout, Show)?;
    Ok(())
}

/// Compact header label: "suspect-002" becomes "S-002"
fn short_label(id: &str) -> String {
    match id.rsplit_once('-') {
        Some((kind, n)) => {
            let initial = kind.chars().next().unwrap_or('?').to_ascii_uppercase();
            format!("{}-{}", initial, n)
        }
        None => id.chars().take(6).collect(),
    }
}

fn axis_title(axis: Axis) -> &'static str {
    match axis {
        Axis::Suspect => "Suspect",
        Axis::Location => "Location",
        Axis::Weapon => "Weapon",
    }
}

fn render_game_screen(stdout: &mut io::Stdout, app: &App, term_width: u16) -> io::Result<()> {
    let theme = &app.theme;
    let case = app.session.case();

    let total_width = GRID_WIDTH * 3 + 4;
    let start_x = term_width.saturating_sub(total_width) / 2;
    let start_y = 2;

    execute!(
        stdout,
        MoveTo(start_x, 0),
        SetForegroundColor(theme.key),
        Print(format!("═══ NOIRNOTE ═══  {} ({})", case.id, case.difficulty))
    )?;

    for (i, pair) in AxisPair::ALL.iter().enumerate() {
        let x = start_x + i as u16 * (GRID_WIDTH + 2);
        render_grid(stdout, app, *pair, x, start_y)?;
    }

    let below = start_y + 10;
    render_selectors(stdout, app, start_x, below)?;
    render_info_panel(stdout, app, start_x, below + 5)?;
    render_controls(stdout, app, start_x, below + 11)?;
    Ok(())
}

fn render_grid(stdout: &mut io::Stdout, app: &App, pair: AxisPair, x: u16, y: u16) -> io::Result<()> {
    let theme = &app.theme;
    let board = app.session.board();
    let active = app.cursor.pair == pair;

    execute!(
        stdout,
        MoveTo(x, y),
        SetForegroundColor(if active { theme.key } else { theme.info }),
        Print(format!("{} × {}", axis_title(pair.rows()), axis_title(pair.cols())))
    )?;

    // Column headers
    execute!(stdout, MoveTo(x + LABEL_WIDTH, y + 1), SetForegroundColor(theme.header))?;
    for col in 0..GRID_SIZE {
        let label = short_label(board.entity_at(pair.cols(), col));
        execute!(stdout, Print(format!("{:^5}", label)))?;
    }

    execute!(
        stdout,
        MoveTo(x + LABEL_WIDTH, y + 2),
        SetForegroundColor(theme.border),
        Print("─".repeat((CELL_WIDTH as usize) * GRID_SIZE))
    )?;

    for row in 0..GRID_SIZE {
        let cy = y + 3 + row as u16 * 2;
        let label = short_label(board.entity_at(pair.rows(), row));
        execute!(
            stdout,
            MoveTo(x, cy),
            SetForegroundColor(theme.header),
            Print(format!("{:<6}", label)),
            SetForegroundColor(theme.border),
            Print("│")
        )?;

        for col in 0..GRID_SIZE {
            let (glyph, color) = theme.cell(board.display(pair, row, col));
            let selected = active && app.cursor.row == row && app.cursor.col == col;
            let bg = if selected { theme.selected_bg } else { theme.bg };
            execute!(
                stdout,
                SetBackgroundColor(bg),
                SetForegroundColor(color),
                Print(format!("  {}  ", glyph)),
                SetBackgroundColor(theme.bg)
            )?;
        }
    }

    Ok(())
}

fn render_selectors(stdout: &mut io::Stdout, app: &App, x: u16, y: u16) -> io::Result<()> {
    let theme = &app.theme;
    let board = app.session.board();

    execute!(
        stdout,
        MoveTo(x, y),
        SetForegroundColor(theme.key),
        Print("Accusation")
    )?;

    for (i, axis) in Axis::ALL.iter().enumerate() {
        let (text, color) = match board.selected(*axis) {
            Some(id) => (id.to_string(), theme.fg),
            None => ("—".to_string(), theme.border),
        };
        execute!(
            stdout,
            MoveTo(x, y + 1 + i as u16),
            SetForegroundColor(theme.key),
            Print(format!("[{}] ", i + 1)),
            SetForegroundColor(theme.info),
            Print(format!("{:<9}", axis_title(*axis))),
            SetForegroundColor(color),
            Print(text)
        )?;
    }
    Ok(())
}

fn render_info_panel(stdout: &mut io::Stdout, app: &App, x: u16, y: u16) -> io::Result<()> {
    let theme = &app.theme;
    let session = app.session.session();
    let gateway = app.session.gateway();

    let (status, status_color) = if session.is_finished() {
        ("Solved", theme.success)
    } else {
        ("Investigating", theme.fg)
    };

    let lines = [
        (format!("Time:      {}", format_duration(app.session.elapsed_ms())), theme.fg),
        (format!("Attempts:  {}", session.attempts), theme.fg),
        (format!("Penalty:   {}", format_duration(session.penalty_ms)), theme.error),
        (format!("Status:    {}", status), status_color),
    ];
    for (i, (text, color)) in lines.iter().enumerate() {
        execute!(
            stdout,
            MoveTo(x, y + i as u16),
            SetForegroundColor(*color),
            Print(text)
        )?;
    }

    let pending = gateway.pending_writes();
    let (sync, sync_color) = match (gateway.is_online(), pending) {
        (true, 0) => (format!("{} · synced", gateway.backend_name()), theme.success),
        (true, n) => (format!("{} · {} pending", gateway.backend_name(), n), theme.suspected),
        (false, n) => (format!("offline · {} queued", n), theme.error),
    };
    execute!(
        stdout,
        MoveTo(x + 30, y),
        SetForegroundColor(theme.info),
        Print("Sync: "),
        SetForegroundColor(sync_color),
        Print(sync),
        MoveTo(x + 30, y + 1),
        SetForegroundColor(theme.info),
        Print(format!("Player: {}", app.session.player().label()))
    )?;
    Ok(())
}

fn render_controls(stdout: &mut io::Stdout, app: &App, x: u16, y: u16) -> io::Result<()> {
    let theme = &app.theme;

    let controls = [
        ("hjkl/Arrows", "Move"),
        ("Tab", "Next grid"),
        ("Space", "Mark cell"),
        ("1/2/3", "Pick answer"),
        ("a", "Accuse"),
        ("p", "Profile"),
        ("b", "Leaderboard"),
        ("c", "Next case"),
        ("n", "Network"),
        ("r", "Repair stats"),
        ("t", "Theme"),
        ("q", "Quit"),
    ];

    // Display in 4 columns (3 items each)
    for (i, (key, desc)) in controls.iter().enumerate() {
        let col = i / 3;
        let row = i % 3;
        let cx = x + (col as u16) * 20;
        let cy = y + row as u16;

        execute!(
            stdout,
            MoveTo(cx, cy),
            SetForegroundColor(theme.key),
            Print(format!("{:>11}", key)),
            SetForegroundColor(theme.info),
            Print(format!(" {}", desc))
        )?;
    }

    Ok(())
}

fn render_message(stdout: &mut io::Stdout, app: &App, msg: &str, term_width: u16) -> io::Result<()> {
    let theme = &app.theme;
    let padded = format!("  {}  ", msg);
    let x = term_width.saturating_sub(padded.chars().count() as u16) / 2;

    execute!(
        stdout,
        MoveTo(x, 1),
        SetForegroundColor(theme.fg),
        SetBackgroundColor(theme.selected_bg),
        Print(&padded),
        SetBackgroundColor(theme.bg)
    )?;

    Ok(())
}

fn render_result_overlay(
    stdout: &mut io::Stdout,
    app: &App,
    term_width: u16,
    term_height: u16,
) -> io::Result<()> {
    let theme = &app.theme;
    let Some(outcome) = app.outcome() else {
        return Ok(());
    };

    let (title, color) = match outcome.kind {
        OutcomeKind::Win => ("CASE CLOSED", theme.success),
        OutcomeKind::Loss => ("WRONG ACCUSATION", theme.error),
    };

    let mut lines = vec![
        format!("Time:     {}", format_duration(outcome.duration_ms)),
        format!("Attempts: {}", outcome.attempts),
        format!("Penalty:  {}", format_duration(outcome.penalty_ms)),
    ];
    match outcome.score {
        Some(score) => lines.push(format!("Score:    {}", score)),
        None => lines.push("The case remains open".to_string()),
    }

    let width: u16 = 34;
    let height = lines.len() as u16 + 6;
    let x = term_width.saturating_sub(width) / 2;
    let y = term_height.saturating_sub(height) / 2;

    for row in 0..height {
        let edge = if row == 0 || row == height - 1 {
            format!("+{}+", "-".repeat(width as usize - 2))
        } else {
            format!("|{}|", " ".repeat(width as usize - 2))
        };
        execute!(
            stdout,
            MoveTo(x, y + row),
            SetBackgroundColor(theme.bg),
            SetForegroundColor(theme.border),
            Print(edge)
        )?;
    }

    let title_x = x + (width - title.len() as u16) / 2;
    execute!(
        stdout,
        MoveTo(title_x, y + 1),
        SetForegroundColor(color),
        Print(title)
    )?;
    for (i, line) in lines.iter().enumerate() {
        execute!(
            stdout,
            MoveTo(x + 4, y + 3 + i as u16),
            SetForegroundColor(theme.fg),
            Print(line)
        )?;
    }
    execute!(
        stdout,
        MoveTo(x + 4, y + height - 2),
        SetForegroundColor(theme.info),
        Print("Enter: back   b: ranks   c: next")
    )?;
    Ok(())
}

fn render_profile_screen(stdout: &mut io::Stdout, app: &App, term_width: u16) -> io::Result<()> {
    let theme = &app.theme;

    let title = "═══ CASE FILE ═══";
    let title_x = term_width.saturating_sub(title.chars().count() as u16) / 2;
    execute!(
        stdout,
        MoveTo(title_x, 2),
        SetForegroundColor(theme.key),
        Print(title)
    )?;

    let x = term_width.saturating_sub(36) / 2;
    execute!(
        stdout,
        MoveTo(x, 4),
        SetForegroundColor(theme.header),
        Print(format!("Detective {}", app.session.player().label()))
    )?;

    match &app.profile {
        Some(stats) => {
            let rows = [
                ("Total score", stats.total_score.to_string()),
                ("Cases solved", stats.solved_cases.to_string()),
                ("Average time", format_duration(stats.average_time_ms)),
                ("Attempts", stats.total_attempts.to_string()),
            ];
            for (i, (label, value)) in rows.iter().enumerate() {
                execute!(
                    stdout,
                    MoveTo(x, 6 + i as u16),
                    SetForegroundColor(theme.info),
                    Print(format!("{:<16}", label)),
                    SetForegroundColor(theme.fg),
                    Print(value)
                )?;
            }
        }
        None => {
            execute!(
                stdout,
                MoveTo(x, 6),
                SetForegroundColor(theme.error),
                Print("No statistics available")
            )?;
        }
    }

    execute!(
        stdout,
        MoveTo(x, 12),
        SetForegroundColor(theme.info),
        Print("r: rebuild   b: leaderboard   Esc: back")
    )?;
    Ok(())
}

fn render_leaderboard_screen(stdout: &mut io::Stdout, app: &App, term_width: u16) -> io::Result<()> {
    let theme = &app.theme;

    let title = "═══ LEADERBOARD ═══";
    let title_x = term_width.saturating_sub(title.chars().count() as u16) / 2;
    execute!(
        stdout,
        MoveTo(title_x, 1),
        SetForegroundColor(theme.key),
        Print(title)
    )?;

    // Scope filter
    execute!(stdout, MoveTo(4, 3), SetForegroundColor(theme.info), Print("◀ "))?;
    for scope in app.scopes() {
        let color = if scope == app.leaderboard_scope {
            theme.key
        } else {
            theme.border
        };
        execute!(stdout, SetForegroundColor(color), Print(format!(" {} ", scope)))?;
    }
    execute!(stdout, SetForegroundColor(theme.info), Print(" ▶"))?;

    let score_header = match app.leaderboard_scope {
        Scope::Global => "Total",
        Scope::Case(_) => "Score",
    };
    execute!(
        stdout,
        MoveTo(4, 5),
        SetForegroundColor(theme.header),
        Print(format!(
            "{:>4}  {:<20} {:>7} {:>9} {:>8}",
            "#", "Detective", score_header, "Time", "Tries"
        ))
    )?;

    if app.leaderboard.is_empty() {
        execute!(
            stdout,
            MoveTo(4, 7),
            SetForegroundColor(theme.info),
            Print("No entries yet")
        )?;
    }

    let uid = &app.session.player().id;
    for (i, entry) in app.leaderboard.iter().enumerate() {
        let color: Color = if &entry.uid == uid { theme.key } else { theme.fg };
        let name: String = entry.label().chars().take(20).collect();
        execute!(
            stdout,
            MoveTo(4, 6 + i as u16),
            SetForegroundColor(color),
            Print(format!(
                "{:>4}  {:<20} {:>7} {:>9} {:>8}",
                entry.rank.map_or("-".to_string(), |r| r.to_string()),
                name,
                entry.score,
                entry.duration_ms.map_or("-".to_string(), format_duration),
                entry.attempts.map_or("-".to_string(), |a| a.to_string())
            ))
        )?;
    }

    let footer_y = 7 + app.leaderboard.len().max(1) as u16;
    let rank = match app.player_rank {
        Some(rank) => format!("Your rank: {}", rank),
        None => "You are not ranked here yet".to_string(),
    };
    execute!(
        stdout,
        MoveTo(4, footer_y),
        SetForegroundColor(theme.info),
        Print(rank),
        MoveTo(4, footer_y + 2),
        Print("←/→: scope   Esc: back")
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_label() {
        assert_eq!(short_label("suspect-002"), "S-002");
        assert_eq!(short_label("location-010"), "L-010");
        assert_eq!(short_label("butler"), "butler");
    }
}
