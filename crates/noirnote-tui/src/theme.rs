use crossterm::style::Color;
use noirnote_core::CellDisplay;

/// Color theme for the TUI
#[derive(Debug, Clone)]
pub struct Theme {
    /// Background color
    pub bg: Color,
    /// Default text color
    pub fg: Color,
    /// Grid border color
    pub border: Color,
    /// Axis header color
    pub header: Color,
    /// Manual cross
    pub crossed: Color,
    /// Cross derived from a confirmation
    pub derived: Color,
    /// Suspicion mark
    pub suspected: Color,
    /// Confirmed link
    pub confirmed: Color,
    /// Selected cell background
    pub selected_bg: Color,
    /// Error/wrong answer color
    pub error: Color,
    /// Success/solved color
    pub success: Color,
    /// Timer/info text color
    pub info: Color,
    /// Key binding text color
    pub key: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::noir()
    }
}

impl Theme {
    /// Dark sepia theme (default)
    pub fn noir() -> Self {
        Self {
            bg: Color::Rgb { r: 18, g: 16, b: 14 },
            fg: Color::Rgb { r: 232, g: 224, b: 208 },
            border: Color::Rgb { r: 90, g: 80, b: 70 },
            header: Color::Rgb { r: 200, g: 170, b: 120 },
            crossed: Color::Rgb { r: 220, g: 90, b: 80 },
            derived: Color::Rgb { r: 120, g: 70, b: 65 },
            suspected: Color::Rgb { r: 240, g: 200, b: 90 },
            confirmed: Color::Rgb { r: 110, g: 210, b: 130 },
            selected_bg: Color::Rgb { r: 70, g: 60, b: 50 },
            error: Color::Rgb { r: 255, g: 90, b: 90 },
            success: Color::Rgb { r: 90, g: 255, b: 130 },
            info: Color::Rgb { r: 165, g: 155, b: 140 },
            key: Color::Rgb { r: 255, g: 210, b: 100 },
        }
    }

    /// High contrast theme
    pub fn high_contrast() -> Self {
        Self {
            bg: Color::Black,
            fg: Color::White,
            border: Color::Grey,
            header: Color::Yellow,
            crossed: Color::Red,
            derived: Color::DarkRed,
            suspected: Color::Yellow,
            confirmed: Color::Green,
            selected_bg: Color::Blue,
            error: Color::Red,
            success: Color::Green,
            info: Color::Grey,
            key: Color::Yellow,
        }
    }

    /// Glyph and color for a grid cell
    pub fn cell(&self, display: CellDisplay) -> (&'static str, Color) {
        match display {
            CellDisplay::Empty => ("·", self.border),
            CellDisplay::Crossed => ("✗", self.crossed),
            CellDisplay::Suspected => ("?", self.suspected),
            CellDisplay::Confirmed => ("✓", self.confirmed),
            CellDisplay::DerivedCrossed => ("×", self.derived),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_cross_is_distinct_from_manual() {
        let theme = Theme::default();
        let (manual, manual_color) = theme.cell(CellDisplay::Crossed);
        let (derived, derived_color) = theme.cell(CellDisplay::DerivedCrossed);
        assert_ne!(manual, derived);
        assert_ne!(manual_color, derived_color);
    }
}
