/// Palette names used for task types and beads.
use rand::RngExt;

use crate::types::{DEFAULT_TYPE_COLOR, Priority};

pub const PALETTE: &[&str] = &[
    "Red", "Orange", "Yellow", "Green", "Blue", "Purple", "Pink", "Teal", "Indigo", "Mint",
];

pub const OVERDUE_COLOR: &str = "Gray";

/// Looks `name` up in the palette, ignoring case, and returns its canonical spelling.
pub fn palette_name(name: &str) -> Option<&'static str> {
    PALETTE
        .iter()
        .copied()
        .find(|candidate| candidate.eq_ignore_ascii_case(name.trim()))
}

/// Resolves a stored color reference, falling back to blue for unknown names.
pub fn resolve(name: &str) -> &'static str {
    palette_name(name).unwrap_or(DEFAULT_TYPE_COLOR)
}

/// Pick a random color from the palette.
pub fn random_color() -> String {
    let mut rng = rand::rng();
    PALETTE[rng.random_range(0..PALETTE.len())].to_string()
}

pub fn priority_color(priority: Priority) -> &'static str {
    match priority.value() {
        1 => "Red",
        2 => "Orange",
        3 => "Yellow",
        4 => "Green",
        _ => DEFAULT_TYPE_COLOR,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("teal", Some("Teal"))]
    #[case(" Indigo ", Some("Indigo"))]
    #[case("#FF5733", None)]
    fn palette_lookup_is_case_insensitive(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(palette_name(input), expected);
    }

    #[rstest]
    fn unknown_color_resolves_to_blue() {
        assert_eq!(resolve("chartreuse"), "Blue");
    }

    #[rstest]
    fn random_color_comes_from_palette() {
        for _ in 0..20 {
            assert!(palette_name(&random_color()).is_some());
        }
    }

    #[rstest]
    fn priorities_map_to_warm_to_cool_colors() {
        assert_eq!(priority_color(Priority::HIGHEST), "Red");
        assert_eq!(priority_color(Priority::LOWEST), "Green");
    }
}
