use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_LIGHT_TILES: &str =
    "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png";
pub const DEFAULT_DARK_TILES: &str =
    "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseThemeError {
    message: String,
}

impl fmt::Display for ParseThemeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseThemeError {}

impl FromStr for Theme {
    type Err = ParseThemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ =>
                Err(ParseThemeError {
                    message: format!("Invalid theme: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TileSet {
    pub light: String,
    pub dark: String,
}

impl Default for TileSet {
    fn default() -> Self {
        Self {
            light: DEFAULT_LIGHT_TILES.to_string(),
            dark: DEFAULT_DARK_TILES.to_string(),
        }
    }
}

impl TileSet {
    pub fn url_for(&self, theme: Theme) -> &str {
        match theme {
            Theme::Light => &self.light,
            Theme::Dark => &self.dark,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_switches_tile_url() {
        let tiles = TileSet::default();
        assert!(tiles.url_for(Theme::Dark).contains("dark_all"));
        assert!(tiles.url_for(Theme::Light).contains("light_all"));
        assert_eq!("DARK".parse::<Theme>(), Ok(Theme::Dark));
        assert!("sepia".parse::<Theme>().is_err());
    }
}
