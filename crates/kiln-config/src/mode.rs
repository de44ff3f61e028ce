//! Build mode selection.

use serde::{Deserialize, Serialize};

/// Selects compiler behaviour and the defaults a command runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Development,
    Production,
}

impl BuildMode {
    /// Parse a user supplied mode, falling back to `default` when the
    /// argument is absent or not a recognised mode.
    ///
    /// ```
    /// use kiln_config::BuildMode;
    ///
    /// assert_eq!(BuildMode::from_arg(Some("development"), BuildMode::Production), BuildMode::Development);
    /// assert_eq!(BuildMode::from_arg(Some("staging"), BuildMode::Production), BuildMode::Production);
    /// assert_eq!(BuildMode::from_arg(None, BuildMode::Development), BuildMode::Development);
    /// ```
    pub fn from_arg(arg: Option<&str>, default: BuildMode) -> BuildMode {
        arg.and_then(|s| s.parse().ok()).unwrap_or(default)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Development => "development",
            BuildMode::Production => "production",
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, BuildMode::Development)
    }
}

impl std::str::FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(BuildMode::Development),
            "production" => Ok(BuildMode::Production),
            other => Err(format!("Invalid build mode: {}", other)),
        }
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes() {
        assert_eq!("development".parse::<BuildMode>(), Ok(BuildMode::Development));
        assert_eq!("production".parse::<BuildMode>(), Ok(BuildMode::Production));
    }

    #[test]
    fn rejects_unknown_and_differently_cased_modes() {
        assert!("Production".parse::<BuildMode>().is_err());
        assert!("dev".parse::<BuildMode>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for mode in [BuildMode::Development, BuildMode::Production] {
            assert_eq!(mode.to_string().parse::<BuildMode>(), Ok(mode));
        }
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&BuildMode::Production).unwrap();
        assert_eq!(json, "\"production\"");
    }
}
