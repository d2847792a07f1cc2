//! crates/logging/src/config.rs
//! Verbosity configuration combining info and debug levels.

use super::levels::{DebugFlag, DebugLevels, InfoFlag, InfoLevels};

/// Highest `-v` count with its own mapping; larger counts behave the same.
pub const MAX_VERBOSE_LEVEL: u8 = 4;

/// Combined verbosity configuration for info and debug flags.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct VerbosityConfig {
    /// Info flag levels.
    pub info: InfoLevels,
    /// Debug flag levels.
    pub debug: DebugLevels,
}

impl VerbosityConfig {
    /// Create a configuration from a `-v` count (0-4).
    ///
    /// | level | enables                                              |
    /// |-------|------------------------------------------------------|
    /// | 0     | nothing beyond warnings and errors                   |
    /// | 1     | `misc`, `stats`                                      |
    /// | 2     | `misc2`, `stats2`, `connect`, `pipeline`, `exit`     |
    /// | 3     | adds `io`, `connect2`, `pipeline2`, `exit2`          |
    /// | 4     | `io2`, `pipeline3`, `exit3`                          |
    #[must_use]
    pub fn from_verbose_level(level: u8) -> Self {
        let mut config = Self::default();
        let level = level.min(MAX_VERBOSE_LEVEL);

        if level >= 1 {
            config.info.misc = 1;
            config.info.stats = 1;
        }
        if level >= 2 {
            config.info.misc = 2;
            config.info.stats = 2;
            config.debug.connect = 1;
            config.debug.pipeline = 1;
            config.debug.exit = 1;
        }
        if level >= 3 {
            config.debug.connect = 2;
            config.debug.io = 1;
            config.debug.pipeline = 2;
            config.debug.exit = 2;
        }
        if level >= 4 {
            config.debug.io = 2;
            config.debug.pipeline = 3;
            config.debug.exit = 3;
        }

        config
    }

    /// Apply a single info flag token (e.g., "progress2", "stats", "ALL").
    pub fn apply_info_flag(&mut self, token: &str) -> Result<(), String> {
        let (name, level) = parse_flag_token(token)?;

        if name.eq_ignore_ascii_case("all") {
            self.info.set_all(level);
            return Ok(());
        }
        if name.eq_ignore_ascii_case("none") {
            self.info.set_all(0);
            return Ok(());
        }

        let flag = InfoFlag::from_name(name).ok_or_else(|| format!("unknown info flag: {name}"))?;
        self.info.set(flag, level);
        Ok(())
    }

    /// Apply a single debug flag token (e.g., "io2", "pipeline", "NONE").
    pub fn apply_debug_flag(&mut self, token: &str) -> Result<(), String> {
        let (name, level) = parse_flag_token(token)?;

        if name.eq_ignore_ascii_case("all") {
            self.debug.set_all(level);
            return Ok(());
        }
        if name.eq_ignore_ascii_case("none") {
            self.debug.set_all(0);
            return Ok(());
        }

        let flag =
            DebugFlag::from_name(name).ok_or_else(|| format!("unknown debug flag: {name}"))?;
        self.debug.set(flag, level);
        Ok(())
    }

    /// Apply a comma-separated list of info tokens, as given to `--info`.
    pub fn apply_info_flags(&mut self, list: &str) -> Result<(), String> {
        for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            self.apply_info_flag(token)?;
        }
        Ok(())
    }

    /// Apply a comma-separated list of debug tokens, as given to `--debug`.
    pub fn apply_debug_flags(&mut self, list: &str) -> Result<(), String> {
        for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            self.apply_debug_flag(token)?;
        }
        Ok(())
    }
}

/// Parse a flag token like "io2" into ("io", 2) or "stats" into ("stats", 1).
fn parse_flag_token(token: &str) -> Result<(&str, u8), String> {
    if token.is_empty() {
        return Err("empty flag token".to_string());
    }

    let split = token
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(token.len());
    let (name, digits) = token.split_at(split);
    if name.is_empty() {
        return Err(format!("flag token has no name: {token}"));
    }
    if digits.is_empty() {
        return Ok((name, 1));
    }

    let level = digits
        .parse::<u8>()
        .map_err(|_| format!("invalid level in flag: {token}"))?;
    Ok((name, level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_zero_is_silent() {
        assert_eq!(
            VerbosityConfig::from_verbose_level(0),
            VerbosityConfig::default()
        );
    }

    #[test]
    fn level_one_enables_summary_output() {
        let config = VerbosityConfig::from_verbose_level(1);
        assert_eq!(config.info.misc, 1);
        assert_eq!(config.info.stats, 1);
        assert_eq!(config.info.progress, 0);
        assert_eq!(config.debug, DebugLevels::default());
    }

    #[test]
    fn higher_levels_add_debug_flags() {
        let two = VerbosityConfig::from_verbose_level(2);
        assert_eq!(two.debug.pipeline, 1);
        assert_eq!(two.debug.io, 0);

        let three = VerbosityConfig::from_verbose_level(3);
        assert_eq!(three.debug.io, 1);
        assert_eq!(three.debug.connect, 2);

        let four = VerbosityConfig::from_verbose_level(4);
        assert_eq!(four.debug.pipeline, 3);
        assert_eq!(VerbosityConfig::from_verbose_level(9), four);
    }

    #[test]
    fn parse_flag_token_defaults_to_level_one() {
        assert_eq!(parse_flag_token("stats").unwrap(), ("stats", 1));
        assert_eq!(parse_flag_token("progress2").unwrap(), ("progress", 2));
        assert_eq!(parse_flag_token("io10").unwrap(), ("io", 10));
        assert!(parse_flag_token("").is_err());
        assert!(parse_flag_token("2").is_err());
        assert!(parse_flag_token("io999").is_err());
    }

    #[test]
    fn apply_info_flags_handles_lists_and_keywords() {
        let mut config = VerbosityConfig::default();
        config.apply_info_flags("progress2, stats").unwrap();
        assert_eq!(config.info.progress, 2);
        assert_eq!(config.info.stats, 1);

        config.apply_info_flag("NONE").unwrap();
        assert_eq!(config.info, InfoLevels::default());

        config.apply_info_flag("ALL2").unwrap();
        assert_eq!(config.info.misc, 2);

        assert_eq!(
            config.apply_info_flag("copy").unwrap_err(),
            "unknown info flag: copy"
        );
    }

    #[test]
    fn apply_debug_flags_handles_lists_and_keywords() {
        let mut config = VerbosityConfig::default();
        config.apply_debug_flags("io,pipeline3").unwrap();
        assert_eq!(config.debug.io, 1);
        assert_eq!(config.debug.pipeline, 3);

        config.apply_debug_flag("all").unwrap();
        assert_eq!(config.debug.connect, 1);
        assert_eq!(config.debug.pipeline, 1);

        assert!(config.apply_debug_flags("io,bogus").is_err());
    }
}
