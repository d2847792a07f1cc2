//! crates/logging/src/levels.rs
//! Flag enums and level structures for info and debug verbosity.

use std::fmt;

/// Info flags for user-facing output categories.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InfoFlag {
    /// General notices about the transfer.
    Misc,
    /// Byte-count progress while the transfer runs.
    Progress,
    /// End-of-transfer statistics.
    Stats,
}

impl InfoFlag {
    /// Every info flag, in display order.
    pub const ALL: [Self; 3] = [Self::Misc, Self::Progress, Self::Stats];

    /// Returns the name used on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Misc => "misc",
            Self::Progress => "progress",
            Self::Stats => "stats",
        }
    }

    /// Looks a flag up by its command-line name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.name() == name)
    }
}

impl fmt::Display for InfoFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Debug flags for developer-facing diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DebugFlag {
    /// Endpoint connection setup and HTTP exchanges.
    Connect,
    /// Individual endpoint requests and worker threads.
    Io,
    /// Coordinator scheduling decisions.
    Pipeline,
    /// Teardown and exit status.
    Exit,
}

impl DebugFlag {
    /// Every debug flag, in display order.
    pub const ALL: [Self; 4] = [Self::Connect, Self::Io, Self::Pipeline, Self::Exit];

    /// Returns the name used on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Io => "io",
            Self::Pipeline => "pipeline",
            Self::Exit => "exit",
        }
    }

    /// Looks a flag up by its command-line name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.name() == name)
    }
}

impl fmt::Display for DebugFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Info verbosity levels for each flag.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct InfoLevels {
    /// Miscellaneous notices level.
    pub misc: u8,
    /// Progress reporting level.
    pub progress: u8,
    /// Transfer statistics level.
    pub stats: u8,
}

impl InfoLevels {
    /// Get the level for a specific flag.
    #[must_use]
    pub const fn get(&self, flag: InfoFlag) -> u8 {
        match flag {
            InfoFlag::Misc => self.misc,
            InfoFlag::Progress => self.progress,
            InfoFlag::Stats => self.stats,
        }
    }

    /// Set the level for a specific flag.
    pub const fn set(&mut self, flag: InfoFlag, level: u8) {
        match flag {
            InfoFlag::Misc => self.misc = level,
            InfoFlag::Progress => self.progress = level,
            InfoFlag::Stats => self.stats = level,
        }
    }

    /// Set all flags to the same level.
    pub fn set_all(&mut self, level: u8) {
        for flag in InfoFlag::ALL {
            self.set(flag, level);
        }
    }
}

/// Debug verbosity levels for each flag.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct DebugLevels {
    /// Connection diagnostics level.
    pub connect: u8,
    /// Endpoint request diagnostics level.
    pub io: u8,
    /// Scheduling diagnostics level.
    pub pipeline: u8,
    /// Teardown diagnostics level.
    pub exit: u8,
}

impl DebugLevels {
    /// Get the level for a specific flag.
    #[must_use]
    pub const fn get(&self, flag: DebugFlag) -> u8 {
        match flag {
            DebugFlag::Connect => self.connect,
            DebugFlag::Io => self.io,
            DebugFlag::Pipeline => self.pipeline,
            DebugFlag::Exit => self.exit,
        }
    }

    /// Set the level for a specific flag.
    pub const fn set(&mut self, flag: DebugFlag, level: u8) {
        match flag {
            DebugFlag::Connect => self.connect = level,
            DebugFlag::Io => self.io = level,
            DebugFlag::Pipeline => self.pipeline = level,
            DebugFlag::Exit => self.exit = level,
        }
    }

    /// Set all flags to the same level.
    pub fn set_all(&mut self, level: u8) {
        for flag in DebugFlag::ALL {
            self.set(flag, level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for flag in InfoFlag::ALL {
            assert_eq!(InfoFlag::from_name(flag.name()), Some(flag));
        }
        for flag in DebugFlag::ALL {
            assert_eq!(DebugFlag::from_name(flag.name()), Some(flag));
        }
        assert_eq!(InfoFlag::from_name("copy"), None);
        assert_eq!(DebugFlag::from_name("IO"), None);
    }

    #[test]
    fn default_levels_are_zero() {
        let info = InfoLevels::default();
        let debug = DebugLevels::default();
        assert!(InfoFlag::ALL.iter().all(|&flag| info.get(flag) == 0));
        assert!(DebugFlag::ALL.iter().all(|&flag| debug.get(flag) == 0));
    }

    #[test]
    fn set_touches_only_the_named_flag() {
        let mut info = InfoLevels::default();
        info.set(InfoFlag::Progress, 2);
        assert_eq!(info.progress, 2);
        assert_eq!(info.misc, 0);
        assert_eq!(info.stats, 0);

        let mut debug = DebugLevels::default();
        debug.set(DebugFlag::Pipeline, 3);
        assert_eq!(debug.get(DebugFlag::Pipeline), 3);
        assert_eq!(debug.get(DebugFlag::Io), 0);
    }

    #[test]
    fn set_all_updates_every_flag() {
        let mut debug = DebugLevels::default();
        debug.set_all(2);
        assert_eq!(
            debug,
            DebugLevels {
                connect: 2,
                io: 2,
                pipeline: 2,
                exit: 2
            }
        );
    }

    #[test]
    fn display_uses_flag_name() {
        assert_eq!(InfoFlag::Stats.to_string(), "stats");
        assert_eq!(DebugFlag::Connect.to_string(), "connect");
    }
}
