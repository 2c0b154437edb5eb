//! Service context bundling the port trait objects.

use crate::adapters::fixed::FixedClock;
use crate::adapters::live::clock::LiveClock;
use crate::adapters::live::filesystem::LiveFileSystem;
use crate::config::Settings;
use crate::ports::clock::Clock;
use crate::ports::filesystem::FileSystem;

/// Bundles the port trait objects into a single context.
///
/// Constructors wire up different adapter implementations.
pub struct ServiceContext {
    /// Clock for obtaining the current date.
    pub clock: Box<dyn Clock>,
    /// Filesystem for file I/O.
    pub fs: Box<dyn FileSystem>,
}

impl ServiceContext {
    /// Creates a live context with the real clock and disk.
    #[must_use]
    pub fn live() -> Self {
        Self { clock: Box::new(LiveClock), fs: Box::new(LiveFileSystem) }
    }

    /// Creates a live context, pinning the clock when settings fix the date.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let mut ctx = Self::live();
        if let Some(today) = settings.today {
            ctx.clock = Box::new(FixedClock::on(today));
        }
        ctx
    }

    /// Creates a context from explicit adapters.
    #[must_use]
    pub fn new(clock: Box<dyn Clock>, fs: Box<dyn FileSystem>) -> Self {
        Self { clock, fs }
    }
}
