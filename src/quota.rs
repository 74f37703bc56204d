use crate::constants::QUOTA_WINDOW_SECS;

/// Guest conversion counter for one client address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GuestWindow {
    pub(crate) count: i64,
    pub(crate) last_reset: i64,
}

impl GuestWindow {
    pub(crate) fn fresh(now: i64) -> Self {
        Self {
            count: 0,
            last_reset: now,
        }
    }

    /// The window as it stands at `now`: a window older than 24 hours
    /// starts over from zero.
    pub(crate) fn at(self, now: i64) -> Self {
        if now - self.last_reset > QUOTA_WINDOW_SECS {
            Self::fresh(now)
        } else {
            self
        }
    }

    pub(crate) fn remaining(self, limit: i64) -> i64 {
        (limit - self.count).max(0)
    }

    pub(crate) fn is_exhausted(self, limit: i64) -> bool {
        self.count >= limit
    }

    pub(crate) fn charged(self, now: i64) -> Self {
        let current = self.at(now);
        Self {
            count: current.count + 1,
            last_reset: current.last_reset,
        }
    }
}
