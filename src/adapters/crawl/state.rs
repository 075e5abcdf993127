use tracing::info;

use crate::models::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    ServiceReady,
    ContextSeeded,
    TraditionalCrawl,
    AjaxCrawl,
    OptionalDeepCrawl,
    ReadyToScan,
    PassiveScanning,
    ActiveScanning,
    Completed,
    Failed,
}

impl CrawlPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ServiceReady => "service_ready",
            Self::ContextSeeded => "context_seeded",
            Self::TraditionalCrawl => "traditional_crawl",
            Self::AjaxCrawl => "ajax_crawl",
            Self::OptionalDeepCrawl => "deep_crawl",
            Self::ReadyToScan => "ready_to_scan",
            Self::PassiveScanning => "passive_scanning",
            Self::ActiveScanning => "active_scanning",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Legal forward edges. `Failed` is reachable from any non-terminal phase.
    fn can_advance_to(&self, next: CrawlPhase) -> bool {
        use CrawlPhase::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, ServiceReady)
                | (ServiceReady, ContextSeeded)
                | (ContextSeeded, TraditionalCrawl)
                | (TraditionalCrawl, AjaxCrawl)
                | (AjaxCrawl, OptionalDeepCrawl)
                | (AjaxCrawl, ReadyToScan)
                | (OptionalDeepCrawl, ReadyToScan)
                | (ReadyToScan, PassiveScanning)
                | (ReadyToScan, ActiveScanning)
                | (PassiveScanning, Completed)
                | (ActiveScanning, Completed)
        )
    }
}

impl std::fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current phase plus the path taken to get there.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    session_id: SessionId,
    current: CrawlPhase,
    history: Vec<CrawlPhase>,
}

impl PhaseTracker {
    pub fn new(session_id: SessionId) -> Self {
        Self { session_id, current: CrawlPhase::Idle, history: vec![CrawlPhase::Idle] }
    }

    pub fn current(&self) -> CrawlPhase {
        self.current
    }

    pub fn history(&self) -> &[CrawlPhase] {
        &self.history
    }

    /// Move to `next`. Illegal edges are ignored and reported as `false`.
    pub fn advance(&mut self, next: CrawlPhase) -> bool {
        if !self.current.can_advance_to(next) {
            tracing::warn!(session_id = %self.session_id, from = %self.current, to = %next, "Ignoring illegal crawl phase transition");
            return false;
        }
        info!(session_id = %self.session_id, tool = "zap", phase = %next, "Crawl phase");
        self.current = next;
        self.history.push(next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_active_path() {
        let mut t = PhaseTracker::new(SessionId::from_existing("s"));
        for p in [
            CrawlPhase::ServiceReady,
            CrawlPhase::ContextSeeded,
            CrawlPhase::TraditionalCrawl,
            CrawlPhase::AjaxCrawl,
            CrawlPhase::OptionalDeepCrawl,
            CrawlPhase::ReadyToScan,
            CrawlPhase::ActiveScanning,
            CrawlPhase::Completed,
        ] {
            assert!(t.advance(p), "{} rejected", p);
        }
        assert_eq!(t.history().len(), 9);
    }

    #[test]
    fn test_failed_from_any_live_phase_but_not_after_completion() {
        let mut t = PhaseTracker::new(SessionId::from_existing("s"));
        assert!(t.advance(CrawlPhase::Failed));
        assert!(!t.advance(CrawlPhase::Failed));
        assert!(!t.advance(CrawlPhase::ServiceReady));
    }

    #[test]
    fn test_skipping_phases_rejected() {
        let mut t = PhaseTracker::new(SessionId::from_existing("s"));
        assert!(!t.advance(CrawlPhase::ActiveScanning));
        assert_eq!(t.current(), CrawlPhase::Idle);
    }
}
