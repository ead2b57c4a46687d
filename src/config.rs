//! Runtime settings shared by the HTTP layer and the CLI.

use chrono::Duration;

use crate::simulation::Simulator;

/// Session lifetime when none is configured (one hour).
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

/// Longest accepted session lifetime (one year).
pub const MAX_SESSION_TTL_SECS: i64 = 31_536_000;

/// How launch-time funnel ratios are chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FunnelMode {
    /// Sample ratios per launch from channel ranges.
    #[default]
    Randomized,
    /// Use the midpoint of every range, so launches are reproducible.
    Typical,
}

impl FunnelMode {
    pub fn simulator(self) -> Simulator {
        match self {
            Self::Randomized => Simulator::randomized(),
            Self::Typical => Simulator::typical(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub session_ttl: Duration,
    pub simulator: Simulator,
    /// Allowed CORS origins. `None` allows any origin.
    pub cors_origins: Option<Vec<String>>,
}

impl AppConfig {
    pub fn new(session_ttl_secs: i64, funnel_mode: FunnelMode) -> Self {
        Self {
            session_ttl: Duration::seconds(session_ttl_secs.clamp(1, MAX_SESSION_TTL_SECS)),
            simulator: funnel_mode.simulator(),
            cors_origins: None,
        }
    }

    pub fn with_simulator(mut self, simulator: Simulator) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Parse a comma-separated origin list. Blank input leaves CORS open.
    pub fn with_cors_origins(mut self, origins: &str) -> Self {
        let origins: Vec<String> = origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self.cors_origins = (!origins.is_empty()).then_some(origins);
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL_SECS, FunnelMode::default())
    }
}
