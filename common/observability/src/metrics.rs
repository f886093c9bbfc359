use anyhow::Result;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Ok,
    Expired,
    Invalid,
    Missing,
}

impl VerificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationOutcome::Ok => "ok",
            VerificationOutcome::Expired => "expired",
            VerificationOutcome::Invalid => "invalid",
            VerificationOutcome::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Renewed,
    Failed,
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshOutcome::Renewed => "renewed",
            RefreshOutcome::Failed => "failed",
        }
    }
}

/// Counters for token verification and renewal, kept in their own registry.
#[derive(Clone)]
pub struct AuthPipelineMetrics {
    registry: Registry,
    verifications: IntCounterVec,
    refreshes: IntCounterVec,
}

impl AuthPipelineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let verifications = IntCounterVec::new(
            Opts::new(
                "auth_token_verifications_total",
                "Access token verifications grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(verifications.clone()))?;

        let refreshes = IntCounterVec::new(
            Opts::new(
                "auth_token_refresh_total",
                "Access token renewals grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(refreshes.clone()))?;

        Ok(Self {
            registry,
            verifications,
            refreshes,
        })
    }

    pub fn verification(&self, outcome: VerificationOutcome) {
        self.verifications
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn refresh(&self, outcome: RefreshOutcome) {
        self.refreshes.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn verification_count(&self, outcome: VerificationOutcome) -> u64 {
        self.verifications
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    pub fn refresh_count(&self, outcome: RefreshOutcome) -> u64 {
        self.refreshes.with_label_values(&[outcome.as_str()]).get()
    }

    /// Prometheus text exposition of this registry.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independent_per_instance() {
        let first = AuthPipelineMetrics::new().unwrap();
        let second = AuthPipelineMetrics::new().unwrap();

        first.verification(VerificationOutcome::Expired);
        first.verification(VerificationOutcome::Expired);
        first.refresh(RefreshOutcome::Renewed);

        assert_eq!(first.verification_count(VerificationOutcome::Expired), 2);
        assert_eq!(first.refresh_count(RefreshOutcome::Renewed), 1);
        assert_eq!(second.verification_count(VerificationOutcome::Expired), 0);
    }

    #[test]
    fn render_exposes_labelled_series() {
        let metrics = AuthPipelineMetrics::new().unwrap();
        metrics.verification(VerificationOutcome::Missing);
        metrics.refresh(RefreshOutcome::Failed);

        let text = metrics.render().unwrap();
        assert!(text.contains("auth_token_verifications_total{outcome=\"missing\"} 1"));
        assert!(text.contains("auth_token_refresh_total{outcome=\"failed\"} 1"));
    }
}
