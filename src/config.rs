use serde::{Deserialize, Serialize};

use crate::{AcornError, Metric};

/// Candidate width used while wiring a new node.
pub const DEFAULT_EF_CONSTRUCTION: usize = 40;
/// Frontier width used by queries unless overridden.
pub const DEFAULT_EF_SEARCH: usize = 48;

/// Acceptance rule for predicate-robust edges.
///
/// The first pass keeps candidates whose label is rare among the node's
/// neighbors; the second pass fills the remaining quota with a relaxed
/// dominance test so that single-label datasets still receive robust edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobustPolicy {
    /// Largest share of a node's current neighbors that may already carry a
    /// candidate's label for the candidate to count as locally rare.
    pub rarity_threshold: f32,
    /// Factor `>= 1` applied to neighbor-to-candidate distances in the relaxed
    /// dominance test. `1.0` reproduces the base rule, `f32::INFINITY` keeps
    /// the nearest remaining candidates unconditionally.
    pub relaxation: f32,
}

impl Default for RobustPolicy {
    fn default() -> Self {
        Self {
            rarity_threshold: 0.5,
            relaxation: f32::INFINITY,
        }
    }
}

impl RobustPolicy {
    pub fn validate(&self) -> Result<(), AcornError> {
        if !(0.0..=1.0).contains(&self.rarity_threshold) {
            return Err(AcornError::InvalidParameters(
                "rarity_threshold must lie in [0, 1]",
            ));
        }
        if self.relaxation.is_nan() || self.relaxation < 1.0 {
            return Err(AcornError::InvalidParameters("relaxation must be >= 1"));
        }
        Ok(())
    }
}

/// Construction parameters of a predicate-aware proximity graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Degree bound of the base (navigability) list.
    pub m: usize,
    /// Degree bound of the robust (predicate-survival) list.
    pub m_beta: usize,
    /// Expansion factor; each node requests up to `(gamma - 1) * m` robust edges.
    pub gamma: usize,
    pub ef_construction: usize,
    pub metric: Metric,
    pub policy: RobustPolicy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            m: 32,
            m_beta: 64,
            gamma: 1,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            metric: Metric::L2,
            policy: RobustPolicy::default(),
        }
    }
}

impl GraphConfig {
    pub fn new(m: usize, m_beta: usize, gamma: usize) -> Self {
        Self {
            m,
            m_beta,
            gamma,
            ..Self::default()
        }
    }

    pub fn with_ef_construction(mut self, ef_construction: usize) -> Self {
        self.ef_construction = ef_construction;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_policy(mut self, policy: RobustPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), AcornError> {
        if self.m == 0 {
            return Err(AcornError::InvalidParameters("m must be positive"));
        }
        if self.gamma == 0 {
            return Err(AcornError::InvalidParameters("gamma must be at least 1"));
        }
        if self.ef_construction == 0 {
            return Err(AcornError::InvalidParameters(
                "ef_construction must be positive",
            ));
        }
        if self.m > u32::MAX as usize || self.m_beta > u32::MAX as usize {
            return Err(AcornError::InvalidParameters(
                "degree bounds exceed persistence limits",
            ));
        }
        self.policy.validate()
    }

    /// Number of robust edges a new node asks for: `min(m_beta, (gamma - 1) * m)`.
    pub fn robust_quota(&self) -> usize {
        self.gamma
            .saturating_sub(1)
            .saturating_mul(self.m)
            .min(self.m_beta)
    }

    /// Width of the candidate search run for every insertion.
    pub fn candidate_width(&self) -> usize {
        self.ef_construction.max(self.m + self.robust_quota())
    }
}

/// Parameters for a graph query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    pub top_k: usize,
    /// Frontier and result-pool width; must be at least `top_k`.
    pub ef_search: usize,
    /// Look through neighbors that fail the predicate to their own neighbors.
    pub two_hop: bool,
}

impl SearchParams {
    pub fn new(top_k: usize, ef_search: usize) -> Self {
        Self {
            top_k,
            ef_search,
            two_hop: true,
        }
    }

    /// Frontier four times wider than the result count.
    pub fn high_recall(top_k: usize) -> Self {
        Self::new(top_k, top_k.saturating_mul(4).max(DEFAULT_EF_SEARCH))
    }

    /// Narrowest legal frontier, single-hop expansion.
    pub fn low_latency(top_k: usize) -> Self {
        Self {
            top_k,
            ef_search: top_k,
            two_hop: false,
        }
    }

    pub fn with_two_hop(mut self, two_hop: bool) -> Self {
        self.two_hop = two_hop;
        self
    }

    pub fn validate(&self) -> Result<(), AcornError> {
        if self.top_k == 0 {
            return Err(AcornError::InvalidArgument("top_k must be positive"));
        }
        if self.ef_search < self.top_k {
            return Err(AcornError::InvalidArgument(
                "ef_search must be at least top_k",
            ));
        }
        Ok(())
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::new(10, DEFAULT_EF_SEARCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn robust_quota_scales_with_gamma() {
        assert_eq!(GraphConfig::new(8, 16, 1).robust_quota(), 0);
        assert_eq!(GraphConfig::new(8, 16, 2).robust_quota(), 8);
        assert_eq!(GraphConfig::new(8, 16, 4).robust_quota(), 16);
        assert_eq!(GraphConfig::new(2, 1, 2).robust_quota(), 1);
        assert_eq!(GraphConfig::new(8, 0, 4).robust_quota(), 0);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(GraphConfig::new(0, 4, 2).validate().is_err());
        assert!(GraphConfig::new(4, 4, 0).validate().is_err());
        assert!(GraphConfig::new(4, 0, 1).validate().is_ok());
        assert!(GraphConfig::new(4, 4, 1)
            .with_ef_construction(0)
            .validate()
            .is_err());
        let policy = RobustPolicy {
            rarity_threshold: 0.5,
            relaxation: 0.9,
        };
        assert!(GraphConfig::default()
            .with_policy(policy)
            .validate()
            .is_err());
    }

    #[test]
    fn search_params_validation() {
        assert!(SearchParams::new(0, 10).validate().is_err());
        assert!(SearchParams::new(10, 5).validate().is_err());
        assert!(SearchParams::new(5, 5).validate().is_ok());
        assert!(SearchParams::high_recall(100).validate().is_ok());
        assert!(SearchParams::low_latency(3).validate().is_ok());
    }

    #[test]
    fn high_recall_saturates_for_huge_result_counts() {
        let params = SearchParams::high_recall(usize::MAX);
        assert_eq!(params.ef_search, usize::MAX);
        assert!(params.validate().is_ok());
        assert_eq!(SearchParams::high_recall(2).ef_search, DEFAULT_EF_SEARCH);
    }
}
