//! Rule-based tiering of clusters into marketing segments

use std::collections::BTreeMap;

use crate::types::{ClusteredCustomer, PipelineOptions, SegmentRecommendation, ThresholdPolicy, Tier};

/// Aggregate Recency/Frequency/Monetary of a group of customers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupProfile {
    pub count: usize,
    pub recency: f64,
    pub frequency: f64,
    pub monetary: f64,
}

impl GroupProfile {
    pub fn compute<'a>(
        customers: impl IntoIterator<Item = &'a ClusteredCustomer>,
        policy: ThresholdPolicy,
    ) -> Option<Self> {
        let mut recency = Vec::new();
        let mut frequency = Vec::new();
        let mut monetary = Vec::new();
        for c in customers {
            recency.push(c.recency as f64);
            frequency.push(c.frequency as f64);
            monetary.push(c.monetary);
        }
        if recency.is_empty() {
            return None;
        }

        let stat = match policy {
            ThresholdPolicy::Mean => mean,
            ThresholdPolicy::Median => median,
        };
        Some(Self {
            count: recency.len(),
            recency: stat(&mut recency),
            frequency: stat(&mut frequency),
            monetary: stat(&mut monetary),
        })
    }
}

fn mean(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Predicate of a tier rule, evaluated against the population reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    /// More recent than the reference and spending more than it.
    RecentHighSpend,
    /// Recency exceeds the reference by the given multiplicative margin.
    RecencyAboveReference { margin: f64 },
    /// Buys more often than the reference.
    FrequencyAboveReference,
}

impl Condition {
    pub fn matches(&self, cluster: &GroupProfile, reference: &GroupProfile) -> bool {
        match *self {
            Condition::RecentHighSpend => {
                cluster.recency < reference.recency && cluster.monetary > reference.monetary
            }
            Condition::RecencyAboveReference { margin } => {
                cluster.recency > reference.recency * margin
            }
            Condition::FrequencyAboveReference => cluster.frequency > reference.frequency,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierRule {
    pub condition: Condition,
    pub tier: Tier,
    pub action: String,
}

impl TierRule {
    pub fn new(condition: Condition, tier: Tier) -> Self {
        Self {
            condition,
            tier,
            action: tier.default_action().to_string(),
        }
    }
}

/// Ordered rules, first match wins. The fallback makes classification total.
#[derive(Debug, Clone, PartialEq)]
pub struct TierRules {
    rules: Vec<TierRule>,
    fallback_tier: Tier,
    fallback_action: String,
}

impl TierRules {
    pub fn new(rules: Vec<TierRule>, fallback_tier: Tier, fallback_action: impl Into<String>) -> Self {
        Self {
            rules,
            fallback_tier,
            fallback_action: fallback_action.into(),
        }
    }

    /// High-value, then at-risk, then (optionally) loyal, else growth.
    pub fn standard(at_risk_margin: f64, include_loyal_rule: bool) -> Self {
        let mut rules = vec![
            TierRule::new(Condition::RecentHighSpend, Tier::HighValue),
            TierRule::new(
                Condition::RecencyAboveReference {
                    margin: at_risk_margin,
                },
                Tier::AtRisk,
            ),
        ];
        if include_loyal_rule {
            rules.push(TierRule::new(Condition::FrequencyAboveReference, Tier::Loyal));
        }
        Self::new(rules, Tier::Growth, Tier::Growth.default_action())
    }

    pub fn rules(&self) -> &[TierRule] {
        &self.rules
    }

    pub fn classify(&self, cluster: &GroupProfile, reference: &GroupProfile) -> (Tier, &str) {
        self.rules
            .iter()
            .find(|rule| rule.condition.matches(cluster, reference))
            .map(|rule| (rule.tier, rule.action.as_str()))
            .unwrap_or((self.fallback_tier, self.fallback_action.as_str()))
    }
}

pub struct SegmentStrategist {
    policy: ThresholdPolicy,
    rules: TierRules,
}

impl SegmentStrategist {
    pub fn new(policy: ThresholdPolicy, rules: TierRules) -> Self {
        Self { policy, rules }
    }

    pub fn from_options(options: &PipelineOptions) -> Self {
        Self::new(
            options.threshold_policy,
            TierRules::standard(options.at_risk_margin, options.include_loyal_rule),
        )
    }

    pub fn policy(&self) -> ThresholdPolicy {
        self.policy
    }

    /// One recommendation per populated cluster label, in label order.
    pub fn recommend(&self, customers: &[ClusteredCustomer]) -> Vec<SegmentRecommendation> {
        let Some(reference) = GroupProfile::compute(customers, self.policy) else {
            return Vec::new();
        };

        let mut clusters: BTreeMap<usize, Vec<&ClusteredCustomer>> = BTreeMap::new();
        for customer in customers {
            clusters.entry(customer.cluster).or_default().push(customer);
        }

        clusters
            .into_iter()
            .filter_map(|(cluster, members)| {
                let profile = GroupProfile::compute(members, self.policy)?;
                let (tier, action) = self.rules.classify(&profile, &reference);

                tracing::debug!(cluster, ?tier, size = profile.count, "Segment classified");

                Some(SegmentRecommendation {
                    cluster,
                    tier,
                    tier_name: tier.display_name().to_string(),
                    recommended_action: action.to_string(),
                    customer_count: profile.count,
                    representative_monetary: profile.monetary,
                    representative_recency: profile.recency,
                    representative_frequency: profile.frequency,
                })
            })
            .collect()
    }
}
