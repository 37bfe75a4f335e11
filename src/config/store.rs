use crate::config::account_map::AccountMap;
use crate::config::cta::CtaPolicy;
use crate::config::elimination_rule::EliminationRule;
use crate::config::nci_map::NciMap;
use crate::config::rate_policy::{RateOverride, RatePolicy};
use crate::config::settings::{EngineSettings, LedgerPresentation};
use crate::core::entity::{Entity, EntityCode};
use crate::error::{ConsolidationError, Result};
use crate::graph::ownership_graph::{validate_edges, OwnershipEdge};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Everything an administrator configures for one consolidation group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Group parent; every consolidation percentage is relative to it.
    pub root: EntityCode,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub ownership: Vec<OwnershipEdge>,
    #[serde(default)]
    pub rate_policy: RatePolicy,
    #[serde(default)]
    pub rate_overrides: Vec<RateOverride>,
    #[serde(default)]
    pub cta_policy: CtaPolicy,
    #[serde(default)]
    pub nci_map: NciMap,
    #[serde(default)]
    pub elimination_rules: Vec<EliminationRule>,
    #[serde(default)]
    pub account_map: AccountMap,
    pub presentation: LedgerPresentation,
    #[serde(default)]
    pub settings: EngineSettings,
}

impl GroupConfig {
    pub fn new(root: impl Into<EntityCode>, presentation: LedgerPresentation) -> Self {
        Self {
            root: root.into(),
            entities: Vec::new(),
            ownership: Vec::new(),
            rate_policy: RatePolicy::default(),
            rate_overrides: Vec::new(),
            cta_policy: CtaPolicy::default(),
            nci_map: NciMap::default(),
            elimination_rules: Vec::new(),
            account_map: AccountMap::default(),
            presentation,
            settings: EngineSettings::default(),
        }
    }
}

/// Immutable view of a group's configuration, taken once at run start.
///
/// Time-bounded settings (rate overrides, elimination rules) are already
/// filtered to the as-of date. Ownership edges are kept in full so the
/// resolver can check window overlaps across the whole history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSnapshot {
    pub group: String,
    pub as_of: NaiveDate,
    pub root: EntityCode,
    pub entities: Vec<Entity>,
    pub ownership: Vec<OwnershipEdge>,
    pub rate_policy: RatePolicy,
    pub rate_overrides: Vec<RateOverride>,
    pub cta_policy: CtaPolicy,
    pub nci_map: NciMap,
    pub elimination_rules: Vec<EliminationRule>,
    pub account_map: AccountMap,
    pub presentation: LedgerPresentation,
    pub settings: EngineSettings,
}

impl ConfigSnapshot {
    pub fn entity(&self, code: &EntityCode) -> Option<&Entity> {
        self.entities.iter().find(|e| &e.code == code)
    }

    pub fn active_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.active)
    }

    /// Overrides that apply to one entity.
    pub fn overrides_for(&self, entity: &EntityCode) -> Vec<RateOverride> {
        self.rate_overrides
            .iter()
            .filter(|o| &o.entity == entity)
            .cloned()
            .collect()
    }
}

/// In-memory configuration surface, keyed by group code.
///
/// Cloning shares the underlying map, so a store handed to an orchestrator
/// sees later administrative changes; runs are isolated from them through
/// [`PolicyStore::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    groups: Arc<RwLock<HashMap<String, GroupConfig>>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a whole group configuration.
    pub fn put_group(&self, group: impl Into<String>, config: GroupConfig) {
        let group = group.into();
        log::info!("configuring group {} (root {})", group, config.root);
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group, config);
    }

    pub fn group(&self, group: &str) -> Option<GroupConfig> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(group)
            .cloned()
    }

    pub fn groups(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn remove_group(&self, group: &str) -> Option<GroupConfig> {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(group)
    }

    fn update<T>(&self, group: &str, f: impl FnOnce(&mut GroupConfig) -> Result<T>) -> Result<T> {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let config = groups
            .get_mut(group)
            .ok_or_else(|| ConsolidationError::InvalidConfiguration(format!("unknown group {}", group)))?;
        f(config)
    }

    /// Add an entity, replacing any entity with the same code.
    pub fn upsert_entity(&self, group: &str, entity: Entity) -> Result<()> {
        self.update(group, |config| {
            config.entities.retain(|e| e.code != entity.code);
            config.entities.push(entity);
            config.entities.sort_by(|a, b| a.code.cmp(&b.code));
            Ok(())
        })
    }

    /// Add an ownership edge. The full edge history must still satisfy the
    /// window invariant, otherwise the edge is rejected and nothing changes.
    pub fn add_ownership_edge(&self, group: &str, edge: OwnershipEdge) -> Result<()> {
        self.update(group, |config| {
            let mut candidate = config.ownership.clone();
            candidate.push(edge);
            validate_edges(&candidate)?;
            config.ownership = candidate;
            Ok(())
        })
    }

    /// Close the open edge between `parent` and `child` at `effective_to`.
    pub fn close_ownership_edge(
        &self,
        group: &str,
        parent: &EntityCode,
        child: &EntityCode,
        effective_to: NaiveDate,
    ) -> Result<()> {
        self.update(group, |config| {
            let edge = config
                .ownership
                .iter_mut()
                .find(|e| &e.parent == parent && &e.child == child && e.effective_to.is_none())
                .ok_or_else(|| {
                    ConsolidationError::InvalidConfiguration(format!(
                        "no open ownership edge {} -> {}",
                        parent, child
                    ))
                })?;
            edge.effective_to = Some(effective_to);
            edge.validate()
        })
    }

    pub fn set_rate_policy(&self, group: &str, policy: RatePolicy) -> Result<()> {
        self.update(group, |config| {
            config.rate_policy = policy;
            Ok(())
        })
    }

    pub fn add_rate_override(&self, group: &str, rate_override: RateOverride) -> Result<()> {
        if let Some(rate) = rate_override.fixed_rate {
            if rate <= rust_decimal::Decimal::ZERO {
                return Err(ConsolidationError::InvalidConfiguration(format!(
                    "fixed rate for {} must be positive, got {}",
                    rate_override.entity, rate
                )));
            }
        }
        self.update(group, |config| {
            if config.rate_overrides.iter().any(|o| o.conflicts_with(&rate_override)) {
                return Err(ConsolidationError::DuplicateRateOverride {
                    entity: rate_override.entity.clone(),
                    scope: rate_override.scope(),
                });
            }
            config.rate_overrides.push(rate_override);
            Ok(())
        })
    }

    pub fn set_cta_policy(&self, group: &str, policy: CtaPolicy) -> Result<()> {
        self.update(group, |config| {
            config.cta_policy = policy;
            Ok(())
        })
    }

    pub fn set_nci_map(&self, group: &str, map: NciMap) -> Result<()> {
        self.update(group, |config| {
            config.nci_map = map;
            Ok(())
        })
    }

    /// Add an elimination rule, replacing a rule with the same id.
    pub fn upsert_elimination_rule(&self, group: &str, rule: EliminationRule) -> Result<()> {
        if rule.tolerance < rust_decimal::Decimal::ZERO || rule.window_days < 0 {
            return Err(ConsolidationError::InvalidConfiguration(format!(
                "elimination rule {} needs a non-negative tolerance and window",
                rule.id
            )));
        }
        self.update(group, |config| {
            config.elimination_rules.retain(|r| r.id != rule.id);
            config.elimination_rules.push(rule);
            Ok(())
        })
    }

    pub fn remove_elimination_rule(&self, group: &str, rule_id: &str) -> Result<bool> {
        self.update(group, |config| {
            let before = config.elimination_rules.len();
            config.elimination_rules.retain(|r| r.id != rule_id);
            Ok(config.elimination_rules.len() != before)
        })
    }

    pub fn set_account_map(&self, group: &str, map: AccountMap) -> Result<()> {
        self.update(group, |config| {
            config.account_map = map;
            Ok(())
        })
    }

    pub fn set_presentation(&self, group: &str, presentation: LedgerPresentation) -> Result<()> {
        self.update(group, |config| {
            config.presentation = presentation;
            Ok(())
        })
    }

    pub fn set_settings(&self, group: &str, settings: EngineSettings) -> Result<()> {
        if settings.significant_influence_threshold > settings.control_threshold {
            return Err(ConsolidationError::InvalidConfiguration(
                "significant influence threshold exceeds control threshold".to_string(),
            ));
        }
        self.update(group, |config| {
            config.settings = settings;
            Ok(())
        })
    }

    /// Consistent read of a group's configuration as of a date.
    pub fn snapshot(&self, group: &str, as_of: NaiveDate) -> Result<Arc<ConfigSnapshot>> {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        let config = groups
            .get(group)
            .ok_or_else(|| ConsolidationError::InvalidConfiguration(format!("unknown group {}", group)))?;

        let mut rules: Vec<EliminationRule> = config
            .elimination_rules
            .iter()
            .filter(|r| r.is_effective(as_of))
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));

        let mut entities = config.entities.clone();
        entities.sort_by(|a, b| a.code.cmp(&b.code));

        Ok(Arc::new(ConfigSnapshot {
            group: group.to_string(),
            as_of,
            root: config.root.clone(),
            entities,
            ownership: config.ownership.clone(),
            rate_policy: config.rate_policy.clone(),
            rate_overrides: config
                .rate_overrides
                .iter()
                .filter(|o| o.is_effective(as_of))
                .cloned()
                .collect(),
            cta_policy: config.cta_policy.clone(),
            nci_map: config.nci_map.clone(),
            elimination_rules: rules,
            account_map: config.account_map.clone(),
            presentation: config.presentation.clone(),
            settings: config.settings.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::account::AccountPurpose;
    use crate::core::currency::RateBasis;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store() -> PolicyStore {
        let store = PolicyStore::new();
        store.put_group("G", GroupConfig::new("P", LedgerPresentation::new("USD")));
        store
    }

    #[test]
    fn test_unknown_group() {
        let err = PolicyStore::new().snapshot("X", date(2025, 11, 30)).unwrap_err();
        assert!(matches!(err, ConsolidationError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_overlapping_edge_rejected() {
        let store = store();
        store
            .add_ownership_edge("G", OwnershipEdge::new("P", "A", dec!(0.8), date(2020, 1, 1)))
            .unwrap();
        let err = store
            .add_ownership_edge("G", OwnershipEdge::new("P", "A", dec!(0.9), date(2024, 1, 1)))
            .unwrap_err();
        assert!(matches!(err, ConsolidationError::OverlappingOwnership { .. }));
        assert_eq!(store.group("G").unwrap().ownership.len(), 1);

        // Closing the first edge lets the new one in.
        store
            .close_ownership_edge("G", &EntityCode::new("P"), &EntityCode::new("A"), date(2024, 1, 1))
            .unwrap();
        store
            .add_ownership_edge("G", OwnershipEdge::new("P", "A", dec!(0.9), date(2024, 1, 1)))
            .unwrap();
        assert_eq!(store.group("G").unwrap().ownership.len(), 2);
    }

    #[test]
    fn test_snapshot_filters_dated_config() {
        let store = store();
        let mut old_rule = EliminationRule::new("old", "14*");
        old_rule.effective_to = Some(date(2025, 1, 1));
        store.upsert_elimination_rule("G", old_rule).unwrap();
        store.upsert_elimination_rule("G", EliminationRule::new("ic", "1*")).unwrap();

        let mut future = RateOverride::basis("A", AccountPurpose::Equity, RateBasis::Closing);
        future.effective_from = Some(date(2026, 1, 1));
        store.add_rate_override("G", future).unwrap();

        let snapshot = store.snapshot("G", date(2025, 11, 30)).unwrap();
        assert_eq!(snapshot.elimination_rules.len(), 1);
        assert_eq!(snapshot.elimination_rules[0].id, "ic");
        assert!(snapshot.rate_overrides.is_empty());
    }

    #[test]
    fn test_conflicting_rate_override_rejected() {
        let store = store();
        let mut first = RateOverride::fixed("A", AccountPurpose::Equity, dec!(1.10)).for_account("3000");
        first.effective_to = Some(date(2025, 1, 1));
        store.add_rate_override("G", first).unwrap();

        let err = store
            .add_rate_override(
                "G",
                RateOverride::fixed("A", AccountPurpose::Equity, dec!(1.20)).for_account("3000"),
            )
            .unwrap_err();
        assert_eq!(
            err,
            ConsolidationError::DuplicateRateOverride {
                entity: EntityCode::new("A"),
                scope: "equity, account 3000".to_string(),
            }
        );

        // Same target once the first window has closed, or a wider target.
        let mut later = RateOverride::fixed("A", AccountPurpose::Equity, dec!(1.20)).for_account("3000");
        later.effective_from = Some(date(2025, 1, 1));
        store.add_rate_override("G", later).unwrap();
        store
            .add_rate_override("G", RateOverride::basis("A", AccountPurpose::Equity, RateBasis::Closing))
            .unwrap();
        assert_eq!(store.group("G").unwrap().rate_overrides.len(), 3);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_changes() {
        let store = store();
        store.upsert_entity("G", Entity::new("A", "EUR")).unwrap();
        let snapshot = store.snapshot("G", date(2025, 11, 30)).unwrap();

        store.upsert_entity("G", Entity::new("B", "GBP")).unwrap();
        assert_eq!(snapshot.entities.len(), 1);
        assert_eq!(store.snapshot("G", date(2025, 11, 30)).unwrap().entities.len(), 2);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let store = store();
        let settings = EngineSettings {
            control_threshold: dec!(0.1),
            ..Default::default()
        };
        assert!(store.set_settings("G", settings).is_err());
        assert!(store.add_rate_override("G", RateOverride::fixed("A", AccountPurpose::Equity, dec!(0))).is_err());
    }
}
