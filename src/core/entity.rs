use crate::core::currency::CurrencyCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a legal or reporting entity in a consolidation group.
///
/// # Examples
///
/// ```
/// use consolidation_engine::core::entity::EntityCode;
///
/// let parent = EntityCode::new("P");
/// let sub = EntityCode::new("A");
/// assert_ne!(parent, sub);
/// assert!(parent > sub);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityCode(String);

impl EntityCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A legal or reporting unit with its functional currency.
///
/// Identity is immutable. A change of functional currency is a dated event
/// handled outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub code: EntityCode,
    pub functional_currency: CurrencyCode,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Entity {
    pub fn new(code: impl Into<EntityCode>, functional_currency: impl Into<CurrencyCode>) -> Self {
        Self {
            code: code.into(),
            functional_currency: functional_currency.into(),
            active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_code_display() {
        assert_eq!(format!("{}", EntityCode::new("DE-GMBH")), "DE-GMBH");
    }

    #[test]
    fn test_entity_defaults_active() {
        let json = r#"{ "code": "A", "functional_currency": "EUR" }"#;
        let entity: Entity = serde_json::from_str(json).unwrap();
        assert!(entity.active);
        assert_eq!(entity.functional_currency.as_str(), "EUR");
        assert!(!Entity::new("B", "USD").inactive().active);
    }
}
