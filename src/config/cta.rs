use crate::core::account::AccountCode;
use serde::{Deserialize, Serialize};

/// Where translation differences are posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CtaPolicy {
    /// All entities' residuals aggregate into one group CTA line.
    Single { account: AccountCode },
    /// One CTA line per entity, all on the same account.
    ByEntity { account: AccountCode },
    /// Per entity, split between the group's share and the NCI share
    /// according to the entity's effective ownership.
    ByNciShare {
        account: AccountCode,
        nci_account: AccountCode,
    },
}

impl Default for CtaPolicy {
    fn default() -> Self {
        CtaPolicy::Single {
            account: AccountCode::new("CTA"),
        }
    }
}

impl CtaPolicy {
    pub fn account(&self) -> &AccountCode {
        match self {
            CtaPolicy::Single { account }
            | CtaPolicy::ByEntity { account }
            | CtaPolicy::ByNciShare { account, .. } => account,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_json_shape() {
        let json = r#"{ "mode": "by_nci_share", "account": "3900", "nci_account": "3950" }"#;
        let policy: CtaPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.account().as_str(), "3900");
        assert!(matches!(policy, CtaPolicy::ByNciShare { .. }));
    }
}
