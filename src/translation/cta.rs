use crate::config::cta::CtaPolicy;
use crate::config::settings::LedgerPresentation;
use crate::core::ledger::{ConsolLine, LineTag};
use crate::graph::resolver::ResolvedEntity;
use rust_decimal::Decimal;

/// Post translation differences according to the group's CTA policy.
///
/// `residuals` pairs each consolidated entity with its CTA balancing figure.
/// Whatever the policy, the posted lines sum to the total of the residuals,
/// so translated lines plus CTA still balance.
pub fn post_cta(
    policy: &CtaPolicy,
    residuals: &[(&ResolvedEntity, Decimal)],
    presentation: &LedgerPresentation,
) -> Vec<ConsolLine> {
    let currency = presentation.presentation_currency.clone();
    match policy {
        CtaPolicy::Single { account } => {
            let total: Decimal = residuals.iter().map(|(_, amount)| *amount).sum();
            vec![ConsolLine::new(account.clone(), LineTag::GroupCta, total, currency)]
        }
        CtaPolicy::ByEntity { account } => residuals
            .iter()
            .map(|(entity, amount)| {
                ConsolLine::new(
                    account.clone(),
                    LineTag::Cta(entity.entity.clone()),
                    *amount,
                    currency.clone(),
                )
            })
            .collect(),
        CtaPolicy::ByNciShare {
            account,
            nci_account,
        } => {
            let mut lines = Vec::with_capacity(residuals.len() * 2);
            for (entity, amount) in residuals {
                // NCI part is rounded; the group part takes the remainder.
                let nci_part = presentation.round(*amount * entity.nci_share());
                let tag = LineTag::Cta(entity.entity.clone());
                lines.push(ConsolLine::new(account.clone(), tag.clone(), *amount - nci_part, currency.clone()));
                lines.push(ConsolLine::new(nci_account.clone(), tag, nci_part, currency.clone()));
            }
            lines
        }
    }
}
