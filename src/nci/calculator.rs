use crate::config::nci_map::NciMap;
use crate::config::settings::LedgerPresentation;
use crate::core::account::AccountPurpose;
use crate::core::ledger::{ConsolLine, LineTag};
use crate::graph::resolver::{ConsolidationMethod, ResolvedEntity};
use crate::translation::engine::TranslatedBalance;
use rust_decimal::Decimal;

/// Non-controlling interest attribution for fully consolidated subsidiaries.
///
/// NCI lines are a disclosure alongside the entity's lines, which stay at
/// 100%: they never reduce the consolidated balance of the source account.
/// Proportional and equity-method entities get no NCI line.
pub struct NciCalculator<'a> {
    map: &'a NciMap,
    presentation: &'a LedgerPresentation,
}

impl<'a> NciCalculator<'a> {
    pub fn new(map: &'a NciMap, presentation: &'a LedgerPresentation) -> Self {
        Self { map, presentation }
    }

    /// NCI equity and P&L lines for one entity.
    ///
    /// Shares are applied to the unrounded sum of the participating lines
    /// and rounded once per output account.
    pub fn compute(&self, entity: &ResolvedEntity, translated: &TranslatedBalance) -> Vec<ConsolLine> {
        if entity.method != ConsolidationMethod::Full || entity.exclusion.is_some() {
            return Vec::new();
        }
        let default_share = entity.nci_share();
        if default_share <= Decimal::ZERO && self.map.mappings.iter().all(|m| m.share.is_none()) {
            return Vec::new();
        }

        let mut equity = Decimal::ZERO;
        let mut profit_and_loss = Decimal::ZERO;
        for line in &translated.lines {
            let Some(share) = self.map.share_for(&line.account, line.purpose, default_share) else {
                continue;
            };
            match line.purpose {
                AccountPurpose::Equity => equity += line.amount * share,
                AccountPurpose::ProfitAndLoss => profit_and_loss += line.amount * share,
                _ => {}
            }
        }

        let currency = self.presentation.presentation_currency.clone();
        let tag = LineTag::Nci(entity.entity.clone());
        let mut lines = Vec::with_capacity(2);
        for (account, amount) in [
            (&self.presentation.nci_equity_account, equity),
            (&self.presentation.nci_pl_account, profit_and_loss),
        ] {
            let amount = self.presentation.round(amount);
            if amount != Decimal::ZERO {
                lines.push(ConsolLine::new(account.clone(), tag.clone(), amount, currency.clone()));
            }
        }
        if !lines.is_empty() {
            log::debug!("NCI for {} at {}: {} lines", entity.entity, default_share, lines.len());
        }
        lines
    }
}
