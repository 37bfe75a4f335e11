use crate::config::rate_policy::{select_rate, RateOverride, RatePolicy, RateSelection};
use crate::config::settings::LedgerPresentation;
use crate::core::account::{AccountCode, AccountPurpose, TrialBalance};
use crate::core::currency::{CurrencyCode, RateBasis};
use crate::core::entity::EntityCode;
use crate::core::period::Period;
use crate::core::posting::IntercompanyPosting;
use crate::error::{ConsolidationError, Result};
use crate::run::providers::{AccountMapProvider, RateProvider};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One trial-balance line in presentation currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedLine {
    pub account: AccountCode,
    pub purpose: AccountPurpose,
    pub local_amount: Decimal,
    pub local_currency: CurrencyCode,
    /// `None` when a fixed override rate was applied.
    pub basis: Option<RateBasis>,
    pub rate: Decimal,
    /// Rounded to the presentation precision.
    pub amount: Decimal,
}

/// An entity's trial balance in presentation currency.
///
/// `cta` is the balancing figure: the translated lines plus `cta` sum to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedBalance {
    pub entity: EntityCode,
    pub currency: CurrencyCode,
    pub lines: Vec<TranslatedLine>,
    pub cta: Decimal,
}

impl TranslatedBalance {
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(|l| l.amount).sum()
    }

    /// Translated total of every line with `purpose`.
    pub fn total_for(&self, purpose: AccountPurpose) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.purpose == purpose)
            .map(|l| l.amount)
            .sum()
    }

    /// Scale every line by `factor` (proportional consolidation) and
    /// recompute the balancing CTA from the rounded scaled lines.
    pub fn scaled(&self, factor: Decimal, presentation: &LedgerPresentation) -> TranslatedBalance {
        if factor == Decimal::ONE {
            return self.clone();
        }
        let lines: Vec<TranslatedLine> = self
            .lines
            .iter()
            .map(|l| TranslatedLine {
                amount: presentation.round(l.amount * factor),
                ..l.clone()
            })
            .collect();
        let cta = -lines.iter().map(|l| l.amount).sum::<Decimal>();
        TranslatedBalance {
            entity: self.entity.clone(),
            currency: self.currency.clone(),
            lines,
            cta,
        }
    }
}

/// Translates local trial balances into the presentation currency.
///
/// Each line is classified through the account map, gets a rate basis (or a
/// fixed rate) from the entity's overrides or the group policy, and is
/// rounded half away from zero to the presentation precision. The engine
/// holds only shared references, so one instance can serve several worker
/// threads.
pub struct TranslationEngine<'a> {
    policy: &'a RatePolicy,
    overrides: &'a [RateOverride],
    accounts: &'a dyn AccountMapProvider,
    rates: &'a dyn RateProvider,
    presentation: &'a LedgerPresentation,
    period: Period,
}

impl<'a> TranslationEngine<'a> {
    pub fn new(
        policy: &'a RatePolicy,
        overrides: &'a [RateOverride],
        accounts: &'a dyn AccountMapProvider,
        rates: &'a dyn RateProvider,
        presentation: &'a LedgerPresentation,
        period: Period,
    ) -> Self {
        Self {
            policy,
            overrides,
            accounts,
            rates,
            presentation,
            period,
        }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// Translate one entity's trial balance.
    ///
    /// Lines are processed in account order, so the first error reported for
    /// an entity does not depend on provider ordering.
    pub fn translate(&self, balance: &TrialBalance) -> Result<TranslatedBalance> {
        let entity = &balance.entity;
        let mut source: Vec<_> = balance.lines.iter().collect();
        source.sort_by(|a, b| a.account.cmp(&b.account));

        let mut lines = Vec::with_capacity(source.len());
        for line in source {
            let purpose = self.classify(entity, &line.account)?;
            let (basis, rate) = self.rate_for(entity, &line.account, purpose, &line.currency)?;
            lines.push(TranslatedLine {
                account: line.account.clone(),
                purpose,
                local_amount: line.amount,
                local_currency: line.currency.clone(),
                basis,
                rate,
                amount: self.presentation.round(line.amount * rate),
            });
        }

        let cta = -lines.iter().map(|l| l.amount).sum::<Decimal>();
        log::debug!(
            "translated {}: {} lines, CTA residual {}",
            entity,
            lines.len(),
            cta
        );

        Ok(TranslatedBalance {
            entity: entity.clone(),
            currency: self.presentation.presentation_currency.clone(),
            lines,
            cta,
        })
    }

    /// Translate an intercompany posting with the rate its account would get
    /// on the trial balance.
    pub fn translate_posting(&self, posting: &IntercompanyPosting) -> Result<IntercompanyPosting> {
        let purpose = self.classify(&posting.entity, &posting.account)?;
        let (_, rate) = self.rate_for(&posting.entity, &posting.account, purpose, &posting.currency)?;
        Ok(IntercompanyPosting {
            amount: self.presentation.round(posting.amount * rate),
            currency: self.presentation.presentation_currency.clone(),
            ..posting.clone()
        })
    }

    fn classify(&self, entity: &EntityCode, account: &AccountCode) -> Result<AccountPurpose> {
        self.accounts
            .classify(account)
            .ok_or_else(|| ConsolidationError::UnmappedAccount {
                entity: entity.clone(),
                account: account.clone(),
            })
    }

    fn rate_for(
        &self,
        entity: &EntityCode,
        account: &AccountCode,
        purpose: AccountPurpose,
        currency: &CurrencyCode,
    ) -> Result<(Option<RateBasis>, Decimal)> {
        match select_rate(self.policy, self.overrides, entity, account, purpose) {
            RateSelection::Fixed(rate) => Ok((None, rate)),
            RateSelection::Basis(basis) => {
                if currency == &self.presentation.presentation_currency {
                    return Ok((Some(basis), Decimal::ONE));
                }
                let rate = self
                    .rates
                    .rate(currency, basis, self.period)
                    .ok_or_else(|| ConsolidationError::MissingRate {
                        entity: entity.clone(),
                        currency: currency.clone(),
                        basis,
                        period: self.period,
                    })?;
                Ok((Some(basis), rate))
            }
        }
    }
}
