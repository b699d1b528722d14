//! Cleaning decision scoring
//!
//! [`DecisionEngine::assess`] is pure: identical inputs always yield an
//! identical [`Assessment`]. Ids and timestamps are stamped by the caller.

use solarsage_core::{
    Assessment, CleaningPriority, CostBenefit, Forecast, PanelObservation, RiskCategory,
};

const RISK_WEIGHT: f64 = 0.45;
const VIABILITY_WEIGHT: f64 = 0.55;

/// Score above which, with enough dust, cleaning happens immediately.
pub const IMMEDIATE_SCORE: f64 = 85.0;
/// Dust percentage above which an immediate cleaning is allowed.
pub const IMMEDIATE_DUST_PCT: f64 = 65.0;
/// Score above which cleaning is scheduled.
pub const SCHEDULE_SCORE: f64 = 70.0;

/// Viability when cleaning never pays back.
const NEVER_PAYS_BACK_VIABILITY: f64 = 25.0;

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    confidence_threshold: f64,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl DecisionEngine {
    /// `confidence_threshold` only flags low-confidence classifications.
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Score an observation against its forecast.
    pub fn assess(&self, observation: &PanelObservation, forecast: &Forecast) -> Assessment {
        let dust_pct = observation.dust_pct();
        let economic = &forecast.economic;

        let environmental_risk = environmental_risk(dust_pct);
        let payback_days = payback_days(economic.cleaning_cost_usd, economic.daily_loss_usd);
        let economic_viability = viability_for(payback_days);
        let combined_score = environmental_risk * RISK_WEIGHT + economic_viability * VIABILITY_WEIGHT;

        Assessment {
            environmental_risk,
            economic_viability,
            combined_score,
            confidence: decision_confidence(combined_score),
            priority: priority_for(combined_score, dust_pct),
            risk_category: RiskCategory::from_dust_pct(dust_pct),
            low_confidence: observation.confidence < self.confidence_threshold,
            cost_benefit: CostBenefit {
                investment: economic.cleaning_cost_usd,
                weekly_savings: economic.weekly_loss_usd,
                roi_pct: roi_pct(economic.weekly_loss_usd, economic.cleaning_cost_usd),
                payback_days,
            },
        }
    }
}

/// Risk in [0, 100] from a dust percentage.
pub fn environmental_risk(dust_pct: f64) -> f64 {
    (dust_pct * 1.2).clamp(0.0, 100.0)
}

/// Days until the avoided loss covers the cleaning cost; `None` if it never does.
pub fn payback_days(cleaning_cost_usd: f64, daily_loss_usd: f64) -> Option<f64> {
    if daily_loss_usd > 0.0 {
        Some(cleaning_cost_usd / daily_loss_usd)
    } else {
        None
    }
}

pub fn viability_for(payback_days: Option<f64>) -> f64 {
    match payback_days {
        None => NEVER_PAYS_BACK_VIABILITY,
        Some(days) if days < 5.0 => 95.0,
        Some(days) if days < 10.0 => 85.0,
        Some(_) => 70.0,
    }
}

pub fn decision_confidence(combined_score: f64) -> f64 {
    (65.0 + combined_score * 0.3).min(95.0)
}

/// First matching rule wins.
pub fn priority_for(combined_score: f64, dust_pct: f64) -> CleaningPriority {
    if combined_score > IMMEDIATE_SCORE && dust_pct > IMMEDIATE_DUST_PCT {
        CleaningPriority::ExecuteImmediate
    } else if combined_score > SCHEDULE_SCORE {
        CleaningPriority::ScheduleCleaning
    } else {
        CleaningPriority::ContinueMonitoring
    }
}

/// Annualized return on one cleaning, in percent.
pub fn roi_pct(weekly_savings: f64, cleaning_cost_usd: f64) -> f64 {
    if weekly_savings > 0.0 && cleaning_cost_usd > 0.0 {
        (weekly_savings * 52.0 / cleaning_cost_usd - 1.0) * 100.0
    } else {
        0.0
    }
}
