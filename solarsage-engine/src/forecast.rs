//! Power-loss forecasting
//!
//! Deterministic: a forecast depends only on the dust level, the location
//! capacity table and the configured economics.

use solarsage_core::{
    clamp_unit, EconomicFactors, EconomicsConfig, Forecast, SolarSageConfig, FORECAST_HOURS,
};
use std::collections::HashMap;
use std::f64::consts::PI;

/// Daily generation capacity (kWh/day) of the reference installation per city.
pub const BUILTIN_LOCATIONS: [(&str, f64); 8] = [
    ("Bengaluru", 28.5),
    ("Mumbai", 26.2),
    ("Delhi", 24.8),
    ("Chennai", 29.1),
    ("Hyderabad", 27.8),
    ("Pune", 27.2),
    ("Kolkata", 25.5),
    ("Ahmedabad", 30.1),
];

/// Exponent applied to the dust level to get its impact on generation.
const DUST_IMPACT_EXPONENT: f64 = 1.3;
/// Fraction of capacity lost at full dust impact.
const LOSS_FACTOR: f64 = 0.45;
const DAYLIGHT_START: usize = 6;
const DAYLIGHT_END: usize = 18;

/// Whether a location resolved against the capacity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationLookup {
    Known,
    /// The city was not in the table; the default capacity was used
    Fallback { city: String },
}

impl LocationLookup {
    pub fn is_fallback(&self) -> bool {
        matches!(self, LocationLookup::Fallback { .. })
    }
}

/// City name to daily capacity, matched case-insensitively.
#[derive(Debug, Clone)]
pub struct LocationTable {
    capacities: HashMap<String, f64>,
    default_capacity: f64,
}

impl LocationTable {
    /// The built-in table with the given default capacity.
    pub fn builtin(default_capacity: f64) -> Self {
        let capacities = BUILTIN_LOCATIONS
            .iter()
            .map(|(city, kwh)| (city.to_lowercase(), *kwh))
            .collect();
        Self {
            capacities,
            default_capacity,
        }
    }

    /// The built-in table extended and overridden by `config.locations`.
    pub fn from_config(config: &SolarSageConfig) -> Self {
        config
            .locations
            .iter()
            .fold(Self::builtin(config.default_capacity_kwh), |table, (city, kwh)| {
                table.with_location(city, *kwh)
            })
    }

    pub fn with_location(mut self, city: &str, capacity_kwh: f64) -> Self {
        self.capacities
            .insert(city.trim().to_lowercase(), capacity_kwh);
        self
    }

    pub fn default_capacity(&self) -> f64 {
        self.default_capacity
    }

    /// City part of a location string: the text before the first comma.
    pub fn city_of(location: &str) -> &str {
        location.split(',').next().unwrap_or_default().trim()
    }

    /// Capacity for a location, falling back to the default.
    pub fn lookup(&self, location: &str) -> (f64, LocationLookup) {
        let city = Self::city_of(location);
        match self.capacities.get(&city.to_lowercase()) {
            Some(kwh) => (*kwh, LocationLookup::Known),
            None => (
                self.default_capacity,
                LocationLookup::Fallback {
                    city: city.to_string(),
                },
            ),
        }
    }
}

/// Fraction of generation lost to a given dust level.
pub fn dust_impact(dust_level: f64) -> f64 {
    clamp_unit(dust_level).powf(DUST_IMPACT_EXPONENT)
}

/// Expected generation per hour over the next [`FORECAST_HOURS`] hours.
///
/// Hour 0 is midnight. Daylight hours follow a flattened sine curve.
pub fn hourly_curve(capacity_kwh: f64, impact: f64) -> Vec<f64> {
    (0..FORECAST_HOURS)
        .map(|h| {
            let hour_of_day = h % 24;
            if (DAYLIGHT_START..=DAYLIGHT_END).contains(&hour_of_day) {
                let angle = PI * (hour_of_day - DAYLIGHT_START) as f64 / 12.0;
                let intensity = angle.sin().max(0.0).powf(0.6);
                let generation = (capacity_kwh / 12.0) * intensity * (1.0 - impact * LOSS_FACTOR);
                generation.max(0.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Builds [`Forecast`]s.
#[derive(Debug, Clone)]
pub struct Forecaster {
    table: LocationTable,
    electricity_rate: f64,
    cleaning_cost_usd: f64,
}

impl Forecaster {
    pub fn new(table: LocationTable, economics: &EconomicsConfig) -> Self {
        Self {
            table,
            electricity_rate: economics.electricity_rate,
            cleaning_cost_usd: economics.cleaning_cost_usd,
        }
    }

    pub fn from_config(config: &SolarSageConfig) -> Self {
        Self::new(LocationTable::from_config(config), &config.economics)
    }

    pub fn table(&self) -> &LocationTable {
        &self.table
    }

    /// Forecast the loss for a dust level (clamped into [0, 1]) at a location.
    ///
    /// Never fails: an unknown location uses the default capacity and is
    /// reported through the returned [`LocationLookup`].
    pub fn forecast(&self, dust_level: f64, location: &str) -> (Forecast, LocationLookup) {
        let (capacity_kwh, lookup) = self.table.lookup(location);
        let impact = dust_impact(dust_level);
        let daily_power_loss_kwh = capacity_kwh * impact * LOSS_FACTOR;
        let loss_percentage = if capacity_kwh > 0.0 {
            (daily_power_loss_kwh / capacity_kwh * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        let daily_loss_usd = daily_power_loss_kwh * self.electricity_rate;

        let forecast = Forecast {
            location: location.to_string(),
            capacity_kwh,
            location_known: !lookup.is_fallback(),
            daily_power_loss_kwh,
            loss_percentage,
            economic: EconomicFactors {
                daily_loss_usd,
                weekly_loss_usd: daily_loss_usd * 7.0,
                cleaning_cost_usd: self.cleaning_cost_usd,
            },
            hourly_generation: hourly_curve(capacity_kwh, impact),
        };
        (forecast, lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forecaster() -> Forecaster {
        Forecaster::new(LocationTable::builtin(26.0), &EconomicsConfig::default())
    }

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_bengaluru_reference_figures() {
        let (forecast, lookup) = forecaster().forecast(0.785, "Bengaluru, India");
        assert_eq!(lookup, LocationLookup::Known);
        assert_eq!(forecast.capacity_kwh, 28.5);
        assert!(close(dust_impact(0.785), 0.73001, 1e-4));
        assert!(close(forecast.daily_power_loss_kwh, 9.3624, 1e-3));
        assert!(close(forecast.economic.daily_loss_usd, 1.12349, 1e-4));
        assert!(close(
            forecast.economic.weekly_loss_usd,
            forecast.economic.daily_loss_usd * 7.0,
            1e-12
        ));
        assert_eq!(forecast.economic.cleaning_cost_usd, 24.50);
        assert!(close(forecast.loss_percentage, 32.85, 0.01));
    }

    #[test]
    fn test_unknown_location_falls_back() {
        let (forecast, lookup) = forecaster().forecast(0.5, "Atlantis, Nowhere");
        assert_eq!(
            lookup,
            LocationLookup::Fallback {
                city: "Atlantis".to_string()
            }
        );
        assert_eq!(forecast.capacity_kwh, 26.0);
        assert!(!forecast.location_known);
    }

    #[test]
    fn test_city_match_ignores_case_and_suffix() {
        let table = LocationTable::builtin(26.0);
        assert_eq!(table.lookup("  pune ").0, 27.2);
        assert_eq!(table.lookup("CHENNAI, Tamil Nadu, India").0, 29.1);
        assert_eq!(LocationTable::city_of("Delhi, India"), "Delhi");
    }

    #[test]
    fn test_config_overrides_table() {
        let mut config = SolarSageConfig::default_roster();
        config.locations.insert("Pune".to_string(), 31.0);
        config.locations.insert("Jaipur".to_string(), 29.9);
        let table = LocationTable::from_config(&config);
        assert_eq!(table.lookup("Pune").0, 31.0);
        assert_eq!(table.lookup("Jaipur, India").0, 29.9);
        assert_eq!(table.lookup("Mumbai").0, 26.2);
    }

    #[test]
    fn test_hourly_curve_shape() {
        let (forecast, _) = forecaster().forecast(0.0, "Bengaluru");
        let curve = &forecast.hourly_generation;
        assert_eq!(curve.len(), FORECAST_HOURS);
        assert_eq!(curve[0], 0.0);
        assert_eq!(curve[5], 0.0);
        assert_eq!(curve[6], 0.0);
        assert!(close(curve[12], 28.5 / 12.0, 1e-9));
        assert_eq!(curve[19], 0.0);
        assert_eq!(curve[12], curve[36]);
        assert!(curve.iter().all(|g| g.is_finite() && *g >= 0.0));
    }

    #[test]
    fn test_dust_level_is_clamped() {
        let f = forecaster();
        let (high, _) = f.forecast(1.7, "Delhi");
        let (one, _) = f.forecast(1.0, "Delhi");
        assert_eq!(high, one);
        let (neg, _) = f.forecast(-0.2, "Delhi");
        assert_eq!(neg.daily_power_loss_kwh, 0.0);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn forecaster() -> Forecaster {
        Forecaster::new(LocationTable::builtin(26.0), &EconomicsConfig::default())
    }

    proptest! {
        #[test]
        fn prop_forecast_is_deterministic(dust in 0.0f64..=1.0, idx in 0usize..8) {
            let f = forecaster();
            let city = BUILTIN_LOCATIONS[idx].0;
            prop_assert_eq!(f.forecast(dust, city), f.forecast(dust, city));
        }

        #[test]
        fn prop_loss_monotone_in_dust(a in 0.0f64..=1.0, b in 0.0f64..=1.0, idx in 0usize..8) {
            let f = forecaster();
            let city = BUILTIN_LOCATIONS[idx].0;
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let (flo, _) = f.forecast(lo, city);
            let (fhi, _) = f.forecast(hi, city);
            prop_assert!(flo.daily_power_loss_kwh <= fhi.daily_power_loss_kwh);
        }

        #[test]
        fn prop_loss_percentage_in_range(dust in -1.0f64..=2.0) {
            let (forecast, _) = forecaster().forecast(dust, "Kolkata");
            prop_assert!((0.0..=100.0).contains(&forecast.loss_percentage));
            prop_assert!(forecast.daily_power_loss_kwh >= 0.0);
        }
    }
}
