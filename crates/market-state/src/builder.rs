use crate::error::MarketStateError;
use crate::schema::{FeatureSchema, FeatureSource};
use chrono::{DateTime, Utc};
use core_types::Observation;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ta::Next;
use ta::indicators::{RelativeStrengthIndex as Rsi, SimpleMovingAverage as Sma};

/// One snapshot of market data as supplied by a data collaborator.
///
/// Series are ordered oldest first; the last close is the reference price of the tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub prices: Vec<Decimal>,
    pub volumes: Vec<Decimal>,
    pub sentiment: Option<f64>,
    #[serde(default)]
    pub indicators: HashMap<String, f64>,
    /// Quote-currency liquidity available at the top of the book.
    pub liquidity: Option<Decimal>,
}

impl RawSnapshot {
    pub fn last_price(&self) -> Option<Decimal> {
        self.prices.last().copied()
    }
}

/// Converts raw snapshots into observations of a fixed schema.
#[derive(Debug, Clone)]
pub struct MarketStateBuilder {
    schema: FeatureSchema,
}

impl MarketStateBuilder {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Builds the observation for one tick.
    ///
    /// Fails with `DataIncomplete` when the reference price or any required feature is
    /// missing. Missing optional features take their neutral value and clear `complete`.
    pub fn build(&self, raw: &RawSnapshot) -> Result<Observation, MarketStateError> {
        let reference_price = raw
            .last_price()
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| incomplete(raw, "prices"))?;

        let closes = to_f64_series(&raw.prices).ok_or_else(|| incomplete(raw, "prices"))?;
        let volumes = to_f64_series(&raw.volumes);

        let mut features = Vec::with_capacity(self.schema.dim());
        let mut complete = true;

        for spec in &self.schema.features {
            let value = compute(&spec.source, &closes, volumes.as_deref(), raw)?
                .filter(|v| v.is_finite());
            match value {
                Some(v) => features.push(v),
                None if spec.required => return Err(incomplete(raw, &spec.name)),
                None => {
                    tracing::debug!(
                        instrument = %raw.instrument,
                        feature = %spec.name,
                        "Optional feature missing, using neutral value"
                    );
                    complete = false;
                    features.push(spec.neutral);
                }
            }
        }

        Ok(Observation {
            schema_version: self.schema.version,
            instrument: raw.instrument.clone(),
            timestamp: raw.timestamp,
            reference_price,
            features,
            complete,
            positions: Vec::new(),
        })
    }
}

fn incomplete(raw: &RawSnapshot, field: &str) -> MarketStateError {
    MarketStateError::DataIncomplete {
        instrument: raw.instrument.clone(),
        field: field.to_string(),
    }
}

fn to_f64_series(values: &[Decimal]) -> Option<Vec<f64>> {
    values.iter().map(|v| v.to_f64()).collect()
}

/// `Ok(None)` means the feature cannot be computed from this snapshot.
fn compute(
    source: &FeatureSource,
    closes: &[f64],
    volumes: Option<&[f64]>,
    raw: &RawSnapshot,
) -> Result<Option<f64>, MarketStateError> {
    if closes.len() < source.price_history() {
        return Ok(None);
    }
    let last = closes[closes.len() - 1];

    let value = match source {
        FeatureSource::LastReturn => simple_return(closes[closes.len() - 2], last),
        FeatureSource::Momentum { period } => simple_return(closes[closes.len() - 1 - period], last),
        FeatureSource::Volatility { period } => {
            let window = &closes[closes.len() - 1 - period..];
            let returns: Option<Vec<f64>> = window
                .windows(2)
                .map(|w| simple_return(w[0], w[1]))
                .collect();
            returns.map(|r| std_dev(&r))
        }
        FeatureSource::SmaRatio { period } => {
            let mut sma = Sma::new(*period)
                .map_err(|e| MarketStateError::InvalidSchema(e.to_string()))?;
            let mut mean = 0.0;
            for close in closes {
                mean = sma.next(*close);
            }
            (mean > 0.0).then(|| last / mean - 1.0)
        }
        FeatureSource::Rsi { period } => {
            let mut rsi = Rsi::new(*period)
                .map_err(|e| MarketStateError::InvalidSchema(e.to_string()))?;
            let mut value = 50.0;
            for close in closes {
                value = rsi.next(*close);
            }
            Some((value - 50.0) / 50.0)
        }
        FeatureSource::VolumeRatio { period } => volumes.and_then(|v| {
            if v.len() < *period {
                return None;
            }
            let window = &v[v.len() - period..];
            let mean = window.iter().sum::<f64>() / *period as f64;
            (mean > 0.0).then(|| window[window.len() - 1] / mean)
        }),
        FeatureSource::Sentiment => raw.sentiment.map(|s| s.clamp(-1.0, 1.0)),
        FeatureSource::Indicator(name) => raw.indicators.get(name).copied(),
    };
    Ok(value)
}

fn simple_return(from: f64, to: f64) -> Option<f64> {
    (from > 0.0).then(|| to / from - 1.0)
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}
