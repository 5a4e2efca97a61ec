use crate::error::MarketStateError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where a single feature value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSource {
    /// Simple return of the last bar.
    LastReturn,
    /// Return over the last `period` bars.
    Momentum { period: usize },
    /// Standard deviation of the last `period` bar returns.
    Volatility { period: usize },
    /// `close / SMA(period) - 1`.
    SmaRatio { period: usize },
    /// RSI rescaled from [0, 100] to [-1, 1].
    Rsi { period: usize },
    /// Last volume over the mean of the last `period` volumes.
    VolumeRatio { period: usize },
    Sentiment,
    /// A value supplied by the data collaborator under this name.
    Indicator(String),
}

impl FeatureSource {
    /// Bars of close history needed to compute this feature.
    pub fn price_history(&self) -> usize {
        match self {
            FeatureSource::LastReturn => 2,
            FeatureSource::Momentum { period }
            | FeatureSource::Volatility { period }
            | FeatureSource::Rsi { period } => period + 1,
            FeatureSource::SmaRatio { period } => *period,
            FeatureSource::VolumeRatio { .. }
            | FeatureSource::Sentiment
            | FeatureSource::Indicator(_) => 1,
        }
    }

    fn period(&self) -> Option<usize> {
        match self {
            FeatureSource::Momentum { period }
            | FeatureSource::Volatility { period }
            | FeatureSource::SmaRatio { period }
            | FeatureSource::Rsi { period }
            | FeatureSource::VolumeRatio { period } => Some(*period),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub source: FeatureSource,
    /// A missing required feature rejects the whole snapshot.
    pub required: bool,
    /// Value used in place of a missing optional feature.
    pub neutral: f64,
}

impl FeatureSpec {
    pub fn required(name: &str, source: FeatureSource) -> Self {
        Self {
            name: name.to_string(),
            source,
            required: true,
            neutral: 0.0,
        }
    }

    pub fn optional(name: &str, source: FeatureSource, neutral: f64) -> Self {
        Self {
            name: name.to_string(),
            source,
            required: false,
            neutral,
        }
    }
}

/// The ordered, versioned layout of an observation vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    pub fn new(version: u32, features: Vec<FeatureSpec>) -> Result<Self, MarketStateError> {
        if features.is_empty() {
            return Err(MarketStateError::InvalidSchema(
                "a schema needs at least one feature".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for spec in &features {
            if !seen.insert(spec.name.as_str()) {
                return Err(MarketStateError::InvalidSchema(format!(
                    "duplicate feature '{}'",
                    spec.name
                )));
            }
            if spec.source.period() == Some(0) {
                return Err(MarketStateError::InvalidSchema(format!(
                    "feature '{}' has a zero period",
                    spec.name
                )));
            }
            if !spec.neutral.is_finite() {
                return Err(MarketStateError::InvalidSchema(format!(
                    "feature '{}' has a non-finite neutral value",
                    spec.name
                )));
            }
        }
        Ok(Self { version, features })
    }

    /// The default schema, version 1.
    pub fn v1(require_sentiment: bool) -> Self {
        let sentiment = if require_sentiment {
            FeatureSpec::required("sentiment", FeatureSource::Sentiment)
        } else {
            FeatureSpec::optional("sentiment", FeatureSource::Sentiment, 0.0)
        };
        Self {
            version: 1,
            features: vec![
                FeatureSpec::required("last_return", FeatureSource::LastReturn),
                FeatureSpec::required("momentum_5", FeatureSource::Momentum { period: 5 }),
                FeatureSpec::required("volatility_10", FeatureSource::Volatility { period: 10 }),
                FeatureSpec::required("sma_ratio_10", FeatureSource::SmaRatio { period: 10 }),
                FeatureSpec::required("rsi_14", FeatureSource::Rsi { period: 14 }),
                FeatureSpec::optional("volume_ratio_10", FeatureSource::VolumeRatio { period: 10 }, 1.0),
                sentiment,
            ],
        }
    }

    pub fn dim(&self) -> usize {
        self.features.len()
    }

    /// Longest close history any feature needs; feeds size their windows from this.
    pub fn min_history(&self) -> usize {
        self.features
            .iter()
            .map(|f| f.source.price_history())
            .max()
            .unwrap_or(1)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_layout_is_stable() {
        let schema = FeatureSchema::v1(true);
        let names: Vec<_> = schema.features.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "last_return",
                "momentum_5",
                "volatility_10",
                "sma_ratio_10",
                "rsi_14",
                "volume_ratio_10",
                "sentiment"
            ]
        );
        assert_eq!(schema.min_history(), 15);
        assert!(schema.features[6].required);
        assert!(!FeatureSchema::v1(false).features[6].required);
    }

    #[test]
    fn rejects_duplicate_names_and_zero_periods() {
        let dup = FeatureSchema::new(
            2,
            vec![
                FeatureSpec::required("r", FeatureSource::LastReturn),
                FeatureSpec::required("r", FeatureSource::LastReturn),
            ],
        );
        assert!(matches!(dup, Err(MarketStateError::InvalidSchema(_))));

        let zero = FeatureSchema::new(
            2,
            vec![FeatureSpec::required("m", FeatureSource::Momentum { period: 0 })],
        );
        assert!(zero.is_err());
    }
}
