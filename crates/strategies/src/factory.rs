use crate::error::StrategyError;
use crate::exploration::EpsilonGreedy;
use crate::linear::{LinearParams, LinearQAgent};
use crate::rule_based::{RuleBasedAgent, DEFAULT_MOMENTUM_THRESHOLD};
use crate::tabular::{TabularParams, TabularQAgent};
use crate::{InputShape, StrategyAgent};
use configuration::RlSettings;
use core_types::AgentKind;
use market_state::FeatureSchema;

/// Bucket width of the tabular discretization, in feature units.
const TABULAR_BUCKET_WIDTH: f64 = 0.01;
const TABULAR_MAX_BUCKET: i64 = 3;

/// Creates the agent selected by `settings.agent`, shaped for `schema`.
///
/// The match is exhaustive, so adding an `AgentKind` without handling it here is a
/// compile error.
pub fn create_agent(
    settings: &RlSettings,
    schema: &FeatureSchema,
) -> Result<Box<dyn StrategyAgent>, StrategyError> {
    let shape = InputShape {
        schema_version: schema.version,
        dim: schema.dim(),
    };
    let explorer = EpsilonGreedy::new(
        settings.exploration_rate,
        settings.exploration_decay,
        settings.exploration_min,
        settings.seed,
    );

    match settings.agent {
        AgentKind::Tabular => {
            let params = TabularParams {
                learning_rate: settings.learning_rate,
                discount_factor: settings.discount_factor,
                size_fraction: settings.enter_size_fraction,
                bucket_width: TABULAR_BUCKET_WIDTH,
                max_bucket: TABULAR_MAX_BUCKET,
            };
            Ok(Box::new(TabularQAgent::new(shape, params, explorer)?))
        }
        AgentKind::Linear => {
            let params = LinearParams {
                learning_rate: settings.learning_rate,
                discount_factor: settings.discount_factor,
                size_fraction: settings.enter_size_fraction,
            };
            Ok(Box::new(LinearQAgent::new(shape, params, explorer)))
        }
        AgentKind::RuleBased => Ok(Box::new(RuleBasedAgent::new(
            schema,
            DEFAULT_MOMENTUM_THRESHOLD,
            settings.enter_size_fraction,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_each_configured_kind() {
        let schema = FeatureSchema::v1(true);
        for kind in [AgentKind::Tabular, AgentKind::Linear, AgentKind::RuleBased] {
            let settings = RlSettings {
                agent: kind,
                ..RlSettings::default()
            };
            let agent = create_agent(&settings, &schema).unwrap();
            assert_eq!(agent.kind(), kind);
            assert_eq!(agent.input_shape(), InputShape { schema_version: 1, dim: 7 });
            assert_eq!(agent.applied_watermark(), 0);
        }
    }
}
