use crate::error::RiskError;
use configuration::Execution;
use core_types::{Action, CloseReason, Direction, OrderIntent, OrderRequest, RiskLimits};
use executor::PortfolioState;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Share of cash held back from entries to cover fees.
const CASH_FEE_BUFFER: Decimal = dec!(0.01);

/// Prices and liquidity for one decision tick.
#[derive(Debug, Clone)]
pub struct MarketContext {
    pub instrument: String,
    /// Reference price orders are sized and stopped against.
    pub price: Decimal,
    pub liquidity: Option<Decimal>,
    /// Marks for every instrument the portfolio holds.
    pub marks: HashMap<String, Decimal>,
}

impl MarketContext {
    pub fn new(instrument: &str, price: Decimal, liquidity: Option<Decimal>) -> Self {
        Self {
            instrument: instrument.to_string(),
            price,
            liquidity,
            marks: HashMap::from([(instrument.to_string(), price)]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMode {
    #[default]
    Normal,
    /// Entries are halted until drawdown recovers.
    ExitOnly,
}

/// Advances the drawdown latch.
///
/// `Normal` switches to `ExitOnly` once drawdown reaches the halt bar, and only switches
/// back when drawdown falls below `max_drawdown * recovery_fraction`.
pub fn next_mode(prev: RiskMode, drawdown: Decimal, limits: &RiskLimits) -> RiskMode {
    match prev {
        RiskMode::Normal if drawdown >= limits.max_drawdown_fraction() => RiskMode::ExitOnly,
        RiskMode::ExitOnly if drawdown < limits.recovery_threshold() => RiskMode::Normal,
        mode => mode,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum VetoReason {
    DrawdownHalt { drawdown: Decimal },
    InsufficientLiquidity { available: Option<Decimal>, required: Decimal },
    PositionLimitReached,
    InsufficientCash,
    NoEquity,
    UnknownPosition { position_id: Uuid },
    LooserStop { current: Decimal, requested: Decimal },
    /// The requested stop is already through the market.
    InvalidStop { requested: Decimal },
    Unpriced { detail: String },
}

impl fmt::Display for VetoReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VetoReason::DrawdownHalt { drawdown } => write!(f, "entries halted at drawdown {drawdown}"),
            VetoReason::InsufficientLiquidity { available, required } => match available {
                Some(available) => write!(f, "liquidity {available} below minimum {required}"),
                None => write!(f, "liquidity unknown, minimum is {required}"),
            },
            VetoReason::PositionLimitReached => f.write_str("position size limit reached"),
            VetoReason::InsufficientCash => f.write_str("no cash available for entry"),
            VetoReason::NoEquity => f.write_str("portfolio equity is not positive"),
            VetoReason::UnknownPosition { position_id } => write!(f, "no open position {position_id}"),
            VetoReason::LooserStop { current, requested } => {
                write!(f, "stop {requested} is looser than current {current}")
            }
            VetoReason::InvalidStop { requested } => write!(f, "stop {requested} is through the market"),
            VetoReason::Unpriced { detail } => write!(f, "cannot value portfolio: {detail}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovedAction {
    /// The action as approved; an entry carries its clamped size fraction.
    pub action: Action,
    /// `None` for `Hold`.
    pub order: Option<OrderRequest>,
    pub clamped: bool,
    /// Notional of an approved entry, zero otherwise.
    pub notional: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Approved(ApprovedAction),
    Vetoed(VetoReason),
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved(_))
    }
}

/// Clamps or vetoes proposed actions against the configured limits.
#[derive(Debug, Clone)]
pub struct RiskGovernor {
    min_liquidity: Decimal,
}

impl RiskGovernor {
    pub fn new(params: &Execution) -> Result<Self, RiskError> {
        if params.min_liquidity.is_sign_negative() {
            return Err(RiskError::InvalidParameters(
                "min_liquidity must not be negative".to_string(),
            ));
        }
        Ok(Self {
            min_liquidity: params.min_liquidity,
        })
    }

    pub fn min_liquidity(&self) -> Decimal {
        self.min_liquidity
    }

    /// Decides whether `action` may be executed, and with which order.
    pub fn evaluate(
        &self,
        action: &Action,
        portfolio: &PortfolioState,
        market: &MarketContext,
        limits: &RiskLimits,
        mode: RiskMode,
    ) -> Result<Decision, RiskError> {
        if market.price <= Decimal::ZERO {
            return Err(RiskError::InvalidReferencePrice(market.price));
        }

        let decision = match action {
            Action::Hold => Decision::Approved(ApprovedAction {
                action: Action::Hold,
                order: None,
                clamped: false,
                notional: Decimal::ZERO,
            }),
            Action::Enter {
                direction,
                size_fraction,
            } => self.evaluate_entry(*direction, *size_fraction, portfolio, market, limits, mode),
            Action::Exit { position_id } => {
                match portfolio.find_position(&market.instrument, *position_id) {
                    Some(position) => {
                        let order = OrderRequest::new(
                            &market.instrument,
                            OrderIntent::Close {
                                position_id: *position_id,
                                direction: position.direction,
                                quantity: position.quantity,
                                reason: CloseReason::Agent,
                            },
                            market.price,
                        );
                        Decision::Approved(ApprovedAction {
                            action: action.clone(),
                            order: Some(order),
                            clamped: false,
                            notional: Decimal::ZERO,
                        })
                    }
                    None => Decision::Vetoed(VetoReason::UnknownPosition {
                        position_id: *position_id,
                    }),
                }
            }
            Action::AdjustStop {
                position_id,
                new_stop,
            } => match portfolio.find_position(&market.instrument, *position_id) {
                None => Decision::Vetoed(VetoReason::UnknownPosition {
                    position_id: *position_id,
                }),
                Some(position) => {
                    let current = position.stop_loss_price;
                    let (tighter, valid) = match position.direction {
                        Direction::Long => (*new_stop > current, *new_stop < market.price),
                        Direction::Short => (*new_stop < current, *new_stop > market.price),
                    };
                    if !tighter {
                        Decision::Vetoed(VetoReason::LooserStop {
                            current,
                            requested: *new_stop,
                        })
                    } else if !valid || *new_stop <= Decimal::ZERO {
                        Decision::Vetoed(VetoReason::InvalidStop {
                            requested: *new_stop,
                        })
                    } else {
                        let order = OrderRequest::new(
                            &market.instrument,
                            OrderIntent::AmendStop {
                                position_id: *position_id,
                                stop_loss_price: *new_stop,
                            },
                            market.price,
                        );
                        Decision::Approved(ApprovedAction {
                            action: action.clone(),
                            order: Some(order),
                            clamped: false,
                            notional: Decimal::ZERO,
                        })
                    }
                }
            },
        };

        if let Decision::Vetoed(reason) = &decision {
            tracing::debug!(action = action.label(), %reason, "RiskGovernor: vetoed");
        }
        Ok(decision)
    }

    fn evaluate_entry(
        &self,
        direction: Direction,
        size_fraction: Decimal,
        portfolio: &PortfolioState,
        market: &MarketContext,
        limits: &RiskLimits,
        mode: RiskMode,
    ) -> Decision {
        let valuation = match portfolio.valuation(&market.marks) {
            Ok(v) => v,
            Err(e) => {
                return Decision::Vetoed(VetoReason::Unpriced {
                    detail: e.to_string(),
                });
            }
        };

        // The drawdown halt outranks every other check.
        if mode == RiskMode::ExitOnly || valuation.drawdown >= limits.max_drawdown_fraction() {
            return Decision::Vetoed(VetoReason::DrawdownHalt {
                drawdown: valuation.drawdown,
            });
        }

        if market.liquidity.is_none_or(|l| l < self.min_liquidity) {
            return Decision::Vetoed(VetoReason::InsufficientLiquidity {
                available: market.liquidity,
                required: self.min_liquidity,
            });
        }

        let equity = valuation.equity;
        if equity <= Decimal::ZERO {
            return Decision::Vetoed(VetoReason::NoEquity);
        }

        let requested = size_fraction * equity;
        let room = limits.max_position_size_fraction() * equity
            - portfolio.exposure(&market.instrument, market.price);
        if room <= Decimal::ZERO {
            return Decision::Vetoed(VetoReason::PositionLimitReached);
        }

        let mut notional = requested.min(room);
        let mut clamped = requested > room;

        let spendable = portfolio.cash() * (Decimal::ONE - CASH_FEE_BUFFER);
        if spendable <= Decimal::ZERO {
            return Decision::Vetoed(VetoReason::InsufficientCash);
        }
        if notional > spendable {
            notional = spendable;
            clamped = true;
        }

        let quantity = notional / market.price;
        let stop_loss_price = match direction {
            Direction::Long => market.price * (Decimal::ONE - limits.stop_loss_fraction()),
            Direction::Short => market.price * (Decimal::ONE + limits.stop_loss_fraction()),
        };

        let action = if clamped {
            Action::Enter {
                direction,
                size_fraction: notional / equity,
            }
        } else {
            Action::Enter {
                direction,
                size_fraction,
            }
        };
        if clamped {
            tracing::debug!(%requested, %notional, "RiskGovernor: entry clamped");
        }

        let order = OrderRequest::new(
            &market.instrument,
            OrderIntent::Open {
                direction,
                quantity,
                stop_loss_price,
            },
            market.price,
        );

        Decision::Approved(ApprovedAction {
            action,
            order: Some(order),
            clamped,
            notional,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{Fill, PositionStatus};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn governor() -> RiskGovernor {
        RiskGovernor::new(&Execution::default()).unwrap()
    }

    fn market(price: Decimal) -> MarketContext {
        MarketContext::new("BTCUSDT", price, Some(dec!(1000000)))
    }

    fn approved(decision: Decision) -> ApprovedAction {
        match decision {
            Decision::Approved(a) => a,
            Decision::Vetoed(reason) => panic!("unexpected veto: {reason}"),
        }
    }

    fn open_long(portfolio: &mut PortfolioState, price: Decimal, qty: Decimal) -> uuid::Uuid {
        let order = OrderRequest::new(
            "BTCUSDT",
            OrderIntent::Open {
                direction: Direction::Long,
                quantity: qty,
                stop_loss_price: price * dec!(0.98),
            },
            price,
        );
        let fill = Fill {
            fill_id: Uuid::new_v4(),
            client_order_id: order.client_order_id,
            instrument: "BTCUSDT".to_string(),
            price,
            quantity: qty,
            fee: Decimal::ZERO,
            timestamp: Utc::now(),
        };
        portfolio.apply_fill(&order, &fill).unwrap();
        portfolio.positions_in("BTCUSDT")[0].position_id
    }

    #[test]
    fn oversized_entry_is_clamped_to_the_limit() {
        let portfolio = PortfolioState::new(dec!(50000));
        let action = Action::enter(Direction::Long, dec!(0.5)).unwrap();
        let decision = governor()
            .evaluate(&action, &portfolio, &market(dec!(100)), &RiskLimits::default(), RiskMode::Normal)
            .unwrap();

        let approved = approved(decision);
        assert!(approved.clamped);
        assert_eq!(approved.notional, dec!(5000));
        let Some(order) = approved.order else { panic!("entry without order") };
        assert_eq!(order.quantity(), dec!(50));
        match order.intent {
            OrderIntent::Open { stop_loss_price, .. } => assert_eq!(stop_loss_price, dec!(98)),
            other => panic!("unexpected intent {other:?}"),
        }
    }

    #[test]
    fn short_entry_stop_sits_above_the_price() {
        let portfolio = PortfolioState::new(dec!(50000));
        let action = Action::enter(Direction::Short, dec!(0.05)).unwrap();
        let approved = approved(
            governor()
                .evaluate(&action, &portfolio, &market(dec!(200)), &RiskLimits::default(), RiskMode::Normal)
                .unwrap(),
        );
        assert!(!approved.clamped);
        assert_eq!(approved.notional, dec!(2500));
        match approved.order.map(|o| o.intent) {
            Some(OrderIntent::Open { stop_loss_price, .. }) => assert_eq!(stop_loss_price, dec!(204)),
            other => panic!("unexpected intent {other:?}"),
        }
    }

    #[test]
    fn existing_exposure_reduces_room_and_full_book_vetoes() {
        let mut portfolio = PortfolioState::new(dec!(10000));
        open_long(&mut portfolio, dec!(100), dec!(6));
        let action = Action::enter(Direction::Long, dec!(1)).unwrap();
        let limits = RiskLimits::default();

        let first = approved(
            governor()
                .evaluate(&action, &portfolio, &market(dec!(100)), &limits, RiskMode::Normal)
                .unwrap(),
        );
        assert_eq!(first.notional, dec!(400));

        open_long(&mut portfolio, dec!(100), dec!(4));
        let second = governor()
            .evaluate(&action, &portfolio, &market(dec!(100)), &limits, RiskMode::Normal)
            .unwrap();
        assert_eq!(second, Decision::Vetoed(VetoReason::PositionLimitReached));
    }

    #[test]
    fn drawdown_halts_entries_but_permits_exits() {
        let mut portfolio = PortfolioState::with_drawdown(dec!(83000), dec!(100000));
        let id = open_long(&mut portfolio, dec!(100), dec!(10));
        let limits = RiskLimits::default();

        let entry = governor()
            .evaluate(
                &Action::enter(Direction::Long, dec!(0.01)).unwrap(),
                &portfolio,
                &market(dec!(100)),
                &limits,
                RiskMode::Normal,
            )
            .unwrap();
        assert_eq!(
            entry,
            Decision::Vetoed(VetoReason::DrawdownHalt { drawdown: dec!(0.17) })
        );

        let exit = governor()
            .evaluate(
                &Action::Exit { position_id: id },
                &portfolio,
                &market(dec!(100)),
                &limits,
                RiskMode::ExitOnly,
            )
            .unwrap();
        assert!(exit.is_approved());
    }

    #[test]
    fn drawdown_veto_outranks_liquidity() {
        let portfolio = PortfolioState::with_drawdown(dec!(83000), dec!(100000));
        let thin = MarketContext::new("BTCUSDT", dec!(100), Some(dec!(1)));
        let decision = governor()
            .evaluate(
                &Action::enter(Direction::Long, dec!(0.01)).unwrap(),
                &portfolio,
                &thin,
                &RiskLimits::default(),
                RiskMode::Normal,
            )
            .unwrap();
        assert!(matches!(decision, Decision::Vetoed(VetoReason::DrawdownHalt { .. })));
    }

    #[test]
    fn thin_liquidity_vetoes_entries() {
        let portfolio = PortfolioState::new(dec!(100000));
        let thin = MarketContext::new("BTCUSDT", dec!(100), Some(dec!(9999)));
        let decision = governor()
            .evaluate(
                &Action::enter(Direction::Long, dec!(0.01)).unwrap(),
                &portfolio,
                &thin,
                &RiskLimits::default(),
                RiskMode::Normal,
            )
            .unwrap();
        assert!(matches!(decision, Decision::Vetoed(VetoReason::InsufficientLiquidity { .. })));
    }

    #[test]
    fn exit_of_unknown_position_is_vetoed() {
        let portfolio = PortfolioState::new(dec!(100000));
        let id = Uuid::new_v4();
        let decision = governor()
            .evaluate(
                &Action::Exit { position_id: id },
                &portfolio,
                &market(dec!(100)),
                &RiskLimits::default(),
                RiskMode::Normal,
            )
            .unwrap();
        assert_eq!(decision, Decision::Vetoed(VetoReason::UnknownPosition { position_id: id }));
    }

    #[test]
    fn stops_may_only_tighten() {
        let mut portfolio = PortfolioState::new(dec!(100000));
        let id = open_long(&mut portfolio, dec!(100), dec!(1));
        let governor = governor();
        let limits = RiskLimits::default();
        let eval = |new_stop| {
            governor
                .evaluate(
                    &Action::AdjustStop { position_id: id, new_stop },
                    &portfolio,
                    &market(dec!(100)),
                    &limits,
                    RiskMode::Normal,
                )
                .unwrap()
        };

        assert!(eval(dec!(99)).is_approved());
        assert!(matches!(eval(dec!(97)), Decision::Vetoed(VetoReason::LooserStop { .. })));
        assert!(matches!(eval(dec!(101)), Decision::Vetoed(VetoReason::InvalidStop { .. })));
        assert_eq!(portfolio.positions_in("BTCUSDT")[0].status, PositionStatus::Open);
    }

    #[test]
    fn latch_holds_until_recovery_threshold() {
        let limits = RiskLimits::default();
        let mut mode = RiskMode::Normal;
        for (drawdown, expected) in [
            (dec!(0.10), RiskMode::Normal),
            (dec!(0.15), RiskMode::ExitOnly),
            (dec!(0.10), RiskMode::ExitOnly),
            (dec!(0.075), RiskMode::ExitOnly),
            (dec!(0.07), RiskMode::Normal),
        ] {
            mode = next_mode(mode, drawdown, &limits);
            assert_eq!(mode, expected, "drawdown {drawdown}");
        }
    }

    #[test]
    fn approved_entries_never_exceed_the_limit() {
        let mut rng = StdRng::seed_from_u64(7);
        let limits = RiskLimits::default();
        let governor = governor();
        for _ in 0..200 {
            let equity = Decimal::from(rng.gen_range(1_000i64..1_000_000));
            let fraction = Decimal::new(rng.gen_range(1i64..=100), 2);
            let price = Decimal::new(rng.gen_range(100i64..10_000_000), 2);
            let portfolio = PortfolioState::new(equity);
            let action = Action::enter(Direction::Long, fraction).unwrap();

            let decision = governor
                .evaluate(&action, &portfolio, &market(price), &limits, RiskMode::Normal)
                .unwrap();
            let approved = approved(decision);
            let cap = limits.max_position_size_fraction() * equity;
            assert!(approved.notional <= cap);
            if fraction >= limits.max_position_size_fraction() {
                assert_eq!(approved.notional, cap);
            }
        }
    }
}
