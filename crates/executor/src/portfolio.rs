use crate::error::ExecutorError;
use core_types::{CloseReason, Fill, OrderIntent, OrderRequest, Position, PositionStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A marked-to-market snapshot of the account.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Valuation {
    pub cash: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub equity: Decimal,
    pub peak_equity: Decimal,
    /// `(peak - equity) / peak`, never negative.
    pub drawdown: Decimal,
    pub closed_trades: u32,
    pub winning_trades: u32,
}

/// What a confirmed fill did to the portfolio.
#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Opened { position_id: Uuid },
    Reduced { position_id: Uuid, realized_pnl: Decimal },
    Closed { position_id: Uuid, realized_pnl: Decimal, status: PositionStatus },
    StopAmended { position_id: Uuid, stop_loss_price: Decimal },
}

/// Manages the state of one episode's account: cash, open positions and closed history.
///
/// Positions are collateralised: opening debits the full notional plus fee, closing
/// credits the cost basis plus P&L less fee. Equity is therefore
/// `cash + sum(cost_basis + unrealized_pnl)` for both directions.
///
/// State changes only through `apply_fill` and `mark_to_market`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    cash: Decimal,
    positions: HashMap<String, Vec<Position>>,
    peak_equity: Decimal,
    realized_pnl: Decimal,
    closed: Vec<Position>,
    closed_trades: u32,
    winning_trades: u32,
}

impl PortfolioState {
    /// Creates a new `PortfolioState` with a given amount of starting capital.
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            cash: initial_capital,
            positions: HashMap::new(),
            peak_equity: initial_capital,
            realized_pnl: Decimal::ZERO,
            closed: Vec::new(),
            closed_trades: 0,
            winning_trades: 0,
        }
    }

    /// An account that already fell from `peak_equity` to `cash`, for drawdown fixtures.
    #[cfg(any(test, feature = "test-util"))]
    pub fn with_drawdown(cash: Decimal, peak_equity: Decimal) -> Self {
        Self {
            peak_equity,
            ..Self::new(cash)
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn peak_equity(&self) -> Decimal {
        self.peak_equity
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    /// Closed and liquidated positions, in closing order.
    pub fn closed(&self) -> &[Position] {
        &self.closed
    }

    pub fn closed_trades(&self) -> u32 {
        self.closed_trades
    }

    pub fn winning_trades(&self) -> u32 {
        self.winning_trades
    }

    /// Applies a confirmed fill for `order`.
    ///
    /// Every check happens before any mutation, so an error leaves the state unchanged.
    pub fn apply_fill(
        &mut self,
        order: &OrderRequest,
        fill: &Fill,
    ) -> Result<FillOutcome, ExecutorError> {
        if fill.client_order_id != order.client_order_id {
            return Err(ExecutorError::PortfolioError(format!(
                "fill {} does not belong to order {}",
                fill.fill_id, order.client_order_id
            )));
        }

        match &order.intent {
            OrderIntent::Open {
                direction,
                stop_loss_price,
                ..
            } => {
                let cost = fill.price * fill.quantity;
                let required = cost + fill.fee;
                if required > self.cash {
                    return Err(ExecutorError::InsufficientCash {
                        required: required.to_string(),
                        available: self.cash.to_string(),
                    });
                }
                self.cash -= required;

                let position = Position {
                    position_id: Uuid::new_v4(),
                    instrument: order.instrument.clone(),
                    direction: *direction,
                    entry_price: fill.price,
                    quantity: fill.quantity,
                    stop_loss_price: *stop_loss_price,
                    opened_at: fill.timestamp,
                    status: PositionStatus::Open,
                    closed_at: None,
                    exit_price: None,
                    realized_pnl: None,
                };
                let position_id = position.position_id;
                tracing::debug!(%position_id, instrument = %order.instrument, "Position opened");
                self.positions
                    .entry(order.instrument.clone())
                    .or_default()
                    .push(position);
                Ok(FillOutcome::Opened { position_id })
            }
            OrderIntent::Close {
                position_id,
                reason,
                ..
            } => self.close(&order.instrument, *position_id, *reason, fill),
            OrderIntent::AmendStop {
                position_id,
                stop_loss_price,
            } => {
                let position = self
                    .find_position_mut(&order.instrument, *position_id)
                    .ok_or(ExecutorError::PositionNotFound(*position_id))?;
                position.stop_loss_price = *stop_loss_price;
                Ok(FillOutcome::StopAmended {
                    position_id: *position_id,
                    stop_loss_price: *stop_loss_price,
                })
            }
        }
    }

    fn close(
        &mut self,
        instrument: &str,
        position_id: Uuid,
        reason: CloseReason,
        fill: &Fill,
    ) -> Result<FillOutcome, ExecutorError> {
        let open = self
            .positions
            .get_mut(instrument)
            .ok_or(ExecutorError::PositionNotFound(position_id))?;
        let index = open
            .iter()
            .position(|p| p.position_id == position_id)
            .ok_or(ExecutorError::PositionNotFound(position_id))?;

        let position = &mut open[index];
        if fill.quantity <= Decimal::ZERO || fill.quantity > position.quantity {
            return Err(ExecutorError::InvalidClosingQuantity {
                requested: fill.quantity.to_string(),
                available: position.quantity.to_string(),
            });
        }

        let gross = (fill.price - position.entry_price) * position.direction.sign() * fill.quantity;
        let net = gross - fill.fee;
        self.cash += position.entry_price * fill.quantity + gross - fill.fee;
        self.realized_pnl += net;

        if fill.quantity < position.quantity {
            position.quantity -= fill.quantity;
            position.realized_pnl = Some(position.realized_pnl.unwrap_or_default() + net);
            return Ok(FillOutcome::Reduced {
                position_id,
                realized_pnl: net,
            });
        }

        let mut position = open.remove(index);
        if open.is_empty() {
            self.positions.remove(instrument);
        }

        let total = position.realized_pnl.unwrap_or_default() + net;
        position.status = match reason {
            CloseReason::Agent => PositionStatus::Closed,
            CloseReason::StopLoss => PositionStatus::Liquidated,
        };
        position.closed_at = Some(fill.timestamp);
        position.exit_price = Some(fill.price);
        position.realized_pnl = Some(total);

        self.closed_trades += 1;
        if total > Decimal::ZERO {
            self.winning_trades += 1;
        }
        let status = position.status;
        tracing::debug!(%position_id, %total, ?status, "Position closed");
        self.closed.push(position);

        Ok(FillOutcome::Closed {
            position_id,
            realized_pnl: net,
            status,
        })
    }

    /// Values the portfolio at the given marks without touching the peak.
    pub fn valuation(&self, marks: &HashMap<String, Decimal>) -> Result<Valuation, ExecutorError> {
        let mut unrealized = Decimal::ZERO;
        let mut basis = Decimal::ZERO;
        for (instrument, positions) in &self.positions {
            if positions.is_empty() {
                continue;
            }
            let mark = marks.get(instrument).ok_or_else(|| {
                ExecutorError::PortfolioError(format!("Missing market price for instrument: {instrument}"))
            })?;
            for position in positions {
                basis += position.cost_basis();
                unrealized += position.unrealized_pnl(*mark);
            }
        }

        let equity = self.cash + basis + unrealized;
        let peak = self.peak_equity.max(equity);
        let drawdown = if peak > Decimal::ZERO {
            ((peak - equity) / peak).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };

        Ok(Valuation {
            cash: self.cash,
            realized_pnl: self.realized_pnl,
            unrealized_pnl: unrealized,
            equity,
            peak_equity: peak,
            drawdown,
            closed_trades: self.closed_trades,
            winning_trades: self.winning_trades,
        })
    }

    /// Values the portfolio and ratchets the peak equity used for drawdown.
    pub fn mark_to_market(&mut self, marks: &HashMap<String, Decimal>) -> Result<Valuation, ExecutorError> {
        let valuation = self.valuation(marks)?;
        self.peak_equity = valuation.peak_equity;
        Ok(valuation)
    }

    /// Absolute notional of the open positions in `instrument` at `mark`.
    pub fn exposure(&self, instrument: &str, mark: Decimal) -> Decimal {
        self.positions_in(instrument)
            .iter()
            .map(|p| p.quantity * mark)
            .sum()
    }

    pub fn positions_in(&self, instrument: &str) -> &[Position] {
        self.positions
            .get(instrument)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find_position(&self, instrument: &str, position_id: Uuid) -> Option<&Position> {
        self.positions_in(instrument)
            .iter()
            .find(|p| p.position_id == position_id)
    }

    fn find_position_mut(&mut self, instrument: &str, position_id: Uuid) -> Option<&mut Position> {
        self.positions
            .get_mut(instrument)?
            .iter_mut()
            .find(|p| p.position_id == position_id)
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.values().map(Vec::len).sum()
    }

    /// Open positions whose stop is hit at `mark`, oldest first.
    pub fn triggered_stops(&self, instrument: &str, mark: Decimal) -> Vec<&Position> {
        let mut hit: Vec<&Position> = self
            .positions_in(instrument)
            .iter()
            .filter(|p| p.is_stop_triggered(mark))
            .collect();
        hit.sort_by_key(|p| p.opened_at);
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::Direction;
    use rust_decimal_macros::dec;

    fn fill_for(order: &OrderRequest, price: Decimal, quantity: Decimal, fee: Decimal) -> Fill {
        Fill {
            fill_id: Uuid::new_v4(),
            client_order_id: order.client_order_id,
            instrument: order.instrument.clone(),
            price,
            quantity,
            fee,
            timestamp: Utc::now(),
        }
    }

    fn marks(price: Decimal) -> HashMap<String, Decimal> {
        HashMap::from([("BTCUSDT".to_string(), price)])
    }

    fn open(portfolio: &mut PortfolioState, direction: Direction, price: Decimal, qty: Decimal) -> Uuid {
        let order = OrderRequest::new(
            "BTCUSDT",
            OrderIntent::Open {
                direction,
                quantity: qty,
                stop_loss_price: price * (Decimal::ONE - direction.sign() * dec!(0.02)),
            },
            price,
        );
        let fill = fill_for(&order, price, qty, Decimal::ZERO);
        match portfolio.apply_fill(&order, &fill).unwrap() {
            FillOutcome::Opened { position_id } => position_id,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    fn close(portfolio: &mut PortfolioState, id: Uuid, direction: Direction, price: Decimal, qty: Decimal, reason: CloseReason) -> FillOutcome {
        let order = OrderRequest::new(
            "BTCUSDT",
            OrderIntent::Close {
                position_id: id,
                direction,
                quantity: qty,
                reason,
            },
            price,
        );
        let fill = fill_for(&order, price, qty, Decimal::ZERO);
        portfolio.apply_fill(&order, &fill).unwrap()
    }

    #[test]
    fn long_round_trip_realizes_profit() {
        let mut portfolio = PortfolioState::new(dec!(10000));
        let id = open(&mut portfolio, Direction::Long, dec!(100), dec!(10));
        assert_eq!(portfolio.cash, dec!(9000));
        assert_eq!(portfolio.valuation(&marks(dec!(110))).unwrap().equity, dec!(10100));

        let outcome = close(&mut portfolio, id, Direction::Long, dec!(110), dec!(10), CloseReason::Agent);
        assert!(matches!(outcome, FillOutcome::Closed { status: PositionStatus::Closed, .. }));
        assert_eq!(portfolio.cash, dec!(10100));
        assert_eq!(portfolio.realized_pnl, dec!(100));
        assert_eq!(portfolio.winning_trades, 1);
        assert_eq!(portfolio.open_position_count(), 0);
    }

    #[test]
    fn short_equity_rises_as_price_falls() {
        let mut portfolio = PortfolioState::new(dec!(10000));
        let id = open(&mut portfolio, Direction::Short, dec!(100), dec!(10));
        assert_eq!(portfolio.valuation(&marks(dec!(90))).unwrap().equity, dec!(10100));

        close(&mut portfolio, id, Direction::Short, dec!(90), dec!(10), CloseReason::Agent);
        assert_eq!(portfolio.cash, dec!(10100));
    }

    #[test]
    fn stop_loss_close_marks_position_liquidated() {
        let mut portfolio = PortfolioState::new(dec!(10000));
        let id = open(&mut portfolio, Direction::Long, dec!(100), dec!(10));
        assert_eq!(portfolio.triggered_stops("BTCUSDT", dec!(97)).len(), 1);

        close(&mut portfolio, id, Direction::Long, dec!(97), dec!(10), CloseReason::StopLoss);
        assert_eq!(portfolio.closed[0].status, PositionStatus::Liquidated);
        assert_eq!(portfolio.closed[0].realized_pnl, Some(dec!(-30)));
        assert_eq!(portfolio.winning_trades, 0);
        assert_eq!(portfolio.closed_trades, 1);
    }

    #[test]
    fn insufficient_cash_leaves_state_untouched() {
        let mut portfolio = PortfolioState::new(dec!(500));
        let order = OrderRequest::new(
            "BTCUSDT",
            OrderIntent::Open {
                direction: Direction::Long,
                quantity: dec!(10),
                stop_loss_price: dec!(98),
            },
            dec!(100),
        );
        let fill = fill_for(&order, dec!(100), dec!(10), dec!(1));
        assert!(matches!(
            portfolio.apply_fill(&order, &fill),
            Err(ExecutorError::InsufficientCash { .. })
        ));
        assert_eq!(portfolio.cash, dec!(500));
        assert_eq!(portfolio.open_position_count(), 0);
    }

    #[test]
    fn mark_to_market_ratchets_peak_and_reports_drawdown() {
        let mut portfolio = PortfolioState::new(dec!(10000));
        open(&mut portfolio, Direction::Long, dec!(100), dec!(50));

        let up = portfolio.mark_to_market(&marks(dec!(120))).unwrap();
        assert_eq!(up.peak_equity, dec!(11000));
        assert_eq!(up.drawdown, Decimal::ZERO);

        let down = portfolio.mark_to_market(&marks(dec!(100))).unwrap();
        assert_eq!(down.peak_equity, dec!(11000));
        assert_eq!(down.equity, dec!(10000));
        assert_eq!(down.drawdown, dec!(1000) / dec!(11000));
    }

    #[test]
    fn a_fallen_account_reports_its_drawdown() {
        let portfolio = PortfolioState::with_drawdown(dec!(8000), dec!(10000));
        let valuation = portfolio.valuation(&HashMap::new()).unwrap();
        assert_eq!(portfolio.cash(), dec!(8000));
        assert_eq!(valuation.peak_equity, dec!(10000));
        assert_eq!(valuation.drawdown, dec!(0.2));
    }

    #[test]
    fn missing_mark_is_an_error() {
        let mut portfolio = PortfolioState::new(dec!(10000));
        open(&mut portfolio, Direction::Long, dec!(100), dec!(1));
        assert!(portfolio.valuation(&HashMap::new()).is_err());
    }
}
