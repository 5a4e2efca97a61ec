use crate::error::ExecutorError;
use async_trait::async_trait;
use chrono::Utc;
use configuration::Execution;
use core_types::{Direction, Fill, OrderIntent, OrderRequest};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A generic trait for an execution venue.
///
/// This trait allows the learning loop to be agnostic about whether it is talking to the
/// paper venue or a real one.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Submits an approved order and waits for its fill.
    ///
    /// The returned `Fill` describes the trade (price, quantity, fee) but the portfolio is
    /// **not** modified here. The caller applies the fill once it is confirmed.
    async fn submit(&self, order: &OrderRequest) -> Result<Fill, ExecutorError>;
}

/// The paper venue used for simulation and training sessions.
pub struct SimulatedExecutor {
    slippage_pct: Decimal,
    taker_fee_pct: Decimal,
}

impl SimulatedExecutor {
    pub fn new(params: &Execution) -> Self {
        Self {
            slippage_pct: params.slippage_pct,
            taker_fee_pct: params.taker_fee_pct,
        }
    }

    /// Moves the reference price against the order by the configured slippage.
    fn slipped_price(&self, order: &OrderRequest) -> Decimal {
        let buying = match &order.intent {
            OrderIntent::Open { direction, .. } => *direction == Direction::Long,
            // Closing a long sells, closing a short buys.
            OrderIntent::Close { direction, .. } => *direction == Direction::Short,
            OrderIntent::AmendStop { .. } => return order.reference_price,
        };
        let slippage = order.reference_price * self.slippage_pct;
        if buying {
            order.reference_price + slippage
        } else {
            order.reference_price - slippage
        }
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn submit(&self, order: &OrderRequest) -> Result<Fill, ExecutorError> {
        if order.reference_price <= Decimal::ZERO {
            return Err(ExecutorError::Rejected(format!(
                "reference price {} is not positive",
                order.reference_price
            )));
        }
        let quantity = order.quantity();
        let is_amend = matches!(order.intent, OrderIntent::AmendStop { .. });
        if !is_amend && quantity <= Decimal::ZERO {
            return Err(ExecutorError::Rejected(format!(
                "quantity {quantity} is not positive"
            )));
        }

        let price = self.slipped_price(order);
        let fee = price * quantity * self.taker_fee_pct;

        let fill = Fill {
            fill_id: Uuid::new_v4(),
            client_order_id: order.client_order_id,
            instrument: order.instrument.clone(),
            price,
            quantity,
            fee,
            timestamp: Utc::now(),
        };
        tracing::debug!(?fill, "SimulatedExecutor: filled order");
        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::CloseReason;
    use rust_decimal_macros::dec;

    fn executor() -> SimulatedExecutor {
        SimulatedExecutor::new(&Execution {
            slippage_pct: dec!(0.001),
            taker_fee_pct: dec!(0.0004),
            ..Execution::default()
        })
    }

    #[tokio::test]
    async fn long_entry_fills_above_reference_with_fee() {
        let order = OrderRequest::new(
            "BTCUSDT",
            OrderIntent::Open {
                direction: Direction::Long,
                quantity: dec!(2),
                stop_loss_price: dec!(98),
            },
            dec!(100),
        );
        let fill = executor().submit(&order).await.unwrap();
        assert_eq!(fill.price, dec!(100.1));
        assert_eq!(fill.quantity, dec!(2));
        assert_eq!(fill.fee, dec!(100.1) * dec!(2) * dec!(0.0004));
        assert_eq!(fill.client_order_id, order.client_order_id);
    }

    #[tokio::test]
    async fn closing_a_long_sells_below_reference() {
        let order = OrderRequest::new(
            "BTCUSDT",
            OrderIntent::Close {
                position_id: Uuid::new_v4(),
                direction: Direction::Long,
                quantity: dec!(1),
                reason: CloseReason::Agent,
            },
            dec!(100),
        );
        let fill = executor().submit(&order).await.unwrap();
        assert_eq!(fill.price, dec!(99.9));
    }

    #[tokio::test]
    async fn stop_amendment_is_acknowledged_without_quantity() {
        let order = OrderRequest::new(
            "BTCUSDT",
            OrderIntent::AmendStop {
                position_id: Uuid::new_v4(),
                stop_loss_price: dec!(99),
            },
            dec!(100),
        );
        let fill = executor().submit(&order).await.unwrap();
        assert_eq!(fill.quantity, Decimal::ZERO);
        assert_eq!(fill.fee, Decimal::ZERO);
    }

    #[tokio::test]
    async fn zero_quantity_entry_is_rejected() {
        let order = OrderRequest::new(
            "BTCUSDT",
            OrderIntent::Open {
                direction: Direction::Short,
                quantity: Decimal::ZERO,
                stop_loss_price: dec!(102),
            },
            dec!(100),
        );
        assert!(matches!(
            executor().submit(&order).await,
            Err(ExecutorError::Rejected(_))
        ));
    }
}
