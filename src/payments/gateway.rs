use std::fmt;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::errors::ServiceError;
use crate::payments::{PaymentMethod, PaymentStatus};

/// The outcome of charging a payment
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub status: PaymentStatus,
    pub reference: Option<String>,
}

/// Something that can move money for a booking
#[async_trait]
pub trait PaymentGateway: fmt::Debug + Send + Sync {
    /// charge `amount` cents with the given method
    async fn charge(&self, method: PaymentMethod, amount: i64) -> Result<Settlement, ServiceError>;
}

/// Settles card and wallet payments on the spot, cash is paid at the court
#[derive(Debug, Default)]
pub struct ManualGateway;

impl ManualGateway {
    pub fn reference() -> String {
        let code: String = thread_rng().sample_iter(&Alphanumeric).take(16).collect();
        format!("MAN-{}", code.to_uppercase())
    }
}

#[async_trait]
impl PaymentGateway for ManualGateway {
    async fn charge(&self, method: PaymentMethod, amount: i64) -> Result<Settlement, ServiceError> {
        if amount < 0 {
            bad_request!("can't charge a negative amount");
        }

        let settlement = match method {
            PaymentMethod::Card | PaymentMethod::Wallet => Settlement {
                status: PaymentStatus::Paid,
                reference: Some(ManualGateway::reference()),
            },
            PaymentMethod::Cash => Settlement {
                status: PaymentStatus::Pending,
                reference: None,
            },
        };

        Ok(settlement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn cards_are_settled_immediately() {
        let settlement = ManualGateway.charge(PaymentMethod::Card, 1500).await.unwrap();

        assert_eq!(settlement.status, PaymentStatus::Paid);
        let reference = settlement.reference.unwrap();
        assert!(reference.starts_with("MAN-"));
        assert_eq!(reference.len(), 20);
    }

    #[actix_rt::test]
    async fn cash_stays_pending() {
        let settlement = ManualGateway.charge(PaymentMethod::Cash, 1500).await.unwrap();

        assert_eq!(settlement.status, PaymentStatus::Pending);
        assert!(settlement.reference.is_none());
    }

    #[actix_rt::test]
    async fn negative_amounts_are_refused() {
        assert!(ManualGateway.charge(PaymentMethod::Wallet, -1).await.is_err());
    }
}
