use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::payment_providers::{PaymentMethod, SetupIntent};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetupIntentResponse {
    pub id: String,
    /// Passed to the payment provider's client library to collect the card
    pub client_secret: String,
}

impl From<SetupIntent> for SetupIntentResponse {
    fn from(intent: SetupIntent) -> Self {
        Self {
            id: intent.id,
            client_secret: intent.client_secret,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentMethodResponse {
    pub id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
    /// Whether auto-recharge charges this card
    pub used_for_auto_recharge: bool,
}

impl PaymentMethodResponse {
    pub fn new(method: PaymentMethod, auto_recharge_method: Option<&str>) -> Self {
        Self {
            used_for_auto_recharge: auto_recharge_method == Some(method.id.as_str()),
            id: method.id,
            brand: method.brand,
            last4: method.last4,
            exp_month: method.exp_month,
            exp_year: method.exp_year,
        }
    }
}
