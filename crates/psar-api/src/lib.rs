pub mod messages;
pub mod middleware;
pub mod payments;

use std::sync::Arc;

use psar_db::Database;
use psar_gateway::relay::MessageRelay;
use psar_payments::confirm::PaymentConfirmer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub relay: MessageRelay,
    pub confirmer: PaymentConfirmer,
    pub jwt_secret: String,
}
