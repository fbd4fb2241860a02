pub mod inventory;
pub mod notifier;
pub mod overdue;
pub mod payments;
pub mod rentals;
pub mod stripe;

pub use inventory::InventoryLedger;
pub use notifier::{MockNotifier, Notifier, TelegramNotifier};
pub use overdue::OverdueScanner;
pub use payments::PaymentOrchestrator;
pub use rentals::RentalLifecycle;
pub use stripe::{MockGateway, PaymentGateway, StripeClient};
