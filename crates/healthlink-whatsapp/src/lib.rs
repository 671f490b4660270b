//! Outbound WhatsApp delivery.

pub mod dispatcher;
pub mod error;
pub mod evolution;
pub mod gateway;

pub use dispatcher::Dispatcher;
pub use error::GatewayError;
pub use evolution::EvolutionClient;
pub use gateway::MessageGateway;
