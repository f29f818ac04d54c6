// SendFlow Infrastructure - Messaging Gateway Adapters
// Implements: MessagingGateway

pub mod dry_run;
pub mod http_gateway;

pub use dry_run::DryRunGateway;
pub use http_gateway::HttpMessagingGateway;
