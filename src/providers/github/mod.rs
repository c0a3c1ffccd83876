mod events;
mod payload;
mod signature;
mod types;

#[cfg(test)]
mod tests;

pub use events::{EventHeader, WebhookEvent};
pub use payload::decode_body;
pub use signature::{sign, verify_signature};
