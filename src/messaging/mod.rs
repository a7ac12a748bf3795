mod redpanda;

pub use redpanda::{RedpandaClient, SendError};
