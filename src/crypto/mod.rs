mod signer;

pub use signer::{generate_state, StateSigner, STATE_TTL_SECS};
