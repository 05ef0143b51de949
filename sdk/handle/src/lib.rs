pub mod crypto;
pub mod types;

pub use types::{EncryptedHandle, HANDLE_VERSION_V1, HandleContext, HandleError};

pub use crypto::{open_amount, seal_amount};
