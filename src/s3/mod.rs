mod client;
pub mod endpoint;
pub mod listing;
pub mod signer;

pub use client::{ObjectStoreClient, ObjectStream, PutPayload};
pub use endpoint::Addressing;
pub use listing::{ListPage, ListedObject};
pub use signer::{Credentials, SigningContext};
