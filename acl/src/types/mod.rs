//! Data model shared by the state store, the pipeline and the endpoints.

pub mod meta;
pub mod one_time;
pub mod policy;
pub mod token;

pub use meta::{QueryMeta, QueryOptions, QueryResponse, WriteResponse};
pub use one_time::OneTimeToken;
pub use policy::{Policy, PolicyStub};
pub use token::{generate_id, Token, TokenStub, TokenType, BOOTSTRAP_TOKEN_NAME};
