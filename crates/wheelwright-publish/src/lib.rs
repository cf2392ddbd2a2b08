//! Release-side adapters for Wheelwright: trusted-identity token exchange
//! over HTTP and package upload through `twine`.

pub mod token;
pub mod uploader;

pub use token::{ActionsIdentityToken, EnvIdentityToken, MintTokenExchange, ProviderError};
pub use uploader::TwineUploader;
