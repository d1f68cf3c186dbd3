pub mod dns;
pub mod domain_provider;
pub mod email;
pub mod telegram;

pub use dns::*;
pub use domain_provider::*;
pub use email::*;
pub use telegram::*;
