pub mod capture;
pub mod channel;
pub mod error;
pub mod event;
pub mod identity;
pub mod model;
pub mod ports;
pub mod store;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
