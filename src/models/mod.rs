pub mod actor;
pub mod location;
pub mod mechanic;
pub mod request;
