pub mod fetch;
pub mod serve;
pub mod personas;
