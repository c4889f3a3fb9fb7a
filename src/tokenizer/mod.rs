pub mod hub;

pub use hub::HubTokenizer;
