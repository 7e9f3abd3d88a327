pub mod debounce;
pub mod message_counter;

pub use debounce::Debouncer;
pub use message_counter::MessageCounter;
