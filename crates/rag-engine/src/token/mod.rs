pub mod counter;

pub use counter::count_tokens;
