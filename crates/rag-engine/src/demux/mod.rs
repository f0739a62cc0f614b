pub mod think_answer;

pub use think_answer::{Mode, ThinkAnswerDemux};
