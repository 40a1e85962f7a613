pub mod aggregate;
pub mod evaluator;
pub mod groundtruth;
pub mod normalize;
pub mod report;
pub mod sampler;
pub mod search_log;

pub use aggregate::summarize;
pub use evaluator::{EvaluationSettings, evaluate_queries};
pub use groundtruth::load_groundtruth;
pub use report::{write_console_summary, write_report_csv};
pub use sampler::sample_queries;
pub use search_log::SearchLog;
