pub use build::{BuildOutput, BuildPipeline, BuildStage, CompileOptions, CompiledArtifact};
pub use config::{BuildFailurePolicy, GraderConfig};
pub use error::GraderError;
pub use matcher::{match_output, MatchConfig, MatchOutcome, Pattern, Quantifier};
pub use report::{FieldScore, Image, Report, TestResult};
pub use runner::{run, run_text, ExecutionOutcome, RunOptions, SandboxIdentity};
pub use session::{RunTest, Session};
pub use suite::{parse_check_log, SuiteNaming, SuiteRun};
pub use utils::setup_logger;

pub mod build;
pub mod config;
mod error;
pub mod matcher;
pub mod report;
pub mod runner;
pub mod session;
pub mod suite;
pub mod utils;
pub mod validator;
