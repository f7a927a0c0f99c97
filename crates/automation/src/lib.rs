//! Automation workflow engine: a persisted step tree walked one
//! asynchronous job at a time. Triggers feed contacts in, rules branch
//! on compiled audience filters, actions perform side effects, END
//! steps (or absent branches) stop traversal.

pub mod executors;
pub mod graph;
pub mod ledger;
pub mod scheduler;
pub mod types;
pub mod worker;

pub use executors::{default_registry, ExecutorRegistry, StepExecutor, StepRun};
pub use graph::{AutomationStepStore, AutomationStore, IfElseSteps, TriggerSteps};
pub use ledger::CompletionLedger;
pub use scheduler::{StepOutcome, StepScheduler, STEP_JOB_NAME};
pub use worker::{AutomationWorker, WorkerReport};
