pub mod config;
pub mod data;
pub mod schedule;
pub mod trainer;
pub mod update;
pub mod validation;

pub use config::{EvaluatorConfig, LossKind, TrainerConfig};
pub use data::{DataPlan, DataStream};
pub use schedule::LearningRateSchedule;
pub use trainer::{ModelStore, NoValidation, TrainStep, Trainer, TrainingSummary, Validator};
pub use update::{clip_gradients, trainable_variables};
pub use validation::{ValidationController, ValidationDecision};
