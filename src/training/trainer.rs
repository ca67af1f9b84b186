//! The training loop
//!
//! The trainer owns the schedule and the validation bookkeeping; the model
//! itself is supplied through three small traits, so the loop can drive any
//! implementation that can take a step, report a validation loss and save or
//! restore its variables.

use crate::error::{NabuError, Result};
use crate::training::config::{EvaluatorConfig, TrainerConfig};
use crate::training::schedule::LearningRateSchedule;
use crate::training::validation::{ValidationController, ValidationDecision};
use tracing::{info, warn};

/// One optimisation step on the next training batch
pub trait TrainStep {
    /// Update the model with the given learning rate and return the batch loss
    fn step(&mut self, learning_rate: f64) -> Result<f64>;
}

impl<F> TrainStep for F
where
    F: FnMut(f64) -> Result<f64>,
{
    fn step(&mut self, learning_rate: f64) -> Result<f64> {
        self(learning_rate)
    }
}

/// Computes the loss on held-out data
pub trait Validator {
    fn num_batches(&self) -> usize;
    fn batch_loss(&mut self, batch: usize) -> Result<f64>;
}

/// Validator for runs without validation data
pub struct NoValidation;

impl Validator for NoValidation {
    fn num_batches(&self) -> usize {
        0
    }

    fn batch_loss(&mut self, _batch: usize) -> Result<f64> {
        Err(NabuError::Training("no validation data".to_string()))
    }
}

/// Persists model snapshots
pub trait ModelStore {
    /// Save the current model as the last validated one
    fn save_validated(&mut self) -> Result<()>;
    /// Go back to the last validated model
    fn restore_validated(&mut self) -> Result<()>;
    /// Save the model at the end of training
    fn save_final(&mut self) -> Result<()>;
}

/// What happened during a run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub steps: u64,
    pub num_steps: u64,
    /// Stopped early because validation stopped improving
    pub terminated: bool,
    pub validations: usize,
    pub best_validation: Option<f64>,
    pub learning_rate_factor: f64,
    pub last_loss: Option<f64>,
}

pub struct Trainer {
    schedule: LearningRateSchedule,
    validation: Option<ValidationController>,
    /// Batch steps averaged into one counted update
    batches_per_update: usize,
    step: u64,
}

impl Trainer {
    /// Create a trainer for epochs of `steps_per_epoch` batches
    pub fn new(config: &TrainerConfig, evaluator: &EvaluatorConfig, steps_per_epoch: u64) -> Self {
        let schedule = LearningRateSchedule::from_config(config, steps_per_epoch);
        let validation =
            (evaluator.validates() && config.validates()).then(|| ValidationController::new(config));
        Self {
            schedule,
            validation,
            batches_per_update: config.batches_per_update(),
            step: 0,
        }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn schedule(&self) -> &LearningRateSchedule {
        &self.schedule
    }

    pub fn validates(&self) -> bool {
        self.validation.is_some()
    }

    /// Run training until every scheduled step was taken or validation stops it
    pub fn train<S, V, M>(
        &mut self,
        model: &mut S,
        validator: &mut V,
        store: &mut M,
    ) -> Result<TrainingSummary>
    where
        S: TrainStep + ?Sized,
        V: Validator + ?Sized,
        M: ModelStore + ?Sized,
    {
        if self.validation.is_some() && validator.num_batches() == 0 {
            return Err(NabuError::Training(
                "validation is enabled but the validator has no batches".to_string(),
            ));
        }

        let num_steps = self.schedule.num_steps();
        let mut validations = 0;
        let mut terminated = false;
        let mut last_loss = None;

        info!(num_steps, validates = self.validates(), "starting training");

        while !self.schedule.should_stop(self.step) {
            if let Some(controller) = self.validation.as_mut()
                && controller.should_validate(self.step)
            {
                info!(step = self.step, "validating model");
                let loss = validation_loss(validator)?;
                validations += 1;
                info!(step = self.step, loss, "validation loss");

                match controller.record(loss, self.step) {
                    ValidationDecision::Improved => store.save_validated()?,
                    ValidationDecision::Worse {
                        go_back,
                        halve_learning_rate,
                    } => {
                        warn!(tries = controller.tries(), "validation loss is worse");
                        if go_back {
                            info!("loading previous model");
                            store.restore_validated()?;
                        }
                        if halve_learning_rate {
                            info!("halving learning rate");
                            self.schedule.halve();
                            store.save_validated()?;
                        }
                    }
                    ValidationDecision::Terminate => {
                        info!("terminating training");
                        store.restore_validated()?;
                        terminated = true;
                        break;
                    }
                }
            }

            let learning_rate = self.schedule.rate(self.step);
            let mut loss = 0.0;
            for _ in 0..self.batches_per_update {
                loss += model.step(learning_rate)? / self.batches_per_update as f64;
            }
            self.step += 1;
            last_loss = Some(loss);
            info!(
                step = self.step,
                num_steps,
                loss,
                learning_rate,
                "training step"
            );
        }

        store.save_final()?;
        info!(steps = self.step, terminated, "training finished");

        Ok(TrainingSummary {
            steps: self.step,
            num_steps,
            terminated,
            validations,
            best_validation: self.validation.as_ref().and_then(ValidationController::best),
            learning_rate_factor: self.schedule.factor(),
            last_loss,
        })
    }
}

/// Mean of the per-batch validation losses
fn validation_loss<V: Validator + ?Sized>(validator: &mut V) -> Result<f64> {
    let batches = validator.num_batches();
    let mut total = 0.0;
    for batch in 0..batches {
        total += validator.batch_loss(batch)? / batches as f64;
    }
    Ok(total)
}
