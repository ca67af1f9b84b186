use crate::training::config::TrainerConfig;

/// What the trainer should do after a validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationDecision {
    /// New best loss; the validated model should be saved
    Improved,
    /// Not better than the best loss so far
    Worse {
        /// Restore the last validated model
        go_back: bool,
        /// Halve the learning rate (and save the validated model with the new rate)
        halve_learning_rate: bool,
    },
    /// Out of tries: restore the last validated model and stop
    Terminate,
}

/// Tracks validation timing, the best loss and the tolerated failures
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationController {
    valid_frequency: u64,
    num_tries: Option<usize>,
    go_back: bool,
    valid_adapt: bool,
    reset_tries: bool,
    validated_step: i64,
    best: f64,
    tries: usize,
}

impl ValidationController {
    pub fn new(config: &TrainerConfig) -> Self {
        let valid_frequency = config.valid_frequency as u64;
        Self {
            valid_frequency,
            num_tries: config.num_tries,
            go_back: config.go_back,
            valid_adapt: config.valid_adapt,
            reset_tries: config.reset_tries,
            // the first validation happens at step 0
            validated_step: -(valid_frequency as i64),
            best: f64::MAX,
            tries: 0,
        }
    }

    /// Whether `valid_frequency` steps passed since the last validation
    pub fn should_validate(&self, step: u64) -> bool {
        step as i64 - self.validated_step >= self.valid_frequency as i64
    }

    pub fn best(&self) -> Option<f64> {
        (self.best < f64::MAX).then_some(self.best)
    }

    pub fn tries(&self) -> usize {
        self.tries
    }

    pub fn validated_step(&self) -> i64 {
        self.validated_step
    }

    /// Record the validation loss measured at `step`
    pub fn record(&mut self, loss: f64, step: u64) -> ValidationDecision {
        if loss < self.best {
            self.best = loss;
            self.validated_step = step as i64;
            if self.reset_tries {
                self.tries = 0;
            }
            return ValidationDecision::Improved;
        }

        if self.num_tries.is_some_and(|limit| self.tries >= limit) {
            return ValidationDecision::Terminate;
        }

        self.tries += 1;
        self.validated_step = step as i64;
        ValidationDecision::Worse {
            go_back: self.go_back,
            halve_learning_rate: self.valid_adapt,
        }
    }
}
