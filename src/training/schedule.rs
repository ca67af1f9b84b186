use crate::training::config::TrainerConfig;

/// Exponentially decaying learning rate with an adjustable scale
///
/// Update rule:
/// - rate(step) = initial · decay^(step / num_steps) · factor
///
/// Over the whole run the rate decays by `decay`. The factor starts at 1
/// and is halved whenever validation asks for a smaller step size.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningRateSchedule {
    initial: f64,
    decay: f64,
    num_steps: u64,
    factor: f64,
}

impl LearningRateSchedule {
    /// Create a schedule
    ///
    /// # Arguments
    /// * `initial` - Learning rate at step 0
    /// * `decay` - Fraction of the initial rate left at the last step
    /// * `num_steps` - Total number of training steps
    #[must_use]
    pub fn new(initial: f64, decay: f64, num_steps: u64) -> Self {
        Self {
            initial,
            decay,
            num_steps,
            factor: 1.0,
        }
    }

    /// Schedule for a trainer config and an epoch of `steps_per_epoch` batches
    ///
    /// With `numbatches_to_aggregate = n > 0` every update consumes `n`
    /// batches, so the run has `n` times fewer updates.
    #[must_use]
    pub fn from_config(config: &TrainerConfig, steps_per_epoch: u64) -> Self {
        let batches = steps_per_epoch.saturating_mul(config.num_epochs as u64);
        Self::new(
            config.initial_learning_rate,
            config.learning_rate_decay,
            batches / config.batches_per_update() as u64,
        )
    }

    pub fn num_steps(&self) -> u64 {
        self.num_steps
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Learning rate at `step`
    pub fn rate(&self, step: u64) -> f64 {
        let progress = if self.num_steps == 0 {
            0.0
        } else {
            step as f64 / self.num_steps as f64
        };
        self.initial * self.decay.powf(progress) * self.factor
    }

    /// Halve every future learning rate
    pub fn halve(&mut self) {
        self.factor /= 2.0;
    }

    pub fn set_factor(&mut self, factor: f64) {
        self.factor = factor;
    }

    /// Training is over once every scheduled step was taken
    pub fn should_stop(&self, step: u64) -> bool {
        step >= self.num_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::ConfigFile;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_rate_endpoints() {
        let schedule = LearningRateSchedule::new(0.1, 0.01, 100);
        assert!(close(schedule.rate(0), 0.1));
        assert!(close(schedule.rate(50), 0.01));
        assert!(close(schedule.rate(100), 0.001));
    }

    #[test]
    fn test_rate_decreases_monotonically() {
        let schedule = LearningRateSchedule::new(1.0, 0.5, 10);
        let rates: Vec<f64> = (0..=10).map(|s| schedule.rate(s)).collect();
        assert!(rates.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn test_halving_scales_rate() {
        let mut schedule = LearningRateSchedule::new(0.2, 0.1, 10);
        let before = schedule.rate(3);
        schedule.halve();
        schedule.halve();
        assert!(close(schedule.factor(), 0.25));
        assert!(close(schedule.rate(3), before / 4.0));
    }

    #[test]
    fn test_should_stop() {
        let schedule = LearningRateSchedule::new(0.1, 1.0, 5);
        assert!(!schedule.should_stop(4));
        assert!(schedule.should_stop(5));
        assert!(LearningRateSchedule::new(0.1, 1.0, 0).should_stop(0));
    }

    #[test]
    fn test_aggregation_divides_steps() {
        let text = "[trainer]\nnum_epochs = 3\ninitial_learning_rate = 0.1\nlearning_rate_decay = 0.5\n\
                    batch_size = 8\nvalid_frequency = 10\nloss = ctc\ntargets = text\n";
        let plain = TrainerConfig::from_config(&ConfigFile::parse(text).unwrap()).unwrap();
        assert_eq!(LearningRateSchedule::from_config(&plain, 100).num_steps(), 300);

        let aggregated = TrainerConfig::from_config(
            &ConfigFile::parse(&format!("{text}numbatches_to_aggregate = 4\n")).unwrap(),
        )
        .unwrap();
        assert_eq!(LearningRateSchedule::from_config(&aggregated, 100).num_steps(), 75);
    }

    #[test]
    fn test_zero_steps_keeps_initial_rate() {
        let schedule = LearningRateSchedule::new(0.3, 0.1, 0);
        assert!(close(schedule.rate(7), 0.3));
    }
}
