use crate::error::{NabuError, Result};
use crate::io::config::{ConfigFile, Section};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub const TRAINER_SECTION: &str = "trainer";
pub const EVALUATOR_SECTION: &str = "evaluator";

/// Loss functions a trainer can minimise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    CrossEntropy,
    Ctc,
    SigmoidCrossEntropy,
}

impl LossKind {
    pub const ALL: [LossKind; 3] = [
        LossKind::CrossEntropy,
        LossKind::Ctc,
        LossKind::SigmoidCrossEntropy,
    ];

    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            LossKind::CrossEntropy => "cross_entropy",
            LossKind::Ctc => "ctc",
            LossKind::SigmoidCrossEntropy => "sigmoid_cross_entropy",
        }
    }

    /// Select the loss for a configuration tag
    pub fn factory(loss: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == loss)
            .ok_or_else(|| NabuError::UndefinedComponent(format!("undefined loss: {loss}")))
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Settings of the `[trainer]` section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainerConfig {
    pub num_epochs: usize,
    pub initial_learning_rate: f64,
    /// Factor the learning rate decays by over the whole run
    pub learning_rate_decay: f64,
    pub batch_size: usize,
    pub numbuckets: usize,
    pub variable_batch_size: bool,
    /// Steps between validations; 0 never validates
    pub valid_frequency: usize,
    /// Worse validations tolerated before stopping; `None` never stops
    pub num_tries: Option<usize>,
    /// Return to the last validated model when validation gets worse
    pub go_back: bool,
    /// Halve the learning rate when validation gets worse
    pub valid_adapt: bool,
    /// Forget earlier worse validations after an improvement
    pub reset_tries: bool,
    pub numbatches_to_aggregate: usize,
    pub trainlabels: usize,
    pub loss: LossKind,
    /// Names of the training targets
    pub targets: Vec<String>,
    /// Data sections for every input and target stream, keyed by stream name
    pub streams: BTreeMap<String, Vec<String>>,
}

const KNOWN_KEYS: [&str; 15] = [
    "num_epochs",
    "initial_learning_rate",
    "learning_rate_decay",
    "batch_size",
    "numbuckets",
    "variable_batch_size",
    "valid_frequency",
    "num_tries",
    "go_back",
    "valid_adapt",
    "reset_tries",
    "numbatches_to_aggregate",
    "trainlabels",
    "loss",
    "targets",
];

impl TrainerConfig {
    pub fn from_section(section: &Section) -> Result<Self> {
        let config = Self {
            num_epochs: section.get_usize("num_epochs")?,
            initial_learning_rate: section.get_float("initial_learning_rate")?,
            learning_rate_decay: section.get_float("learning_rate_decay")?,
            batch_size: section.get_usize("batch_size")?,
            numbuckets: usize_or(section, "numbuckets", 1)?,
            variable_batch_size: section.get_bool_or("variable_batch_size", false)?,
            valid_frequency: section.get_usize("valid_frequency")?,
            num_tries: section.get_optional_usize("num_tries")?,
            go_back: section.get_bool_or("go_back", false)?,
            valid_adapt: section.get_bool_or("valid_adapt", false)?,
            reset_tries: section.get_bool_or("reset_tries", false)?,
            numbatches_to_aggregate: usize_or(section, "numbatches_to_aggregate", 0)?,
            trainlabels: usize_or(section, "trainlabels", 0)?,
            loss: LossKind::factory(section.get_str("loss")?.trim())?,
            targets: section.get_list("targets")?,
            streams: section
                .iter()
                .filter(|(key, _)| !KNOWN_KEYS.contains(key))
                .map(|(key, value)| {
                    (
                        key.to_string(),
                        value.split_whitespace().map(str::to_string).collect(),
                    )
                })
                .collect(),
        };

        if config.batch_size == 0 {
            return Err(section.invalid("batch_size", "0", "an integer >= 1"));
        }
        if config.learning_rate_decay <= 0.0 {
            return Err(section.invalid(
                "learning_rate_decay",
                &config.learning_rate_decay.to_string(),
                "a positive number",
            ));
        }
        Ok(config)
    }

    pub fn from_config(config: &ConfigFile) -> Result<Self> {
        Self::from_section(config.section(TRAINER_SECTION)?)
    }

    /// Batches whose gradients make up one update
    pub fn batches_per_update(&self) -> usize {
        self.numbatches_to_aggregate.max(1)
    }

    /// Whether validation runs at all; a frequency of 0 turns it off
    pub fn validates(&self) -> bool {
        self.valid_frequency > 0
    }

    /// Batches kept in flight by the data queue
    pub fn queue_capacity(&self) -> usize {
        self.batch_size * 2
    }
}

/// Settings of the `[evaluator]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluatorConfig {
    /// Evaluator type; `None` disables validation
    pub evaluator: Option<String>,
    pub settings: BTreeMap<String, String>,
}

impl EvaluatorConfig {
    pub fn from_config(config: &ConfigFile) -> Result<Self> {
        let section = config.section(EVALUATOR_SECTION)?;
        Ok(Self {
            evaluator: section.get_optional_str("evaluator").map(str::to_string),
            settings: section
                .iter()
                .filter(|(key, _)| *key != "evaluator")
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    /// Evaluator that disables validation
    pub fn disabled() -> Self {
        Self {
            evaluator: None,
            settings: BTreeMap::new(),
        }
    }

    pub fn validates(&self) -> bool {
        self.evaluator.is_some()
    }
}

fn usize_or(section: &Section, key: &str, default: usize) -> Result<usize> {
    if section.contains(key) {
        section.get_usize(key)
    } else {
        Ok(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAINER: &str = "\
[trainer]
num_epochs = 10
initial_learning_rate = 0.001
learning_rate_decay = 0.1
batch_size = 32
numbuckets = 8
variable_batch_size = False
valid_frequency = 500
num_tries = 3
go_back = True
valid_adapt = True
reset_tries = True
numbatches_to_aggregate = 0
trainlabels = 31
loss = cross_entropy
targets = text
features = train_features
text = train_text
";

    #[test]
    fn test_trainer_config() {
        let config = TrainerConfig::from_config(&ConfigFile::parse(TRAINER).unwrap()).unwrap();
        assert_eq!(config.num_epochs, 10);
        assert_eq!(config.num_tries, Some(3));
        assert!(config.go_back && config.valid_adapt && config.reset_tries);
        assert_eq!(config.loss, LossKind::CrossEntropy);
        assert_eq!(config.targets, vec!["text"]);
        assert_eq!(config.streams.len(), 2);
        assert_eq!(config.streams["features"], vec!["train_features"]);
        assert_eq!(config.queue_capacity(), 64);
    }

    #[test]
    fn test_unlimited_tries() {
        let text = TRAINER.replace("num_tries = 3", "num_tries = None");
        let config = TrainerConfig::from_config(&ConfigFile::parse(&text).unwrap()).unwrap();
        assert_eq!(config.num_tries, None);
    }

    #[test]
    fn test_unknown_loss() {
        let text = TRAINER.replace("cross_entropy", "hinge");
        let err = TrainerConfig::from_config(&ConfigFile::parse(&text).unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "undefined loss: hinge");
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let text = TRAINER.replace("batch_size = 32", "batch_size = 0");
        assert!(TrainerConfig::from_config(&ConfigFile::parse(&text).unwrap()).is_err());
    }

    #[test]
    fn test_zero_valid_frequency_turns_validation_off() {
        let config = TrainerConfig::from_config(&ConfigFile::parse(TRAINER).unwrap()).unwrap();
        assert!(config.validates());

        let text = TRAINER.replace("valid_frequency = 500", "valid_frequency = 0");
        let config = TrainerConfig::from_config(&ConfigFile::parse(&text).unwrap()).unwrap();
        assert!(!config.validates());
    }

    #[test]
    fn test_batches_per_update() {
        let config = TrainerConfig::from_config(&ConfigFile::parse(TRAINER).unwrap()).unwrap();
        assert_eq!(config.batches_per_update(), 1);

        let text = TRAINER.replace("numbatches_to_aggregate = 0", "numbatches_to_aggregate = 4");
        let config = TrainerConfig::from_config(&ConfigFile::parse(&text).unwrap()).unwrap();
        assert_eq!(config.batches_per_update(), 4);
    }

    #[test]
    fn test_evaluator_none_disables_validation() {
        let config = ConfigFile::parse("[evaluator]\nevaluator = None\n").unwrap();
        assert!(!EvaluatorConfig::from_config(&config).unwrap().validates());

        let config =
            ConfigFile::parse("[evaluator]\nevaluator = loss_evaluator\nbatch_size = 8\n").unwrap();
        let evaluator = EvaluatorConfig::from_config(&config).unwrap();
        assert!(evaluator.validates());
        assert_eq!(evaluator.settings.len(), 1);
    }
}
