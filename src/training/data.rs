use crate::error::{NabuError, Result};
use crate::io::config::ConfigFile;
use crate::model::ModelConfig;
use crate::training::config::TrainerConfig;
use std::collections::BTreeMap;
use tracing::debug;

/// One named stream of training data and the data sections that feed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataStream {
    pub name: String,
    /// Settings of each data section, in the order the trainer lists them
    pub sections: Vec<(String, BTreeMap<String, String>)>,
}

/// Data sources for the model inputs and training targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPlan {
    pub inputs: Vec<DataStream>,
    pub targets: Vec<DataStream>,
    /// Capacity of the queue of data elements
    pub queue_capacity: usize,
}

impl DataPlan {
    /// Resolve the data sections behind every input of `model` and every
    /// target of `trainer` in the data configuration
    pub fn resolve(model: &ModelConfig, trainer: &TrainerConfig, data: &ConfigFile) -> Result<Self> {
        let inputs = model
            .inputs
            .iter()
            .map(|name| stream(name, trainer, data))
            .collect::<Result<Vec<_>>>()?;
        let targets = trainer
            .targets
            .iter()
            .map(|name| stream(name, trainer, data))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            inputs = inputs.len(),
            targets = targets.len(),
            "resolved training data"
        );
        Ok(Self {
            inputs,
            targets,
            queue_capacity: trainer.queue_capacity(),
        })
    }

    /// All streams, inputs first
    pub fn streams(&self) -> impl Iterator<Item = &DataStream> {
        self.inputs.iter().chain(&self.targets)
    }
}

fn stream(name: &str, trainer: &TrainerConfig, data: &ConfigFile) -> Result<DataStream> {
    let section_names = trainer
        .streams
        .get(name)
        .filter(|sections| !sections.is_empty())
        .ok_or_else(|| NabuError::MissingKey {
            section: crate::training::config::TRAINER_SECTION.to_string(),
            key: name.to_string(),
        })?;

    let sections = section_names
        .iter()
        .map(|section_name| {
            let section = data.section(section_name)?;
            let settings: BTreeMap<String, String> = section
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Ok((section_name.clone(), settings))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DataStream {
        name: name.to_string(),
        sections,
    })
}
