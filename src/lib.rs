//! Model configuration, hot-start restoration and training control for
//! Listen, Attend and Spell speech recognizers.
//!
//! A model is described by an INI-style `model.cfg`: an `[io]` section naming
//! inputs and outputs, an `[encoder]` section that may stack or hot-start other
//! encoder sections, and a `[decoder]` section. [`ModelConfig`] parses,
//! validates and resolves such a file into a tree of typed components.

pub mod decoding;
pub mod error;
pub mod io;
pub mod model;
pub mod training;

pub use error::{NabuError, Result};
pub use io::config::{ConfigFile, Section};
pub use io::{Checkpoint, VariableData, load_checkpoint, save_checkpoint};
pub use model::{ModelConfig, VariableStore};
pub use training::{EvaluatorConfig, Trainer, TrainerConfig};
