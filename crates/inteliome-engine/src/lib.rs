//! Turn pipeline: language gate, intent classification, fact memory, prompt
//! composition, answer and rolling summary.

pub mod catalog;
pub mod completion;
pub mod composer;
pub mod controller;
pub mod error;
pub mod gate;
pub mod intent;
pub mod summarizer;
mod template;

pub use catalog::Catalog;
pub use controller::{ControllerConfig, TurnController, TurnKind, TurnOutcome};
pub use error::EngineError;
pub use gate::{LanguageVerdict, REFUSAL_SENTINEL};
pub use intent::Category;
