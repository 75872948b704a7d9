pub mod auth;
pub mod error;
pub mod extractor;
pub mod gemini;
pub mod history;
pub mod logging;
pub mod pipeline;
pub mod reflection;
pub mod store;

pub use error::{AuthError, InputError};
pub use extractor::{EmotionExtractor, EmotionProfile};
pub use gemini::{GeminiClient, SamplingOptions, TextGenerator};
pub use history::HistoricalDigest;
pub use pipeline::{AnalyzeResponse, BatchResponse, Pipeline, PipelineConfig};
pub use reflection::{DeeperMeaningGenerator, Mode, ReflectionGenerator};
pub use store::{AnalysisRecord, Store, UserIdentity};
