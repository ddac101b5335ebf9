pub mod classifier;
pub mod dom;
pub mod extractor;
pub mod filler;
pub mod heuristics;
pub mod messaging;
pub mod provider;
pub mod store;

pub use classifier::{FieldClassifier, FillTarget};
pub use dom::{InputField, PageDom, StaticPage};
pub use extractor::{CodeExtractor, ScanSession};
pub use filler::CodeFiller;
pub use heuristics::Heuristics;
pub use messaging::{Signal, StoreClient, StoreService};
pub use provider::CodeSource;
pub use store::{CodeStore, DetectedCode, FetchResult, StoredState};
