pub mod errors;
pub mod formats;
pub mod model;
mod registry;

pub use errors::{FormatAttempt, ParserError};
pub use formats::{ReaderOptions, RecordFormat, RecordStream};
pub use model::{RecordKind, SourceRecord};
pub use registry::{open_source, open_with_formats};
