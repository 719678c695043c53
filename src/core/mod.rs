pub mod converter;
pub mod delta;
pub mod parser;
pub mod relay;
pub mod supervisor;
pub mod translation;
pub mod uploader;

pub use crate::domain::model::{FieldValue, NormalizedRecord, RawRecord};
pub use crate::domain::ports::{RecordSink, UploadTransport};
pub use crate::utils::error::Result;
