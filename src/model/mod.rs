//! 数据模型：字段值、院校记录、记录表、完整度状态

pub mod record;
pub mod table;
pub mod value;

pub use record::{Confidence, PartialFieldMap, PassKind, Provenance, Record, Status};
pub use table::RecordTable;
pub use value::{FieldMap, FieldValue};
