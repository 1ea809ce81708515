pub mod condition;
pub mod database;
pub mod error;
pub mod file;
pub mod primitive;
pub mod scope;
pub mod services;

pub use condition::{AttributeCondition, CompareKind, ElementKind, ExistenceKind};
pub use database::{DatabaseOptions, DbKey, ReturnValues, ScanPage};
pub use error::{ErrorCode, OpError, OpResult};
pub use file::{
    BucketEventMessage, ByteRange, EventNotificationConfig, FileAccessibility, FileEvent,
    FileListing, FileMetadata, FilePayload, FileSink, FileState, ListOptions, SignedUrl,
    parse_native_event_kind,
};
pub use primitive::{Primitive, PrimitiveKind};
pub use scope::{
    LIST_KEY_DELIMITER, MONITOR_DISPATCH_SCOPE, MONITOR_SCOPE, MemoryScope,
};
pub use services::database::DatabaseService;
pub use services::file::FileService;
pub use services::memory::MemoryService;
pub use services::pubsub::{ErrorCallback, MessageCallback, PubSubService, Subscription};
