pub mod column_definition;
pub mod command;
pub mod handshake;
pub mod packet;
pub mod primitive;
pub mod response;
pub mod row;
pub mod r#trait;
pub mod value;

pub use column_definition::FieldMetadata;
pub use row::Codec;
pub use value::{NullBitmap, Value};
