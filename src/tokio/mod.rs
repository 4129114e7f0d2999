mod conn;
mod stream;

pub use conn::{Connection, ResultSet};
pub use stream::Stream;
