mod conn;

pub use conn::{Connection, ResultSet};
