mod builder;
mod cursor;

pub use builder::ByteBuilder;
pub use cursor::ByteCursor;
