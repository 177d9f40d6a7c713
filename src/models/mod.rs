pub mod batch;
pub mod value;

pub use batch::ResultBatch;
pub use value::CellValue;
