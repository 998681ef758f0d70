pub mod image;
pub mod service;
pub mod target;
pub mod value;

// Re-export commonly used types
pub use image::{ImagePart, MemImage};
pub use service::LayoutService;
pub use target::{Endianness, TargetInfo};
pub use value::ConstVal;
