pub mod image;
pub mod shader;
