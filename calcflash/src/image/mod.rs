//! In-memory payloads: the firmware image and the receiving program.

pub mod firmware;
pub mod loader;

pub use firmware::FirmwareImage;
pub use loader::LoaderProgram;
