//! Model weight serialization.
//!
//! Weights are stored as `SafeTensors` (F32, little-endian) with string
//! metadata under `__metadata__`.

pub mod safetensors;

pub use safetensors::{
    save_safetensors, SafeTensors, SafeTensorsMetadata, TensorMetadata, UserMetadata,
};
