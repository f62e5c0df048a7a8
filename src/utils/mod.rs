pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{
    decode_base64_image,
    encode_jpeg,
    encode_jpeg_base64_async,
    load_image_from_memory,
    load_image_from_memory_async,
};
pub use metrics::{Metrics, MetricsSnapshot};
