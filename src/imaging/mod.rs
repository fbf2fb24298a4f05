//! Image transcoding capability.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image` header sniffing |
//! | **Resize** | Lanczos3 |
//! | **Encode** | WebP (lossless), AVIF (rav1e), JPEG, PNG |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Per-image planning and execution against a backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{calculate_density_sizes, calculate_target_dimensions};
pub use operations::{ImagePlan, PlannedVariant, execute_plan, plan_image};
pub use params::{OutputFormat, Quality, TranscodeParams};
pub use rust_backend::RustBackend;
