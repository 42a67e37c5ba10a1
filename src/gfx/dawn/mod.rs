//! WebGPU 后端模块
//!
//! 基于 wgpu 实现，对应 Dawn 的 WebGPU 设备模型。
//! 设备与队列总是显式注入。

pub mod context;
pub mod driver;

pub use context::{DawnBackendContext, DawnTextureInfo};
pub use driver::DawnDriver;
