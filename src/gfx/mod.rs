//! 原生后端模块
//!
//! 本模块封装了不同图形 API 的设备驱动实现，包括：
//! - Headless：纯 CPU 的参考设备，用于测试和无 GPU 环境
//! - Vulkan：基于 ash，使用调用者提供的 instance / device / queue
//! - Dawn：基于 wgpu 的 WebGPU 设备
//! - Metal：仅 macOS，基于 metal crate
//!
//! 所有后端都实现了统一的 `DeviceDriver` trait，
//! 上层的 Context / Recorder / Surface 不关心具体的图形 API。

pub mod dawn;
pub mod headless;
pub mod metal;
pub mod vulkan;
