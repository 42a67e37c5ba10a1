//! Headless 后端模块
//!
//! 纯 CPU 的参考设备与驱动，不依赖任何 GPU，
//! 用于测试以及在没有显卡的环境中运行整个记录 / 提交流程。

pub mod device;
pub mod driver;

pub use device::{HeadlessBackendContext, HeadlessDevice, HeadlessImage, HeadlessTextureInfo, HeadlessTextureRef};
pub use driver::HeadlessDriver;
