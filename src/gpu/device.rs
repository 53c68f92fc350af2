// gpu/device.rs — wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate adapters and select a real GPU over a software one.
//   - Own the device/queue pair (and the instance, for drop order).
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` uses power preference heuristics that
// may grab llvmpipe/softpipe on machines where the software renderer is
// exposed as a regular device. We enumerate explicitly and prefer hardware,
// falling back to whatever exists (the chosen adapter is logged).
//
// No surface is involved: rendering targets an offscreen texture (see
// `wgpu_context.rs`), so the device can be created headless and a window is
// fed from the readback.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use crate::LOG_TAG;

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl From<wgpu::AdapterInfo> for AdapterInfo {
    fn from(info: wgpu::AdapterInfo) -> Self {
        AdapterInfo {
            name: info.name,
            vendor: info.vendor,
            device: info.device,
            device_type: info.device_type,
            backend: info.backend,
        }
    }
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Errors from GPU device initialization.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No adapter at all on the enabled backends.
    #[error("no GPU adapter found on backends {0:?}")]
    NoSuitableAdapter(wgpu::Backends),
    /// wgpu device request failed (driver issue, unsupported limits, etc.).
    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// The core GPU context: device, queue and adapter description.
///
/// # Field drop order
/// Rust drops struct fields in declaration order (top → bottom).
/// `_instance` is declared last so the `wgpu::Instance` outlives `device`
/// and `queue`. Some Vulkan layers crash when the instance is destroyed
/// while device-level objects still reference it.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    /// Keeps the `wgpu::Instance` alive until `device` and `queue` are
    /// dropped. Never accessed.
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a device on the primary backends (Vulkan, Metal, DX12,
    /// browser WebGPU).
    pub fn new() -> Result<Self, DeviceError> {
        Self::with_backends(wgpu::Backends::PRIMARY)
    }

    pub fn with_backends(backends: wgpu::Backends) -> Result<Self, DeviceError> {
        pollster::block_on(Self::init_async(backends))
    }

    async fn init_async(backends: wgpu::Backends) -> Result<Self, DeviceError> {
        let flags = if cfg!(debug_assertions) {
            // Validation layer in debug builds for shader error feedback.
            wgpu::InstanceFlags::VALIDATION
        } else {
            wgpu::InstanceFlags::empty()
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            flags,
            ..Default::default()
        });

        // Tiered selection:
        //   1. Real hardware (discrete, integrated, virtual, other).
        //   2. Anything else, including CPU/software adapters.
        let mut adapters = instance.enumerate_adapters(backends);
        if adapters.is_empty() {
            return Err(DeviceError::NoSuitableAdapter(backends));
        }
        for a in &adapters {
            let info = a.get_info();
            debug!(target: LOG_TAG, "adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }
        let pick = adapters
            .iter()
            .position(|a| a.get_info().device_type != wgpu::DeviceType::Cpu)
            .unwrap_or(0);
        let adapter = adapters.swap_remove(pick);

        let adapter_info = AdapterInfo::from(adapter.get_info());
        info!(target: LOG_TAG, "using adapter {adapter_info}");

        // wgpu 22: request_device returns (Device, Queue) directly; the tuple
        // type must be spelled out to help the type inferencer.
        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("edgecam"),
                    required_features: wgpu::Features::empty(),
                    // Quad rendering needs nothing beyond the downlevel set.
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        Ok(GpuDevice {
            device,
            queue,
            adapter_info,
            _instance: instance,
        })
    }

    /// Largest texture edge this device accepts.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuDevice {{ adapter: {} }}", self.adapter_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests that require an actual GPU are behind `#[ignore]` so that
    // `cargo test` passes in CI without one. Run with:
    //   cargo test -- --include-ignored

    #[test]
    fn test_adapter_info_display() {
        let info = AdapterInfo {
            name: "Test GPU".into(),
            vendor: 0x10de,
            device: 1,
            device_type: wgpu::DeviceType::DiscreteGpu,
            backend: wgpu::Backend::Vulkan,
        };
        assert_eq!(info.to_string(), "Test GPU (Vulkan, DiscreteGpu)");
    }

    #[test]
    fn test_error_messages() {
        let err = DeviceError::NoSuitableAdapter(wgpu::Backends::VULKAN);
        assert!(err.to_string().starts_with("no GPU adapter found"));
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_gpu_device_init() {
        let gpu = GpuDevice::new().expect("should initialise a GPU device");
        println!("{gpu}");
        assert!(gpu.max_texture_dimension() >= 2048);
    }
}
