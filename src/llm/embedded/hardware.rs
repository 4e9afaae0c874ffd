//! Hardware detection for local inference

use sysinfo::System;
use tracing::{debug, info};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Detected hardware capabilities
#[derive(Debug, Clone)]
pub struct HardwareCapabilities {
    /// Total system RAM in bytes
    pub total_ram_bytes: u64,
    /// Available RAM in bytes
    pub available_ram_bytes: u64,
    /// Whether a CUDA device could be opened
    pub cuda_available: bool,
    /// Whether a Metal device could be opened
    pub metal_available: bool,
    /// Number of CPU cores
    pub cpu_cores: usize,
}

impl HardwareCapabilities {
    pub fn available_ram_gb(&self) -> f64 {
        self.available_ram_bytes as f64 / GIB
    }

    pub fn total_ram_gb(&self) -> f64 {
        self.total_ram_bytes as f64 / GIB
    }

    /// Returns the best available compute device
    pub fn best_device(&self) -> ComputeDevice {
        if self.cuda_available {
            ComputeDevice::Cuda
        } else if self.metal_available {
            ComputeDevice::Metal
        } else {
            ComputeDevice::Cpu
        }
    }
}

/// Available compute devices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

impl std::fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "CPU"),
            ComputeDevice::Cuda => write!(f, "CUDA"),
            ComputeDevice::Metal => write!(f, "Metal"),
        }
    }
}

pub struct HardwareDetector;

impl HardwareDetector {
    pub fn detect() -> HardwareCapabilities {
        let mut sys = System::new_all();
        sys.refresh_all();

        let capabilities = HardwareCapabilities {
            total_ram_bytes: sys.total_memory(),
            available_ram_bytes: sys.available_memory(),
            cuda_available: Self::detect_cuda(),
            metal_available: Self::detect_metal(),
            cpu_cores: sys.cpus().len(),
        };

        info!(
            "Hardware detected: {:.1}GB RAM available ({:.1}GB total), {} cores, device: {}",
            capabilities.available_ram_gb(),
            capabilities.total_ram_gb(),
            capabilities.cpu_cores,
            capabilities.best_device()
        );

        capabilities
    }

    #[cfg(feature = "cuda")]
    fn detect_cuda() -> bool {
        match candle_core::Device::new_cuda(0) {
            Ok(_) => true,
            Err(e) => {
                debug!("CUDA not available: {}", e);
                false
            }
        }
    }

    #[cfg(not(feature = "cuda"))]
    fn detect_cuda() -> bool {
        debug!("CUDA support not compiled (cuda feature not enabled)");
        false
    }

    #[cfg(feature = "metal")]
    fn detect_metal() -> bool {
        match candle_core::Device::new_metal(0) {
            Ok(_) => true,
            Err(e) => {
                debug!("Metal not available: {}", e);
                false
            }
        }
    }

    #[cfg(not(feature = "metal"))]
    fn detect_metal() -> bool {
        debug!("Metal support not compiled (metal feature not enabled)");
        false
    }
}
