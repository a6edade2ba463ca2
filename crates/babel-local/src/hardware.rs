//! Hardware detection for local inference.
//!
//! Probes RAM, CPU and GPU backend once, then derives the largest model
//! (in parameters) the machine can comfortably run.

use std::fmt;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Model size buckets, largest first: (usable GiB threshold, parameters).
const MODEL_SIZE_BUCKETS: &[(f64, u64)] = &[
    (70.0, 70_000_000_000),
    (27.0, 27_000_000_000),
    (13.0, 13_000_000_000),
    (7.0, 7_000_000_000),
    (3.0, 3_000_000_000),
];

const MIN_MODEL_SIZE: u64 = 1_000_000_000;

// ─────────────────────────────────────────────
// GpuBackend
// ─────────────────────────────────────────────

/// GPU acceleration backend understood by llama.cpp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuBackend {
    #[default]
    None,
    Metal,
    Cuda,
    Rocm,
    Vulkan,
}

impl GpuBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpuBackend::None => "none",
            GpuBackend::Metal => "metal",
            GpuBackend::Cuda => "cuda",
            GpuBackend::Rocm => "rocm",
            GpuBackend::Vulkan => "vulkan",
        }
    }

    pub fn is_accelerated(&self) -> bool {
        *self != GpuBackend::None
    }
}

impl fmt::Display for GpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────
// HardwareCapabilities
// ─────────────────────────────────────────────

/// Snapshot of the machine, taken once when a local client is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HardwareCapabilities {
    pub architecture: String,
    /// Total RAM in bytes.
    pub total_ram: u64,
    /// Available RAM in bytes.
    pub available_ram: u64,
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub gpu: GpuBackend,
    /// Largest runnable model, in parameters.
    pub max_model_size: u64,
}

impl HardwareCapabilities {
    /// Probe the current machine.
    pub fn detect() -> Self {
        let total_ram = detect_total_ram().unwrap_or_else(|| {
            warn!("RAM detection failed, assuming 8 GB");
            8 * 1024 * 1024 * 1024
        });
        let available_ram = detect_available_ram().unwrap_or(total_ram).min(total_ram);
        let cpu_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let gpu = detect_gpu();

        let caps = Self {
            architecture: std::env::consts::ARCH.to_string(),
            total_ram,
            available_ram,
            cpu_model: detect_cpu_model().unwrap_or_else(|| "Unknown CPU".to_string()),
            cpu_cores,
            gpu,
            max_model_size: calculate_max_model_size(available_ram, gpu.is_accelerated()),
        };

        debug!(
            arch = %caps.architecture,
            total_gb = caps.total_ram as f64 / GIB,
            available_gb = caps.available_ram as f64 / GIB,
            cores = caps.cpu_cores,
            gpu = %caps.gpu,
            "Detected hardware"
        );
        caps
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu.is_accelerated()
    }

    /// Whether a model with `parameters` fits within `max_model_size`.
    pub fn can_run_model(&self, parameters: u64) -> bool {
        parameters <= self.max_model_size
    }

    /// Inference threads: three quarters of the cores, at least one.
    pub fn optimal_threads(&self) -> usize {
        (self.cpu_cores * 3 / 4).max(1)
    }

    /// Sanity-check a snapshot (hand-built ones included).
    pub fn validate(&self) -> Result<(), String> {
        if self.architecture.is_empty() {
            return Err("architecture is empty".into());
        }
        if self.total_ram == 0 {
            return Err("total RAM is zero".into());
        }
        if self.available_ram > self.total_ram {
            return Err("available RAM exceeds total RAM".into());
        }
        if self.cpu_cores == 0 {
            return Err("CPU core count is zero".into());
        }
        Ok(())
    }
}

impl fmt::Display for HardwareCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hardware Capabilities:")?;
        writeln!(f, "  Architecture: {}", self.architecture)?;
        writeln!(f, "  CPU: {} ({} cores)", self.cpu_model, self.cpu_cores)?;
        writeln!(
            f,
            "  RAM: {:.1} GB total, {:.1} GB available",
            self.total_ram as f64 / GIB,
            self.available_ram as f64 / GIB
        )?;
        if self.has_gpu() {
            writeln!(f, "  GPU: {} acceleration", self.gpu)?;
        } else {
            writeln!(f, "  GPU: None")?;
        }
        write!(
            f,
            "  Max Model Size: {}B parameters",
            self.max_model_size / 1_000_000_000
        )
    }
}

/// Largest model size bucket for the given available RAM.
///
/// CPU inference needs roughly twice the weights in RAM, GPU offload 1.5x.
pub fn calculate_max_model_size(available_ram: u64, has_gpu: bool) -> u64 {
    let divisor = if has_gpu { 1.5 } else { 2.0 };
    let usable_gb = available_ram as f64 / GIB / divisor;

    MODEL_SIZE_BUCKETS
        .iter()
        .find(|(threshold, _)| usable_gb >= *threshold)
        .map(|(_, size)| *size)
        .unwrap_or(MIN_MODEL_SIZE)
}

// ─────────────────────────────────────────────
// Platform detection
// ─────────────────────────────────────────────

/// Parse a `/proc/meminfo` field (reported in kB) into bytes.
pub(crate) fn parse_meminfo_field(meminfo: &str, field: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with(field))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Extract the `model name` entry from `/proc/cpuinfo`.
pub(crate) fn parse_cpuinfo_model(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|line| line.starts_with("model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, name)| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(target_os = "linux")]
fn detect_total_ram() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_field(&meminfo, "MemTotal:")
}

#[cfg(target_os = "linux")]
fn detect_available_ram() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_field(&meminfo, "MemAvailable:")
}

#[cfg(target_os = "linux")]
fn detect_cpu_model() -> Option<String> {
    let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").ok()?;
    parse_cpuinfo_model(&cpuinfo)
}

#[cfg(target_os = "macos")]
fn sysctl(name: &str) -> Option<String> {
    let output = Command::new("sysctl").args(["-n", name]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(target_os = "macos")]
fn detect_total_ram() -> Option<u64> {
    sysctl("hw.memsize")?.parse().ok()
}

#[cfg(target_os = "macos")]
fn detect_available_ram() -> Option<u64> {
    // Unified memory: treat three quarters of physical RAM as usable.
    detect_total_ram().map(|total| total / 4 * 3)
}

#[cfg(target_os = "macos")]
fn detect_cpu_model() -> Option<String> {
    sysctl("machdep.cpu.brand_string").filter(|s| !s.is_empty())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn detect_total_ram() -> Option<u64> {
    None
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn detect_available_ram() -> Option<u64> {
    None
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn detect_cpu_model() -> Option<String> {
    None
}

fn detect_gpu() -> GpuBackend {
    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        return GpuBackend::Metal;
    }
    if tool_responds("nvidia-smi", &["-L"]) {
        return GpuBackend::Cuda;
    }
    if tool_responds("rocm-smi", &["--showproductname"]) {
        return GpuBackend::Rocm;
    }
    if tool_responds("vulkaninfo", &["--summary"]) {
        return GpuBackend::Vulkan;
    }
    GpuBackend::None
}

fn tool_responds(tool: &str, args: &[&str]) -> bool {
    if which::which(tool).is_err() {
        return false;
    }
    Command::new(tool)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const GB: u64 = 1024 * 1024 * 1024;

    fn caps(total_gb: u64, available_gb: u64, gpu: GpuBackend, max: u64) -> HardwareCapabilities {
        HardwareCapabilities {
            architecture: "x86_64".into(),
            total_ram: total_gb * GB,
            available_ram: available_gb * GB,
            cpu_model: "Intel Core i7-9700K".into(),
            cpu_cores: 8,
            gpu,
            max_model_size: max,
        }
    }

    #[test]
    fn test_max_model_size_cpu_only() {
        assert_eq!(calculate_max_model_size(3 * GB, false), 1_000_000_000);
        assert_eq!(calculate_max_model_size(7 * GB, false), 3_000_000_000);
        assert_eq!(calculate_max_model_size(14 * GB, false), 7_000_000_000);
        assert_eq!(calculate_max_model_size(21 * GB, false), 7_000_000_000);
        assert_eq!(calculate_max_model_size(26 * GB, false), 13_000_000_000);
        assert_eq!(calculate_max_model_size(39 * GB, false), 13_000_000_000);
        assert_eq!(calculate_max_model_size(54 * GB, false), 27_000_000_000);
        assert_eq!(calculate_max_model_size(105 * GB, false), 27_000_000_000);
    }

    #[test]
    fn test_max_model_size_with_gpu() {
        assert_eq!(calculate_max_model_size(3 * GB, true), 1_000_000_000);
        assert_eq!(calculate_max_model_size(9 * GB, true), 3_000_000_000);
        assert_eq!(calculate_max_model_size(39 * GB / 2, true), 13_000_000_000);
        assert_eq!(calculate_max_model_size(81 * GB / 2, true), 27_000_000_000);
    }

    #[test]
    fn test_max_model_size_extremes() {
        assert_eq!(calculate_max_model_size(0, false), 1_000_000_000);
        assert_eq!(calculate_max_model_size(1024 * GB, true), 70_000_000_000);
    }

    #[test]
    fn test_can_run_model() {
        let c = caps(32, 24, GpuBackend::None, 13_000_000_000);
        assert!(c.can_run_model(0));
        assert!(c.can_run_model(7_000_000_000));
        assert!(c.can_run_model(13_000_000_000));
        assert!(!c.can_run_model(14_000_000_000));
    }

    #[test]
    fn test_optimal_threads() {
        let mut c = caps(16, 8, GpuBackend::None, 7_000_000_000);
        assert_eq!(c.optimal_threads(), 6);
        c.cpu_cores = 1;
        assert_eq!(c.optimal_threads(), 1);
    }

    #[test]
    fn test_validate() {
        assert!(caps(16, 8, GpuBackend::None, 7_000_000_000).validate().is_ok());
        let bad = caps(8, 16, GpuBackend::None, 7_000_000_000);
        assert!(bad.validate().is_err());
        let mut no_cores = caps(16, 8, GpuBackend::None, 7_000_000_000);
        no_cores.cpu_cores = 0;
        assert!(no_cores.validate().is_err());
    }

    #[test]
    fn test_display_cpu_only() {
        let s = caps(32, 24, GpuBackend::None, 13_000_000_000).to_string();
        assert!(s.contains("Hardware Capabilities:"));
        assert!(s.contains("Intel Core i7-9700K"));
        assert!(s.contains("8 cores"));
        assert!(s.contains("32.0 GB"));
        assert!(s.contains("24.0 GB"));
        assert!(s.contains("GPU: None"));
        assert!(s.contains("13B parameters"));
    }

    #[test]
    fn test_display_gpu() {
        let s = caps(128, 96, GpuBackend::Cuda, 70_000_000_000).to_string();
        assert!(s.contains("cuda acceleration"));
        assert!(s.contains("70B parameters"));
    }

    #[test]
    fn test_parse_meminfo() {
        let meminfo = "MemTotal:       16384000 kB\nMemFree:         1000 kB\nMemAvailable:    8192000 kB\n";
        assert_eq!(parse_meminfo_field(meminfo, "MemTotal:"), Some(16384000 * 1024));
        assert_eq!(parse_meminfo_field(meminfo, "MemAvailable:"), Some(8192000 * 1024));
        assert_eq!(parse_meminfo_field(meminfo, "SwapTotal:"), None);
    }

    #[test]
    fn test_parse_cpuinfo() {
        let cpuinfo = "processor\t: 0\nmodel name\t: AMD Ryzen 9 7950X 16-Core Processor\n";
        assert_eq!(
            parse_cpuinfo_model(cpuinfo).as_deref(),
            Some("AMD Ryzen 9 7950X 16-Core Processor")
        );
        assert_eq!(parse_cpuinfo_model("processor : 0\n"), None);
    }

    #[test]
    fn test_detect_is_consistent() {
        let c = HardwareCapabilities::detect();
        assert!(c.validate().is_ok());
        assert_eq!(
            c.max_model_size,
            calculate_max_model_size(c.available_ram, c.has_gpu())
        );
    }
}
