use super::{GpuBackend, GpuDevice, ProviderError};
use log::info;
use std::sync::Arc;

/// Hosts without a supported GPU driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGpu;

impl GpuBackend for NoGpu {
    fn name(&self) -> &'static str {
        "none"
    }

    fn devices(&self) -> Result<Vec<GpuDevice>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Picks the GPU backend once at startup. Falls back to [`NoGpu`] when GPUs
/// are disabled or no driver library can be loaded.
pub fn select_gpu_backend(enabled: bool) -> Arc<dyn GpuBackend> {
    if !enabled {
        info!("[gpu] disabled in config");
        return Arc::new(NoGpu);
    }

    #[cfg(feature = "nvml")]
    match nvml::NvmlBackend::init() {
        Ok(backend) => {
            info!("[gpu] using NVML backend");
            return Arc::new(backend);
        }
        Err(err) => info!("[gpu] NVML not available ({err}); reporting no GPUs"),
    }

    Arc::new(NoGpu)
}

#[cfg(feature = "nvml")]
mod nvml {
    use super::{GpuBackend, GpuDevice, ProviderError};
    use log::debug;
    use nvml_wrapper::Nvml;
    use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
    use nvml_wrapper::error::NvmlError;

    impl From<NvmlError> for ProviderError {
        fn from(err: NvmlError) -> Self {
            ProviderError::Backend(format!("NVML: {err}"))
        }
    }

    pub struct NvmlBackend {
        nvml: Nvml,
    }

    impl NvmlBackend {
        pub fn init() -> Result<Self, ProviderError> {
            let nvml = Nvml::init()
                .map_err(|err| ProviderError::Unavailable(format!("NVML ({err})")))?;
            Ok(Self { nvml })
        }

        fn read_device(&self, index: u32) -> Result<GpuDevice, NvmlError> {
            let device = self.nvml.device_by_index(index)?;
            let memory = device.memory_info()?;
            Ok(GpuDevice {
                index,
                name: device.name()?,
                load_percent: f64::from(device.utilization_rates()?.gpu),
                memory_used: memory.used,
                memory_total: memory.total,
                memory_free: memory.free,
                temperature_celsius: device
                    .temperature(TemperatureSensor::Gpu)
                    .ok()
                    .map(f64::from),
            })
        }
    }

    impl GpuBackend for NvmlBackend {
        fn name(&self) -> &'static str {
            "nvml"
        }

        fn devices(&self) -> Result<Vec<GpuDevice>, ProviderError> {
            let count = self.nvml.device_count()?;
            let mut devices = Vec::with_capacity(count as usize);
            for index in 0..count {
                match self.read_device(index) {
                    Ok(device) => devices.push(device),
                    Err(err) => debug!("[gpu] skipping device {index}: {err}"),
                }
            }
            Ok(devices)
        }
    }
}
