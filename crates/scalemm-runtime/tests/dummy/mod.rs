mod kernels;

pub use kernels::*;

use scalemm_runtime::ComputeClient;
use scalemm_runtime::properties::{DeviceProperties, HardwareGeneration};

/// Client on a small generic device.
pub fn test_client() -> ComputeClient {
    ComputeClient::with_workers(DeviceProperties::new(HardwareGeneration::Generic), 4)
}
