// Output device discovery

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

use super::AudioError;

#[derive(Clone, Debug)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

pub struct AudioDeviceManager {
    host: Host,
}

impl AudioDeviceManager {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// List every output device the host reports
    pub fn list_output_devices(&self) -> Vec<AudioDeviceInfo> {
        let default_name = self
            .host
            .default_output_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_default();

        match self.host.output_devices() {
            Ok(devices) => devices
                .filter_map(|device| device.name().ok())
                .map(|name| AudioDeviceInfo {
                    is_default: name == default_name,
                    name,
                })
                .collect(),
            Err(e) => {
                log::warn!("cannot enumerate output devices: {}", e);
                Vec::new()
            }
        }
    }

    /// Device by name, or the default device when `name` is None
    pub fn output_device(&self, name: Option<&str>) -> Result<Device, AudioError> {
        let Some(wanted) = name else {
            return self
                .host
                .default_output_device()
                .ok_or(AudioError::NoOutputDevice);
        };

        let devices = self
            .host
            .output_devices()
            .map_err(|_| AudioError::NoOutputDevice)?;
        for device in devices {
            if let Ok(device_name) = device.name()
                && device_name == wanted
            {
                return Ok(device);
            }
        }
        Err(AudioError::DeviceNotFound(wanted.to_string()))
    }
}

impl Default for AudioDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
