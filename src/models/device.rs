use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::util::format_timestamp;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Device {
    pub id: String,
    pub account_number: String,
    pub pubkey: String,
    pub hijack_dns: bool,
    pub name: String,
    /// IPv4 address as its 32-bit integer value.
    pub ipv4_address: i64,
    pub ipv6_address: String,
    pub created_at: i64,
}

impl Device {
    pub fn ipv4(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ipv4_address as u32)
    }
}

/// Everything needed to insert a device row; the allocator fills in the addresses.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub id: String,
    pub account_number: String,
    pub pubkey: String,
    pub hijack_dns: bool,
    pub name: String,
    pub ipv4_address: Ipv4Addr,
    pub ipv6_address: String,
    pub created_at: i64,
}

impl NewDevice {
    pub fn into_device(self) -> Device {
        Device {
            id: self.id,
            account_number: self.account_number,
            pubkey: self.pubkey,
            hijack_dns: self.hijack_dns,
            name: self.name,
            ipv4_address: i64::from(u32::from(self.ipv4_address)),
            ipv6_address: self.ipv6_address,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub pubkey: String,
    #[serde(default)]
    pub hijack_dns: bool,
}

#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub id: String,
    pub name: String,
    pub pubkey: String,
    pub hijack_dns: bool,
    pub created: String,
    pub ipv4_address: String,
    pub ipv6_address: String,
    pub ports: Vec<String>,
}

impl From<&Device> for DeviceResponse {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id.clone(),
            name: device.name.clone(),
            pubkey: device.pubkey.clone(),
            hijack_dns: device.hijack_dns,
            created: format_timestamp(device.created_at),
            ipv4_address: format!("{}/32", device.ipv4()),
            ipv6_address: format!("{}/128", device.ipv6_address),
            ports: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}
